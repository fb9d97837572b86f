use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("RPC endpoint '{url}' must use http:// or https://")]
    InvalidRpcUrl { url: String },

    #[error("download_dir and output_dir must differ (both are '{path}')")]
    SameDirectories { path: String },

    #[error("Engine binary path is empty")]
    EmptyEngineBinary,

    #[error("Subtitle language tag at position {index} is empty")]
    EmptyLanguageTag { index: usize },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_engine(config)?;
    validate_rpc(config)?;
    validate_session(config)?;
    validate_paths(config)?;
    validate_postprocess(config)?;
    Ok(())
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::ZeroValue { field });
    }
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.manage && config.engine.binary.as_os_str().is_empty() {
        return Err(ValidationError::EmptyEngineBinary);
    }
    non_zero("engine.ready_attempts", config.engine.ready_attempts.into())?;
    non_zero("engine.max_concurrent_downloads", config.engine.max_concurrent_downloads.into())?;
    Ok(())
}

fn validate_rpc(config: &Config) -> Result<(), ValidationError> {
    let url = config.rpc_url();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidRpcUrl { url });
    }
    non_zero("rpc.max_attempts", config.rpc.max_attempts.into())?;
    non_zero("rpc.request_timeout_ms", config.rpc.request_timeout_ms)?;
    Ok(())
}

fn validate_session(config: &Config) -> Result<(), ValidationError> {
    non_zero("session.poll_interval_ms", config.session.poll_interval_ms)?;
    non_zero("session.timeout_secs", config.session.timeout_secs)?;
    non_zero("session.metadata_poll_interval_ms", config.session.metadata_poll_interval_ms)?;
    Ok(())
}

fn validate_paths(config: &Config) -> Result<(), ValidationError> {
    if config.paths.download_dir == config.paths.output_dir {
        return Err(ValidationError::SameDirectories {
            path: config.paths.output_dir.display().to_string(),
        });
    }
    Ok(())
}

fn validate_postprocess(config: &Config) -> Result<(), ValidationError> {
    if let Some(index) = config
        .postprocess
        .subtitle_languages
        .iter()
        .position(|tag| tag.trim().is_empty())
    {
        return Err(ValidationError::EmptyLanguageTag { index });
    }
    non_zero("postprocess.tool_timeout_ms", config.postprocess.tool_timeout_ms)?;
    Ok(())
}
