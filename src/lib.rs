pub mod config;
pub mod engine;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod postprocess;
pub mod rpc;
pub mod session;
