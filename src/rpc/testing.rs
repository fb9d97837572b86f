//! Scripted control channel for unit tests

use super::{ControlChannel, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&str, &[Value]) -> Result<Value> + Send + Sync>;

/// Answers every call through a closure and records the traffic.
pub(crate) struct ScriptedChannel {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedChannel {
    pub(crate) fn new(
        handler: impl Fn(&str, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl ControlChannel for ScriptedChannel {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let result = (self.handler)(method, &params);
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        result
    }
}
