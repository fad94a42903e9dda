// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool and resource registries: name-keyed handler tables the JSON-RPC
//! dispatcher consults for `tools/call`, `tools/list`, `resources/read`,
//! and `resources/list`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fm_core::Result;
use serde_json::Value;

/// One callable tool. Implementors own their own domain error mapping via
/// `fm_core::Error`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn call(&self, arguments: Value) -> Result<Value>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema(),
                })
            })
            .collect()
    }
}

/// One readable/subscribable resource (e.g. `logs://<processId>`).
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn uri(&self) -> &str;
    fn description(&self) -> &str;
    async fn read(&self) -> Result<Value>;
}

#[derive(Default, Clone)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: Arc<dyn ResourceHandler>) {
        self.resources.insert(resource.uri().to_string(), resource);
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.resources.get(uri).cloned()
    }

    pub fn list(&self) -> Vec<Value> {
        self.resources
            .values()
            .map(|r| serde_json::json!({"uri": r.uri(), "description": r.description()}))
            .collect()
    }
}
