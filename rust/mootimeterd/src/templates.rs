//! Tool templates are mustache sources compiled once at start-up.

use crate::error::{MtmError, MtmResult};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub trait TemplateEngine {
    fn render(&self, name: &str, params: &Map<String, Value>) -> MtmResult<String>;
}

#[derive(Default)]
pub struct TemplateSet {
    compiled: HashMap<String, mustache::Template>,
}

/// Parses `source`; syntax errors are reported against `name`.
pub fn compile(name: &str, source: &str) -> MtmResult<mustache::Template> {
    mustache::compile_str(source)
        .map_err(|e| MtmError::Configuration(format!("template {}: {}", name, e)))
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, source: &str) -> MtmResult<()> {
        let name = name.into();
        let template = compile(&name, source)?;
        self.compiled.insert(name, template);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }
}

impl TemplateEngine for TemplateSet {
    fn render(&self, name: &str, params: &Map<String, Value>) -> MtmResult<String> {
        let template = self
            .compiled
            .get(name)
            .ok_or_else(|| MtmError::Configuration(format!("template {} is not registered", name)))?;
        template
            .render_to_string(params)
            .map_err(|e| MtmError::Configuration(format!("template {}: {}", name, e)))
    }
}
