use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::context::RequestContext;
use crate::db;
use crate::templates::TemplateSet;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub context: RequestContext,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub registry: ToolRegistry,
    pub templates: TemplateSet,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let registry = ToolRegistry::with_builtin_tools()?;
        let mut templates = TemplateSet::new();
        registry.install_templates(&mut templates)?;
        Ok(Self {
            config,
            workspace: None,
            db: None,
            registry,
            templates,
        })
    }

    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        info!(workspace = %path.to_string_lossy(), "workspace opened");
        Ok(())
    }
}
