//! Pluggable page types. Every tool implements [`ToolHandler`]; the
//! [`ToolRegistry`] is filled once at start-up and resolves tool names.

pub mod quiz;
pub mod wordcloud;

use crate::context::RequestContext;
use crate::error::{FieldError, MtmError, MtmResult};
use crate::pages::{self, Page};
use crate::templates::{self, TemplateSet};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

pub use quiz::Quiz;
pub use wordcloud::Wordcloud;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SettingKind {
    Text { max_len: usize },
    Color,
    Bool,
    Int { min: i64, max: i64 },
    Choice { options: &'static [&'static str] },
}

impl SettingKind {
    /// Returns the canonical stored form of `raw`.
    pub fn validate(&self, raw: &str) -> Result<String, String> {
        let raw = raw.trim();
        match *self {
            SettingKind::Text { max_len } => {
                if raw.chars().count() > max_len {
                    return Err(format!("length must be <= {}", max_len));
                }
                Ok(raw.to_string())
            }
            SettingKind::Color => {
                let hex = raw
                    .strip_prefix('#')
                    .ok_or_else(|| "must be a hex color like #f98012".to_string())?;
                if !(hex.len() == 3 || hex.len() == 6)
                    || !hex.chars().all(|c| c.is_ascii_hexdigit())
                {
                    return Err("must be a hex color like #f98012".to_string());
                }
                Ok(format!("#{}", hex.to_ascii_lowercase()))
            }
            SettingKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" => Ok("1".to_string()),
                "0" | "false" => Ok("0".to_string()),
                _ => Err("must be boolean".to_string()),
            },
            SettingKind::Int { min, max } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| "must be integer".to_string())?;
                if !(min..=max).contains(&n) {
                    return Err(format!("must be in {}..={}", min, max));
                }
                Ok(n.to_string())
            }
            SettingKind::Choice { options } => {
                let s = raw.to_ascii_lowercase();
                if options.contains(&s.as_str()) {
                    Ok(s)
                } else {
                    Err(format!("must be one of: {}", options.join(", ")))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingDef {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolTemplates {
    pub wrapper: &'static str,
    pub content: &'static str,
}

/// Capability contract of a page type.
///
/// Hooks receive the caller's connection; when the page store runs them
/// (`on_page_created`, `on_page_deleted`) that connection is inside an open
/// transaction, so a hook must not start its own.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn templates(&self) -> ToolTemplates;

    fn settings_schema(&self, page: &Page) -> Vec<SettingDef>;

    /// Template variables for the page view; a pure function of stored rows.
    fn render_params(&self, conn: &Connection, page: &Page) -> MtmResult<Map<String, Value>>;

    fn has_results_view(&self) -> bool;

    fn render_results(&self, conn: &Connection, page: &Page) -> MtmResult<String>;

    /// Aggregated results served to polling clients.
    fn results(&self, conn: &Connection, page: &Page) -> MtmResult<Value>;

    fn store_answer(
        &self,
        conn: &Connection,
        page: &Page,
        ctx: &RequestContext,
        selection: &Value,
    ) -> MtmResult<()>;

    fn on_page_created(&self, _conn: &Connection, _page: &Page) -> MtmResult<()> {
        Ok(())
    }

    /// Removes tool-owned rows. `Ok(false)` vetoes the page deletion.
    fn on_page_deleted(&self, conn: &Connection, page: &Page) -> MtmResult<bool>;

    /// Validates every submitted field, then persists all of them or none.
    fn apply_settings(
        &self,
        conn: &Connection,
        page: &Page,
        submitted: &Map<String, Value>,
    ) -> MtmResult<BTreeMap<String, String>> {
        let schema = self.settings_schema(page);
        let accepted = validate_submission(&schema, submitted)?;

        let tx = conn.unchecked_transaction()?;
        for (name, value) in &accepted {
            pages::upsert_setting(&tx, self.name(), page.id, name, value)?;
        }
        pages::bump_marker(&tx, page.id)?;
        tx.commit()?;

        debug!(pageid = page.id, tool = self.name(), fields = accepted.len(), "settings applied");
        Ok(accepted)
    }
}

fn submitted_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn validate_submission(
    schema: &[SettingDef],
    submitted: &Map<String, Value>,
) -> MtmResult<BTreeMap<String, String>> {
    let mut accepted = BTreeMap::new();
    let mut errors = Vec::new();
    for (name, raw) in submitted {
        let Some(def) = schema.iter().find(|d| d.name == name) else {
            errors.push(FieldError::new(name, "unknown setting"));
            continue;
        };
        let Some(text) = submitted_text(raw) else {
            errors.push(FieldError::new(name, "must be a string, number or boolean"));
            continue;
        };
        match def.kind.validate(&text) {
            Ok(v) => {
                accepted.insert(name.clone(), v);
            }
            Err(msg) => errors.push(FieldError::new(name, msg)),
        }
    }
    if !errors.is_empty() {
        return Err(MtmError::Validation(errors));
    }
    Ok(accepted)
}

/// Schema defaults overlaid with the stored values.
pub fn effective_settings(
    conn: &Connection,
    handler: &dyn ToolHandler,
    page: &Page,
) -> MtmResult<BTreeMap<String, String>> {
    let mut out: BTreeMap<String, String> = handler
        .settings_schema(page)
        .iter()
        .map(|d| (d.name.to_string(), d.default.to_string()))
        .collect();
    out.extend(pages::get_settings(conn, handler.name(), page.id)?);
    Ok(out)
}

pub fn setting_is_on(settings: &BTreeMap<String, String>, name: &str) -> bool {
    settings.get(name).map(String::as_str) == Some("1")
}

pub struct ToolRegistry {
    handlers: BTreeMap<&'static str, Box<dyn ToolHandler>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn with_builtin_tools() -> MtmResult<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(Quiz))?;
        registry.register(Box::new(Wordcloud))?;
        Ok(registry)
    }

    /// Adds a handler after checking what the trait cannot express.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) -> MtmResult<()> {
        let name = handler.name();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(MtmError::Configuration(format!(
                "tool name {:?} must match [a-z0-9_]+",
                name
            )));
        }
        if self.handlers.contains_key(name) {
            return Err(MtmError::Configuration(format!(
                "tool {} is already registered",
                name
            )));
        }

        let schema = handler.settings_schema(&schema_page(name));
        let mut seen = HashSet::new();
        for def in &schema {
            if !seen.insert(def.name) {
                return Err(MtmError::Configuration(format!(
                    "tool {} declares setting {} twice",
                    name, def.name
                )));
            }
            if let Err(msg) = def.kind.validate(def.default) {
                return Err(MtmError::Configuration(format!(
                    "tool {} default for {} is invalid: {}",
                    name, def.name, msg
                )));
            }
        }

        let templates = handler.templates();
        if templates.wrapper.trim().is_empty() || templates.content.trim().is_empty() {
            return Err(MtmError::Configuration(format!(
                "tool {} has an empty template",
                name
            )));
        }
        templates::compile(&format!("{}/view_wrapper", name), templates.wrapper)?;
        templates::compile(&format!("{}/view_content", name), templates.content)?;

        debug!(tool = name, settings = schema.len(), "tool registered");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn resolve(&self, tool: &str) -> MtmResult<&dyn ToolHandler> {
        self.handlers
            .get(tool)
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                MtmError::Configuration(format!("no handler registered for tool {:?}", tool))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn install_templates(&self, set: &mut TemplateSet) -> MtmResult<()> {
        for (name, handler) in &self.handlers {
            let t = handler.templates();
            set.register(format!("{}/view_wrapper", name), t.wrapper)?;
            set.register(format!("{}/view_content", name), t.content)?;
        }
        Ok(())
    }
}

fn schema_page(tool: &str) -> Page {
    Page {
        id: 0,
        instance: String::new(),
        title: String::new(),
        question: String::new(),
        tool: tool.to_string(),
        sortorder: 0,
        timecreated: 0,
        timemodified: 0,
        contentchangedat: 0,
    }
}
