use crate::context::RequestContext;
use crate::error::MtmResult;
use crate::pages::Page;
use crate::templates::TemplateEngine;
use crate::tools::ToolRegistry;
use rusqlite::Connection;
use serde_json::{Map, Value};

pub const CONTAINER_CLASSES: &str = "border rounded";

pub struct PageRenderer<'a> {
    registry: &'a ToolRegistry,
    templates: &'a dyn TemplateEngine,
}

impl<'a> PageRenderer<'a> {
    pub fn new(registry: &'a ToolRegistry, templates: &'a dyn TemplateEngine) -> Self {
        Self {
            registry,
            templates,
        }
    }

    /// Page markup, either the full card (`with_wrapper`) or its bare content.
    pub fn render(
        &self,
        conn: &Connection,
        page: &Page,
        ctx: &RequestContext,
        with_wrapper: bool,
    ) -> MtmResult<String> {
        let handler = self.registry.resolve(&page.tool)?;
        let mut params = base_params(page, ctx);
        params.extend(handler.render_params(conn, page)?);

        let template = if with_wrapper {
            format!("{}/view_wrapper", page.tool)
        } else {
            format!("{}/view_content", page.tool)
        };
        self.templates.render(&template, &params)
    }

    pub fn render_results(&self, conn: &Connection, page: &Page) -> MtmResult<String> {
        self.registry.resolve(&page.tool)?.render_results(conn, page)
    }

    pub fn has_results_view(&self, page: &Page) -> MtmResult<bool> {
        Ok(self.registry.resolve(&page.tool)?.has_results_view())
    }
}

pub fn base_params(page: &Page, ctx: &RequestContext) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("containerclasses".into(), CONTAINER_CLASSES.into());
    params.insert("mootimetercard".into(), CONTAINER_CLASSES.into());
    params.insert("pageid".into(), Value::from(page.id));
    params.insert("cmid".into(), Value::String(page.instance.clone()));
    params.insert("title".into(), Value::String(page.title.clone()));
    params.insert("question".into(), Value::String(page.question.clone()));
    params.insert("isediting".into(), Value::Bool(ctx.isediting));
    params
}
