//! Answer submission and the results query served to polling clients.

use crate::context::RequestContext;
use crate::error::MtmResult;
use crate::pages::{self, Page};
use crate::tools::ToolRegistry;
use rusqlite::Connection;
use serde_json::{json, Value};

pub fn submit(
    conn: &Connection,
    registry: &ToolRegistry,
    page: &Page,
    ctx: &RequestContext,
    selection: &Value,
) -> MtmResult<()> {
    registry
        .resolve(&page.tool)?
        .store_answer(conn, page, ctx, selection)
}

/// Tool results plus the page marker. When the caller already holds the
/// current marker (`lastupdated`), only `{changed: false}` is returned.
pub fn query(
    conn: &Connection,
    registry: &ToolRegistry,
    page: &Page,
    lastupdated: Option<i64>,
) -> MtmResult<Value> {
    let handler = registry.resolve(&page.tool)?;
    let state = pages::page_state(conn, page.id)?;
    let mut out = json!({
        "pageid": page.id,
        "contentchangedat": state.contentchangedat,
        "changed": true,
    });
    if lastupdated.is_some_and(|seen| seen >= state.contentchangedat) {
        out["changed"] = Value::Bool(false);
        return Ok(out);
    }
    if let (Value::Object(target), Value::Object(payload)) =
        (&mut out, handler.results(conn, page)?)
    {
        target.extend(payload);
    }
    Ok(out)
}
