use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::param_i64;
use crate::ipc::types::{AppState, Request};
use crate::pages::{MAX_REFRESH_INTERVAL_MS, MIN_REFRESH_INTERVAL_MS};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

const DEFAULTS_KEY: &str = "workspace.defaults";

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspace": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "tools": state.registry.names().collect::<Vec<_>>(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match state.open_workspace(&path) {
        Ok(()) => ok(&req.id, json!({ "workspace": path.to_string_lossy() })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// Refresh interval for new instances: workspace default, else the daemon config.
pub fn default_refresh_interval(conn: &Connection, fallback: i64) -> i64 {
    match db::settings_get_json(conn, DEFAULTS_KEY) {
        Ok(Some(v)) => v
            .get("refreshinterval")
            .and_then(|v| v.as_i64())
            .unwrap_or(fallback),
        _ => fallback,
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(
        &req.id,
        json!({
            "refreshinterval": default_refresh_interval(conn, state.config.refresh_interval_ms),
        }),
    )
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(ms) = param_i64(&req.params, "refreshinterval") else {
        return err(&req.id, "bad_params", "missing params.refreshinterval", None);
    };
    if !(MIN_REFRESH_INTERVAL_MS..=MAX_REFRESH_INTERVAL_MS).contains(&ms) {
        return err(
            &req.id,
            "bad_params",
            format!(
                "refreshinterval must be in {}..={}",
                MIN_REFRESH_INTERVAL_MS, MAX_REFRESH_INTERVAL_MS
            ),
            None,
        );
    }
    if let Err(e) = db::settings_set_json(conn, DEFAULTS_KEY, &json!({ "refreshinterval": ms })) {
        return err(&req.id, "db_update_failed", format!("{e:?}"), None);
    }
    ok(&req.id, json!({ "refreshinterval": ms }))
}

fn handle_tools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut tools = Vec::new();
    for name in state.registry.names() {
        let Ok(handler) = state.registry.resolve(name) else {
            continue;
        };
        tools.push(json!({
            "name": name,
            "hasresultsview": handler.has_results_view(),
        }));
    }
    ok(&req.id, json!({ "tools": tools }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.config.get" => Some(handle_config_get(state, req)),
        "workspace.config.update" => Some(handle_config_update(state, req)),
        "tools.list" => Some(handle_tools_list(state, req)),
        _ => None,
    }
}
