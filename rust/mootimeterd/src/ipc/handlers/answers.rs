use crate::answers;
use crate::ipc::error::{err, reply};
use crate::ipc::helpers::{page_from_params, param_i64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_answers_store(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(selection) = req.params.get("selection") else {
        return err(&req.id, "bad_params", "missing params.selection", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(
        &req.id,
        answers::submit(conn, &state.registry, &page, &req.context, selection).map(|()| json!({})),
    )
}

fn handle_results_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let lastupdated = param_i64(&req.params, "lastupdated");
    reply(&req.id, answers::query(conn, &state.registry, &page, lastupdated))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "answers.store" => Some(handle_answers_store(state, req)),
        "results.get" => Some(handle_results_get(state, req)),
        _ => None,
    }
}
