use crate::ipc::error::{err, reply};
use crate::ipc::helpers::{page_from_params, param_i64, param_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::Page;
use crate::tools::{quiz, Quiz};
use rusqlite::Connection;
use serde_json::json;

fn quiz_page(conn: &Connection, req: &Request) -> Result<Page, serde_json::Value> {
    let page = page_from_params(conn, req)?;
    if page.tool != Quiz::NAME {
        return Err(err(
            &req.id,
            "bad_params",
            format!("page {} is a {} page, not a quiz", page.id, page.tool),
            None,
        ));
    }
    Ok(page)
}

fn handle_options_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match quiz_page(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(&req.id, quiz::list_options(conn, page.id).map(|options| json!({ "options": options })))
}

fn handle_options_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match quiz_page(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let text = param_str(&req.params, "text").unwrap_or("");
    reply(
        &req.id,
        quiz::add_option(conn, &page, text).map(|optionid| json!({ "optionid": optionid })),
    )
}

fn handle_options_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(optionid) = param_i64(&req.params, "optionid") else {
        return err(&req.id, "bad_params", "missing params.optionid", None);
    };
    let Some(text) = param_str(&req.params, "text") else {
        return err(&req.id, "bad_params", "missing params.text", None);
    };
    let page = match quiz_page(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(
        &req.id,
        quiz::update_option(conn, &page, optionid, text).map(|()| json!({ "optionid": optionid })),
    )
}

fn handle_options_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(optionid) = param_i64(&req.params, "optionid") else {
        return err(&req.id, "bad_params", "missing params.optionid", None);
    };
    let page = match quiz_page(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(
        &req.id,
        quiz::delete_option(conn, &page, optionid).map(|()| json!({ "deleted": optionid })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quiz.options.list" => Some(handle_options_list(state, req)),
        "quiz.options.add" => Some(handle_options_add(state, req)),
        "quiz.options.update" => Some(handle_options_update(state, req)),
        "quiz.options.delete" => Some(handle_options_delete(state, req)),
        _ => None,
    }
}
