use crate::ipc::error::{err, fail, ok, reply};
use crate::ipc::helpers::{page_from_params, param_bool, param_i64, param_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::{self, PageRecord};
use crate::render::PageRenderer;
use serde_json::json;

fn handle_pages_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(instance) = param_str(&req.params, "instance") else {
        return err(&req.id, "bad_params", "missing params.instance", None);
    };
    reply(&req.id, pages::list_pages(conn, instance).map(|list| json!({ "pages": list })))
}

fn handle_pages_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match page_from_params(conn, req) {
        Ok(page) => ok(&req.id, json!({ "page": page })),
        Err(resp) => resp,
    }
}

fn handle_pages_store(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let record: PageRecord = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if record.instance.trim().is_empty() {
        return err(&req.id, "bad_params", "missing params.instance", None);
    }
    reply(
        &req.id,
        pages::create_or_update(conn, &state.registry, &record)
            .map(|pageid| json!({ "pageid": pageid })),
    )
}

fn handle_pages_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if param_str(&req.params, "instance").is_none() {
        return err(&req.id, "bad_params", "missing params.instance", None);
    }
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(
        &req.id,
        pages::delete_page(conn, &state.registry, &page).map(|()| json!({ "deleted": page.id })),
    )
}

fn handle_pages_navigation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(instance) = param_str(&req.params, "instance") else {
        return err(&req.id, "bad_params", "missing params.instance", None);
    };
    let active = param_i64(&req.params, "pageid");
    reply(
        &req.id,
        pages::list_pages(conn, instance)
            .map(|list| json!({ "pages": pages::navigation(&list, active) })),
    )
}

fn handle_pages_render(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let with_wrapper = param_bool(&req.params, "withwrapper").unwrap_or(true);
    let renderer = PageRenderer::new(&state.registry, &state.templates);
    match renderer.render(conn, &page, &req.context, with_wrapper) {
        Ok(html) => ok(
            &req.id,
            json!({
                "pageid": page.id,
                "html": html,
                "contentchangedat": page.contentchangedat,
            }),
        ),
        Err(e) => fail(&req.id, &e),
    }
}

fn handle_pages_render_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let renderer = PageRenderer::new(&state.registry, &state.templates);
    let has = match renderer.has_results_view(&page) {
        Ok(v) => v,
        Err(e) => return fail(&req.id, &e),
    };
    if !has {
        return ok(&req.id, json!({ "hasresultsview": false, "html": "" }));
    }
    reply(
        &req.id,
        renderer.render_results(conn, &page)
            .map(|html| json!({ "hasresultsview": true, "html": html })),
    )
}

fn handle_pages_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let page = match page_from_params(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    reply(&req.id, pages::page_state(conn, page.id).map(|ps| json!(ps)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "pages.list" => Some(handle_pages_list(state, req)),
        "pages.get" => Some(handle_pages_get(state, req)),
        "pages.store" => Some(handle_pages_store(state, req)),
        "pages.delete" => Some(handle_pages_delete(state, req)),
        "pages.navigation" => Some(handle_pages_navigation(state, req)),
        "pages.render" => Some(handle_pages_render(state, req)),
        "pages.renderResults" => Some(handle_pages_render_results(state, req)),
        "pages.state" => Some(handle_pages_state(state, req)),
        _ => None,
    }
}
