use crate::ipc::error::{err, reply};
use crate::ipc::handlers::core::default_refresh_interval;
use crate::ipc::helpers::{param_i64, param_str};
use crate::ipc::types::{AppState, Request};
use crate::pages;
use serde_json::json;

fn handle_instances_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(name) = param_str(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing params.name", None);
    };
    let interval = match req.params.get("refreshinterval") {
        None | Some(serde_json::Value::Null) => {
            default_refresh_interval(conn, state.config.refresh_interval_ms)
        }
        Some(_) => match param_i64(&req.params, "refreshinterval") {
            Some(v) => v,
            None => {
                return err(&req.id, "bad_params", "refreshinterval must be an integer", None)
            }
        },
    };

    reply(
        &req.id,
        pages::create_instance(conn, name, interval)
            .map(|instance| json!({ "instance": instance })),
    )
}

fn handle_instances_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    reply(
        &req.id,
        pages::list_instances(conn).map(|instances| json!({ "instances": instances })),
    )
}

fn handle_instances_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(instance) = param_str(&req.params, "instance") else {
        return err(&req.id, "bad_params", "missing params.instance", None);
    };
    reply(
        &req.id,
        pages::delete_instance(conn, &state.registry, instance)
            .map(|n| json!({ "deletedpages": n })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "instances.create" => Some(handle_instances_create(state, req)),
        "instances.list" => Some(handle_instances_list(state, req)),
        "instances.delete" => Some(handle_instances_delete(state, req)),
        _ => None,
    }
}
