use crate::ipc::error::ok;
use crate::ipc::helpers::{persist, require_workspace, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "classes": state.store.class_summaries(),
            "selectedClass": state.store.selected(),
        }),
    )
}

fn handle_classes_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Selecting an unknown class leaves the pointer where it was.
    let before = state.store.clone();
    let already = state.store.selected() == Some(name.as_str());
    let changed = !already && state.store.select_class(&name);
    if changed {
        if let Err(resp) = persist(state, req, before) {
            return resp;
        }
    }
    ok(
        &req.id,
        json!({
            "changed": changed,
            "selectedClass": state.store.selected(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.select" => Some(handle_classes_select(state, req)),
        _ => None,
    }
}
