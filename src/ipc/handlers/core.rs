use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "selectedClass": state.store.selected(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:#}"), None),
    };
    let store = match db::load_roster(&conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:#}"), None),
    };

    tracing::info!(
        workspace = %path.to_string_lossy(),
        classes = store.classes().len(),
        "workspace opened"
    );
    let result = json!({
        "workspacePath": path.to_string_lossy(),
        "classCount": store.classes().len(),
        "selectedClass": store.selected(),
    });
    state.workspace = Some(path);
    state.db = Some(conn);
    state.store = store;
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
