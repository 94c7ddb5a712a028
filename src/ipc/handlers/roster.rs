use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{persist, require_workspace, required_str};
use crate::ipc::types::{AppState, Request};
use crate::ledger::ImportRecord;
use serde_json::json;

fn handle_next_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_name = match required_str(req, "className") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({ "nextId": state.store.find_next_id(&class_name) }),
    )
}

/// Records go through the same trimming and status normalization as sheet rows.
fn handle_merge(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let class_name = match required_str(req, "className") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("records").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing records", None);
    };

    let text = |v: &serde_json::Value, key: &str| -> String {
        v.get(key).and_then(|x| x.as_str()).unwrap_or("").to_string()
    };
    let mut skipped = 0usize;
    let records: Vec<ImportRecord> = raw
        .iter()
        .filter_map(|v| {
            let r = ImportRecord::from_raw(&text(v, "name"), &text(v, "actions"), &text(v, "status"));
            if r.is_none() {
                skipped += 1;
            }
            r
        })
        .collect();

    let before = state.store.clone();
    let count = state.store.merge(&class_name, records);
    if state.store.selected().is_none() {
        state.store.select_class(&class_name);
    }
    if let Err(resp) = persist(state, req, before) {
        return resp;
    }
    tracing::info!(class = %class_name, count, skipped, "roster merged");
    ok(
        &req.id,
        json!({ "count": count, "skipped": skipped }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.nextId" => Some(handle_next_id(state, req)),
        "roster.merge" => Some(handle_merge(state, req)),
        _ => None,
    }
}
