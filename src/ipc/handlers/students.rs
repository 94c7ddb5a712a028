use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, persist, require_workspace};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{Mark, StudentView};
use serde_json::json;

fn class_param(req: &Request) -> Option<String> {
    param_str(req, "className")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = class_param(req);
    let students: Vec<StudentView> = state
        .store
        .students(class.as_deref())
        .iter()
        .map(|s| s.view())
        .collect();
    ok(
        &req.id,
        json!({
            "className": class.as_deref().or(state.store.selected()),
            "students": students,
        }),
    )
}

fn handle_students_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class = class_param(req);
    let query = param_str(req, "query").unwrap_or("");
    let hits = state.store.search(class.as_deref(), query);
    ok(&req.id, json!({ "hits": hits }))
}

fn handle_marks_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(mark) = param_str(req, "symbol").and_then(Mark::from_symbol) else {
        return err(
            &req.id,
            "bad_params",
            "symbol must be a praise or note mark",
            Some(json!({ "symbol": req.params.get("symbol") })),
        );
    };
    let class = class_param(req);

    let before = state.store.clone();
    let Some((student, outcome)) = state.store.apply_mark(class.as_deref(), student_id, mark) else {
        return ok(&req.id, json!({ "applied": false }));
    };
    if let Err(resp) = persist(state, req, before) {
        return resp;
    }
    ok(
        &req.id,
        json!({
            "applied": true,
            "student": student.view(),
            "outcome": outcome,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.search" => Some(handle_students_search(state, req)),
        "marks.apply" => Some(handle_marks_apply(state, req)),
        _ => None,
    }
}
