use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, persist, require_workspace, required_str};
use crate::ipc::types::{AppState, Request};
use crate::spreadsheet::{self, TransferError, DEFAULT_EXPORT_FILE};
use serde_json::json;
use std::path::PathBuf;

fn handle_workbook_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_workspace(state, req) {
        return resp;
    }
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    let batches = match spreadsheet::read_workbook(&path) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    let before = state.store.clone();
    let summary = state.store.import_sheets(batches);
    if let Err(resp) = persist(state, req, before) {
        return resp;
    }
    tracing::info!(
        records = summary.records_imported,
        skipped = summary.skipped_rows,
        classes = ?summary.classes,
        "workbook imported"
    );
    ok(
        &req.id,
        json!({
            "recordsImported": summary.records_imported,
            "skippedRows": summary.skipped_rows,
            "classes": summary.classes,
            "selectedClass": state.store.selected(),
        }),
    )
}

fn handle_workbook_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match param_str(req, "path").map(str::trim).filter(|s| !s.is_empty()) {
        Some(p) => PathBuf::from(p),
        None => match state.workspace.as_ref() {
            Some(ws) => ws.join(DEFAULT_EXPORT_FILE),
            None => return err(&req.id, "no_workspace", "select a workspace first", None),
        },
    };

    match spreadsheet::write_workbook(&state.store, &path) {
        Ok(summary) => {
            tracing::info!(
                path = %path.to_string_lossy(),
                sheets = summary.sheets_written,
                "workbook exported"
            );
            ok(
                &req.id,
                json!({
                    "path": path.to_string_lossy(),
                    "sheetsWritten": summary.sheets_written,
                    "rowsWritten": summary.rows_written,
                    "classesSkipped": summary.classes_skipped,
                }),
            )
        }
        Err(TransferError::NothingToExport) => err(
            &req.id,
            "nothing_to_export",
            TransferError::NothingToExport.to_string(),
            None,
        ),
        Err(e) => err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workbook.import" => Some(handle_workbook_import(state, req)),
        "workbook.export" => Some(handle_workbook_export(state, req)),
        _ => None,
    }
}
