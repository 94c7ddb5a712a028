use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::ledger::RosterStore;

pub fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Trimmed, non-empty string param.
pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match param_str(req, key).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

pub fn require_workspace(state: &AppState, req: &Request) -> Result<(), serde_json::Value> {
    if state.db.is_none() {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    }
    Ok(())
}

/// Writes the whole roster snapshot after a mutation. When the write fails the
/// store is put back to `before`, so a failed call leaves no in-memory change.
pub fn persist(
    state: &mut AppState,
    req: &Request,
    before: RosterStore,
) -> Result<(), serde_json::Value> {
    let saved = match state.db.as_ref() {
        Some(conn) => db::save_roster(conn, &state.store).map_err(|e| {
            tracing::error!(method = %req.method, error = %e, "snapshot save failed, change rolled back");
            err(&req.id, "db_save_failed", format!("{e:#}"), None)
        }),
        None => Err(err(&req.id, "no_workspace", "select a workspace first", None)),
    };
    if let Err(resp) = saved {
        state.store = before;
        return Err(resp);
    }
    Ok(())
}
