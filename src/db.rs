use crate::ledger::{ClassRoster, Mark, RosterStore, RunState, Student};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "conduct.sqlite3";
const SELECTED_CLASS_KEY: &str = "roster.selected_class";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            name TEXT PRIMARY KEY,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            class_name TEXT NOT NULL,
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            actions TEXT NOT NULL,
            status TEXT NOT NULL,
            run_type TEXT,
            run_count INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_name, id),
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_name, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {key} is not valid JSON"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn load_roster(conn: &Connection) -> anyhow::Result<RosterStore> {
    let mut class_stmt = conn.prepare("SELECT name FROM classes ORDER BY sort_order")?;
    let class_names = class_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stud_stmt = conn.prepare(
        "SELECT id, name, actions, status, run_type, run_count
         FROM students
         WHERE class_name = ?
         ORDER BY sort_order",
    )?;

    let mut classes = Vec::with_capacity(class_names.len());
    for name in class_names {
        let students = stud_stmt
            .query_map([&name], |row| {
                let run_type: Option<String> = row.get(4)?;
                let run_count: i64 = row.get(5)?;
                let kind = run_type.as_deref().and_then(Mark::parse_kind);
                Ok(Student {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    actions: row.get(2)?,
                    status: row.get(3)?,
                    run: RunState::from_parts(kind, run_count.max(0) as u32),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        classes.push(ClassRoster { name, students });
    }

    let selected = settings_get_json(conn, SELECTED_CLASS_KEY)?
        .and_then(|v| v.as_str().map(str::to_string));

    Ok(RosterStore::from_snapshot(classes, selected))
}

/// Writes the whole store; there is no incremental path.
pub fn save_roster(conn: &Connection, store: &RosterStore) -> anyhow::Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin snapshot transaction")?;

    tx.execute("DELETE FROM students", [])?;
    tx.execute("DELETE FROM classes", [])?;

    {
        let mut class_ins = tx.prepare("INSERT INTO classes(name, sort_order) VALUES(?, ?)")?;
        let mut stud_ins = tx.prepare(
            "INSERT INTO students(class_name, id, name, actions, status, run_type, run_count, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for (ci, class) in store.classes().iter().enumerate() {
            class_ins.execute(params![class.name, ci as i64])?;
            for (si, s) in class.students.iter().enumerate() {
                stud_ins.execute(params![
                    class.name,
                    s.id,
                    s.name,
                    s.actions,
                    s.status,
                    s.run_kind().map(Mark::as_str),
                    s.sequence() as i64,
                    si as i64,
                ])?;
            }
        }
    }

    match store.selected() {
        Some(name) => settings_set_json(&tx, SELECTED_CLASS_KEY, &serde_json::json!(name))?,
        None => {
            tx.execute("DELETE FROM settings WHERE key = ?", [SELECTED_CLASS_KEY])?;
        }
    }

    tx.commit().context("failed to commit snapshot")?;
    Ok(())
}
