use crate::ledger::{export_status, ImportRecord, RosterStore, SheetBatch};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::path::Path;

pub const DEFAULT_EXPORT_FILE: &str = "Class_Gradebook_Report.xlsx";
pub const HEADER: [&str; 5] = ["№", "Име на ученик", "Действия", "Символ", "Поведение"];

const COL_NAME: usize = 1;
const COL_ACTIONS: usize = 2;
const COL_STATUS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no class data to export")]
    NothingToExport,
    #[error("failed to open workbook {path}: {message}")]
    Open { path: String, message: String },
    #[error("failed to read sheet '{sheet}': {message}")]
    Sheet { sheet: String, message: String },
    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub sheets_written: usize,
    pub rows_written: usize,
    pub classes_skipped: usize,
}

/// Reads every sheet as one batch. Row 0 is the header.
pub fn read_workbook(path: &Path) -> Result<Vec<SheetBatch>, TransferError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| TransferError::Open {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut batches = Vec::with_capacity(sheet_names.len());

    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| TransferError::Sheet {
                sheet: sheet_name.clone(),
                message: e.to_string(),
            })?;

        let mut batch = SheetBatch {
            name: sheet_name.trim().to_string(),
            ..Default::default()
        };
        for row in range.rows().skip(1) {
            let name = cell_text(row.get(COL_NAME));
            let actions = cell_text(row.get(COL_ACTIONS));
            let status = cell_text(row.get(COL_STATUS));
            match ImportRecord::from_raw(&name, &actions, &status) {
                Some(r) => batch.records.push(r),
                None => batch.skipped_rows += 1,
            }
        }
        tracing::debug!(
            sheet = %batch.name,
            records = batch.records.len(),
            skipped = batch.skipped_rows,
            "sheet read"
        );
        batches.push(batch);
    }

    Ok(batches)
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.clone(),
        Some(Data::Int(n)) => n.to_string(),
        Some(Data::Float(n)) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Some(Data::Float(n)) => n.to_string(),
        Some(Data::Bool(b)) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Some(other) => other.to_string(),
    }
}

/// One sheet per non-empty class, statuses converted back to ASCII.
pub fn write_workbook(store: &RosterStore, path: &Path) -> Result<ExportSummary, TransferError> {
    if store.is_empty() {
        return Err(TransferError::NothingToExport);
    }

    let mut summary = ExportSummary::default();
    let mut workbook = Workbook::new();

    for class in store.classes() {
        if class.students.is_empty() {
            summary.classes_skipped += 1;
            continue;
        }
        let sheet = workbook.add_worksheet();
        sheet.set_name(&class.name)?;

        for (col, title) in HEADER.iter().enumerate() {
            sheet.write_string(0, col as u16, *title)?;
        }
        for (i, student) in class.students.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_number(row, 0, student.id as f64)?;
            sheet.write_string(row, COL_NAME as u16, &student.name)?;
            sheet.write_string(row, COL_ACTIONS as u16, &student.actions)?;
            sheet.write_string(row, 3, "")?;
            sheet.write_string(row, COL_STATUS as u16, export_status(&student.status))?;
            summary.rows_written += 1;
        }
        summary.sheets_written += 1;
    }

    if summary.sheets_written == 0 {
        return Err(TransferError::NothingToExport);
    }

    workbook.save(path)?;
    Ok(summary)
}
