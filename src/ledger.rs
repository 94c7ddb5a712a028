use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Three consecutive same-type marks become one permanent status symbol.
pub const ESCALATION_THRESHOLD: u32 = 3;

pub const PRAISE_MARK: char = '🇴';
pub const NOTE_MARK: char = '❌';
pub const PRAISE_STATUS: char = '➕';
pub const NOTE_STATUS: char = '➖';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Praise,
    Note,
}

impl Mark {
    /// Accepts the button symbols as well as the plain words.
    pub fn from_symbol(raw: &str) -> Option<Mark> {
        let t = raw.trim();
        if t == PRAISE_MARK.to_string() || t.eq_ignore_ascii_case("praise") {
            return Some(Mark::Praise);
        }
        if t == NOTE_MARK.to_string() || t.eq_ignore_ascii_case("note") {
            return Some(Mark::Note);
        }
        None
    }

    pub fn symbol(self) -> char {
        match self {
            Mark::Praise => PRAISE_MARK,
            Mark::Note => NOTE_MARK,
        }
    }

    pub fn status(self) -> StatusSymbol {
        match self {
            Mark::Praise => StatusSymbol::Praise,
            Mark::Note => StatusSymbol::Note,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Praise => "praise",
            Mark::Note => "note",
        }
    }

    pub fn parse_kind(raw: &str) -> Option<Mark> {
        match raw {
            "praise" => Some(Mark::Praise),
            "note" => Some(Mark::Note),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSymbol {
    Praise,
    Note,
}

impl StatusSymbol {
    pub fn symbol(self) -> char {
        match self {
            StatusSymbol::Praise => PRAISE_STATUS,
            StatusSymbol::Note => NOTE_STATUS,
        }
    }
}

/// In-progress run of one mark type. `count` is 1 or 2 between operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Open { kind: Mark, count: u32 },
}

impl RunState {
    pub fn count(self) -> u32 {
        match self {
            RunState::Idle => 0,
            RunState::Open { count, .. } => count,
        }
    }

    pub fn kind(self) -> Option<Mark> {
        match self {
            RunState::Idle => None,
            RunState::Open { kind, .. } => Some(kind),
        }
    }

    /// Rebuilds a run from the stored pair; anything inconsistent collapses to idle.
    pub fn from_parts(kind: Option<Mark>, count: u32) -> RunState {
        match kind {
            Some(kind) if count > 0 && count < ESCALATION_THRESHOLD => RunState::Open { kind, count },
            _ => RunState::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub actions: String,
    pub status: String,
    pub run: RunState,
}

impl Student {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            actions: String::new(),
            status: String::new(),
            run: RunState::Idle,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.run.count()
    }

    pub fn run_kind(&self) -> Option<Mark> {
        self.run.kind()
    }

    /// Merge-time identity only; storage identity is `id`.
    pub fn identity_key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn has_official_praise(&self) -> bool {
        self.status.contains(PRAISE_STATUS)
    }

    pub fn has_official_note(&self) -> bool {
        self.status.contains(NOTE_STATUS)
    }

    pub fn view(&self) -> StudentView {
        StudentView {
            id: self.id,
            name: self.name.clone(),
            actions: self.actions.clone(),
            status: self.status.clone(),
            sequence: self.sequence(),
            run_type: self.run_kind(),
            official_praise: self.has_official_praise(),
            official_note: self.has_official_note(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub id: i64,
    pub name: String,
    pub actions: String,
    pub status: String,
    pub sequence: u32,
    #[serde(rename = "type")]
    pub run_type: Option<Mark>,
    pub official_praise: bool,
    pub official_note: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MarkOutcome {
    Accumulated { sequence: u32 },
    Cancelled { removed: Option<char> },
    Escalated { status: StatusSymbol },
}

pub fn apply_mark(student: &mut Student, mark: Mark) -> MarkOutcome {
    let is_cancellation = matches!(student.run, RunState::Open { kind, .. } if kind != mark);

    if is_cancellation {
        // The opposing mark is consumed; only the latest tally is taken back.
        let removed = student.actions.pop();
        student.run = RunState::Idle;
        return MarkOutcome::Cancelled { removed };
    }

    if student.run == RunState::Idle && !student.actions.is_empty() {
        student.actions.clear();
    }

    let count = student.run.count() + 1;
    student.actions.push(mark.symbol());

    if count >= ESCALATION_THRESHOLD {
        let status = mark.status();
        student.status.push(status.symbol());
        student.actions.clear();
        student.run = RunState::Idle;
        return MarkOutcome::Escalated { status };
    }

    student.run = RunState::Open { kind: mark, count };
    MarkOutcome::Accumulated { sequence: count }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRecord {
    pub name: String,
    #[serde(default)]
    pub actions: String,
    #[serde(default)]
    pub status: String,
}

impl ImportRecord {
    /// Trims the row and normalizes ASCII status; `None` when the name is blank.
    pub fn from_raw(name: &str, actions: &str, status: &str) -> Option<ImportRecord> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(ImportRecord {
            name: name.to_string(),
            actions: actions.trim().to_string(),
            status: normalize_status(status.trim()),
        })
    }
}

pub fn normalize_status(raw: &str) -> String {
    raw.replace('+', &PRAISE_STATUS.to_string())
        .replace('-', &NOTE_STATUS.to_string())
}

pub fn export_status(stored: &str) -> String {
    stored
        .replace(PRAISE_STATUS, "+")
        .replace(NOTE_STATUS, "-")
}

pub fn next_id(students: &[Student]) -> i64 {
    students.iter().map(|s| s.id).max().map(|m| m + 1).unwrap_or(1)
}

/// Replaces `students` with the incoming batch, keeping ids of matched names.
/// Students missing from the batch are dropped: the sheet is authoritative.
pub fn merge_records(students: &mut Vec<Student>, records: Vec<ImportRecord>) -> usize {
    let mut next = next_id(students);
    let mut existing: HashMap<String, Student> = std::mem::take(students)
        .into_iter()
        .map(|s| (s.identity_key(), s))
        .collect();

    let mut merged: Vec<Student> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = record.name.to_lowercase();

        // A repeated name within one batch updates the row it already produced.
        if let Some(&pos) = positions.get(&key) {
            let s = &mut merged[pos];
            s.actions = record.actions;
            s.status = record.status;
            s.run = RunState::Idle;
            continue;
        }

        let student = match existing.remove(&key) {
            Some(mut s) => {
                s.actions = record.actions;
                s.status = record.status;
                s.run = RunState::Idle;
                s
            }
            None => {
                let mut s = Student::new(next, record.name);
                next += 1;
                s.actions = record.actions;
                s.status = record.status;
                s
            }
        };
        positions.insert(key, merged.len());
        merged.push(student);
    }

    *students = merged;
    students.len()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRoster {
    pub name: String,
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Default)]
pub struct SheetBatch {
    pub name: String,
    pub records: Vec<ImportRecord>,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub records_imported: usize,
    pub skipped_rows: usize,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub name: String,
    pub student_count: usize,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub student_id: i64,
    /// Char range of the match inside the name, when the name matched.
    pub highlight: Option<(usize, usize)>,
}

/// All classes of the workspace plus the selected-class pointer.
/// Mutated only through `apply_mark`, `merge`, `import_sheets` and `select_class`.
#[derive(Debug, Clone, Default)]
pub struct RosterStore {
    classes: Vec<ClassRoster>,
    selected: Option<String>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(classes: Vec<ClassRoster>, selected: Option<String>) -> Self {
        let mut store = Self { classes, selected };
        store.fix_selection();
        store
    }

    fn fix_selection(&mut self) {
        let valid = self
            .selected
            .as_deref()
            .map(|name| self.class(name).is_some())
            .unwrap_or(false);
        if !valid {
            self.selected = self.classes.first().map(|c| c.name.clone());
        }
    }

    pub fn classes(&self) -> &[ClassRoster] {
        &self.classes
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, name: &str) -> Option<&ClassRoster> {
        self.classes.iter().find(|c| c.name == name)
    }

    fn class_mut(&mut self, name: &str) -> Option<&mut ClassRoster> {
        self.classes.iter_mut().find(|c| c.name == name)
    }

    fn resolve<'a>(&'a self, class_name: Option<&'a str>) -> Option<&'a str> {
        class_name.or(self.selected.as_deref())
    }

    pub fn students(&self, class_name: Option<&str>) -> &[Student] {
        self.resolve(class_name)
            .and_then(|name| self.class(name))
            .map(|c| c.students.as_slice())
            .unwrap_or(&[])
    }

    pub fn class_summaries(&self) -> Vec<ClassSummary> {
        self.classes
            .iter()
            .map(|c| ClassSummary {
                name: c.name.clone(),
                student_count: c.students.len(),
                selected: self.selected.as_deref() == Some(c.name.as_str()),
            })
            .collect()
    }

    pub fn select_class(&mut self, name: &str) -> bool {
        if self.class(name).is_none() {
            tracing::debug!(class = name, "select ignored: unknown class");
            return false;
        }
        self.selected = Some(name.to_string());
        true
    }

    pub fn find_next_id(&self, class_name: &str) -> i64 {
        self.class(class_name)
            .map(|c| next_id(&c.students))
            .unwrap_or(1)
    }

    /// Missing class or student is a no-op and yields `None`.
    pub fn apply_mark(
        &mut self,
        class_name: Option<&str>,
        student_id: i64,
        mark: Mark,
    ) -> Option<(Student, MarkOutcome)> {
        let name = class_name
            .map(str::to_string)
            .or_else(|| self.selected.clone())?;
        let Some(class) = self.class_mut(&name) else {
            tracing::debug!(class = %name, "mark ignored: unknown class");
            return None;
        };
        let Some(student) = class.students.iter_mut().find(|s| s.id == student_id) else {
            tracing::debug!(class = %name, student_id, "mark ignored: unknown student");
            return None;
        };
        let outcome = apply_mark(student, mark);
        if let MarkOutcome::Escalated { status } = outcome {
            tracing::info!(class = %name, student_id, status = %status.symbol(), "run escalated");
        }
        Some((student.clone(), outcome))
    }

    pub fn merge(&mut self, class_name: &str, records: Vec<ImportRecord>) -> usize {
        if self.class(class_name).is_none() {
            self.classes.push(ClassRoster {
                name: class_name.to_string(),
                students: Vec::new(),
            });
        }
        let Some(class) = self.class_mut(class_name) else {
            return 0;
        };
        let count = merge_records(&mut class.students, records);
        tracing::debug!(class = class_name, count, "roster merged");
        count
    }

    pub fn import_sheets(&mut self, batches: Vec<SheetBatch>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let mut last: Option<String> = None;

        for batch in batches {
            let name = batch.name.trim().to_string();
            summary.skipped_rows += batch.skipped_rows;
            if name.is_empty() {
                tracing::warn!(rows = batch.records.len(), "sheet without a name skipped");
                summary.skipped_rows += batch.records.len();
                continue;
            }
            summary.records_imported += self.merge(&name, batch.records);
            summary.classes.push(name.clone());
            last = Some(name);
        }

        if self.selected.is_none() {
            self.selected = last;
        }
        summary
    }

    pub fn search(&self, class_name: Option<&str>, query: &str) -> Vec<SearchHit> {
        let filter = query.trim().to_lowercase();
        self.students(class_name)
            .iter()
            .filter_map(|s| {
                if filter.is_empty() {
                    return Some(SearchHit {
                        student_id: s.id,
                        highlight: None,
                    });
                }
                if let Some(range) = find_folded(&s.name, &filter) {
                    return Some(SearchHit {
                        student_id: s.id,
                        highlight: Some(range),
                    });
                }
                if s.id.to_string() == filter {
                    return Some(SearchHit {
                        student_id: s.id,
                        highlight: None,
                    });
                }
                None
            })
            .collect()
    }
}

/// Case-insensitive find returning a char range of `name` itself. Lowercasing may
/// expand one char into several (`İ` -> `i̇`), so each folded char keeps the index
/// of the char it came from.
fn find_folded(name: &str, lower_needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = lower_needle.chars().collect();
    if needle.is_empty() {
        return None;
    }
    let folded: Vec<(usize, char)> = name
        .chars()
        .enumerate()
        .flat_map(|(i, c)| c.to_lowercase().map(move |l| (i, l)))
        .collect();
    folded
        .windows(needle.len())
        .find(|w| w.iter().map(|(_, c)| *c).eq(needle.iter().copied()))
        .map(|w| (w[0].0, w[w.len() - 1].0 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, actions: &str, status: &str) -> ImportRecord {
        ImportRecord {
            name: name.into(),
            actions: actions.into(),
            status: status.into(),
        }
    }

    fn with_ids(ids: &[i64]) -> Vec<Student> {
        ids.iter()
            .map(|id| Student::new(*id, format!("Student {id}")))
            .collect()
    }

    #[test]
    fn third_same_type_mark_escalates() {
        let mut s = Student::new(1, "Ivan");
        assert_eq!(
            apply_mark(&mut s, Mark::Praise),
            MarkOutcome::Accumulated { sequence: 1 }
        );
        assert_eq!(
            apply_mark(&mut s, Mark::Praise),
            MarkOutcome::Accumulated { sequence: 2 }
        );
        assert_eq!(s.actions, "🇴🇴");
        assert!(s.status.is_empty());

        assert_eq!(
            apply_mark(&mut s, Mark::Praise),
            MarkOutcome::Escalated {
                status: StatusSymbol::Praise
            }
        );
        assert_eq!(s.status, "➕");
        assert_eq!(s.actions, "");
        assert_eq!(s.sequence(), 0);
        assert_eq!(s.run_kind(), None);
    }

    #[test]
    fn note_run_escalates_to_minus() {
        let mut s = Student::new(1, "Ivan");
        for _ in 0..6 {
            apply_mark(&mut s, Mark::Note);
        }
        assert_eq!(s.status, "➖➖");
        assert_eq!(s.run, RunState::Idle);
    }

    #[test]
    fn opposing_mark_after_one_cancels_it() {
        let mut s = Student::new(1, "Ivan");
        apply_mark(&mut s, Mark::Praise);
        let out = apply_mark(&mut s, Mark::Note);
        assert_eq!(
            out,
            MarkOutcome::Cancelled {
                removed: Some(PRAISE_MARK)
            }
        );
        assert_eq!(s.actions, "");
        assert_eq!(s.sequence(), 0);
        assert_eq!(s.run_kind(), None);
        assert_eq!(s.status, "");
    }

    #[test]
    fn cancellation_pops_only_last_symbol() {
        let mut s = Student::new(1, "Ivan");
        s.actions = "OO".into();
        s.run = RunState::Open {
            kind: Mark::Praise,
            count: 2,
        };
        apply_mark(&mut s, Mark::Note);
        assert_eq!(s.actions, "O");
        assert_eq!(s.run, RunState::Idle);
        assert_eq!(s.status, "");
    }

    #[test]
    fn fresh_run_discards_leftover_actions() {
        let mut s = Student::new(1, "Ivan");
        s.actions = "🇴".into();
        apply_mark(&mut s, Mark::Note);
        assert_eq!(s.actions, "❌");
        assert_eq!(
            s.run,
            RunState::Open {
                kind: Mark::Note,
                count: 1
            }
        );
    }

    #[test]
    fn run_state_from_parts_rejects_inconsistent_pairs() {
        assert_eq!(RunState::from_parts(Some(Mark::Praise), 0), RunState::Idle);
        assert_eq!(RunState::from_parts(None, 2), RunState::Idle);
        assert_eq!(RunState::from_parts(Some(Mark::Note), 3), RunState::Idle);
        assert_eq!(
            RunState::from_parts(Some(Mark::Note), 2),
            RunState::Open {
                kind: Mark::Note,
                count: 2
            }
        );
    }

    #[test]
    fn next_id_is_max_plus_one() {
        assert_eq!(next_id(&with_ids(&[1, 3, 4])), 5);
        assert_eq!(next_id(&[]), 1);
    }

    #[test]
    fn merge_keeps_ids_and_closes_runs() {
        let mut students = with_ids(&[1, 2]);
        students[1].name = "Maria".into();
        students[1].run = RunState::Open {
            kind: Mark::Note,
            count: 1,
        };
        let n = merge_records(
            &mut students,
            vec![rec("MARIA", "❌", "➖"), rec("Petar", "", "")],
        );
        assert_eq!(n, 2);
        assert_eq!(students[0].id, 2);
        assert_eq!(students[0].name, "Maria");
        assert_eq!(students[0].status, "➖");
        assert_eq!(students[0].run, RunState::Idle);
        assert_eq!(students[1].id, 3);
        assert_eq!(students[1].name, "Petar");
    }

    #[test]
    fn merge_replaces_the_whole_roster() {
        let mut students = with_ids(&[1, 2, 3, 4, 5]);
        let n = merge_records(
            &mut students,
            vec![rec("student 2", "", ""), rec("New", "", "")],
        );
        assert_eq!(n, 2);
        assert_eq!(students.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 6]);
    }

    #[test]
    fn merge_collapses_repeated_names_in_one_batch() {
        let mut students = Vec::new();
        let n = merge_records(
            &mut students,
            vec![rec("Ana", "🇴", ""), rec("ana", "", "➕")],
        );
        assert_eq!(n, 1);
        assert_eq!(students[0].id, 1);
        assert_eq!(students[0].actions, "");
        assert_eq!(students[0].status, "➕");
    }

    #[test]
    fn import_record_filters_blank_names_and_normalizes_status() {
        assert_eq!(ImportRecord::from_raw("   ", "x", "+"), None);
        let r = ImportRecord::from_raw(" Ivan ", " O ", "+-+").expect("record");
        assert_eq!(r.name, "Ivan");
        assert_eq!(r.actions, "O");
        assert_eq!(r.status, "➕➖➕");
        assert_eq!(export_status(&r.status), "+-+");
    }

    #[test]
    fn store_import_selects_last_sheet_when_nothing_selected() {
        let mut store = RosterStore::new();
        let summary = store.import_sheets(vec![
            SheetBatch {
                name: " 7A ".into(),
                records: vec![rec("Ivan", "O", "➕")],
                skipped_rows: 1,
            },
            SheetBatch {
                name: "7B".into(),
                records: vec![rec("Ana", "", ""), rec("Boris", "", "")],
                skipped_rows: 0,
            },
        ]);
        assert_eq!(summary.records_imported, 3);
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(summary.classes, vec!["7A".to_string(), "7B".to_string()]);
        assert_eq!(store.selected(), Some("7B"));
        assert_eq!(store.students(Some("7A"))[0].id, 1);
    }

    #[test]
    fn store_ignores_unknown_student_and_class() {
        let mut store = RosterStore::new();
        store.merge("7A", vec![rec("Ivan", "", "")]);
        assert!(store.apply_mark(Some("7A"), 42, Mark::Praise).is_none());
        assert!(store.apply_mark(Some("8Z"), 1, Mark::Praise).is_none());
        assert!(!store.select_class("8Z"));
        assert_eq!(store.find_next_id("8Z"), 1);
    }

    #[test]
    fn snapshot_with_stale_selection_falls_back_to_first_class() {
        let store = RosterStore::from_snapshot(
            vec![ClassRoster {
                name: "5B".into(),
                students: Vec::new(),
            }],
            Some("gone".into()),
        );
        assert_eq!(store.selected(), Some("5B"));
    }

    #[test]
    fn search_matches_name_substring_or_exact_id() {
        let mut store = RosterStore::new();
        store.merge(
            "7A",
            vec![rec("Ivan Petrov", "", ""), rec("Maria", "", ""), rec("Ana", "", "")],
        );
        let hits = store.search(None, " PET ");
        assert_eq!(
            hits,
            vec![SearchHit {
                student_id: 1,
                highlight: Some((5, 8))
            }]
        );
        let by_id = store.search(None, "3");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].student_id, 3);
        assert_eq!(by_id[0].highlight, None);
        assert_eq!(store.search(None, "").len(), 3);
        // "a" hits Ivan Petrov, Maria and Ana by name
        assert_eq!(store.search(None, "a").len(), 3);
    }

    #[test]
    fn highlight_indexes_the_original_name_when_lowercase_grows() {
        let mut store = RosterStore::new();
        store.merge("7A", vec![rec("İvan Petrov", "", "")]);
        let hits = store.search(None, "pet");
        assert_eq!(hits[0].highlight, Some((5, 8)));
        let name: Vec<char> = "İvan Petrov".chars().collect();
        assert_eq!(name[5..8].iter().collect::<String>(), "Pet");

        // A match that starts inside an expanded char still covers that char.
        let hits = store.search(None, "i\u{307}va");
        assert_eq!(hits[0].highlight, Some((0, 3)));
    }
}
