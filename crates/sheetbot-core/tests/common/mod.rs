#![allow(dead_code)]

//! In-memory spreadsheet backend and LLM fakes for integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sheetbot_core::{
    BatchRequest, BuilderOptions, CellData, ChatResponder, ChatTurn, CopiedSheet, ExtendedValue,
    LlmError, ProjectExtractor, ProjectRequest, RowData, SheetId, SheetProperties, SheetsError,
    SpreadsheetBackend, SpreadsheetMetadata, TemplateRefs,
};

pub const MAIN: &str = "main";
pub const TOP: &str = "top";
pub const SECTION: &str = "section";

/// Rows in the standard section template.
pub const SECTION_ROWS: u32 = 5;

pub fn refs() -> TemplateRefs {
    TemplateRefs {
        main_sheet_id: MAIN.into(),
        template_top_id: TOP.into(),
        template_section_id: SECTION.into(),
    }
}

pub fn options() -> BuilderOptions {
    BuilderOptions::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Metadata,
    CopySheet,
    ReadRange,
    ReadGrid,
    Rename,
    CopyPaste,
    UpdateCells,
    DeleteSheet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Metadata(String),
    CopySheet {
        source: String,
        sheet_id: SheetId,
        dest: String,
    },
    ReadRange {
        spreadsheet: String,
        range: String,
    },
    ReadGrid {
        spreadsheet: String,
        range: String,
    },
    Batch {
        spreadsheet: String,
        requests: Vec<BatchRequest>,
    },
}

#[derive(Debug, Clone)]
pub struct FakeSheet {
    pub id: SheetId,
    pub title: String,
    pub index: i64,
    pub values: Vec<Vec<String>>,
}

impl FakeSheet {
    pub fn new(id: SheetId, title: &str, rows: &[&[&str]]) -> Self {
        Self {
            id,
            title: title.into(),
            index: 0,
            values: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.values
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn grid(&self) -> Vec<RowData> {
        self.values
            .iter()
            .map(|row| RowData {
                values: row
                    .iter()
                    .map(|c| {
                        if c.is_empty() {
                            CellData::default()
                        } else if c.starts_with('=') {
                            CellData::value(ExtendedValue::FormulaValue(c.clone()))
                        } else {
                            CellData::value(ExtendedValue::StringValue(c.clone()))
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

struct FailRule {
    op: Op,
    skip: usize,
    times: usize,
    status: u16,
}

#[derive(Default)]
struct State {
    books: HashMap<String, Vec<FakeSheet>>,
    next_id: SheetId,
    calls: Vec<Call>,
    rules: Vec<FailRule>,
}

impl State {
    fn check(&mut self, op: Op) -> Result<(), SheetsError> {
        for rule in self.rules.iter_mut().filter(|r| r.op == op) {
            if rule.skip > 0 {
                rule.skip -= 1;
            } else if rule.times > 0 {
                rule.times -= 1;
                return Err(SheetsError::from_status(rule.status, format!("injected {:?} failure", op)));
            }
        }
        Ok(())
    }

    fn book(&self, id: &str) -> Result<&Vec<FakeSheet>, SheetsError> {
        self.books
            .get(id)
            .ok_or_else(|| SheetsError::from_status(404, format!("spreadsheet {} not found", id)))
    }
}

/// Spreadsheet backend held entirely in memory. Records every call and applies
/// batch requests to sheet values, so tests can assert on both.
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }

    /// Main spreadsheet with one existing "Festival" sheet, a three-row header
    /// template and a five-row section template.
    pub fn standard() -> Self {
        let backend = Self::empty();
        backend.add_sheet(MAIN, FakeSheet::new(1, "Festival", &[&["old"]]));
        backend.add_sheet(
            TOP,
            FakeSheet::new(
                100,
                "Header",
                &[
                    &["Проект"],
                    &["Итого", "", "", "", "0"],
                    &["Раздел", "Кол-во", "Цена", "", "Сумма"],
                ],
            ),
        );
        backend.add_sheet(SECTION, Self::section_template());
        backend
    }

    pub fn section_template() -> FakeSheet {
        FakeSheet::new(
            200,
            "Section",
            &[
                &["{sectionName}", "", "", "", "=SUM(E2:E4)"],
                &["Позиция", "", "", "", ""],
                &["", "", "", "", ""],
                &["", "", "", "", ""],
                &["Итого {sectionName}", "", "", "", "{sectionName}"],
            ],
        )
    }

    pub fn add_sheet(&self, book: &str, mut sheet: FakeSheet) {
        let mut state = self.state.lock().unwrap();
        let sheets = state.books.entry(book.to_string()).or_default();
        sheet.index = sheets.len() as i64;
        sheets.push(sheet);
    }

    /// Replace a sheet's contents, keeping its id and title.
    pub fn set_values(&self, book: &str, sheet_id: SheetId, rows: &[&[&str]]) {
        let mut state = self.state.lock().unwrap();
        let sheet = state
            .books
            .get_mut(book)
            .and_then(|b| b.iter_mut().find(|s| s.id == sheet_id))
            .unwrap();
        sheet.values = FakeSheet::new(sheet_id, "", rows).values;
    }

    /// Fail the `skip + 1`th through `skip + times`th calls of `op` with `status`.
    pub fn fail(&self, op: Op, skip: usize, times: usize, status: u16) {
        self.state.lock().unwrap().rules.push(FailRule {
            op,
            skip,
            times,
            status,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Every batch request sent to `book`, flattened in order.
    pub fn batch_requests(&self, book: &str) -> Vec<BatchRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Batch {
                    spreadsheet,
                    requests,
                } if spreadsheet == book => Some(requests),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn titles(&self, book: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut sheets = state.books.get(book).cloned().unwrap_or_default();
        sheets.sort_by_key(|s| s.index);
        sheets.into_iter().map(|s| s.title).collect()
    }

    pub fn sheet(&self, book: &str, title: &str) -> Option<FakeSheet> {
        let state = self.state.lock().unwrap();
        state
            .books
            .get(book)
            .and_then(|b| b.iter().find(|s| s.title == title).cloned())
    }
}

fn batch_op(requests: &[BatchRequest]) -> Option<Op> {
    requests.first().map(|r| match r {
        BatchRequest::CopyPaste { .. } => Op::CopyPaste,
        BatchRequest::UpdateCells { .. } => Op::UpdateCells,
        BatchRequest::DeleteSheet { .. } => Op::DeleteSheet,
        BatchRequest::UpdateSheetProperties { .. } => Op::Rename,
    })
}

/// `'Bob''s'!A1:J` -> (Some("Bob's"), "A1:J"); `A1:A` -> (None, "A1:A").
fn split_range(range: &str) -> (Option<String>, String) {
    if let Some(rest) = range.strip_prefix('\'') {
        let mut title = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if let Some(&(_, '\'')) = chars.peek() {
                    title.push('\'');
                    chars.next();
                    continue;
                }
                return (Some(title), rest[i + 1..].trim_start_matches('!').to_string());
            }
            title.push(c);
        }
        (Some(title), String::new())
    } else if let Some((t, cells)) = range.split_once('!') {
        (Some(t.to_string()), cells.to_string())
    } else {
        (None, range.to_string())
    }
}

fn find_sheet<'a>(sheets: &'a [FakeSheet], title: Option<&str>) -> Result<&'a FakeSheet, SheetsError> {
    let found = match title {
        Some(t) => sheets.iter().find(|s| s.title == t),
        None => sheets.iter().min_by_key(|s| s.index),
    };
    found.ok_or_else(|| SheetsError::from_status(400, "Unable to parse range"))
}

/// Like the values API: trailing empty cells and rows are omitted.
fn trim_values(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for row in rows.iter_mut() {
        while row.last().map(|c| c.is_empty()).unwrap_or(false) {
            row.pop();
        }
    }
    while rows.last().map(|r| r.is_empty()).unwrap_or(false) {
        rows.pop();
    }
    rows
}

fn set_cell(sheet: &mut FakeSheet, row: usize, col: usize, value: String) {
    if sheet.values.len() <= row {
        sheet.values.resize(row + 1, Vec::new());
    }
    let r = &mut sheet.values[row];
    if r.len() <= col {
        r.resize(col + 1, String::new());
    }
    r[col] = value;
}

fn apply(sheets: &mut Vec<FakeSheet>, request: &BatchRequest) -> Result<(), SheetsError> {
    match request {
        BatchRequest::UpdateSheetProperties { properties, .. } => {
            if let Some(title) = &properties.title {
                if sheets
                    .iter()
                    .any(|s| s.title == *title && s.id != properties.sheet_id)
                {
                    return Err(SheetsError::from_status(
                        400,
                        format!("A sheet with the name \"{}\" already exists", title),
                    ));
                }
                let sheet = sheets
                    .iter_mut()
                    .find(|s| s.id == properties.sheet_id)
                    .ok_or_else(|| SheetsError::from_status(400, "no such sheet"))?;
                sheet.title = title.clone();
            }
        }
        BatchRequest::DeleteSheet { sheet_id } => {
            let pos = sheets
                .iter()
                .position(|s| s.id == *sheet_id)
                .ok_or_else(|| SheetsError::from_status(400, "no such sheet"))?;
            sheets.remove(pos);
        }
        BatchRequest::CopyPaste {
            source,
            destination,
            ..
        } => {
            let src = sheets
                .iter()
                .find(|s| s.id == source.sheet_id)
                .cloned()
                .ok_or_else(|| SheetsError::from_status(400, "no such source sheet"))?;
            let dest = sheets
                .iter_mut()
                .find(|s| s.id == destination.sheet_id)
                .ok_or_else(|| SheetsError::from_status(400, "no such destination sheet"))?;
            for r in 0..source.row_count() {
                for c in source.start_column_index..source.end_column_index {
                    let value = src.cell((source.start_row_index + r) as usize, c as usize).to_string();
                    let dest_col = destination.start_column_index + (c - source.start_column_index);
                    set_cell(dest, (destination.start_row_index + r) as usize, dest_col as usize, value);
                }
            }
        }
        BatchRequest::UpdateCells { range, rows, .. } => {
            let dest = sheets
                .iter_mut()
                .find(|s| s.id == range.sheet_id)
                .ok_or_else(|| SheetsError::from_status(400, "no such sheet"))?;
            for (ri, row) in rows.iter().enumerate() {
                for (ci, cell) in row.values.iter().enumerate() {
                    let text = match &cell.user_entered_value {
                        Some(ExtendedValue::StringValue(s)) | Some(ExtendedValue::FormulaValue(s)) => s.clone(),
                        Some(ExtendedValue::NumberValue(n)) => n.to_string(),
                        Some(ExtendedValue::BoolValue(b)) => b.to_string(),
                        Some(ExtendedValue::ErrorValue(_)) | None => String::new(),
                    };
                    set_cell(
                        dest,
                        range.start_row_index as usize + ri,
                        range.start_column_index as usize + ci,
                        text,
                    );
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl SpreadsheetBackend for FakeBackend {
    async fn get_spreadsheet_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMetadata, SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Metadata(spreadsheet_id.into()));
        state.check(Op::Metadata)?;
        let sheets = state
            .book(spreadsheet_id)?
            .iter()
            .map(|s| SheetProperties {
                sheet_id: s.id,
                title: s.title.clone(),
                index: s.index,
            })
            .collect();
        Ok(SpreadsheetMetadata { sheets })
    }

    async fn copy_sheet(
        &self,
        source_spreadsheet_id: &str,
        source_sheet_id: SheetId,
        dest_spreadsheet_id: &str,
    ) -> Result<CopiedSheet, SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CopySheet {
            source: source_spreadsheet_id.into(),
            sheet_id: source_sheet_id,
            dest: dest_spreadsheet_id.into(),
        });
        state.check(Op::CopySheet)?;
        let source = state
            .book(source_spreadsheet_id)?
            .iter()
            .find(|s| s.id == source_sheet_id)
            .cloned()
            .ok_or_else(|| SheetsError::from_status(404, "source sheet not found"))?;
        state.book(dest_spreadsheet_id)?;

        let id = state.next_id;
        state.next_id += 1;
        let dest = state
            .books
            .get_mut(dest_spreadsheet_id)
            .ok_or_else(|| SheetsError::from_status(404, "destination not found"))?;
        let base = format!("Copy of {}", source.title);
        let mut title = base.clone();
        let mut n = 2;
        while dest.iter().any(|s| s.title == title) {
            title = format!("{} {}", base, n);
            n += 1;
        }
        dest.push(FakeSheet {
            id,
            title: title.clone(),
            index: dest.len() as i64,
            values: source.values,
        });
        Ok(CopiedSheet { sheet_id: id, title })
    }

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadRange {
            spreadsheet: spreadsheet_id.into(),
            range: range.into(),
        });
        state.check(Op::ReadRange)?;
        let (title, cells) = split_range(range);
        let sheet = find_sheet(state.book(spreadsheet_id)?, title.as_deref())?;
        let width = if cells == "A1:A" { 1 } else { 10 };
        Ok(trim_values(
            sheet
                .values
                .iter()
                .map(|r| r.iter().take(width).cloned().collect())
                .collect(),
        ))
    }

    async fn read_range_with_formatting(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<RowData>, SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadGrid {
            spreadsheet: spreadsheet_id.into(),
            range: range.into(),
        });
        state.check(Op::ReadGrid)?;
        let (title, _) = split_range(range);
        let sheet = find_sheet(state.book(spreadsheet_id)?, title.as_deref())?;
        Ok(sheet.grid())
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchRequest>,
    ) -> Result<(), SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Batch {
            spreadsheet: spreadsheet_id.into(),
            requests: requests.clone(),
        });
        if let Some(op) = batch_op(&requests) {
            state.check(op)?;
        }
        let mut sheets = state.book(spreadsheet_id)?.clone();
        for request in &requests {
            apply(&mut sheets, request)?;
        }
        state.books.insert(spreadsheet_id.to_string(), sheets);
        Ok(())
    }
}

/// Returns the same extraction result for every message.
pub struct StaticExtractor(pub Option<ProjectRequest>);

#[async_trait]
impl ProjectExtractor for StaticExtractor {
    async fn extract_project_info(&self, _text: &str) -> Result<Option<ProjectRequest>, LlmError> {
        Ok(self.0.clone())
    }
}

/// Replies with the newest user turn and remembers each history it was shown.
#[derive(Default)]
pub struct EchoResponder {
    pub seen: Mutex<Vec<Vec<ChatTurn>>>,
    pub fail: bool,
}

#[async_trait]
impl ChatResponder for EchoResponder {
    async fn reply(&self, history: &[ChatTurn]) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(history.to_vec());
        if self.fail {
            return Err(LlmError::Empty);
        }
        let last = history.last().map(|t| t.content.as_str()).unwrap_or("");
        Ok(format!("echo: {}", last))
    }
}
