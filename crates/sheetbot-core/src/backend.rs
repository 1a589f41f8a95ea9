//! Spreadsheet backend seam: the remote operations the builder needs, plus typed
//! batch requests that serialize straight into the Sheets v4 JSON shape.

use std::ops::Range;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SheetsError;

/// Numeric id of one sheet (tab) inside a spreadsheet, the `gid` in URLs.
pub type SheetId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: SheetId,
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpreadsheetMetadata {
    pub sheets: Vec<SheetProperties>,
}

impl SpreadsheetMetadata {
    pub fn first_sheet(&self) -> Option<&SheetProperties> {
        self.sheets.iter().min_by_key(|s| s.index)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.title.as_str())
    }
}

/// Result of copying a sheet into another spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedSheet {
    pub sheet_id: SheetId,
    pub title: String,
}

/// A cell value as the backend stores it. Serializes as `{"stringValue": "..."}` etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtendedValue {
    NumberValue(f64),
    StringValue(String),
    BoolValue(bool),
    FormulaValue(String),
    ErrorValue(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_entered_value: Option<ExtendedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_entered_format: Option<serde_json::Value>,
}

impl CellData {
    pub fn value(value: ExtendedValue) -> Self {
        Self {
            user_entered_value: Some(value),
            user_entered_format: None,
        }
    }

    /// Literal text of the cell; `None` for numbers, formulas and empty cells.
    pub fn text(&self) -> Option<&str> {
        match &self.user_entered_value {
            Some(ExtendedValue::StringValue(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    #[serde(default)]
    pub values: Vec<CellData>,
}

/// Half-open rectangle on one sheet, 0-indexed like the backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    pub sheet_id: SheetId,
    pub start_row_index: u32,
    pub end_row_index: u32,
    pub start_column_index: u32,
    pub end_column_index: u32,
}

impl GridRange {
    pub fn new(sheet_id: SheetId, rows: Range<u32>, columns: Range<u32>) -> Self {
        Self {
            sheet_id,
            start_row_index: rows.start,
            end_row_index: rows.end,
            start_column_index: columns.start,
            end_column_index: columns.end,
        }
    }

    pub fn cell(sheet_id: SheetId, row: u32, column: u32) -> Self {
        Self::new(sheet_id, row..row + 1, column..column + 1)
    }

    pub fn row_count(&self) -> u32 {
        self.end_row_index.saturating_sub(self.start_row_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasteType {
    /// Values, formulas, formats and merges.
    #[serde(rename = "PASTE_NORMAL")]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPropertiesUpdate {
    pub sheet_id: SheetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One entry of a `batchUpdate` call. Applied by the backend in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BatchRequest {
    CopyPaste {
        source: GridRange,
        destination: GridRange,
        paste_type: PasteType,
    },
    UpdateCells {
        range: GridRange,
        rows: Vec<RowData>,
        fields: String,
    },
    DeleteSheet {
        sheet_id: SheetId,
    },
    UpdateSheetProperties {
        properties: SheetPropertiesUpdate,
        fields: String,
    },
}

impl BatchRequest {
    pub fn copy_paste(source: GridRange, destination: GridRange) -> Self {
        BatchRequest::CopyPaste {
            source,
            destination,
            paste_type: PasteType::Normal,
        }
    }

    /// Overwrite the entered value of a single cell, leaving its format alone.
    pub fn update_cell(sheet_id: SheetId, row: u32, column: u32, value: ExtendedValue) -> Self {
        BatchRequest::UpdateCells {
            range: GridRange::cell(sheet_id, row, column),
            rows: vec![RowData {
                values: vec![CellData::value(value)],
            }],
            fields: "userEnteredValue".to_string(),
        }
    }

    pub fn delete_sheet(sheet_id: SheetId) -> Self {
        BatchRequest::DeleteSheet { sheet_id }
    }

    pub fn rename_sheet(sheet_id: SheetId, title: &str) -> Self {
        BatchRequest::UpdateSheetProperties {
            properties: SheetPropertiesUpdate {
                sheet_id,
                title: Some(title.to_string()),
            },
            fields: "title".to_string(),
        }
    }
}

/// Remote spreadsheet service. Every method is one round trip.
#[async_trait]
pub trait SpreadsheetBackend: Send + Sync {
    async fn get_spreadsheet_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMetadata, SheetsError>;

    async fn copy_sheet(
        &self,
        source_spreadsheet_id: &str,
        source_sheet_id: SheetId,
        dest_spreadsheet_id: &str,
    ) -> Result<CopiedSheet, SheetsError>;

    async fn rename_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_id: SheetId,
        new_title: &str,
    ) -> Result<(), SheetsError> {
        self.batch_update(
            spreadsheet_id,
            vec![BatchRequest::rename_sheet(sheet_id, new_title)],
        )
        .await
    }

    /// Formatted values; trailing empty rows and cells are omitted by the backend.
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Entered values plus format metadata for every cell in the range.
    async fn read_range_with_formatting(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<RowData>, SheetsError>;

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchRequest>,
    ) -> Result<(), SheetsError>;
}

/// Column letters for a 0-based index: 0 -> A, 9 -> J, 26 -> AA.
pub fn column_letter(index: u32) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// A1 range on a named sheet. The title is always quoted so spaces and
/// punctuation survive; embedded quotes are doubled.
pub fn sheet_range(title: &str, cells: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), cells)
}
