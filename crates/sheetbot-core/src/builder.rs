//! Project sheet builder.
//!
//! A build copies the top template into the main spreadsheet, renames it to a
//! unique title, then appends one block per section: the section template is copied
//! into a scratch sheet, pasted into the target at the running row, its
//! `{sectionName}` placeholders are rewritten, and the scratch sheet is deleted.
//! Finally `E2` receives `=E<r1>+E<r2>+...` summing each section's total cell.
//!
//! Sections are always read over a fixed window of [`COLUMN_WINDOW`] columns (A–J);
//! anything to the right of column J in the section template is dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{
    column_letter, sheet_range, BatchRequest, CopiedSheet, ExtendedValue, GridRange, RowData,
    SheetId, SpreadsheetBackend,
};
use crate::config::TemplateRefs;
use crate::error::{BuildError, BuildStep, SectionPhase, SheetsError, StepContext};
use crate::unique::resolve_unique_title;

/// Columns copied from every section block.
pub const COLUMN_WINDOW: u32 = 10;
/// Column holding each section's total and the grand total.
const TOTAL_COLUMN: u32 = 4;
/// Grand total cell `E2`, 0-indexed row.
const GRAND_TOTAL_ROW: u32 = 1;
/// First section row when the top template reads back empty.
const DEFAULT_FIRST_ROW: u32 = 4;

/// What the extractor hands to the builder. Section order is significant and
/// duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRequest {
    pub project_name: String,
    #[serde(default)]
    pub sections: Vec<String>,
}

fn default_trailing_section() -> String {
    "Other".to_string()
}

fn default_placeholder() -> String {
    "{sectionName}".to_string()
}

fn default_locator_host() -> String {
    "https://docs.google.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderOptions {
    /// Synthetic section appended after the requested ones.
    #[serde(default = "default_trailing_section")]
    pub trailing_section: String,
    /// Marker in section template text replaced with the section's display name.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Scheme and host used for returned sheet URLs.
    #[serde(default = "default_locator_host")]
    pub locator_host: String,
    /// Serialize build attempts that share a project name, so two requests for
    /// the same name cannot race between title resolution and rename. Builds for
    /// other names and retry backoff are never held up by it.
    #[serde(default)]
    pub serialize_builds: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            trailing_section: default_trailing_section(),
            placeholder: default_placeholder(),
            locator_host: default_locator_host(),
            serialize_builds: false,
        }
    }
}

/// Where the finished sheet lives. Displays as its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetLocator {
    pub spreadsheet_id: String,
    pub sheet_id: SheetId,
    pub title: String,
    pub url: String,
}

impl SheetLocator {
    pub fn new(host: &str, spreadsheet_id: &str, sheet_id: SheetId, title: String) -> Self {
        let url = format!(
            "{}/spreadsheets/d/{}/edit#gid={}",
            host.trim_end_matches('/'),
            spreadsheet_id,
            sheet_id
        );
        Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_id,
            title,
            url,
        }
    }
}

impl fmt::Display for SheetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Per-attempt progress. `current_row` is 1-indexed and only grows; one total
/// reference is recorded at the start of each section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildState {
    pub new_sheet_id: SheetId,
    pub current_row: u32,
    pub formula_cell_refs: Vec<String>,
}

impl BuildState {
    pub fn new(new_sheet_id: SheetId, first_row: u32) -> Self {
        Self {
            new_sheet_id,
            current_row: first_row.max(1),
            formula_cell_refs: Vec::new(),
        }
    }

    fn begin_section(&mut self) {
        let cell = format!("{}{}", column_letter(TOTAL_COLUMN), self.current_row);
        self.formula_cell_refs.push(cell);
    }

    fn advance(&mut self, rows: u32) {
        self.current_row += rows;
    }

    /// 0-indexed row where the next block is pasted.
    fn start_index(&self) -> u32 {
        self.current_row - 1
    }

    pub fn total_formula(&self) -> String {
        format!("={}", self.formula_cell_refs.join("+"))
    }
}

/// Uppercase the first letter of every word and lowercase the rest
/// ("аренда" -> "Аренда", "sound and light" -> "Sound And Light").
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Text fixes for one pasted block: every literal text cell containing the
/// placeholder, retargeted to its destination coordinates in the new sheet.
fn placeholder_updates(
    grid: &[RowData],
    rows: u32,
    target: SheetId,
    start_index: u32,
    placeholder: &str,
    display_name: &str,
) -> Vec<BatchRequest> {
    let mut updates = Vec::new();
    for (row_idx, row) in grid.iter().enumerate().take(rows as usize) {
        for (col_idx, cell) in row.values.iter().enumerate().take(COLUMN_WINDOW as usize) {
            let Some(text) = cell.text() else { continue };
            if !text.contains(placeholder) {
                continue;
            }
            updates.push(BatchRequest::update_cell(
                target,
                start_index + row_idx as u32,
                col_idx as u32,
                ExtendedValue::StringValue(text.replace(placeholder, display_name)),
            ));
        }
    }
    updates
}

/// One build against one backend. Cheap to construct; holds only borrows, so a
/// retry gets a fresh builder and a fresh [`BuildState`].
pub struct SheetBuilder<'a, B: ?Sized> {
    backend: &'a B,
    refs: &'a TemplateRefs,
    options: &'a BuilderOptions,
}

impl<'a, B> SheetBuilder<'a, B>
where
    B: SpreadsheetBackend + ?Sized,
{
    pub fn new(backend: &'a B, refs: &'a TemplateRefs, options: &'a BuilderOptions) -> Self {
        Self {
            backend,
            refs,
            options,
        }
    }

    /// Requested sections followed by the trailing section.
    pub fn all_sections(&self, sections: &[String]) -> Vec<String> {
        sections
            .iter()
            .cloned()
            .chain(std::iter::once(self.options.trailing_section.clone()))
            .collect()
    }

    pub async fn build_project_sheet(
        &self,
        request: &ProjectRequest,
    ) -> Result<SheetLocator, BuildError> {
        self.build(&request.project_name, &request.sections).await
    }

    pub async fn build(
        &self,
        project_name: &str,
        sections: &[String],
    ) -> Result<SheetLocator, BuildError> {
        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(BuildError::InvalidRequest("project name is empty".into()));
        }
        let all_sections = self.all_sections(sections);
        let main = self.refs.main_sheet_id.as_str();

        let title = resolve_unique_title(self.backend, main, project_name)
            .await
            .at(BuildStep::ResolveTitle)?;

        let top_source = self
            .first_sheet_id(&self.refs.template_top_id)
            .await
            .at(BuildStep::CopyTopTemplate)?;
        let copied = self
            .backend
            .copy_sheet(&self.refs.template_top_id, top_source, main)
            .await
            .at(BuildStep::CopyTopTemplate)?;
        self.backend
            .rename_sheet(main, copied.sheet_id, &title)
            .await
            .at(BuildStep::RenameSheet)?;
        tracing::debug!(sheet_id = copied.sheet_id, title = %title, "top template copied");

        let header = self
            .backend
            .read_range(&self.refs.template_top_id, "A1:A")
            .await
            .at(BuildStep::MeasureHeader)?;
        let first_row = if header.is_empty() {
            DEFAULT_FIRST_ROW
        } else {
            header.len() as u32 + 1
        };
        let mut state = BuildState::new(copied.sheet_id, first_row);

        let section_source = self
            .first_sheet_id(&self.refs.template_section_id)
            .await
            .at(BuildStep::LocateSectionTemplate)?;
        for name in &all_sections {
            self.append_section(&mut state, section_source, name).await?;
        }

        let formula = state.total_formula();
        self.backend
            .batch_update(
                main,
                vec![BatchRequest::update_cell(
                    state.new_sheet_id,
                    GRAND_TOTAL_ROW,
                    TOTAL_COLUMN,
                    ExtendedValue::FormulaValue(formula.clone()),
                )],
            )
            .await
            .at(BuildStep::WriteTotal)?;

        tracing::info!(
            project = %project_name,
            title = %title,
            sheet_id = state.new_sheet_id,
            sections = all_sections.len(),
            rows = state.current_row - 1,
            formula = %formula,
            "project sheet created"
        );
        Ok(SheetLocator::new(
            &self.options.locator_host,
            main,
            state.new_sheet_id,
            title,
        ))
    }

    async fn first_sheet_id(&self, spreadsheet_id: &str) -> Result<SheetId, SheetsError> {
        let metadata = self.backend.get_spreadsheet_metadata(spreadsheet_id).await?;
        metadata
            .first_sheet()
            .map(|s| s.sheet_id)
            .ok_or_else(|| SheetsError::Decode(format!("spreadsheet {} has no sheets", spreadsheet_id)))
    }

    async fn append_section(
        &self,
        state: &mut BuildState,
        section_source: SheetId,
        name: &str,
    ) -> Result<(), BuildError> {
        let main = self.refs.main_sheet_id.as_str();
        state.begin_section();

        let scratch = self
            .backend
            .copy_sheet(&self.refs.template_section_id, section_source, main)
            .await
            .at(BuildStep::section(name, SectionPhase::CopyTemplate))?;

        let outcome = self.transplant(state, &scratch, name).await;
        if let Ok(rows) = outcome {
            state.advance(rows);
        }

        if let Err(e) = self
            .backend
            .batch_update(main, vec![BatchRequest::delete_sheet(scratch.sheet_id)])
            .await
        {
            tracing::warn!(
                scratch_sheet = scratch.sheet_id,
                scratch_title = %scratch.title,
                error = %e,
                "scratch sheet could not be deleted and is left behind"
            );
        }

        outcome.map(|_| ())
    }

    /// Paste the scratch block at the current row, then fix its placeholders.
    /// Returns the number of rows pasted.
    async fn transplant(
        &self,
        state: &BuildState,
        scratch: &CopiedSheet,
        name: &str,
    ) -> Result<u32, BuildError> {
        let main = self.refs.main_sheet_id.as_str();
        let range = sheet_range(
            &scratch.title,
            &format!("A1:{}", column_letter(COLUMN_WINDOW - 1)),
        );

        let values = self
            .backend
            .read_range(main, &range)
            .await
            .at(BuildStep::section(name, SectionPhase::ReadScratch))?;
        if values.is_empty() {
            tracing::warn!(section = %name, "section template is empty, nothing to copy");
            return Ok(0);
        }
        let rows = values.len() as u32;
        let grid = self
            .backend
            .read_range_with_formatting(main, &range)
            .await
            .at(BuildStep::section(name, SectionPhase::ReadScratch))?;

        let start = state.start_index();
        let fixes = placeholder_updates(
            &grid,
            rows,
            state.new_sheet_id,
            start,
            &self.options.placeholder,
            &title_case(name),
        );

        // Paste first: the text fixes land on top of the pasted placeholders.
        let copy = BatchRequest::copy_paste(
            GridRange::new(scratch.sheet_id, 0..rows, 0..COLUMN_WINDOW),
            GridRange::new(state.new_sheet_id, start..start + rows, 0..COLUMN_WINDOW),
        );
        self.backend
            .batch_update(main, vec![copy])
            .await
            .at(BuildStep::section(name, SectionPhase::Transplant))?;

        if !fixes.is_empty() {
            self.backend
                .batch_update(main, fixes)
                .await
                .at(BuildStep::section(name, SectionPhase::ReplacePlaceholders))?;
        }

        tracing::debug!(section = %name, start_row = state.current_row, rows, "section appended");
        Ok(rows)
    }
}
