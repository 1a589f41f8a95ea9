//! sheetbot-core: turns chat requests into project sheets on a spreadsheet backend.
//!
//! The builder composes a new sheet from a header template and one section template
//! per requested section, then writes a running-total formula. Everything that talks
//! to the outside world (spreadsheet service, LLM) sits behind a trait so the
//! gateway injects real clients and tests inject fakes.

pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod google;
pub mod intent;
pub mod processor;
pub mod retry;
pub mod session;
pub mod unique;

pub use backend::{
    column_letter, sheet_range, BatchRequest, CellData, CopiedSheet, ExtendedValue, GridRange,
    PasteType, RowData, SheetId, SheetProperties, SpreadsheetBackend, SpreadsheetMetadata,
};
pub use builder::{
    title_case, BuildState, BuilderOptions, ProjectRequest, SheetBuilder, SheetLocator,
    COLUMN_WINDOW,
};
pub use config::{AppConfig, ChatConfig, LlmConfig, ServerConfig, SheetsConfig, TelegramConfig, TemplateRefs};
pub use error::{BuildError, BuildStep, ConfigError, LlmError, SectionPhase, SheetsError, Transient};
pub use extract::{parse_project_info, ChatResponder, OpenAiClient, ProjectExtractor};
pub use google::GoogleSheetsClient;
pub use intent::{classify_intent, Intent};
pub use processor::{CommandProcessor, SheetService};
pub use retry::{with_retry, RetryPolicy};
pub use session::{ChatRole, ChatTurn, SessionStore};
pub use unique::{resolve_unique_title, unique_title};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
