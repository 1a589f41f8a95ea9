//! Sheet title uniqueness within the main spreadsheet.

use std::collections::HashSet;

use crate::backend::SpreadsheetBackend;
use crate::error::SheetsError;

/// `base` if unused, otherwise `base-N` with the smallest free N >= 1.
pub fn unique_title<'a, I>(existing: I, base: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = existing.into_iter().collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n: u64 = 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

/// Fetch the current titles once and pick a free one. The title is not reserved:
/// a concurrent build can take it before the caller renames its sheet.
pub async fn resolve_unique_title<B>(
    backend: &B,
    main_sheet_id: &str,
    base_name: &str,
) -> Result<String, SheetsError>
where
    B: SpreadsheetBackend + ?Sized,
{
    let metadata = backend.get_spreadsheet_metadata(main_sheet_id).await?;
    let title = unique_title(metadata.titles(), base_name);
    if title != base_name {
        tracing::debug!(base = %base_name, resolved = %title, "sheet title taken, using suffix");
    }
    Ok(title)
}
