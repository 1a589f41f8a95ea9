//! Google Sheets v4 REST client. Bearer-token auth; token acquisition is left to
//! the deployment (service-account exchange, workload identity, or a static token).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{
    BatchRequest, CopiedSheet, RowData, SheetId, SheetProperties, SpreadsheetBackend,
    SpreadsheetMetadata,
};
use crate::config::SheetsConfig;
use crate::error::SheetsError;

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridData {
    #[serde(default)]
    row_data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct GridSheet {
    #[serde(default)]
    data: Vec<GridData>,
}

#[derive(Debug, Deserialize)]
struct GridResponse {
    #[serde(default)]
    sheets: Vec<GridSheet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopyResponse {
    sheet_id: SheetId,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct GoogleSheetsClient {
    client: Client,
    api_base: Url,
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn new(api_base: &str, access_token: &str, timeout: Duration) -> Result<Self, SheetsError> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|e| SheetsError::Decode(format!("invalid sheets api_base: {}", e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base,
            access_token: access_token.to_string(),
        })
    }

    pub fn from_config(cfg: &SheetsConfig) -> Result<Self, SheetsError> {
        Self::new(
            &cfg.api_base,
            &cfg.access_token,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// `{api_base}/spreadsheets/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::Decode("sheets api_base cannot be a base URL".into()))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        if self.access_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.access_token)
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, req: RequestBuilder) -> Result<T, SheetsError> {
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(SheetsError::from_status(status.as_u16(), message));
        }
        serde_json::from_str(&text).map_err(|e| SheetsError::Decode(e.to_string()))
    }
}

/// Formatted values arrive as strings; numbers and booleans only when the
/// render option says so.
fn cell_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SpreadsheetBackend for GoogleSheetsClient {
    async fn get_spreadsheet_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMetadata, SheetsError> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let body: MetadataResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(SpreadsheetMetadata {
            sheets: body.sheets.into_iter().map(|s| s.properties).collect(),
        })
    }

    async fn copy_sheet(
        &self,
        source_spreadsheet_id: &str,
        source_sheet_id: SheetId,
        dest_spreadsheet_id: &str,
    ) -> Result<CopiedSheet, SheetsError> {
        let url = self.url(&[
            source_spreadsheet_id,
            "sheets",
            &format!("{}:copyTo", source_sheet_id),
        ])?;
        let req = self
            .request(Method::POST, url)
            .json(&json!({ "destinationSpreadsheetId": dest_spreadsheet_id }));
        let body: CopyResponse = self.send(req).await?;
        tracing::debug!(
            source = %source_spreadsheet_id,
            source_sheet = source_sheet_id,
            copied_sheet = body.sheet_id,
            "sheet copied"
        );
        Ok(CopiedSheet {
            sheet_id: body.sheet_id,
            title: body.title,
        })
    }

    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut url = self.url(&[spreadsheet_id, "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "FORMATTED_VALUE");
        let body: ValueRangeResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn read_range_with_formatting(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<RowData>, SheetsError> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("ranges", range)
            .append_pair("includeGridData", "true");
        let body: GridResponse = self.send(self.request(Method::GET, url)).await?;
        Ok(body
            .sheets
            .into_iter()
            .next()
            .and_then(|s| s.data.into_iter().next())
            .map(|d| d.row_data)
            .unwrap_or_default())
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchRequest>,
    ) -> Result<(), SheetsError> {
        if requests.is_empty() {
            return Ok(());
        }
        let url = self.url(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        let count = requests.len();
        let req = self
            .request(Method::POST, url)
            .json(&json!({ "requests": requests }));
        let _: Value = self.send(req).await?;
        tracing::debug!(spreadsheet = %spreadsheet_id, requests = count, "batch update applied");
        Ok(())
    }
}
