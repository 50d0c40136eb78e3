use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::store::{CellRange, CreatedTab, DocumentCreator, DocumentIo, TabRef};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Drive + Sheets REST backend.
///
/// Each meeting gets a copy of a template spreadsheet; transcript lines go
/// into the copy's first tab. The OAuth access token is supplied by the
/// caller.
pub struct SheetsDocuments {
    http: Client,
    access_token: String,
    template_sheet_id: String,
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsDocuments {
    pub fn new(access_token: String, template_sheet_id: String, folder_id: Option<String>) -> Result<Self> {
        if template_sheet_id.is_empty() {
            bail!("document.template_sheet_id is required for the sheets backend");
        }

        Ok(Self {
            http: Client::new(),
            access_token,
            template_sheet_id,
            folder_id,
        })
    }

    fn values_url(file_id: &str, a1: &str) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid Sheets API base URL"))?
            .push(file_id)
            .push("values")
            .push(a1);
        Ok(url)
    }

    async fn first_tab(&self, file_id: &str) -> Result<SheetProperties> {
        let info: SpreadsheetInfo = self
            .http
            .get(format!("{}/{}", SHEETS_API, file_id))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info.sheets
            .into_iter()
            .next()
            .map(|entry| entry.properties)
            .ok_or_else(|| anyhow!("Spreadsheet {} has no tabs", file_id))
    }
}

#[async_trait::async_trait]
impl DocumentCreator for SheetsDocuments {
    async fn create_tab(&self, title: &str, date: &str, time: &str) -> Result<CreatedTab> {
        let name = format!("{} {}", date, title);
        let mut body = json!({ "name": name });
        if let Some(folder) = &self.folder_id {
            body["parents"] = json!([folder]);
        }

        info!("Copying template sheet {} as {}", self.template_sheet_id, name);

        let copied: DriveFile = self
            .http
            .post(format!("{}/{}/copy", DRIVE_API, self.template_sheet_id))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id,name,webViewLink")])
            .json(&body)
            .send()
            .await
            .context("Failed to copy template sheet")?
            .error_for_status()
            .context("Failed to copy template sheet")?
            .json()
            .await?;

        let tab = self
            .first_tab(&copied.id)
            .await
            .context("Failed to look up meeting tab")?;

        info!(
            "Meeting sheet created: {} (tab {}, started {})",
            copied.id, tab.title, time
        );

        Ok(CreatedTab {
            web_link: copied.web_view_link.unwrap_or_else(|| {
                format!("https://docs.google.com/spreadsheets/d/{}/edit", copied.id)
            }),
            file_id: copied.id,
            tab_id: Some(tab.sheet_id),
            tab_name: tab.title,
        })
    }
}

#[async_trait::async_trait]
impl DocumentIo for SheetsDocuments {
    async fn read_column(&self, tab: &TabRef, range: &CellRange) -> Result<Vec<String>> {
        let url = Self::values_url(&tab.file_id, &range.a1(&tab.tab_name))?;

        let values: ValueRange = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("majorDimension", "COLUMNS")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(values.values.into_iter().next().unwrap_or_default())
    }

    async fn write_cells(&self, tab: &TabRef, range: &CellRange, values: Vec<String>) -> Result<()> {
        if values.len() != range.len() {
            bail!(
                "Range {} holds {} cells but {} values were given",
                range.a1(&tab.tab_name),
                range.len(),
                values.len()
            );
        }

        let a1 = range.a1(&tab.tab_name);
        let url = Self::values_url(&tab.file_id, &a1)?;

        self.http
            .put(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": a1,
                "majorDimension": "COLUMNS",
                "values": [values],
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
