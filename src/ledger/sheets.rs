//! Google Sheets `LedgerStore` backed by the v4 values API

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::{col_letter, LedgerStore, RangeUpdate};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct GoogleSheetsStore {
    http: reqwest::Client,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsStore {
    pub fn new(spreadsheet_id: String, sheet_name: String, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id,
            sheet_name,
            access_token,
        }
    }

    /// Prefix an A1 range with the quoted sheet name
    fn qualify(&self, a1: &str) -> String {
        format!("'{}'!{}", self.sheet_name, a1)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{API_BASE}/{}/values/{}",
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!(
                "access denied ({status}); check the access token and make sure the \
                 spreadsheet is shared with the service account"
            ),
            StatusCode::NOT_FOUND => format!(
                "spreadsheet '{}' not found ({status}); check SHEETS_SPREADSHEET_ID",
                self.spreadsheet_id
            ),
            _ => format!("sheets API returned {status}: {body}"),
        };
        Err(Error::StoreAccess(message))
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let response = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::StoreAccess(e.to_string()))?;
        let response = self.check(response).await?;
        let parsed: ValueRange = response
            .json()
            .await
            .map_err(|e| Error::StoreAccess(e.to_string()))?;
        Ok(parsed.values)
    }
}

#[async_trait]
impl LedgerStore for GoogleSheetsStore {
    async fn header(&self) -> Result<Vec<String>> {
        let values = self.get_values(&self.qualify("1:1")).await?;
        Ok(values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(super::cell_to_text)
            .collect())
    }

    async fn write_header(&self, header: &[String]) -> Result<()> {
        let range = self.qualify(&format!("A1:{}1", col_letter(header.len())));
        let url = format!("{}?valueInputOption=RAW", self.values_url(&range));
        debug!(range = %range, "Writing ledger header");
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [header] }))
            .send()
            .await
            .map_err(|e| Error::StoreAccess(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }

    async fn all_rows(&self) -> Result<Vec<Vec<Value>>> {
        self.get_values(&self.qualify("A:ZZ")).await
    }

    async fn batch_update(&self, updates: &[RangeUpdate]) -> Result<()> {
        let url = format!(
            "{API_BASE}/{}/values:batchUpdate",
            self.spreadsheet_id
        );
        let data: Vec<Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "range": self.qualify(&u.range),
                    "values": u.values,
                })
            })
            .collect();
        debug!(ranges = updates.len(), "Batch-updating ledger rows");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await
            .map_err(|e| Error::StoreAccess(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }

    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<()> {
        let range = self.qualify("A1");
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(&range)
        );
        debug!(rows = rows.len(), "Appending ledger rows");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| Error::StoreAccess(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_ranges_quote_the_sheet_name() {
        let store = GoogleSheetsStore::new(
            "sheet-id".to_string(),
            "Media Repo Inventory".to_string(),
            "token".to_string(),
        );
        assert_eq!(store.qualify("A2:N2"), "'Media Repo Inventory'!A2:N2");
        assert_eq!(
            store.values_url("'Media Repo Inventory'!1:1"),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/%27Media%20Repo%20Inventory%27%211%3A1"
        );
    }
}
