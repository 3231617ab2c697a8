use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

use crate::models::{order::COLUMNS, Order, OrderStatus};

use super::{Store, StoreError, Transition};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// [`Store`] over a Google Sheets worksheet: one header row, one row per
/// order, columns `A..L` matching [`COLUMNS`].
///
/// The compare-and-set in `transition` is a read-check-write against the
/// remote sheet; the order engine serializes writers per hash, and this
/// service is the worksheet's only writer.
pub struct SheetStore {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
    worksheet: String,
}

impl SheetStore {
    pub fn new(
        http: Client,
        spreadsheet_id: String,
        access_token: String,
        worksheet: String,
    ) -> Self {
        Self {
            http,
            base_url: SHEETS_API_BASE.into(),
            spreadsheet_id,
            access_token,
            worksheet,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}!{}",
            self.base_url, self.spreadsheet_id, self.worksheet, range
        )
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let resp = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let rows = body
            .get("values")
            .and_then(|v| v.as_array())
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows)
    }

    async fn write_range(&self, range: &str, values: Vec<Vec<String>>) -> Result<(), StoreError> {
        self.http
            .put(format!(
                "{}?valueInputOption=RAW",
                self.values_url(range)
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": values }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), StoreError> {
        self.http
            .post(format!(
                "{}:append?valueInputOption=RAW",
                self.values_url("A:L")
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Write the header row if the worksheet is still blank.
    pub async fn ensure_header(&self) -> Result<(), StoreError> {
        let header = self.read_range("A1:L1").await?;
        if header.is_empty() {
            let cells = COLUMNS.iter().map(|c| c.to_string()).collect();
            self.write_range("A1:L1", vec![cells]).await?;
            tracing::info!(worksheet = %self.worksheet, "Created orders worksheet header");
        }
        Ok(())
    }

    /// All data rows, with their 1-based sheet row numbers. Malformed rows
    /// are logged and skipped rather than failing the read.
    async fn read_orders(&self) -> Result<Vec<(u32, Order)>, StoreError> {
        let rows = self.read_range("A2:L").await?;

        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let sheet_row = i as u32 + 2;
                match Order::from_row(row) {
                    Some(order) => Some((sheet_row, order)),
                    None => {
                        if !row.iter().all(|cell| cell.is_empty()) {
                            tracing::warn!(sheet_row, "Skipping malformed order row");
                        }
                        None
                    }
                }
            })
            .collect())
    }

    async fn find(&self, hash: &str) -> Result<Option<(u32, Order)>, StoreError> {
        Ok(self
            .read_orders()
            .await?
            .into_iter()
            .find(|(_, o)| o.hash == hash))
    }
}

#[async_trait]
impl Store for SheetStore {
    async fn insert(&self, mut order: Order) -> Result<Order, StoreError> {
        let rows = self.read_orders().await?;
        if rows.iter().any(|(_, o)| o.hash == order.hash) {
            return Err(StoreError::DuplicateHash(order.hash));
        }

        order.id = rows.len() as u64 + 1;
        self.append_row(order.to_row()).await?;
        Ok(order)
    }

    async fn get(&self, hash: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.find(hash).await?.map(|(_, o)| o))
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .read_orders()
            .await?
            .into_iter()
            .map(|(_, o)| o)
            .collect())
    }

    async fn transition(
        &self,
        hash: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Transition, StoreError> {
        debug_assert!(
            expected.can_transition_to(next),
            "illegal transition {expected} -> {next}"
        );

        let (sheet_row, mut order) = self
            .find(hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;

        if order.status != expected {
            return Ok(Transition::Conflict(order));
        }

        order.status = next;
        order.updated_at = Utc::now();

        // Columns I..L: status, confirmations, created_at, updated_at.
        self.write_range(
            &format!("I{sheet_row}:L{sheet_row}"),
            vec![vec![
                order.status.to_string(),
                order.confirmations_observed.to_string(),
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ]],
        )
        .await?;

        Ok(Transition::Applied(order))
    }

    async fn record_confirmations(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), StoreError> {
        let (sheet_row, mut order) = self
            .find(hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;

        order.confirmations_observed = confirmations;
        order.updated_at = Utc::now();

        self.write_range(
            &format!("J{sheet_row}:L{sheet_row}"),
            vec![vec![
                order.confirmations_observed.to_string(),
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ]],
        )
        .await?;

        Ok(())
    }
}
