use serde::{Deserialize, Serialize};

use crate::ledger::{decode, PriceLevelRow};
use crate::types::PreviousQuery;

/// One row of an already-fetched detail page. Only the fields the ledger
/// views need are modelled; the rest of the page row is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRow {
    #[serde(alias = "pcId")]
    pub record_id: u64,
    #[serde(default)]
    pub selection: String,
    pub selection_id: u64,
    pub market_id: u64,
    #[serde(default)]
    pub last_odds: f64,
    #[serde(alias = "tradedChange", default)]
    pub traded_delta: f64,
    #[serde(alias = "refreshTime")]
    pub reference_time: String,
    #[serde(alias = "rawPayload", default)]
    pub raw_data: Option<String>,
    /// Line value for goal line, corner and asian handicap markets.
    #[serde(default)]
    pub handicap: Option<f64>,
}

impl HoldRow {
    /// Build the previous-record lookup for this row.
    pub fn previous_query(&self) -> PreviousQuery {
        let query = PreviousQuery::new(
            self.record_id,
            self.market_id,
            self.selection_id,
            self.reference_time.clone(),
        );
        match self.handicap {
            Some(h) => query.with_param("handicap", h.to_string()),
            None => query,
        }
    }
}

/// Resting-order snapshot for one selection at the window's last price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPriceEntry {
    pub selection_id: u64,
    #[serde(default)]
    pub selection: String,
    #[serde(alias = "rawPayload", default)]
    pub raw_data: Option<String>,
    #[serde(rename = "hasLargeOrderAt500Or1000", default)]
    pub has_large_order: bool,
}

impl LastPriceEntry {
    /// Decode the embedded snapshot.
    pub fn ledger(&self) -> Vec<PriceLevelRow> {
        decode(self.raw_data.as_deref())
    }
}

/// One time window of a detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hours_offset: i32,
    #[serde(default)]
    pub items: Vec<HoldRow>,
    #[serde(default)]
    pub last_prices: Option<Vec<LastPriceEntry>>,
}

/// Detail page payload; match metadata and summary statistics are not
/// modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPage {
    pub windows: Vec<TimeWindow>,
}

impl HoldPage {
    /// All rows across every window, in page order.
    pub fn rows(&self) -> impl Iterator<Item = &HoldRow> {
        self.windows.iter().flat_map(|w| w.items.iter())
    }
}
