use serde::{Deserialize, Serialize};

/// The snapshot recorded immediately before a given record, as returned by
/// the previous-record endpoint.
///
/// The backend has shipped two naming generations; the older names are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousRecord {
    #[serde(alias = "pcId")]
    pub record_id: u64,
    /// Raw exchange snapshot JSON, see [`crate::ledger::decode`].
    #[serde(rename = "rawPayload", alias = "rawData", default)]
    pub raw_data: Option<String>,
    #[serde(alias = "refreshTime", default)]
    pub reference_time: String,
    #[serde(alias = "tradedChange", default)]
    pub traded_delta: f64,
    #[serde(default)]
    pub last_odds: f64,
}

/// Parameters identifying one previous-record lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousQuery {
    /// Cache key.
    pub record_id: u64,
    pub market_id: u64,
    pub selection_id: u64,
    /// ISO 8601 timestamp of the current record, passed through verbatim.
    pub reference_time: String,
    /// Market-specific parameters such as `handicap`.
    pub extra: Vec<(String, String)>,
}

impl PreviousQuery {
    pub fn new(
        record_id: u64,
        market_id: u64,
        selection_id: u64,
        reference_time: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            market_id,
            selection_id,
            reference_time: reference_time.into(),
            extra: Vec::new(),
        }
    }

    /// Append an extra query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Query string pairs in wire order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("recordId".to_string(), self.record_id.to_string()),
            ("marketId".to_string(), self.market_id.to_string()),
            ("selectionId".to_string(), self.selection_id.to_string()),
            ("referenceTime".to_string(), self.reference_time.clone()),
        ];
        pairs.extend(self.extra.iter().cloned());
        pairs
    }
}
