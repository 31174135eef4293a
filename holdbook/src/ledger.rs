//! Snapshot decoding: raw exchange JSON to a price-sorted ledger.
//!
//! A raw snapshot is a runner object whose exchange section holds three
//! `{price, size}` ladders (available to back, available to lay, traded).
//! The producer is not consistent about key casing, so every lookup goes
//! through [`normalize`], which yields one canonical [`ExchangeLadders`].
//! Everything after that works on the canonical shape only.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const EXCHANGE_KEYS: [&str; 2] = ["Ex", "ex"];
const BACK_KEYS: [&str; 2] = ["AvailableToBack", "availableToBack"];
const LAY_KEYS: [&str; 2] = ["AvailableToLay", "availableToLay"];
const TRADED_KEYS: [&str; 2] = ["TradedVolume", "tradedVolume"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Relative-magnitude class of the dominant traded price level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum HighlightTier {
    #[default]
    None,
    /// Largest traded level, not dominant.
    Max,
    /// Largest traded level, at least twice the runner-up.
    Double,
    /// Largest traded level, at least three times the runner-up.
    Triple,
}

impl From<HighlightTier> for u8 {
    fn from(tier: HighlightTier) -> Self {
        match tier {
            HighlightTier::None => 0,
            HighlightTier::Max => 1,
            HighlightTier::Double => 2,
            HighlightTier::Triple => 3,
        }
    }
}

impl TryFrom<u8> for HighlightTier {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(HighlightTier::None),
            1 => Ok(HighlightTier::Max),
            2 => Ok(HighlightTier::Double),
            3 => Ok(HighlightTier::Triple),
            other => Err(format!("invalid highlight tier {other}")),
        }
    }
}

/// One price point of a decoded ledger.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelRow {
    pub price: f64,
    pub to_back: f64,
    pub to_lay: f64,
    pub traded: f64,
    pub highlight: HighlightTier,
}

/// A `{price, size}` ladder entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PriceSize {
    pub price: f64,
    pub size: f64,
}

/// Canonical form of the exchange section of a snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeLadders {
    pub back: Vec<PriceSize>,
    pub lay: Vec<PriceSize>,
    pub traded: Vec<PriceSize>,
}

// ---------------------------------------------------------------------------
// Schema normalization
// ---------------------------------------------------------------------------

/// Extract the exchange ladders from a parsed runner, accepting both
/// PascalCase and camelCase keys (PascalCase is tried first).
///
/// Returns `None` when the runner has no exchange object. Missing ladders
/// are empty; ladder entries without a numeric price and size are skipped.
pub fn normalize(runner: &Value) -> Option<ExchangeLadders> {
    let ex = EXCHANGE_KEYS
        .iter()
        .find_map(|key| runner.get(key).and_then(Value::as_object))?;

    Some(ExchangeLadders {
        back: ladder(ex, &BACK_KEYS),
        lay: ladder(ex, &LAY_KEYS),
        traded: ladder(ex, &TRADED_KEYS),
    })
}

fn ladder(ex: &Map<String, Value>, keys: &[&str]) -> Vec<PriceSize> {
    let Some(entries) = keys
        .iter()
        .find_map(|key| ex.get(*key).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    entries.iter().filter_map(price_size).collect()
}

fn price_size(entry: &Value) -> Option<PriceSize> {
    let field = |lower: &str, upper: &str| {
        entry
            .get(lower)
            .or_else(|| entry.get(upper))
            .and_then(Value::as_f64)
    };
    Some(PriceSize {
        price: field("price", "Price")?,
        size: field("size", "Size")?,
    })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LevelTotals {
    to_back: f64,
    to_lay: f64,
    traded: f64,
}

/// Decode a raw snapshot into rows sorted ascending by price.
///
/// Entries at the same price are summed per field. `None`, malformed JSON
/// and payloads without an exchange section all decode to an empty ledger.
pub fn decode(raw: Option<&str>) -> Vec<PriceLevelRow> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    let runner: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "discarding malformed snapshot");
            return Vec::new();
        }
    };
    match normalize(&runner) {
        Some(ladders) => build_ledger(&ladders),
        None => Vec::new(),
    }
}

/// Merge canonical ladders into a ledger and assign the highlight tier.
pub fn build_ledger(ladders: &ExchangeLadders) -> Vec<PriceLevelRow> {
    let mut levels: BTreeMap<OrderedFloat<f64>, LevelTotals> = BTreeMap::new();
    let mut negative = 0usize;

    for entry in &ladders.back {
        negative += usize::from(entry.size < 0.0);
        levels.entry(OrderedFloat(entry.price)).or_default().to_back += entry.size;
    }
    for entry in &ladders.lay {
        negative += usize::from(entry.size < 0.0);
        levels.entry(OrderedFloat(entry.price)).or_default().to_lay += entry.size;
    }
    for entry in &ladders.traded {
        negative += usize::from(entry.size < 0.0);
        levels.entry(OrderedFloat(entry.price)).or_default().traded += entry.size;
    }

    if negative > 0 {
        // Upstream guarantees non-negative sizes; pass them through as-is.
        debug!(negative, "snapshot carries negative sizes");
    }

    let mut rows: Vec<PriceLevelRow> = levels
        .into_iter()
        .map(|(price, totals)| PriceLevelRow {
            price: price.0,
            to_back: totals.to_back,
            to_lay: totals.to_lay,
            traded: totals.traded,
            highlight: HighlightTier::None,
        })
        .collect();

    assign_highlight(&mut rows);
    rows
}

/// Mark the first row holding the largest positive traded size.
fn assign_highlight(rows: &mut [PriceLevelRow]) {
    let mut traded: Vec<f64> = rows
        .iter()
        .map(|r| r.traded)
        .filter(|t| *t > 0.0)
        .collect();
    traded.sort_by(|a, b| b.total_cmp(a));

    let Some(&max) = traded.first() else {
        return;
    };
    let second = traded.get(1).copied().unwrap_or(0.0);

    let tier = if second > 0.0 && max >= second * 3.0 {
        HighlightTier::Triple
    } else if second > 0.0 && max >= second * 2.0 {
        HighlightTier::Double
    } else {
        HighlightTier::Max
    };

    if let Some(row) = rows.iter_mut().find(|r| r.traded == max) {
        row.highlight = tier;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
