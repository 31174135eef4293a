//! Comparison of two decoded ledgers of the same selection.

use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::ledger::PriceLevelRow;

/// Number of newly traded price levels above which a record is flagged.
pub const DEFAULT_HEAVY_THRESHOLD: usize = 3;

/// New traded volume at one price. Back/lay sizes are always zero.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDiffRow {
    pub price: f64,
    pub to_back: f64,
    pub to_lay: f64,
    pub traded: f64,
}

impl LedgerDiffRow {
    fn traded_only(price: f64, traded: f64) -> Self {
        Self {
            price,
            to_back: 0.0,
            to_lay: 0.0,
            traded,
        }
    }
}

/// Current and previous rows side by side at one price.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedRow {
    pub price: f64,
    pub current: Option<PriceLevelRow>,
    pub previous: Option<PriceLevelRow>,
    /// Current traded minus previous traded; may be zero or negative.
    pub delta: f64,
}

/// Positive traded-volume deltas between two ledgers, in `current` order.
///
/// Prices missing from `previous` count as previously untraded. Prices only
/// in `previous` never appear.
pub fn traded_diff(current: &[PriceLevelRow], previous: &[PriceLevelRow]) -> Vec<LedgerDiffRow> {
    let prev_traded: HashMap<OrderedFloat<f64>, f64> = previous
        .iter()
        .filter(|r| r.traded > 0.0)
        .map(|r| (OrderedFloat(r.price), r.traded))
        .collect();

    current
        .iter()
        .filter(|r| r.traded > 0.0)
        .filter_map(|r| {
            let before = prev_traded
                .get(&OrderedFloat(r.price))
                .copied()
                .unwrap_or(0.0);
            let delta = r.traded - before;
            (delta > 0.0).then(|| LedgerDiffRow::traded_only(r.price, delta))
        })
        .collect()
}

/// Union of both ledgers' prices, ascending, with each side's row if present.
pub fn aligned_rows(current: &[PriceLevelRow], previous: &[PriceLevelRow]) -> Vec<AlignedRow> {
    let mut by_price: BTreeMap<OrderedFloat<f64>, (Option<PriceLevelRow>, Option<PriceLevelRow>)> =
        BTreeMap::new();
    for row in current {
        by_price.entry(OrderedFloat(row.price)).or_default().0 = Some(*row);
    }
    for row in previous {
        by_price.entry(OrderedFloat(row.price)).or_default().1 = Some(*row);
    }

    by_price
        .into_iter()
        .map(|(price, (cur, prev))| AlignedRow {
            price: price.0,
            current: cur,
            previous: prev,
            delta: cur.map_or(0.0, |r| r.traded) - prev.map_or(0.0, |r| r.traded),
        })
        .collect()
}

/// Count of current price levels whose traded size grew since `previous`.
pub fn active_level_count(current: &[PriceLevelRow], previous: &[PriceLevelRow]) -> usize {
    let prev_traded: HashMap<OrderedFloat<f64>, f64> = previous
        .iter()
        .map(|r| (OrderedFloat(r.price), r.traded))
        .collect();

    current
        .iter()
        .filter(|r| {
            let before = prev_traded
                .get(&OrderedFloat(r.price))
                .copied()
                .unwrap_or(0.0);
            r.traded - before > 0.0
        })
        .count()
}

/// Whether more than `threshold` price levels picked up new volume.
/// Always `false` without a previous record to compare against.
pub fn is_heavily_traded(
    current: &[PriceLevelRow],
    previous: Option<&[PriceLevelRow]>,
    threshold: usize,
) -> bool {
    match previous {
        Some(previous) => active_level_count(current, previous) > threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::HighlightTier;

    fn traded(price: f64, traded: f64) -> PriceLevelRow {
        PriceLevelRow {
            price,
            to_back: 0.0,
            to_lay: 0.0,
            traded,
            highlight: HighlightTier::None,
        }
    }

    #[test]
    fn reports_growth_at_same_price() {
        let previous = vec![traded(2.0, 500.0)];
        let current = vec![traded(2.0, 800.0)];
        assert_eq!(
            traded_diff(&current, &previous),
            vec![LedgerDiffRow {
                price: 2.0,
                to_back: 0.0,
                to_lay: 0.0,
                traded: 300.0,
            }]
        );
    }

    #[test]
    fn identical_ledgers_have_no_diff() {
        let ledger = vec![traded(1.5, 10.0), traded(1.6, 0.0), traded(2.0, 75.5)];
        assert!(traded_diff(&ledger, &ledger).is_empty());
    }

    #[test]
    fn new_price_counts_full_traded() {
        let previous = vec![traded(2.0, 100.0)];
        let current = vec![traded(2.0, 100.0), traded(2.2, 40.0)];
        let diff = traded_diff(&current, &previous);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].price, 2.2);
        assert_eq!(diff[0].traded, 40.0);
    }

    #[test]
    fn shrinking_and_untraded_levels_are_dropped() {
        let previous = vec![traded(1.8, 50.0), traded(2.0, 100.0), traded(3.0, 5.0)];
        let current = vec![traded(1.8, 20.0), traded(2.0, 0.0), traded(2.5, 0.0)];
        assert!(traded_diff(&current, &previous).is_empty());
    }

    #[test]
    fn output_follows_current_order_and_prices() {
        let previous = vec![traded(1.5, 1.0), traded(9.0, 100.0)];
        let current = vec![traded(1.5, 4.0), traded(1.7, 2.0), traded(2.0, 1.0)];
        let diff = traded_diff(&current, &previous);
        let prices: Vec<f64> = diff.iter().map(|d| d.price).collect();
        assert_eq!(prices, vec![1.5, 1.7, 2.0]);
        assert!(diff.iter().all(|d| d.traded > 0.0 && d.to_back == 0.0 && d.to_lay == 0.0));
    }

    #[test]
    fn aligned_rows_cover_union_of_prices() {
        let previous = vec![traded(1.9, 10.0), traded(2.1, 30.0)];
        let current = vec![traded(2.0, 5.0), traded(2.1, 20.0)];
        let rows = aligned_rows(&current, &previous);

        let prices: Vec<f64> = rows.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![1.9, 2.0, 2.1]);

        assert!(rows[0].current.is_none());
        assert_eq!(rows[0].delta, -10.0);
        assert!(rows[1].previous.is_none());
        assert_eq!(rows[1].delta, 5.0);
        assert_eq!(rows[2].delta, -10.0);
    }

    #[test]
    fn heavy_flag_needs_more_than_threshold_levels() {
        let previous = vec![traded(1.5, 10.0)];
        let mut current = vec![
            traded(1.5, 11.0),
            traded(1.6, 1.0),
            traded(1.7, 1.0),
        ];
        assert_eq!(active_level_count(&current, &previous), 3);
        assert!(!is_heavily_traded(&current, Some(&previous), DEFAULT_HEAVY_THRESHOLD));

        current.push(traded(1.8, 1.0));
        assert!(is_heavily_traded(&current, Some(&previous), DEFAULT_HEAVY_THRESHOLD));
    }

    #[test]
    fn heavy_flag_is_false_without_previous_record() {
        let current: Vec<PriceLevelRow> = (0..10).map(|i| traded(1.0 + i as f64, 5.0)).collect();
        assert!(!is_heavily_traded(&current, None, DEFAULT_HEAVY_THRESHOLD));
        assert!(is_heavily_traded(&current, Some(&[]), DEFAULT_HEAVY_THRESHOLD));
    }
}
