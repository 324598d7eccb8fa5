//! Folding one day's observation into stored price history
//!
//! The merge is an upsert keyed by date, so re-running a crawl on the same day
//! (or re-processing the same product twice) leaves the stored history exactly
//! as a single application would.

use chrono::NaiveDate;

use super::price_history::{DailyObservation, PersistedProduct};
use super::product::{ProductRecord, VariationPrice};

/// Merge `incoming` into `existing` (or a fresh record) for `today`.
///
/// - A blank stored name is healed from the incoming one; a non-blank stored
///   name is never overwritten.
/// - Each incoming variation gets exactly one observation dated `today`.
/// - `is_sale` is the explicit sale signal, or a price drop against the latest
///   observation dated before `today`. Same-day entries are never compared.
/// - Stored variations missing from `incoming` are left untouched.
pub fn merge(
    existing: Option<PersistedProduct>,
    incoming: &ProductRecord,
    today: NaiveDate,
) -> PersistedProduct {
    let mut product = existing
        .unwrap_or_else(|| PersistedProduct::new(incoming.id.clone(), incoming.name.clone()));

    if product.name.trim().is_empty() && !incoming.name.trim().is_empty() {
        product.name.clone_from(&incoming.name);
    }

    for variation in &incoming.variations {
        let series = product.variations.entry(variation.name.clone()).or_default();
        let is_sale = infer_sale(series, variation, incoming.sale_keyword_hit, today);
        upsert_observation(
            series,
            DailyObservation {
                date: today,
                price: variation.price,
                is_sale,
            },
        );
    }

    product
}

/// Latest observation strictly before `today`
pub fn last_prior_observation(series: &[DailyObservation], today: NaiveDate) -> Option<&DailyObservation> {
    series.iter().rev().find(|obs| obs.date < today)
}

fn infer_sale(
    series: &[DailyObservation],
    variation: &VariationPrice,
    sale_keyword_hit: bool,
    today: NaiveDate,
) -> bool {
    if variation.is_sale_hint || sale_keyword_hit {
        return true;
    }
    last_prior_observation(series, today).is_some_and(|prior| variation.price < prior.price)
}

/// Replace the entry with the same date or append, keeping the series sorted
fn upsert_observation(series: &mut Vec<DailyObservation>, observation: DailyObservation) {
    if let Some(slot) = series.iter_mut().rev().find(|obs| obs.date == observation.date) {
        *slot = observation;
        return;
    }

    series.push(observation);
    let len = series.len();
    // Only the appended tail can be out of place
    if len >= 2 && series[len - 2].date > observation.date {
        series.sort_by_key(|obs| obs.date);
    }
}

/// Re-apply the price-drop heuristic to already stored history.
///
/// Every observation cheaper than its predecessor is flagged as a sale. Flags
/// are only ever set, never cleared. Returns the number of flipped entries.
pub fn reinfer_price_drop_sales(product: &mut PersistedProduct) -> usize {
    let mut flipped = 0;
    for series in product.variations.values_mut() {
        for i in 1..series.len() {
            let previous_price = series[i - 1].price;
            let current = &mut series[i];
            if !current.is_sale && current.price < previous_price {
                current.is_sale = true;
                flipped += 1;
            }
        }
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn obs(date: &str, price: u64, is_sale: bool) -> DailyObservation {
        DailyObservation { date: day(date), price, is_sale }
    }

    fn stored(name: &str, variation: &str, series: Vec<DailyObservation>) -> PersistedProduct {
        let mut product = PersistedProduct::new("4120631", name);
        product.variations.insert(variation.to_string(), series);
        product
    }

    #[test]
    fn first_fetch_creates_record() {
        let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", 1500, false);
        let merged = merge(None, &incoming, day("2026-02-10"));

        assert_eq!(merged.id, "4120631");
        assert_eq!(merged.name, "Avatar");
        assert_eq!(merged.history("basic").unwrap(), &[obs("2026-02-10", 1500, false)]);
    }

    #[test]
    fn blank_name_is_healed_but_real_name_is_kept() {
        let incoming = ProductRecord::new("4120631", "New title").with_variation("basic", 1500, false);

        let healed = merge(Some(stored("  ", "basic", vec![])), &incoming, day("2026-02-10"));
        assert_eq!(healed.name, "New title");

        let kept = merge(Some(stored("Old title", "basic", vec![])), &incoming, day("2026-02-10"));
        assert_eq!(kept.name, "Old title");

        let blank_incoming = ProductRecord::new("4120631", "").with_variation("basic", 1500, false);
        let still_blank = merge(Some(stored("", "basic", vec![])), &blank_incoming, day("2026-02-10"));
        assert_eq!(still_blank.name, "");
    }

    #[test]
    fn price_drop_against_prior_day_is_a_sale() {
        let existing = stored("Avatar", "basic", vec![obs("2026-02-09", 2000, false)]);
        let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", 1500, false);
        let merged = merge(Some(existing), &incoming, day("2026-02-10"));
        assert!(merged.observation_on("basic", day("2026-02-10")).unwrap().is_sale);
    }

    #[test]
    fn equal_or_higher_price_without_signal_is_not_a_sale() {
        let existing = stored("Avatar", "basic", vec![obs("2026-02-09", 2000, true)]);
        for price in [2000, 2500] {
            let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", price, false);
            let merged = merge(Some(existing.clone()), &incoming, day("2026-02-10"));
            assert!(!merged.observation_on("basic", day("2026-02-10")).unwrap().is_sale);
        }
    }

    #[test]
    fn explicit_signals_win_over_price_comparison() {
        let existing = stored("Avatar", "basic", vec![obs("2026-02-09", 1000, false)]);

        let hinted = ProductRecord::new("4120631", "Avatar").with_variation("basic", 1200, true);
        let merged = merge(Some(existing.clone()), &hinted, day("2026-02-10"));
        assert!(merged.observation_on("basic", day("2026-02-10")).unwrap().is_sale);

        let keyword = ProductRecord::new("4120631", "Avatar")
            .with_variation("basic", 1200, false)
            .with_sale_keyword(true);
        let merged = merge(Some(existing), &keyword, day("2026-02-10"));
        assert!(merged.observation_on("basic", day("2026-02-10")).unwrap().is_sale);
    }

    #[test]
    fn same_day_entry_is_replaced_and_not_used_for_comparison() {
        let existing = stored(
            "Avatar",
            "basic",
            vec![obs("2026-02-09", 2000, false), obs("2026-02-10", 3000, false)],
        );
        // Cheaper than today's earlier reading but not than yesterday's
        let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", 2500, false);
        let merged = merge(Some(existing), &incoming, day("2026-02-10"));

        let series = merged.history("basic").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1], obs("2026-02-10", 2500, false));
    }

    #[test]
    fn upsert_restores_order_when_history_has_future_entries() {
        let existing = stored("Avatar", "basic", vec![obs("2026-02-12", 2000, false)]);
        let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", 1800, false);
        let merged = merge(Some(existing), &incoming, day("2026-02-10"));
        assert!(merged.is_well_ordered());
        assert_eq!(merged.history("basic").unwrap()[0].date, day("2026-02-10"));
    }

    #[test]
    fn variations_missing_from_fetch_are_untouched() {
        let existing = stored("Avatar", "deluxe", vec![obs("2026-02-09", 5000, false)]);
        let incoming = ProductRecord::new("4120631", "Avatar").with_variation("basic", 1000, false);
        let merged = merge(Some(existing), &incoming, day("2026-02-10"));
        assert_eq!(merged.history("deluxe").unwrap(), &[obs("2026-02-09", 5000, false)]);
        assert_eq!(merged.history("basic").unwrap().len(), 1);
    }

    #[test]
    fn reinfer_flags_drops_and_never_clears() {
        let mut product = stored(
            "Avatar",
            "basic",
            vec![
                obs("2026-01-01", 3000, false),
                obs("2026-01-02", 2000, false),
                obs("2026-01-03", 2500, true),
                obs("2026-01-04", 2500, false),
            ],
        );
        assert_eq!(reinfer_price_drop_sales(&mut product), 1);
        let series = product.history("basic").unwrap();
        assert!(series[1].is_sale);
        assert!(series[2].is_sale);
        assert!(!series[3].is_sale);

        assert_eq!(reinfer_price_drop_sales(&mut product), 0);
    }

    fn arb_series() -> impl Strategy<Value = Vec<DailyObservation>> {
        prop::collection::vec((0u32..40, 0u64..5000, any::<bool>()), 0..8).prop_map(|raw| {
            let base = day("2026-01-01");
            let mut series: Vec<DailyObservation> = raw
                .into_iter()
                .map(|(offset, price, is_sale)| DailyObservation {
                    date: base + chrono::Days::new(u64::from(offset)),
                    price,
                    is_sale,
                })
                .collect();
            crate::domain::price_history::normalize_series(&mut series);
            series
        })
    }

    fn arb_existing() -> impl Strategy<Value = Option<PersistedProduct>> {
        let names = prop::sample::select(vec!["", "  ", "Stored name"]);
        let variations = prop::collection::btree_map(
            prop::sample::select(vec!["basic".to_string(), "deluxe".to_string()]),
            arb_series(),
            0..3,
        );
        prop::option::of((names, variations).prop_map(|(name, variations)| PersistedProduct {
            id: "4120631".to_string(),
            name: name.to_string(),
            variations,
        }))
    }

    fn arb_incoming() -> impl Strategy<Value = ProductRecord> {
        let names = prop::sample::select(vec!["", "Fetched name"]);
        let variations = prop::collection::vec(
            (
                prop::sample::select(vec!["basic", "deluxe", "extra"]),
                0u64..5000,
                any::<bool>(),
            ),
            0..4,
        );
        (names, variations, any::<bool>()).prop_map(|(name, variations, keyword)| {
            variations.into_iter().fold(
                ProductRecord::new("4120631", name).with_sale_keyword(keyword),
                |record, (v, price, hint)| record.with_variation(v, price, hint),
            )
        })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(existing in arb_existing(), incoming in arb_incoming(), offset in 0u32..45) {
            let today = day("2026-01-01") + chrono::Days::new(u64::from(offset));
            let once = merge(existing, &incoming, today);
            let twice = merge(Some(once.clone()), &incoming, today);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merged_series_stay_strictly_ascending(existing in arb_existing(), incoming in arb_incoming(), offset in 0u32..45) {
            let today = day("2026-01-01") + chrono::Days::new(u64::from(offset));
            let merged = merge(existing, &incoming, today);
            prop_assert!(merged.is_well_ordered());
        }

        #[test]
        fn non_blank_name_survives(existing in arb_existing(), incoming in arb_incoming()) {
            let stored_name = existing.as_ref().map(|p| p.name.clone());
            let merged = merge(existing, &incoming, day("2026-02-01"));
            if let Some(name) = stored_name.filter(|n| !n.trim().is_empty()) {
                prop_assert_eq!(merged.name, name);
            }
        }
    }
}
