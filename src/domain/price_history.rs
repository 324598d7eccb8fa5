//! Persisted per-product price history
//!
//! On disk every product is one JSON document. Three generations of that
//! document exist in the wild; they are all read through [`StoredDocument`]
//! and normalized into [`PersistedProduct`] before any merge logic runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variation name used for products tracked before per-variation history existed.
/// The chart client falls back to the same label.
pub const DEFAULT_VARIATION_NAME: &str = "標準価格";

/// One dated price point of a single variation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub price: u64,
    pub is_sale: bool,
}

/// Durable price history of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedProduct {
    pub id: String,
    pub name: String,
    /// Variation name -> observations sorted ascending by date, dates unique
    pub variations: BTreeMap<String, Vec<DailyObservation>>,
}

impl PersistedProduct {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            variations: BTreeMap::new(),
        }
    }

    pub fn history(&self, variation: &str) -> Option<&[DailyObservation]> {
        self.variations.get(variation).map(Vec::as_slice)
    }

    pub fn observation_on(&self, variation: &str, date: NaiveDate) -> Option<&DailyObservation> {
        self.history(variation)?.iter().find(|o| o.date == date)
    }

    /// Every series strictly ascending by date
    pub fn is_well_ordered(&self) -> bool {
        self.variations
            .values()
            .all(|series| series.windows(2).all(|w| w[0].date < w[1].date))
    }
}

/// A product document as found on disk, newest schema first.
///
/// Deserialization is untagged: serde tries the variants in order, so a
/// complete current document never falls through to the looser shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredDocument {
    /// `{ id, name, variations }`
    Current(PersistedProduct),
    /// An object with `name` and/or `variations` missing
    Partial(PartialDocument),
    /// First generation: a bare array of observations for a single price
    LegacyFlat(Vec<DailyObservation>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variations: Option<BTreeMap<String, Vec<DailyObservation>>>,
}

impl StoredDocument {
    /// Parse raw file contents
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Convert into the current shape.
    ///
    /// `expected_id` comes from the file location and fills in a missing id.
    /// Each series is re-sorted and duplicate dates collapse to the entry that
    /// appeared last in the file.
    pub fn normalize(self, expected_id: &str) -> PersistedProduct {
        let mut product = match self {
            Self::Current(product) => product,
            Self::Partial(partial) => PersistedProduct {
                id: partial
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| expected_id.to_string()),
                name: partial.name.unwrap_or_default(),
                variations: partial.variations.unwrap_or_default(),
            },
            Self::LegacyFlat(series) => {
                let mut product = PersistedProduct::new(expected_id, "");
                if !series.is_empty() {
                    product
                        .variations
                        .insert(DEFAULT_VARIATION_NAME.to_string(), series);
                }
                product
            }
        };

        if product.id.trim().is_empty() {
            product.id = expected_id.to_string();
        }
        for series in product.variations.values_mut() {
            normalize_series(series);
        }
        product
    }

    pub const fn schema_name(&self) -> &'static str {
        match self {
            Self::Current(_) => "current",
            Self::Partial(_) => "partial",
            Self::LegacyFlat(_) => "legacy-flat",
        }
    }
}

/// Sort ascending by date, keeping the last occurrence of a repeated date
pub fn normalize_series(series: &mut Vec<DailyObservation>) {
    let is_clean = series.windows(2).all(|w| w[0].date < w[1].date);
    if is_clean {
        return;
    }
    let by_date: BTreeMap<NaiveDate, DailyObservation> =
        series.drain(..).map(|obs| (obs.date, obs)).collect();
    series.extend(by_date.into_values());
}
