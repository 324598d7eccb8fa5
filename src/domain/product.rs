use serde::{Deserialize, Serialize};

/// Marketplace product identifier (numeric string on BOOTH, e.g. "4120631")
pub type ProductId = String;

/// One product as observed on its detail page during the current run.
///
/// Produced by a `PageFetcher`, consumed once by the history merge and never
/// persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub variations: Vec<VariationPrice>,
    /// The title or description advertises a sale
    pub sale_keyword_hit: bool,
}

/// Price of a single purchasable variation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationPrice {
    pub name: String,
    pub price: u64,
    /// The page marks this price as discounted
    pub is_sale_hint: bool,
}

impl ProductRecord {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            variations: Vec::new(),
            sale_keyword_hit: false,
        }
    }

    #[must_use]
    pub fn with_variation(mut self, name: impl Into<String>, price: u64, is_sale_hint: bool) -> Self {
        self.variations.push(VariationPrice {
            name: name.into(),
            price,
            is_sale_hint,
        });
        self
    }

    #[must_use]
    pub const fn with_sale_keyword(mut self, hit: bool) -> Self {
        self.sale_keyword_hit = hit;
        self
    }
}
