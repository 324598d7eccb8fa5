//! Product detail pages: name, per-variation prices and sale signals
//!
//! Markup is tried first; the page's JSON-LD `Product` block fills in the
//! name and the price when the markup has none.

#![allow(clippy::uninlined_format_args)]

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{ParsingError, ParsingResult, compile_selector, element_text, parse_price};
use crate::domain::{DEFAULT_VARIATION_NAME, ProductRecord};
use crate::infrastructure::config::ParsingConfig;

pub struct ProductDetailParser {
    title_selectors: Vec<Selector>,
    variation_selector: Selector,
    variation_name_selector: Selector,
    variation_price_selector: Selector,
    main_price_selector: Selector,
    description_selector: Selector,
    sale_marker_selector: Selector,
    json_ld_selector: Selector,
    sale_class: String,
    sale_keywords: Vec<String>,
}

impl ProductDetailParser {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            title_selectors: config
                .title_selectors
                .iter()
                .map(|s| compile_selector(s))
                .collect::<ParsingResult<_>>()?,
            variation_selector: compile_selector(&config.variation_selector)?,
            variation_name_selector: compile_selector(&config.variation_name_selector)?,
            variation_price_selector: compile_selector(&config.variation_price_selector)?,
            main_price_selector: compile_selector(&config.main_price_selector)?,
            description_selector: compile_selector(&config.description_selector)?,
            sale_marker_selector: compile_selector(&config.sale_marker_selector)?,
            json_ld_selector: compile_selector(r#"script[type="application/ld+json"]"#)?,
            sale_class: config.sale_class.clone(),
            sale_keywords: config
                .sale_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    pub fn parse(&self, id: &str, html: &str) -> ParsingResult<ProductRecord> {
        let document = Html::parse_document(html);
        let json_ld = self.json_ld_product(&document);

        let name = self
            .title(&document)
            .or_else(|| json_ld.as_ref().and_then(json_ld_name))
            .unwrap_or_default();

        let description = document
            .select(&self.description_selector)
            .next()
            .map(|e| element_text(&e))
            .unwrap_or_default();

        let mut record = ProductRecord::new(id, name.clone())
            .with_sale_keyword(self.mentions_sale(&name) || self.mentions_sale(&description));

        let variation_items: Vec<ElementRef<'_>> = document.select(&self.variation_selector).collect();
        if variation_items.is_empty() {
            let (price, is_sale_hint) = self
                .main_price(&document)
                .or_else(|| json_ld.as_ref().and_then(json_ld_price).map(|p| (p, false)))
                .ok_or_else(|| ParsingError::NoPrice { id: id.to_string() })?;
            let is_sale_hint = is_sale_hint || self.has_sale_marker(&document);
            return Ok(record.with_variation(DEFAULT_VARIATION_NAME, price, is_sale_hint));
        }

        for (index, item) in variation_items.iter().enumerate() {
            let Some((price, is_sale_hint)) = self.variation_price(item) else {
                debug!("Product {}: variation {} has no price, skipped", id, index);
                continue;
            };
            let variation_name = item
                .select(&self.variation_name_selector)
                .next()
                .map(|e| element_text(&e))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_VARIATION_NAME.to_string());
            record = record.with_variation(variation_name, price, is_sale_hint);
        }

        if record.variations.is_empty() {
            return Err(ParsingError::NoPrice { id: id.to_string() });
        }
        Ok(record)
    }

    fn title(&self, document: &Html) -> Option<String> {
        self.title_selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .map(|e| element_text(&e))
                .find(|text| !text.is_empty())
        })
    }

    fn main_price(&self, document: &Html) -> Option<(u64, bool)> {
        document.select(&self.main_price_selector).find_map(|element| {
            parse_price(&element_text(&element)).map(|price| (price, self.has_sale_class(&element)))
        })
    }

    fn variation_price(&self, item: &ElementRef<'_>) -> Option<(u64, bool)> {
        let price_element = item.select(&self.variation_price_selector).next();
        let price = match &price_element {
            Some(element) => parse_price(&element_text(element))?,
            None => parse_price(&element_text(item))?,
        };
        let is_sale_hint = price_element.is_some_and(|e| self.has_sale_class(&e))
            || item.select(&self.sale_marker_selector).next().is_some();
        Some((price, is_sale_hint))
    }

    fn has_sale_class(&self, element: &ElementRef<'_>) -> bool {
        element.value().classes().any(|class| class == self.sale_class)
    }

    fn has_sale_marker(&self, document: &Html) -> bool {
        document.select(&self.sale_marker_selector).next().is_some()
    }

    fn mentions_sale(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.sale_keywords.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    /// First JSON-LD object typed `Product`, looking through arrays and `@graph`
    fn json_ld_product(&self, document: &Html) -> Option<Value> {
        document
            .select(&self.json_ld_selector)
            .filter_map(|script| serde_json::from_str::<Value>(&script.inner_html()).ok())
            .find_map(find_product_node)
    }
}

fn find_product_node(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.into_iter().find_map(find_product_node),
        Value::Object(mut map) => {
            let is_product = match map.get("@type") {
                Some(Value::String(t)) => t == "Product",
                Some(Value::Array(types)) => types.iter().any(|t| t == "Product"),
                _ => false,
            };
            if is_product {
                return Some(Value::Object(map));
            }
            map.remove("@graph").and_then(find_product_node)
        }
        _ => None,
    }
}

fn json_ld_name(product: &Value) -> Option<String> {
    product
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn json_ld_price(product: &Value) -> Option<u64> {
    let offers = product.get("offers")?;
    let offer = match offers {
        Value::Array(list) => list.first()?,
        other => other,
    };
    let price = offer.get("price").or_else(|| offer.get("lowPrice"))?;
    match price {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.split('.').next().and_then(parse_price),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ProductDetailParser {
        ProductDetailParser::new(&ParsingConfig::default()).unwrap()
    }

    const WITH_VARIATIONS: &str = r#"
        <html><body>
          <h2 class="font-bold">Winter Outfit for Avatar</h2>
          <div class="js-market-item-detail-description">Full set with textures.</div>
          <ul>
            <li class="variation-item">
              <div class="variation-name">Full set</div>
              <div class="variation-price is-sale">¥ 2,400</div>
            </li>
            <li class="variation-item">
              <div class="variation-name">Texture only</div>
              <div class="variation-price">¥ 800</div>
            </li>
            <li class="variation-item">
              <div class="variation-name">Sold out</div>
              <div class="variation-price">売り切れ</div>
            </li>
          </ul>
        </body></html>"#;

    #[test]
    fn parses_variations_with_sale_hints() {
        let record = parser().parse("4120631", WITH_VARIATIONS).unwrap();
        assert_eq!(record.id, "4120631");
        assert_eq!(record.name, "Winter Outfit for Avatar");
        assert!(!record.sale_keyword_hit);
        assert_eq!(record.variations.len(), 2);
        assert_eq!(record.variations[0].name, "Full set");
        assert_eq!(record.variations[0].price, 2400);
        assert!(record.variations[0].is_sale_hint);
        assert_eq!(record.variations[1].price, 800);
        assert!(!record.variations[1].is_sale_hint);
    }

    #[test]
    fn single_price_product_uses_default_variation_and_keywords() {
        let html = r#"
            <html><body>
              <h2 class="font-bold">【50%OFF】Shader Pack</h2>
              <div class="price">¥ 1,000</div>
            </body></html>"#;
        let record = parser().parse("3900011", html).unwrap();
        assert!(record.sale_keyword_hit);
        assert_eq!(record.variations.len(), 1);
        assert_eq!(record.variations[0].name, DEFAULT_VARIATION_NAME);
        assert_eq!(record.variations[0].price, 1000);
    }

    #[test]
    fn falls_back_to_json_ld() {
        let html = r#"
            <html><head>
              <script type="application/ld+json">
                {"@context":"https://schema.org","@graph":[
                  {"@type":"BreadcrumbList"},
                  {"@type":"Product","name":"Hair Accessory","offers":{"@type":"Offer","price":"500","priceCurrency":"JPY"}}
                ]}
              </script>
            </head><body><span class="on-sale">SALE</span></body></html>"#;
        let record = parser().parse("5000001", html).unwrap();
        assert_eq!(record.name, "Hair Accessory");
        assert_eq!(record.variations[0].price, 500);
        assert!(record.variations[0].is_sale_hint);
    }

    #[test]
    fn page_without_any_price_is_an_error() {
        let err = parser().parse("42", "<html><body><h1>Gone</h1></body></html>").unwrap_err();
        assert_eq!(err, ParsingError::NoPrice { id: "42".into() });
    }
}
