use std::sync::Arc;

use harvest_core::{Item, KeyStrategy};
use harvest_logging::{harvest_debug, harvest_warn};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::{Payload, RawPage};

/// Turns one raw page into keyed items.
///
/// Must never fail the page: malformed records are logged and dropped.
pub trait ItemExtractor: Send + Sync {
    fn extract(&self, page: &RawPage) -> Vec<Item>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemParseError {
    #[error("page body is not valid json: {0}")]
    InvalidJson(String),
    #[error("record {index} is not an object")]
    NotAnObject { index: usize },
    #[error("record {index} has no usable key")]
    NoKey { index: usize },
    #[error("unexpected {0} payload")]
    UnexpectedPayload(&'static str),
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
}

fn report(page: &RawPage, err: &ItemParseError) {
    harvest_warn!("{}: dropped record: {}", page.source, err);
}

/// Items from a JSON array found at `items_pointer` (RFC 6901; `""` is the
/// whole document).
#[derive(Clone)]
pub struct JsonItemExtractor {
    items_pointer: String,
    keys: Arc<dyn KeyStrategy>,
}

impl JsonItemExtractor {
    pub fn new(items_pointer: impl Into<String>, keys: Arc<dyn KeyStrategy>) -> Self {
        Self {
            items_pointer: items_pointer.into(),
            keys,
        }
    }

    fn document(page: &RawPage) -> Result<Value, ItemParseError> {
        match &page.body {
            Payload::Json(value) => Ok(value.clone()),
            Payload::Text(text) => {
                serde_json::from_str(text).map_err(|err| ItemParseError::InvalidJson(err.to_string()))
            }
        }
    }
}

impl ItemExtractor for JsonItemExtractor {
    fn extract(&self, page: &RawPage) -> Vec<Item> {
        let document = match Self::document(page) {
            Ok(document) => document,
            Err(err) => {
                report(page, &err);
                return Vec::new();
            }
        };

        // A missing list is how most sources say "no more results".
        let Some(Value::Array(records)) = document.pointer(&self.items_pointer) else {
            harvest_debug!("{}: no item list at `{}`", page.source, self.items_pointer);
            return Vec::new();
        };

        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                if !record.is_object() {
                    report(page, &ItemParseError::NotAnObject { index });
                    return None;
                }
                let item = Item::from_record(record.clone(), self.keys.as_ref());
                if item.is_none() {
                    report(page, &ItemParseError::NoKey { index });
                }
                item
            })
            .collect()
    }
}

/// One output field of an HTML item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub name: String,
    /// Matched inside the item element. `None` reads the item element itself.
    pub selector: Option<String>,
    /// Attribute to read instead of the element text.
    pub attr: Option<String>,
}

impl FieldSelector {
    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: Some(selector.into()),
            attr: None,
        }
    }

    pub fn attr(
        name: impl Into<String>,
        selector: Option<&str>,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            selector: selector.map(str::to_string),
            attr: Some(attr.into()),
        }
    }
}

/// Items from DOM nodes: one JSON object per node matched by `item_selector`,
/// fields in declaration order. Fields whose selector matches nothing are `null`.
#[derive(Clone)]
pub struct HtmlItemExtractor {
    item_selector: Selector,
    /// Parsed `FieldSelector::selector`, one per field.
    field_selectors: Vec<Option<Selector>>,
    fields: Vec<FieldSelector>,
    keys: Arc<dyn KeyStrategy>,
}

impl HtmlItemExtractor {
    /// Fails when any selector does not parse.
    pub fn new(
        item_selector: &str,
        fields: Vec<FieldSelector>,
        keys: Arc<dyn KeyStrategy>,
    ) -> Result<Self, ItemParseError> {
        let item_selector = parse_selector(item_selector)?;
        let field_selectors = fields
            .iter()
            .map(|field| field.selector.as_deref().map(parse_selector).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            item_selector,
            field_selectors,
            fields,
            keys,
        })
    }

    fn record(&self, element: ElementRef<'_>) -> Value {
        let mut record = Map::new();
        for (field, selector) in self.fields.iter().zip(&self.field_selectors) {
            let target = match selector {
                Some(selector) => element.select(selector).next(),
                None => Some(element),
            };
            let value = target
                .and_then(|node| match &field.attr {
                    Some(attr) => node.value().attr(attr).map(collapse_whitespace),
                    None => Some(collapse_whitespace(&node.text().collect::<String>())),
                })
                .map(Value::String)
                .unwrap_or(Value::Null);
            record.insert(field.name.clone(), value);
        }
        Value::Object(record)
    }
}

impl ItemExtractor for HtmlItemExtractor {
    fn extract(&self, page: &RawPage) -> Vec<Item> {
        let Payload::Text(html) = &page.body else {
            report(page, &ItemParseError::UnexpectedPayload("json"));
            return Vec::new();
        };

        let document = Html::parse_document(html);
        document
            .select(&self.item_selector)
            .enumerate()
            .filter_map(|(index, element)| {
                let item = Item::from_record(self.record(element), self.keys.as_ref());
                if item.is_none() {
                    report(page, &ItemParseError::NoKey { index });
                }
                item
            })
            .collect()
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ItemParseError> {
    Selector::parse(selector).map_err(|err| ItemParseError::Selector {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
