//! Review events and product metadata as supplied by the loader.
//!
//! Both types are read-only inputs. Nothing downstream mutates them; derived
//! temporal fields live on [`crate::anchor::AnchoredEvent`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Input column names accepted as the product key, in order of preference.
pub const PRODUCT_KEY_FIELDS: [&str; 2] = ["product_id", "parent_asin"];

/// One user review of one product variant.
///
/// `product_id` is the cohort grain; `item_id` identifies the variant and is
/// carried through untouched. Source files using the marketplace column names
/// (`parent_asin`, `asin`) are accepted too. A row carrying both spellings
/// takes the canonical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReview")]
pub struct ReviewEvent {
    pub product_id: String,
    pub item_id: String,
    pub rating: f64,
    pub text: String,
    pub title: Option<String>,
    pub helpful_vote: u32,
    pub verified_purchase: bool,
    /// Raw epoch timestamp. The column is required; a `null` value is kept
    /// so the anchor stage can reject it with a precise diagnostic.
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Review row as it appears on the wire, with both key spellings.
#[derive(Deserialize)]
struct RawReview {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    parent_asin: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    rating: f64,
    text: String,
    #[serde(default)]
    title: Option<String>,
    helpful_vote: u32,
    verified_purchase: bool,
    #[serde(deserialize_with = "required_nullable")]
    timestamp: Option<i64>,
    #[serde(default)]
    user_id: Option<String>,
}

impl TryFrom<RawReview> for ReviewEvent {
    type Error = String;

    fn try_from(raw: RawReview) -> Result<Self, Self::Error> {
        let product_id = raw
            .product_id
            .or(raw.parent_asin)
            .ok_or("missing field `product_id`")?;
        let item_id = raw.item_id.or(raw.asin).ok_or("missing field `item_id`")?;
        Ok(Self {
            product_id,
            item_id,
            rating: raw.rating,
            text: raw.text,
            title: raw.title,
            helpful_vote: raw.helpful_vote,
            verified_purchase: raw.verified_purchase,
            timestamp: raw.timestamp,
            user_id: raw.user_id,
        })
    }
}

/// Deserialize a field that must be present but may be `null`.
///
/// Plain `Option<T>` fields treat a missing key as `None`; routing through
/// `deserialize_with` without `#[serde(default)]` makes absence an error.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer)
}

/// Arbitrary product attributes keyed by `product_id`.
///
/// The row is kept as the original JSON object so attributes the pipeline
/// does not know about pass through to the cleaned output unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductMetadata {
    product_id: String,
    fields: Map<String, Value>,
}

impl ProductMetadata {
    /// Build a metadata row from a JSON object, extracting its product key.
    ///
    /// Returns `None` if the object has no string-valued key column.
    #[must_use]
    pub fn from_object(fields: Map<String, Value>) -> Option<Self> {
        let product_id = PRODUCT_KEY_FIELDS
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))?
            .to_string();
        Some(Self { product_id, fields })
    }

    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// All attributes of the row, including the key column.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A copy of this row with the named attributes removed.
    ///
    /// The product key is preserved even if named.
    #[must_use]
    pub fn without_fields(&self, names: &[&str]) -> Self {
        let mut fields = self.fields.clone();
        for name in names {
            if !PRODUCT_KEY_FIELDS.contains(name) {
                fields.remove(*name);
            }
        }
        Self {
            product_id: self.product_id.clone(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review_json() -> Value {
        json!({
            "parent_asin": "B00P1",
            "asin": "B00V1",
            "rating": 5.0,
            "text": "works great",
            "title": "Great",
            "helpful_vote": 2,
            "verified_purchase": true,
            "timestamp": 1_588_687_728_923_i64,
            "user_id": "U1"
        })
    }

    #[test]
    fn marketplace_aliases_map_to_cohort_fields() {
        let event: ReviewEvent = serde_json::from_value(review_json()).expect("parse");
        assert_eq!(event.product_id, "B00P1");
        assert_eq!(event.item_id, "B00V1");
        assert_eq!(event.timestamp, Some(1_588_687_728_923));
        assert_eq!(event.user_id.as_deref(), Some("U1"));
    }

    #[test]
    fn canonical_key_wins_over_marketplace_spelling() {
        let mut raw = review_json();
        raw["product_id"] = json!("P-CANON");
        raw["item_id"] = json!("V-CANON");
        let event: ReviewEvent = serde_json::from_value(raw).expect("parse");
        assert_eq!(event.product_id, "P-CANON");
        assert_eq!(event.item_id, "V-CANON");
    }

    #[test]
    fn missing_product_key_is_a_schema_error() {
        let mut raw = review_json();
        raw.as_object_mut().expect("object").remove("parent_asin");
        let err = serde_json::from_value::<ReviewEvent>(raw).expect_err("must fail");
        assert!(err.to_string().contains("product_id"), "{err}");
    }

    #[test]
    fn serialized_event_reads_back_under_canonical_names() {
        let event: ReviewEvent = serde_json::from_value(review_json()).expect("parse");
        let value = serde_json::to_value(&event).expect("encode");
        assert_eq!(value["product_id"], "B00P1");
        assert!(value.get("parent_asin").is_none());
        let back: ReviewEvent = serde_json::from_value(value).expect("decode");
        assert_eq!(back, event);
    }

    #[test]
    fn null_timestamp_is_kept_for_the_anchor_stage() {
        let mut raw = review_json();
        raw["timestamp"] = Value::Null;
        let event: ReviewEvent = serde_json::from_value(raw).expect("parse");
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn missing_timestamp_column_is_a_schema_error() {
        let mut raw = review_json();
        raw.as_object_mut().expect("object").remove("timestamp");
        let err = serde_json::from_value::<ReviewEvent>(raw).expect_err("must fail");
        assert!(err.to_string().contains("timestamp"), "{err}");
    }

    #[test]
    fn negative_helpful_vote_is_rejected() {
        let mut raw = review_json();
        raw["helpful_vote"] = json!(-1);
        assert!(serde_json::from_value::<ReviewEvent>(raw).is_err());
    }

    #[test]
    fn title_and_user_id_are_optional() {
        let mut raw = review_json();
        let obj = raw.as_object_mut().expect("object");
        obj.remove("title");
        obj.remove("user_id");
        let event: ReviewEvent = serde_json::from_value(raw).expect("parse");
        assert!(event.title.is_none());
        assert!(event.user_id.is_none());
    }

    #[test]
    fn metadata_key_prefers_product_id_then_parent_asin() {
        let Value::Object(fields) = json!({"parent_asin": "P9", "title": "Serum"}) else {
            unreachable!()
        };
        let meta = ProductMetadata::from_object(fields).expect("keyed");
        assert_eq!(meta.product_id(), "P9");
        assert_eq!(meta.fields()["title"], "Serum");
    }

    #[test]
    fn without_fields_keeps_the_key() {
        let Value::Object(fields) = json!({"parent_asin": "P9", "images": [], "store": "s"}) else {
            unreachable!()
        };
        let meta = ProductMetadata::from_object(fields).expect("keyed");
        let trimmed = meta.without_fields(&["images", "parent_asin"]);
        assert_eq!(trimmed.product_id(), "P9");
        assert!(trimmed.fields().contains_key("parent_asin"));
        assert!(!trimmed.fields().contains_key("images"));
        assert!(meta.fields().contains_key("images"));
    }

    #[test]
    fn metadata_without_key_is_rejected() {
        let Value::Object(fields) = json!({"title": "orphan"}) else {
            unreachable!()
        };
        assert!(ProductMetadata::from_object(fields).is_none());
    }
}
