//! Field-level comparison of two versions of an item

use crate::ingest::record::ExtractedItem;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Old and new value of one changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Changed tracked fields, keyed by field name
pub type FieldDiffs = BTreeMap<String, FieldChange>;

/// Fields whose changes are written to the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    Name,
    PriceExclTax,
    PriceInclTax,
    Availability,
    ReviewCount,
}

impl TrackedField {
    pub const ALL: [TrackedField; 5] = [
        Self::Name,
        Self::PriceExclTax,
        Self::PriceInclTax,
        Self::Availability,
        Self::ReviewCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PriceExclTax => "price_excl_tax",
            Self::PriceInclTax => "price_incl_tax",
            Self::Availability => "availability",
            Self::ReviewCount => "review_count",
        }
    }

    fn value(&self, item: &ExtractedItem) -> Value {
        match self {
            Self::Name => json!(item.name),
            Self::PriceExclTax => json!(item.price_excl_tax),
            Self::PriceInclTax => json!(item.price_incl_tax),
            Self::Availability => json!(item.availability),
            Self::ReviewCount => json!(item.review_count),
        }
    }
}

/// Collects every tracked field that differs between `old` and `new`
///
/// Untracked fields (description, category, image, rating) never show up
/// here even when they changed.
pub fn diff_tracked(old: &ExtractedItem, new: &ExtractedItem) -> FieldDiffs {
    TrackedField::ALL
        .iter()
        .filter_map(|field| {
            let before = field.value(old);
            let after = field.value(new);
            (before != after).then(|| {
                (
                    field.name().to_string(),
                    FieldChange {
                        old: before,
                        new: after,
                    },
                )
            })
        })
        .collect()
}
