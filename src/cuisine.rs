//! Cuisine normalization and exclusion filtering.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical, lower-cased cuisine key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CuisineKey(String);

impl CuisineKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tolerant match used when filtering: equal, or either key contains the other.
    ///
    /// An empty key never matches, so untagged items are never hidden.
    pub fn loosely_matches(&self, other: &CuisineKey) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.0 == other.0 || self.0.contains(&other.0) || other.0.contains(&self.0)
    }
}

impl fmt::Display for CuisineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CuisineKey {
    fn from(value: &str) -> Self {
        normalize_cuisine(value)
    }
}

/// Synonyms and common misspellings, keyed by the lower-cased trimmed label
const SYNONYMS: &[(&str, &str)] = &[
    ("cafe", "coffee"),
    ("café", "coffee"),
    ("coffee shop", "coffee"),
    ("espresso", "coffee"),
    ("bbque", "bbq"),
    ("barbecue", "bbq"),
    ("barbeque", "bbq"),
    ("bar-b-q", "bbq"),
    ("veggie", "vegan"),
    ("plant-based", "vegan"),
    ("plant based", "vegan"),
    ("taco", "mexican"),
    ("tacos", "mexican"),
    ("tex-mex", "mexican"),
    ("burger", "american"),
    ("burgers", "american"),
    ("hot dogs", "american"),
    ("pizzeria", "pizza"),
    ("desserts", "dessert"),
    ("sweets", "dessert"),
    ("ice cream", "dessert"),
    ("fish", "seafood"),
    ("sushi", "japanese"),
    ("ramen", "japanese"),
    ("gyro", "mediterranean"),
    ("gyros", "mediterranean"),
    ("bubble tea", "drinks"),
    ("beverages", "drinks"),
];

/// Map a free-text cuisine label to its canonical key.
///
/// Unmapped labels pass through trimmed and lower-cased.
pub fn normalize_cuisine(raw: &str) -> CuisineKey {
    let cleaned = raw.trim().to_lowercase();
    let key = SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == cleaned)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(cleaned);
    CuisineKey(key)
}

/// Anything that carries a cuisine tag.
pub trait Cuisine {
    fn cuisine_label(&self) -> &str;

    fn cuisine_key(&self) -> CuisineKey {
        normalize_cuisine(self.cuisine_label())
    }
}

/// Set of cuisines hidden by the viewer. Empty shows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuisineFilter {
    excluded: BTreeSet<CuisineKey>,
}

impl CuisineFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|c| normalize_cuisine(c.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Return a new filter with `cuisine` toggled in or out of the excluded set.
    pub fn toggled(&self, cuisine: &str) -> Self {
        let key = normalize_cuisine(cuisine);
        let mut excluded = self.excluded.clone();
        if !excluded.remove(&key) && !key.is_empty() {
            excluded.insert(key);
        }
        Self { excluded }
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn excluded(&self) -> impl Iterator<Item = &CuisineKey> {
        self.excluded.iter()
    }

    /// Case-insensitive exact membership.
    pub fn is_excluded(&self, cuisine: &str) -> bool {
        self.excluded.contains(&normalize_cuisine(cuisine))
    }

    /// Whether an item tagged `cuisine` survives the filter.
    pub fn allows(&self, cuisine: &str) -> bool {
        if self.excluded.is_empty() {
            return true;
        }
        let key = normalize_cuisine(cuisine);
        !self.excluded.iter().any(|ex| ex.loosely_matches(&key))
    }

    /// Keep items whose cuisine tag is not excluded.
    pub fn filter_by_cuisine<T, I>(&self, items: I) -> Vec<T>
    where
        T: Cuisine,
        I: IntoIterator<Item = T>,
    {
        items
            .into_iter()
            .filter(|item| self.allows(item.cuisine_label()))
            .collect()
    }
}

impl<T: Cuisine + ?Sized> Cuisine for &T {
    fn cuisine_label(&self) -> &str {
        (**self).cuisine_label()
    }
}
