//! Preference facets and the term vocabulary that activates them.
//!
//! The vocabulary is data: a flat term -> (facet, canonical) table with
//! built-in defaults and an optional TOML override, so new synonyms never
//! require logic changes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::menu::MenuItemId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Discover,
    AddToCart,
    RemoveFromCart,
    ShowCart,
    Checkout,
}

impl Intent {
    /// Orchestration priority: checkout beats cart mutation beats show-cart
    /// beats discovery.
    pub fn priority(self) -> u8 {
        match self {
            Self::Checkout => 4,
            Self::AddToCart | Self::RemoveFromCart => 3,
            Self::ShowCart => 2,
            Self::Discover => 1,
        }
    }
}

/// A parsed add/remove target: menu item id plus requested quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub item_id: MenuItemId,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Cuisine,
    Diet,
    Feature,
    Allergen,
}

/// Facets extracted from one message. Built fresh per message, never
/// persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSet {
    pub cuisines: BTreeSet<String>,
    pub diets: BTreeSet<String>,
    pub features: BTreeSet<String>,
    pub allergens_to_exclude: BTreeSet<String>,
    pub price_cap_minor: Option<i64>,
}

impl PreferenceSet {
    pub fn insert(&mut self, facet: Facet, canonical: &str) {
        let target = match facet {
            Facet::Cuisine => &mut self.cuisines,
            Facet::Diet => &mut self.diets,
            Facet::Feature => &mut self.features,
            Facet::Allergen => &mut self.allergens_to_exclude,
        };
        target.insert(canonical.to_string());
    }

    /// Union of cuisine, diet, and feature terms. Allergens are exclusions,
    /// not match terms.
    pub fn facet_terms(&self) -> Vec<String> {
        self.cuisines.iter().chain(self.diets.iter()).chain(self.features.iter()).cloned().collect()
    }

    pub fn has_facet_terms(&self) -> bool {
        !self.cuisines.is_empty() || !self.diets.is_empty() || !self.features.is_empty()
    }

    /// Entirely empty: no facets of any kind and no price cap.
    pub fn is_empty(&self) -> bool {
        !self.has_facet_terms() && self.allergens_to_exclude.is_empty() && self.price_cap_minor.is_none()
    }
}

/// Built-in term table: (surface term, facet, canonical form).
const DEFAULT_TERMS: &[(&str, Facet, &str)] = &[
    ("thai", Facet::Cuisine, "thai"),
    ("indian", Facet::Cuisine, "indian"),
    ("mexican", Facet::Cuisine, "mexican"),
    ("italian", Facet::Cuisine, "italian"),
    ("japanese", Facet::Cuisine, "japanese"),
    ("chinese", Facet::Cuisine, "chinese"),
    ("korean", Facet::Cuisine, "korean"),
    ("mediterranean", Facet::Cuisine, "mediterranean"),
    ("greek", Facet::Cuisine, "greek"),
    ("vietnamese", Facet::Cuisine, "vietnamese"),
    ("ramen", Facet::Cuisine, "ramen"),
    ("sushi", Facet::Cuisine, "sushi"),
    ("bbq", Facet::Cuisine, "bbq"),
    ("vegan", Facet::Diet, "vegan"),
    ("vegetarian", Facet::Diet, "vegetarian"),
    ("veggie", Facet::Diet, "vegetarian"),
    ("halal", Facet::Diet, "halal"),
    ("gluten-free", Facet::Diet, "gluten-free"),
    ("gluten free", Facet::Diet, "gluten-free"),
    ("keto", Facet::Diet, "keto"),
    ("low-carb", Facet::Diet, "low-carb"),
    ("low carb", Facet::Diet, "low-carb"),
    ("high-protein", Facet::Diet, "high-protein"),
    ("high protein", Facet::Diet, "high-protein"),
    ("spicy", Facet::Feature, "spicy"),
    ("mild", Facet::Feature, "mild"),
    ("dessert", Facet::Feature, "dessert"),
    ("salad", Facet::Feature, "salad"),
    ("bowl", Facet::Feature, "bowl"),
    ("grilled", Facet::Feature, "grilled"),
    ("noodles", Facet::Feature, "noodles"),
    ("soup", Facet::Feature, "soup"),
    ("burger", Facet::Feature, "burger"),
    ("pizza", Facet::Feature, "pizza"),
    ("wrap", Facet::Feature, "wrap"),
    ("nuts", Facet::Allergen, "nuts"),
    ("peanut", Facet::Allergen, "peanut"),
    ("peanuts", Facet::Allergen, "peanut"),
    ("dairy", Facet::Allergen, "dairy"),
    ("egg", Facet::Allergen, "egg"),
    ("shellfish", Facet::Allergen, "shellfish"),
    ("gluten", Facet::Allergen, "gluten"),
];

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct VocabularyEntrySpec {
    term: String,
    facet: Facet,
    canonical: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct VocabularyFile {
    #[serde(default)]
    term: Vec<VocabularyEntrySpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub term: String,
    pub facet: Facet,
    pub canonical: String,
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary parse failure: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("vocabulary is empty")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<VocabularyEntry>,
}

impl Vocabulary {
    pub fn builtin() -> Self {
        let entries = DEFAULT_TERMS
            .iter()
            .map(|(term, facet, canonical)| VocabularyEntry {
                term: (*term).to_string(),
                facet: *facet,
                canonical: (*canonical).to_string(),
            })
            .collect();
        Self { entries }
    }

    /// Load a replacement vocabulary from TOML:
    ///
    /// ```toml
    /// [[term]]
    /// term = "pho"
    /// facet = "cuisine"
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, VocabularyError> {
        let file: VocabularyFile = toml::from_str(raw)?;
        if file.term.is_empty() {
            return Err(VocabularyError::Empty);
        }
        let entries = file
            .term
            .into_iter()
            .map(|spec| {
                let term = spec.term.to_lowercase();
                let canonical = spec.canonical.unwrap_or_else(|| term.clone()).to_lowercase();
                VocabularyEntry { term, facet: spec.facet, canonical }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }
}
