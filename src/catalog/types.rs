//! Catalog data types
//!
//! Field names follow the Scryfall card object. Only the subset the scanner
//! shows is kept; unknown fields are ignored on decode.

use serde::{Deserialize, Serialize};

/// Card prices as reported by the catalog (decimal strings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub usd: Option<String>,
    pub usd_foil: Option<String>,
    pub eur: Option<String>,
}

/// Card image URLs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    pub png: Option<String>,
    pub art_crop: Option<String>,
}

/// A catalog card record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    /// Set code
    #[serde(default)]
    pub set: String,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub collector_number: String,
    #[serde(default)]
    pub rarity: String,
    pub type_line: Option<String>,
    pub mana_cost: Option<String>,
    pub oracle_text: Option<String>,
    #[serde(default)]
    pub prices: Prices,
    pub image_uris: Option<ImageUris>,
    pub scryfall_uri: Option<String>,
}

/// How a lookup was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Id,
}

/// Outcome of one lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// Served from one of the cache tiers
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

pub const ERR_NAME_TOO_SHORT: &str = "name too short";
pub const ERR_INVALID_NAME: &str = "invalid card name";
pub const ERR_NOT_FOUND: &str = "not found";

impl LookupResult {
    pub fn found(card: Card, match_type: MatchType, cached: bool) -> Self {
        Self {
            success: true,
            card: Some(card),
            match_type: Some(match_type),
            cached,
            error: None,
            suggestions: Vec::new(),
        }
    }

    /// Not found, optionally with close names for manual selection
    pub fn not_found(suggestions: Vec<String>) -> Self {
        Self::failed(ERR_NOT_FOUND).with_suggestions(suggestions)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            card: None,
            match_type: None,
            cached: false,
            error: Some(error.into()),
            suggestions: Vec::new(),
        }
    }

    fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Error object returned by the catalog for non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub details: Option<String>,
}

/// Autocomplete response (a catalog object)
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NameCatalog {
    #[serde(default)]
    pub data: Vec<String>,
}
