//! cardscan - real-time trading card recognition
//!
//! Samples a fixed detection zone of a camera feed, decides when a card is
//! held still, reads its name with a text-recognition engine and resolves it
//! against the Scryfall catalog with caching and rate limiting.

pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod scanner;
pub mod storage;
pub mod text;
pub mod vision;

pub use error::{CacheError, CatalogError, RecognitionError};
