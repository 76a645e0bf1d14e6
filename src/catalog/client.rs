//! Catalog service client
//!
//! `CatalogService` is the seam between the orchestrator and the remote
//! catalog. A 404 is a plain `None`; a 429 is `CatalogError::RateLimited` so
//! the request queue can back off and retry.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::types::{ApiError, Card, NameCatalog};
use super::LookupConfig;
use crate::error::CatalogError;

/// Remote card catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Card with exactly this name
    async fn named_exact(&self, name: &str) -> Result<Option<Card>, CatalogError>;

    /// Card whose name best matches, tolerating typos
    async fn named_fuzzy(&self, name: &str) -> Result<Option<Card>, CatalogError>;

    /// Card names starting with or resembling `query`
    async fn autocomplete(&self, query: &str) -> Result<Vec<String>, CatalogError>;

    /// Card by catalog id
    async fn card_by_id(&self, id: &str) -> Result<Option<Card>, CatalogError>;
}

/// Scryfall REST client
pub struct ScryfallClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScryfallClient {
    pub fn new(config: &LookupConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Ok(response)
    }

    async fn get_card(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Card>, CatalogError> {
        let response = self.get(path, query).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(CatalogError::RateLimited),
            status if status.is_success() => Ok(Some(response.json::<Card>().await?)),
            _ => Err(upstream_error(response).await),
        }
    }
}

#[async_trait]
impl CatalogService for ScryfallClient {
    async fn named_exact(&self, name: &str) -> Result<Option<Card>, CatalogError> {
        self.get_card("/cards/named", &[("exact", name)]).await
    }

    async fn named_fuzzy(&self, name: &str) -> Result<Option<Card>, CatalogError> {
        self.get_card("/cards/named", &[("fuzzy", name)]).await
    }

    async fn autocomplete(&self, query: &str) -> Result<Vec<String>, CatalogError> {
        let response = self.get("/cards/autocomplete", &[("q", query)]).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            StatusCode::TOO_MANY_REQUESTS => Err(CatalogError::RateLimited),
            status if status.is_success() => Ok(response.json::<NameCatalog>().await?.data),
            _ => Err(upstream_error(response).await),
        }
    }

    async fn card_by_id(&self, id: &str) -> Result<Option<Card>, CatalogError> {
        self.get_card(&card_path(id), &[]).await
    }
}

/// Build an upstream error, preferring the catalog's own `details` message
async fn upstream_error(response: Response) -> CatalogError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    CatalogError::Upstream {
        status: status.as_u16(),
        details: error_details(status, &body),
    }
}

fn error_details(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .ok()
        .and_then(|e| e.details)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

/// Catalog path for a card id; the id is a single path segment
fn card_path(id: &str) -> String {
    format!("/cards/{}", urlencoding::encode(id))
}
