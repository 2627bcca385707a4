//! Catalog provider search client
//!
//! One authenticated playlist search per call, scoped by a free-text term
//! used verbatim. No retries here; the caller decides what a failure means.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::credential_broker::{AuthError, CredentialBroker};
use crate::types::PlaylistResult;

/// Maximum number of playlists requested and returned
pub const SEARCH_LIMIT: usize = 5;

/// Name used when the provider record has none
pub const UNNAMED_PLAYLIST: &str = "Unnamed Playlist";

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to get access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Catalog API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Raw search response (`GET /search?type=playlist`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    pub playlists: PlaylistPage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistPage {
    /// The provider emits `null` entries for records it cannot return
    #[serde(default)]
    pub items: Vec<Option<RawPlaylist>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPlaylist {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
    #[serde(default)]
    pub images: Option<Vec<Option<RawImage>>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// Catalog API client
pub struct CatalogClient {
    http_client: reqwest::Client,
    search_url: String,
    broker: Arc<CredentialBroker>,
}

impl CatalogClient {
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: &str,
        broker: Arc<CredentialBroker>,
    ) -> Self {
        Self {
            http_client,
            search_url: format!("{}/search", api_base_url.trim_end_matches('/')),
            broker,
        }
    }

    pub fn broker(&self) -> &Arc<CredentialBroker> {
        &self.broker
    }

    /// Search playlists for `term`, shaped for the caller
    ///
    /// Obtains a token from the broker before every call.
    pub async fn search(&self, term: &str) -> Result<Vec<PlaylistResult>, CatalogError> {
        let raw = self.search_raw(term).await?;
        let results = shape_playlists(raw.playlists.items);

        tracing::info!(
            query = term,
            results = results.len(),
            "Playlist search successful"
        );

        Ok(results)
    }

    /// Search playlists for `term` and return the provider's records unshaped
    pub async fn search_raw(&self, term: &str) -> Result<SearchResponse, CatalogError> {
        let token = self.broker.get_token().await?;

        let limit = SEARCH_LIMIT.to_string();
        let params = [("q", term), ("type", "playlist"), ("limit", limit.as_str())];

        tracing::debug!(query = term, "Querying catalog search API");

        let response = self
            .http_client
            .get(&self.search_url)
            .bearer_auth(token.as_str())
            .query(&params)
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                // Provider revoked the token early; next caller fetches a new one
                self.broker.invalidate();
            }
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status_code = status.as_u16(),
                body = %body,
                "Catalog search failed"
            );
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }
}

/// Turn raw provider records into caller-facing results
///
/// Drops null records and records without an external link, defaults blank
/// names, takes the first image URL (or empty), caps at [`SEARCH_LIMIT`].
pub fn shape_playlists(items: Vec<Option<RawPlaylist>>) -> Vec<PlaylistResult> {
    items
        .into_iter()
        .flatten()
        .filter_map(shape_playlist)
        .take(SEARCH_LIMIT)
        .collect()
}

fn shape_playlist(raw: RawPlaylist) -> Option<PlaylistResult> {
    let Some(url) = raw
        .external_urls
        .and_then(|urls| urls.spotify)
        .filter(|url| !url.trim().is_empty())
    else {
        tracing::debug!(name = ?raw.name, "Dropping playlist without external link");
        return None;
    };

    let name = raw
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNNAMED_PLAYLIST.to_string());

    let image = raw
        .images
        .and_then(|images| images.into_iter().next().flatten())
        .and_then(|image| image.url)
        .unwrap_or_default();

    Some(PlaylistResult { name, url, image })
}
