//! Playlist search by emotion label
//!
//! The label is forwarded verbatim as the catalog query term. Failures are
//! reported as `500` with a plain-text body.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::services::catalog_client::CatalogError;
use crate::types::PlaylistResult;
use crate::AppState;

/// Query parameters for playlist search
#[derive(Debug, Deserialize)]
pub struct PlaylistQuery {
    /// Emotion label used as the search term
    pub emotion: Option<String>,
}

/// GET /playlist-search?emotion=<label>
///
/// Returns up to five shaped playlists.
pub async fn search_playlists(
    State(state): State<AppState>,
    Query(query): Query<PlaylistQuery>,
) -> Result<Json<Vec<PlaylistResult>>, PlaylistSearchError> {
    let emotion = query
        .emotion
        .filter(|e| !e.trim().is_empty())
        .ok_or(PlaylistSearchError::MissingEmotion)?;

    let playlists = state.catalog.search(&emotion).await?;
    Ok(Json(playlists))
}

/// Build playlist search routes
///
/// `/spotify-playlist` is kept as an alias for older clients.
pub fn playlist_routes() -> Router<AppState> {
    Router::new()
        .route("/playlist-search", get(search_playlists))
        .route("/spotify-playlist", get(search_playlists))
}

/// Playlist search errors
#[derive(Debug)]
pub enum PlaylistSearchError {
    MissingEmotion,
    Catalog(CatalogError),
}

impl From<CatalogError> for PlaylistSearchError {
    fn from(err: CatalogError) -> Self {
        PlaylistSearchError::Catalog(err)
    }
}

impl IntoResponse for PlaylistSearchError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PlaylistSearchError::MissingEmotion => (
                StatusCode::BAD_REQUEST,
                "Missing emotion query parameter".to_string(),
            ),
            PlaylistSearchError::Catalog(CatalogError::Auth(e)) => {
                tracing::error!(error = %e, "Playlist search without access token");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to get Spotify access token.".to_string(),
                )
            }
            PlaylistSearchError::Catalog(e) => {
                tracing::error!(error = %e, "Error fetching playlists");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error fetching Spotify playlists: {}", e),
                )
            }
        };

        (status, message).into_response()
    }
}
