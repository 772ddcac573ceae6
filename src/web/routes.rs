//! HTTP API routes

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use cached::proc_macro::cached;
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;
use crate::archive::{Post, PostArchive, SourceMessage, StorageStats};

/// Header carrying the ingestion secret
pub const INGEST_TOKEN_HEADER: &str = "x-ingest-token";

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorStatsResponse {
    pub total_visits: u64,
    pub unique_visitors: usize,
    pub today_visits: u64,
}

/// API: Public visitor counters
pub async fn api_visitor_stats(State(state): State<Arc<AppState>>) -> Json<VisitorStatsResponse> {
    let summary = state.visitors.get_stats().await;
    Json(VisitorStatsResponse {
        total_visits: summary.total_visits,
        unique_visitors: summary.unique_visitors,
        today_visits: summary.today_visits,
    })
}

/// API: Archived posts, newest first
pub async fn api_posts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(state.archive.try_load_posts().await?))
}

/// Cached storage stats - 60 second TTL, one entry per archive file
#[cached(time = 60, key = "String", convert = r#"{ archive.path().display().to_string() }"#)]
async fn get_cached_storage_stats(archive: Arc<PostArchive>) -> StorageStats {
    archive.storage_stats().await
}

/// API: Archive file statistics (cached for 60 seconds)
pub async fn api_posts_stats(State(state): State<Arc<AppState>>) -> Json<StorageStats> {
    Json(get_cached_storage_stats(state.archive.clone()).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub total_posts: usize,
}

/// Compare secrets without stopping at the first differing byte
fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// API: Archive one source message. Disabled unless an ingest token is configured.
pub async fn api_ingest_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(message): Json<SourceMessage>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let expected = state.ingest_token.as_deref().ok_or(ApiError::NotFound)?;
    let provided = headers
        .get(INGEST_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !tokens_match(provided, expected) {
        return Err(ApiError::Unauthorized);
    }

    if message.is_empty() {
        return Err(ApiError::BadRequest("message has neither text nor media".to_string()));
    }

    let posts = state.archive.add_post(Post::from_message(&message)).await?;
    tracing::info!("Ingested message {:?} ({} posts archived)", message.message_id, posts.len());

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            total_posts: posts.len(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_must_match_exactly() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secreT", "secret"));
        assert!(!tokens_match("secret2", "secret"));
        assert!(!tokens_match("", "secret"));
    }
}
