//! Community management.
//!
//! Summarizes a user's recent activity: fetches their author feed and keeps
//! the texts of posts newer than a week, up to the requested limit. Results
//! are cached briefly per (handle, limit) pair.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use skygate_common::{GatewayError, Result};

use crate::handlers::decode_params;
use crate::state::AppState;

const AUTHOR_FEED_ENDPOINT: &str = "app.bsky.feed.getAuthorFeed";

const CACHE_TTL: Duration = Duration::from_secs(180);
const RECENT_WINDOW_DAYS: i64 = 7;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommunityManageParams {
    #[serde(rename = "userHandle")]
    pub user_handle: String,
    pub limit: u32,
}

impl Default for CommunityManageParams {
    fn default() -> Self {
        Self {
            user_handle: String::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthorFeed {
    #[serde(default)]
    feed: Vec<AuthorFeedItem>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorFeedItem {
    #[serde(default)]
    post: AuthorPost,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorPost {
    #[serde(default)]
    record: AuthorRecord,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorRecord {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "createdAt")]
    created_at: String,
}

/// Handles the `community-manage` method.
pub async fn manage(state: &AppState, params: Value) -> Result<Value> {
    let params: CommunityManageParams = decode_params(params)?;

    let user_handle = params.user_handle.trim().to_string();
    if user_handle.is_empty() {
        return Err(GatewayError::InvalidParams(
            "missing or invalid user handle".into(),
        ));
    }
    if !user_handle.starts_with("did:") && !user_handle.contains('.') {
        return Err(GatewayError::InvalidParams(
            "invalid user handle format".into(),
        ));
    }

    let limit = if params.limit == 0 || params.limit > MAX_LIMIT {
        DEFAULT_LIMIT as usize
    } else {
        params.limit as usize
    };

    let key = cache_key(&user_handle, limit);
    if let Some(cached) = state.community_cache.get(&key).await {
        return Ok(cached);
    }

    state.tokens.get_token().await?;
    let body = state
        .tokens
        .client()
        .get(
            AUTHOR_FEED_ENDPOINT,
            &[("actor", user_handle.clone()), ("limit", limit.to_string())],
        )
        .await?;

    let feed: AuthorFeed = serde_json::from_slice(&body)?;
    let recent = recent_posts(feed, limit, Utc::now());
    let count = recent.len();

    let result = json!({
        "user": user_handle,
        "recentPosts": recent,
        "count": count,
    });
    state.community_cache.set(&key, result.clone(), CACHE_TTL).await;
    Ok(result)
}

/// Keeps texts of posts newer than the recency window, in feed order, up to
/// `limit`. Posts with unparseable timestamps are skipped.
fn recent_posts(feed: AuthorFeed, limit: usize, now: DateTime<Utc>) -> Vec<String> {
    let cutoff = now - chrono::Duration::days(RECENT_WINDOW_DAYS);
    let mut recent = Vec::with_capacity(limit);

    for item in feed.feed {
        if let Ok(created) = DateTime::parse_from_rfc3339(&item.post.record.created_at) {
            if created.with_timezone(&Utc) > cutoff {
                recent.push(item.post.record.text);
            }
        }
        if recent.len() >= limit {
            break;
        }
    }
    recent
}

fn cache_key(user_handle: &str, limit: usize) -> String {
    hex::encode(Sha256::digest(format!("user:{user_handle}:{limit}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_with(times_and_texts: &[(&str, &str)]) -> AuthorFeed {
        AuthorFeed {
            feed: times_and_texts
                .iter()
                .map(|(created_at, text)| AuthorFeedItem {
                    post: AuthorPost {
                        record: AuthorRecord {
                            text: text.to_string(),
                            created_at: created_at.to_string(),
                        },
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn test_recent_posts_filters_by_age() {
        let now = DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let feed = feed_with(&[
            ("2025-06-14T12:00:00Z", "yesterday"),
            ("2025-06-01T12:00:00Z", "two weeks ago"),
            ("2025-06-13T12:00:00Z", "recent too"),
        ]);

        let recent = recent_posts(feed, 5, now);
        assert_eq!(recent, vec!["yesterday", "recent too"]);
    }

    #[test]
    fn test_recent_posts_respects_limit() {
        let now = DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let feed = feed_with(&[
            ("2025-06-14T10:00:00Z", "a"),
            ("2025-06-14T11:00:00Z", "b"),
            ("2025-06-14T12:00:00Z", "c"),
        ]);

        assert_eq!(recent_posts(feed, 2, now).len(), 2);
    }

    #[test]
    fn test_recent_posts_skips_bad_timestamps() {
        let now = Utc::now();
        let feed = feed_with(&[("not a timestamp", "dropped"), ("", "also dropped")]);
        assert!(recent_posts(feed, 5, now).is_empty());
    }

    #[test]
    fn test_cache_key_distinct_per_handle_and_limit() {
        assert_eq!(cache_key("user.test", 5), cache_key("user.test", 5));
        assert_ne!(cache_key("user.test", 5), cache_key("user.test", 6));
        assert_ne!(cache_key("user.test", 5), cache_key("other.test", 5));
    }

    #[test]
    fn test_handle_validation_shapes() {
        // Mirrors the checks in manage(): a DID or a dotted handle passes.
        for valid in ["did:plc:abc123", "user.bsky.social", "a.b"] {
            assert!(valid.starts_with("did:") || valid.contains('.'));
        }
        for invalid in ["plainname", "user"] {
            assert!(!invalid.starts_with("did:") && !invalid.contains('.'));
        }
    }
}
