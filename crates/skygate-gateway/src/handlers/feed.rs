//! Feed analysis.
//!
//! Fetches the timeline (or a hashtag search), annotates each post with
//! word/length metrics and keyword sentiment, and caches the report. When
//! the upstream is failing, a stale report is served with a warning instead
//! of an error.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;

use skygate_common::Result;

use crate::handlers::{decode_params, escape_html};
use crate::state::AppState;

const TIMELINE_ENDPOINT: &str = "app.bsky.feed.getTimeline";
const SEARCH_ENDPOINT: &str = "app.bsky.feed.searchPosts";

/// TTL of a freshly loaded report.
const REPORT_TTL: Duration = Duration::from_secs(120);

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FeedAnalysisParams {
    pub hashtag: String,
    pub limit: u32,
}

impl Default for FeedAnalysisParams {
    fn default() -> Self {
        Self {
            hashtag: String::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A post with its analysis attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub created_at: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub author: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metrics: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub analysis: BTreeMap<String, String>,
}

/// The feed-analysis result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedReport {
    pub posts: Vec<PostSummary>,
    pub count: usize,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub warning: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub source: String,
}

// Upstream feed shapes. The timeline nests posts under `feed[].post`; the
// search endpoint returns them directly under `posts[]`.

#[derive(Debug, Default, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedItem {
    #[serde(default)]
    post: FeedPost,
}

#[derive(Debug, Default, Deserialize)]
struct FeedPost {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    record: PostRecord,
    #[serde(default)]
    author: Author,
}

#[derive(Debug, Default, Deserialize)]
struct PostRecord {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "createdAt")]
    created_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    #[serde(default)]
    handle: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    posts: Vec<FeedPost>,
}

/// Handles the `feed-analysis` method.
pub async fn analyze(state: &AppState, params: Value) -> Result<Value> {
    let params: FeedAnalysisParams = decode_params(params)?;
    let hashtag = escape_html(params.hashtag.trim());
    let limit = normalize_limit(params.limit);

    let key = cache_key(&hashtag, limit);
    let loader_state = state.clone();
    let loader_hashtag = hashtag.clone();
    let loaded = state
        .feed_cache
        .get_or_load(&key, REPORT_TTL, move || async move {
            fetch_and_analyze(&loader_state, &loader_hashtag, limit).await
        })
        .await?;

    let mut value = loaded.value;
    if loaded.stale {
        if let Some(report) = value.as_object_mut() {
            report.insert("warning".into(), json!("Data may be stale due to API errors"));
            report.insert("source".into(), json!("cache_stale"));
        }
    }
    Ok(value)
}

async fn fetch_and_analyze(state: &AppState, hashtag: &str, limit: usize) -> Result<Value> {
    state.tokens.get_token().await?;
    let client = state.tokens.client();

    let (endpoint, body) = if hashtag.is_empty() {
        let body = client
            .get(TIMELINE_ENDPOINT, &[("limit", limit.to_string())])
            .await?;
        (TIMELINE_ENDPOINT, body)
    } else {
        let body = client
            .get(
                SEARCH_ENDPOINT,
                &[("q", format!("#{hashtag}")), ("limit", limit.to_string())],
            )
            .await?;
        (SEARCH_ENDPOINT, body)
    };

    // Fallback bytes pass through without a freshness claim.
    let source = if client.was_fallback(endpoint, &body) {
        String::new()
    } else {
        "api_fresh".to_string()
    };

    let items = parse_feed(&body)?;
    let posts = analyze_posts(items, limit).await;
    let report = FeedReport {
        count: posts.len(),
        posts,
        warning: String::new(),
        source,
    };
    Ok(serde_json::to_value(report)?)
}

fn normalize_limit(limit: u32) -> usize {
    if limit == 0 || limit > MAX_LIMIT {
        DEFAULT_LIMIT as usize
    } else {
        limit as usize
    }
}

fn parse_feed(body: &[u8]) -> Result<Vec<FeedPost>> {
    let value: Value = serde_json::from_slice(body)?;
    if value.get("feed").is_some() {
        let timeline: TimelineResponse = serde_json::from_value(value)?;
        Ok(timeline.feed.into_iter().map(|item| item.post).collect())
    } else if value.get("posts").is_some() {
        let search: SearchResponse = serde_json::from_value(value)?;
        Ok(search.posts)
    } else {
        Ok(Vec::new())
    }
}

/// Annotates posts in parallel, one task per post, joining before return.
async fn analyze_posts(items: Vec<FeedPost>, limit: usize) -> Vec<PostSummary> {
    let mut set = JoinSet::new();
    for post in items.into_iter().take(limit) {
        set.spawn(async move { summarize(post) });
    }

    let mut posts = Vec::new();
    while let Some(result) = set.join_next().await {
        if let Ok(post) = result {
            posts.push(post);
        }
    }
    posts
}

fn summarize(post: FeedPost) -> PostSummary {
    let mut metrics = BTreeMap::new();
    metrics.insert("length".to_string(), post.record.text.len() as i64);
    metrics.insert(
        "words".to_string(),
        post.record.text.split_whitespace().count() as i64,
    );

    let mut analysis = BTreeMap::new();
    analysis.insert("sentiment".to_string(), sentiment(&post.record.text).to_string());

    PostSummary {
        id: post_id(&post.uri),
        text: post.record.text,
        created_at: post.record.created_at,
        author: post.author.handle,
        metrics,
        analysis,
    }
}

fn post_id(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or_default().to_string()
}

fn sentiment(text: &str) -> &'static str {
    const POSITIVE: [&str; 6] = ["good", "great", "happy", "excited", "love", "awesome"];
    const NEGATIVE: [&str; 6] = ["bad", "sad", "angry", "hate", "terrible", "awful"];

    let text = text.to_lowercase();
    let positive = POSITIVE.iter().filter(|w| text.contains(*w)).count();
    let negative = NEGATIVE.iter().filter(|w| text.contains(*w)).count();

    if positive > negative {
        "positive"
    } else if negative > positive {
        "negative"
    } else {
        "neutral"
    }
}

fn cache_key(hashtag: &str, limit: usize) -> String {
    hex::encode(Sha256::digest(format!("feed:{hashtag}:{limit}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_limit() {
        assert_eq!(normalize_limit(0), 10);
        assert_eq!(normalize_limit(101), 10);
        assert_eq!(normalize_limit(1), 1);
        assert_eq!(normalize_limit(100), 100);
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        assert_eq!(cache_key("rust", 10), cache_key("rust", 10));
        assert_ne!(cache_key("rust", 10), cache_key("rust", 11));
        assert_ne!(cache_key("rust", 10), cache_key("go", 10));
        assert_eq!(cache_key("rust", 10).len(), 64);
    }

    #[test]
    fn test_sentiment_keywords() {
        assert_eq!(sentiment("what a great awesome day"), "positive");
        assert_eq!(sentiment("terrible, just awful"), "negative");
        assert_eq!(sentiment("the sky is blue"), "neutral");
        assert_eq!(sentiment("good but also bad"), "neutral");
    }

    #[test]
    fn test_post_id_from_uri() {
        assert_eq!(post_id("at://did:plc:1/app.bsky.feed.post/3k44"), "3k44");
        assert_eq!(post_id("plain"), "plain");
        assert_eq!(post_id(""), "");
    }

    #[test]
    fn test_parse_timeline_shape() {
        let body = br#"{"feed":[{"post":{"uri":"at://u/p/1","record":{"text":"hi","createdAt":"2025-01-01T00:00:00Z"},"author":{"handle":"u"}}}]}"#;
        let posts = parse_feed(body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].record.text, "hi");
        assert_eq!(posts[0].author.handle, "u");
    }

    #[test]
    fn test_parse_search_shape() {
        let body = br##"{"posts":[{"uri":"at://u/p/2","record":{"text":"#rust rocks","createdAt":"2025-01-01T00:00:00Z"},"author":{"handle":"v"}}]}"##;
        let posts = parse_feed(body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author.handle, "v");
    }

    #[test]
    fn test_parse_unknown_shape_is_empty() {
        assert!(parse_feed(br#"{"cursor":"x"}"#).unwrap().is_empty());
        assert!(parse_feed(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_analyze_posts_respects_limit() {
        let items: Vec<FeedPost> = (0..5)
            .map(|i| FeedPost {
                uri: format!("at://u/p/{i}"),
                record: PostRecord {
                    text: format!("post {i} is great"),
                    created_at: String::new(),
                },
                author: Author { handle: "u".into() },
            })
            .collect();

        let posts = analyze_posts(items, 3).await;
        assert_eq!(posts.len(), 3);
        for post in &posts {
            assert_eq!(post.analysis["sentiment"], "positive");
            assert!(post.metrics["words"] > 0);
        }
    }

    #[test]
    fn test_report_serialization_omits_empty_fields() {
        let report = FeedReport {
            posts: vec![],
            count: 0,
            warning: String::new(),
            source: "api_fresh".into(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("warning").is_none());
        assert_eq!(value["source"], "api_fresh");
    }
}
