//! Post suggestion and submission.
//!
//! `post-assist` composes a suggestion from mood and topic template banks;
//! with `submit: true` the suggestion is published in the same call.
//! `post-submit` publishes caller-provided text directly via
//! `com.atproto.repo.createRecord`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skygate_common::{GatewayError, Result};

use crate::handlers::{decode_params, escape_html};
use crate::state::AppState;

const CREATE_RECORD_ENDPOINT: &str = "com.atproto.repo.createRecord";
const POST_COLLECTION: &str = "app.bsky.feed.post";

const MAX_TOPIC_CHARS: usize = 200;

const HAPPY_TEMPLATES: [&str; 5] = [
    "Today is a great day!",
    "Feeling so positive right now!",
    "Nothing but blue skies today!",
    "So happy I could burst!",
    "What a wonderful day it's turning out to be!",
];

const SAD_TEMPLATES: [&str; 5] = [
    "Feeling a bit down today.",
    "Having one of those days...",
    "Sometimes things don't go as planned.",
    "Looking for a silver lining today.",
    "When it rains, it pours.",
];

const EXCITED_TEMPLATES: [&str; 5] = [
    "I can't contain my excitement!",
    "You won't believe what just happened!",
    "This is absolutely incredible!",
    "I'm literally bouncing with energy!",
    "Big news coming your way!",
];

const THOUGHTFUL_TEMPLATES: [&str; 5] = [
    "I've been pondering something interesting.",
    "Here's a thought worth sharing:",
    "Something to consider today:",
    "Been reflecting on this lately:",
    "Food for thought:",
];

const TOPIC_TEMPLATES: [&str; 8] = [
    " I want to talk about %s.",
    " Let's discuss %s today.",
    " Has anyone else been thinking about %s?",
    " What are your thoughts on %s?",
    " %s has been on my mind lately.",
    " Anyone interested in %s?",
    " %s is something we should all explore more.",
    " I've been fascinated by %s recently.",
];

const FALLBACK_TEMPLATES: [&str; 8] = [
    "Let's post something interesting!",
    "What's on everyone's mind today?",
    "How's everyone doing?",
    "Anything exciting happening?",
    "Just wanted to check in!",
    "Happy to connect with you all!",
    "Thoughts?",
    "Open to interesting conversations today!",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostAssistParams {
    pub mood: String,
    pub topic: String,
    pub submit: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostSubmitParams {
    pub text: String,
}

/// Receipt for a successfully created post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReceipt {
    pub uri: String,
    pub cid: String,
}

/// Handles the `post-assist` method.
pub async fn assist(state: &AppState, params: Value) -> Result<Value> {
    assist_with_selector(state, params, random_index).await
}

/// Template selection goes through `select` so tests can pin the choice.
pub(crate) async fn assist_with_selector(
    state: &AppState,
    params: Value,
    select: fn(&[&str]) -> usize,
) -> Result<Value> {
    let params: PostAssistParams = decode_params(params)?;

    if params.topic.chars().count() > MAX_TOPIC_CHARS {
        return Err(GatewayError::InvalidParams("topic too long".into()));
    }
    let topic = escape_html(params.topic.trim());

    let mut suggestion = match params.mood.as_str() {
        "happy" => pick(&HAPPY_TEMPLATES, select).to_string(),
        "sad" => pick(&SAD_TEMPLATES, select).to_string(),
        "excited" => pick(&EXCITED_TEMPLATES, select).to_string(),
        "thoughtful" => pick(&THOUGHTFUL_TEMPLATES, select).to_string(),
        _ => String::new(),
    };

    if !topic.is_empty() {
        let filled = pick(&TOPIC_TEMPLATES, select).replacen("%s", &topic, 1);
        if suggestion.is_empty() {
            suggestion = filled.trim_start().to_string();
        } else {
            suggestion.push_str(&filled);
        }
    }

    if suggestion.is_empty() {
        suggestion = pick(&FALLBACK_TEMPLATES, select).to_string();
    }

    if params.submit {
        // Submission failures are reported in-band so the caller still gets
        // the suggestion.
        return match submit_text(state, &suggestion).await {
            Ok(receipt) => Ok(json!({
                "suggestion": suggestion,
                "submitted": true,
                "post_uri": receipt.uri,
                "post_cid": receipt.cid,
            })),
            Err(err) => Ok(json!({
                "suggestion": suggestion,
                "submitted": false,
                "error": err.to_string(),
            })),
        };
    }

    Ok(json!({ "suggestion": suggestion }))
}

/// Handles the `post-submit` method.
pub async fn submit(state: &AppState, params: Value) -> Result<Value> {
    let params: PostSubmitParams = decode_params(params)?;
    let text = params.text.trim();
    if text.is_empty() {
        return Err(GatewayError::InvalidParams("text is required".into()));
    }

    let receipt = submit_text(state, text).await?;
    Ok(json!({
        "submitted": true,
        "post_uri": receipt.uri,
        "post_cid": receipt.cid,
    }))
}

/// Creates a post record under the authenticated principal's repository.
pub(crate) async fn submit_text(state: &AppState, text: &str) -> Result<PostReceipt> {
    // A valid token also guarantees the principal is resolved.
    state.tokens.get_token().await?;
    let did = state.tokens.principal().await;
    if did.is_empty() {
        return Err(GatewayError::Internal(
            "unable to resolve the authenticated principal".into(),
        ));
    }

    let request = json!({
        "repo": did,
        "collection": POST_COLLECTION,
        "record": {
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": Utc::now().to_rfc3339(),
        },
    });

    let body = state
        .tokens
        .client()
        .post(CREATE_RECORD_ENDPOINT, &request)
        .await?;
    Ok(serde_json::from_slice(&body)?)
}

fn random_index(templates: &[&str]) -> usize {
    use rand::Rng;
    rand::thread_rng().gen_range(0..templates.len())
}

fn pick<'a>(templates: &'a [&'a str], select: fn(&[&str]) -> usize) -> &'a str {
    templates[select(templates).min(templates.len() - 1)]
}
