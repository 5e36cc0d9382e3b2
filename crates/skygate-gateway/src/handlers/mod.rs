//! Method handlers.
//!
//! Each handler decodes its params into a typed record, validates, and
//! adapts the call onto the upstream XRPC endpoints through the shared
//! client and caches.

pub mod community;
pub mod feed;
pub mod post;

use serde::de::DeserializeOwned;
use serde_json::Value;

use skygate_common::{GatewayError, Result};

/// Decodes a params object into a typed record, treating missing params as
/// the record's defaults. Decode failures surface as `invalid_params`.
pub(crate) fn decode_params<T>(params: Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|err| GatewayError::InvalidParams(err.to_string()))
}

/// Escapes HTML-special characters in untrusted text.
pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
