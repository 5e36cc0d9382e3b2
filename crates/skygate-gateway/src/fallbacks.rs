//! Static fallback payloads.
//!
//! At startup, known fallback files are read from a directory of JSON
//! payloads and registered on the shared client under their endpoint keys.
//! The registered bytes are what callers receive when the circuit is open or
//! retries against that endpoint are exhausted.

use std::path::Path;

use skygate_client::XrpcClient;
use skygate_common::{GatewayError, Result};

const TIMELINE_ENDPOINT: &str = "app.bsky.feed.getTimeline";
const TIMELINE_FILE: &str = "timeline.json";

/// Loads fallback payloads from `dir` and registers them on `client`.
pub async fn initialize(client: &XrpcClient, dir: &Path) -> Result<()> {
    let payload = load_fallback_file(dir, TIMELINE_FILE).await?;
    client.register_fallback(TIMELINE_ENDPOINT, payload);
    tracing::info!(dir = %dir.display(), "fallback responses initialized");
    Ok(())
}

/// Reads a fallback file and validates that it parses as JSON; the raw bytes
/// are registered verbatim.
async fn load_fallback_file(dir: &Path, filename: &str) -> Result<Vec<u8>> {
    let path = dir.join(filename);
    let data = tokio::fs::read(&path).await?;

    serde_json::from_slice::<serde_json::Value>(&data).map_err(|err| {
        GatewayError::InvalidRequest(format!("invalid JSON in fallback file {filename}: {err}"))
    })?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_registers_timeline_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TIMELINE_FILE), br#"{"feed":[]}"#).unwrap();

        let client = XrpcClient::new("http://127.0.0.1:1").unwrap();
        initialize(&client, dir.path()).await.unwrap();

        // Force the breaker open; the registered payload must come back.
        for _ in 0..5 {
            client.breaker().record_failure();
        }
        let body = client.get(TIMELINE_ENDPOINT, &[]).await.unwrap();
        assert_eq!(body, br#"{"feed":[]}"#);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let client = XrpcClient::new("http://127.0.0.1:1").unwrap();
        assert!(initialize(&client, dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TIMELINE_FILE), b"{not json").unwrap();

        let client = XrpcClient::new("http://127.0.0.1:1").unwrap();
        let err = initialize(&client, dir.path()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }
}
