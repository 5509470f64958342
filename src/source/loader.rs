//! Fetch a subscription from a URL or read it from disk.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};

use super::SourceError;

/// Load raw subscription bytes. Remote bodies that are valid base64 are
/// decoded; anything else is returned untouched.
pub async fn load(source: &str, timeout: Duration) -> Result<Vec<u8>, SourceError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let body = fetch(source, timeout).await?;
        return Ok(decode_subscription(body));
    }

    info!(path = %source, "reading route source from file");
    tokio::fs::read(source).await.map_err(|e| SourceError::Read {
        path: source.to_string(),
        source: e,
    })
}

async fn fetch(url: &str, timeout: Duration) -> Result<Vec<u8>, SourceError> {
    info!(%url, "fetching route source");
    let fetch_err = |e| SourceError::Fetch {
        url: url.to_string(),
        source: e,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(fetch_err)?;
    let resp = client.get(url).send().await.map_err(fetch_err)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::FetchStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = resp.bytes().await.map_err(fetch_err)?;
    Ok(body.to_vec())
}

fn decode_subscription(body: Vec<u8>) -> Vec<u8> {
    let trimmed: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    match STANDARD.decode(&trimmed) {
        Ok(decoded) => {
            debug!(bytes = decoded.len(), "decoded base64 subscription");
            decoded
        }
        Err(_) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const YAML: &str = "proxies:\n  - {name: a, type: ss, server: h, port: 1}\n";

    #[test]
    fn test_plain_yaml_is_not_decoded() {
        assert_eq!(decode_subscription(YAML.as_bytes().to_vec()), YAML.as_bytes());
    }

    #[test]
    fn test_base64_body_is_decoded() {
        let encoded = STANDARD.encode(YAML);
        assert_eq!(decode_subscription(encoded.into_bytes()), YAML.as_bytes());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sub.yaml");
        std::fs::write(&file, YAML).unwrap();

        let data = load(file.to_str().unwrap(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, YAML.as_bytes());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load("/nonexistent/sub.yaml", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }

    #[tokio::test]
    async fn test_load_from_url_decodes_base64() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STANDARD.encode(YAML)))
            .mount(&server)
            .await;

        let url = format!("{}/sub", server.uri());
        let data = load(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(data, YAML.as_bytes());
    }

    #[tokio::test]
    async fn test_load_from_url_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/sub", server.uri());
        let err = load(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, SourceError::FetchStatus { status: 404, .. }));
    }
}
