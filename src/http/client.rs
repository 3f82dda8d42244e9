use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;

/// Remote JSON source for one URL
#[derive(Clone, Debug)]
pub struct HttpSource {
  client: reqwest::Client,
  url: Url,
}

impl HttpSource {
  pub fn new(url: &str, config: &HttpConfig) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Unsupported URL scheme '{}' in {}", url.scheme(), url));
    }

    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(config.user_agent.as_str())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, url })
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// GET the URL and decode the body as JSON
  pub async fn fetch_json<T: DeserializeOwned>(&self) -> Result<T> {
    debug!(url = %self.url, "fetching");

    let response = self
      .client
      .get(self.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", self.url, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("{} returned HTTP {}", self.url, status));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", self.url, e))?;

    serde_json::from_slice(&body)
      .map_err(|e| eyre!("Failed to parse response from {}: {}", self.url, e))
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Serve `status` and `body` to every connection on a local port.
  pub(crate) async fn serve(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        let mut request = vec![0u8; 4096];
        let _ = socket.read(&mut request).await;
        let response = format!(
          "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
          status,
          body.len(),
          body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
      }
    });

    format!("http://{}/data", addr)
  }

  #[test]
  fn test_rejects_invalid_url() {
    let err = HttpSource::new("not a url", &HttpConfig::default()).unwrap_err();
    assert!(err.to_string().contains("Invalid URL"));
  }

  #[test]
  fn test_rejects_non_http_scheme() {
    let err = HttpSource::new("ftp://example.com/file", &HttpConfig::default()).unwrap_err();
    assert!(err.to_string().contains("Unsupported URL scheme"));
  }

  #[tokio::test]
  async fn test_fetch_json() {
    let url = serve("200 OK", r#"{"answer": 42}"#).await;
    let source = HttpSource::new(&url, &HttpConfig::default()).unwrap();

    let value: serde_json::Value = source.fetch_json().await.unwrap();
    assert_eq!(value["answer"], 42);
  }

  #[tokio::test]
  async fn test_http_error_status() {
    let url = serve("503 Service Unavailable", "{}").await;
    let source = HttpSource::new(&url, &HttpConfig::default()).unwrap();

    let err = source.fetch_json::<serde_json::Value>().await.unwrap_err();
    assert!(err.to_string().contains("503"));
  }

  #[tokio::test]
  async fn test_invalid_json() {
    let url = serve("200 OK", "not json").await;
    let source = HttpSource::new(&url, &HttpConfig::default()).unwrap();

    let err = source.fetch_json::<serde_json::Value>().await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse response"));
  }
}
