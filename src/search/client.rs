use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::{Duration, Instant};
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::search::api_types::ApiSearchResponse;
use crate::search::error::FetchError;
use crate::search::types::RemoteArticle;

/// Source of one page of articles.
///
/// The sync engine only ever talks to this trait so tests can substitute a
/// scripted source for the HTTP client.
#[async_trait]
pub trait ArticleFetcher: Send + Sync + 'static {
  async fn fetch(&self) -> Result<Vec<RemoteArticle>, FetchError>;
}

/// Article search API client wrapper
#[derive(Clone)]
pub struct SearchClient {
  http: reqwest::Client,
  url: Url,
}

impl SearchClient {
  /// Create a client for a fully built query URL.
  pub fn new(url: Url, timeout: Duration) -> Result<Self, FetchError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("articlesync/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { http, url })
  }

  /// Build the query URL from configuration and the API key in the environment.
  pub fn from_config(config: &ApiConfig) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let url = build_query_url(config, &api_key)?;

    Self::new(url, config.timeout()).map_err(|e| eyre!("Failed to create search client: {}", e))
  }

  /// Endpoint with the API key stripped, for logging.
  fn redacted_url(&self) -> String {
    let mut url = self.url.clone();
    url.set_query(None);
    url.to_string()
  }
}

#[async_trait]
impl ArticleFetcher for SearchClient {
  async fn fetch(&self) -> Result<Vec<RemoteArticle>, FetchError> {
    let start = Instant::now();
    tracing::debug!("fetching articles from {}", self.redacted_url());

    let response = self.http.get(self.url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
      tracing::warn!("article search failed with status {}", status);
      return Err(FetchError::Network {
        status: Some(status.as_u16()),
        message: status
          .canonical_reason()
          .unwrap_or("unexpected status")
          .to_string(),
      });
    }

    let bytes = response.bytes().await?;
    let articles = decode_articles(&bytes)?;

    tracing::debug!(
      "fetched {} articles in {:?}",
      articles.len(),
      start.elapsed()
    );
    Ok(articles)
  }
}

/// Decode a search response body into articles.
///
/// A body without `response.docs` is rejected rather than read as an empty
/// page, so a truncated payload never wipes the cache.
pub fn decode_articles(body: &[u8]) -> Result<Vec<RemoteArticle>, FetchError> {
  let parsed: ApiSearchResponse =
    serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

  let docs = parsed
    .response
    .and_then(|r| r.docs)
    .ok_or_else(|| FetchError::Decode("missing response.docs".to_string()))?;

  Ok(docs.into_iter().map(|doc| doc.into_remote()).collect())
}

/// Append the API key and optional search terms to the configured endpoint.
pub fn build_query_url(config: &ApiConfig, api_key: &str) -> Result<Url> {
  let mut url = Url::parse(&config.url)
    .map_err(|e| eyre!("Invalid search endpoint {}: {}", config.url, e))?;

  {
    let mut pairs = url.query_pairs_mut();
    if let Some(query) = config.query.as_deref().filter(|q| !q.trim().is_empty()) {
      pairs.append_pair("q", query.trim());
    }
    pairs.append_pair("api-key", api_key);
  }

  Ok(url)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer, timeout: Duration) -> SearchClient {
    let url = Url::parse(&format!("{}/search.json?api-key=test", server.uri())).unwrap();
    SearchClient::new(url, timeout).unwrap()
  }

  #[tokio::test]
  async fn test_fetch_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/search.json"))
      .and(query_param("api-key", "test"))
      .respond_with(ResponseTemplate::new(200).set_body_string(
        r#"{"response":{"docs":[
          {"headline":{"main":"One"},"abstract":"A","byline":{"original":"By X"}},
          {"headline":{"main":"Two"}}
        ]}}"#,
      ))
      .expect(1)
      .mount(&server)
      .await;

    let articles = client_for(&server, Duration::from_secs(5))
      .fetch()
      .await
      .unwrap();

    assert_eq!(
      articles,
      vec![
        RemoteArticle {
          headline: Some("One".to_string()),
          abstract_text: Some("A".to_string()),
          byline: Some("By X".to_string()),
          media_image_url: None,
        },
        RemoteArticle {
          headline: Some("Two".to_string()),
          ..Default::default()
        },
      ]
    );
  }

  #[tokio::test]
  async fn test_fetch_http_status_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let err = client_for(&server, Duration::from_secs(5))
      .fetch()
      .await
      .unwrap_err();

    assert!(matches!(err, FetchError::Network { status: Some(500), .. }));
  }

  #[tokio::test]
  async fn test_fetch_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string("{\"response\": [not json"))
      .mount(&server)
      .await;

    let err = client_for(&server, Duration::from_secs(5))
      .fetch()
      .await
      .unwrap_err();

    assert!(err.is_decode());
  }

  #[tokio::test]
  async fn test_fetch_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string(r#"{"response":{"docs":[]}}"#)
          .set_delay(Duration::from_millis(500)),
      )
      .mount(&server)
      .await;

    let err = client_for(&server, Duration::from_millis(50))
      .fetch()
      .await
      .unwrap_err();

    assert!(matches!(err, FetchError::Network { status: None, .. }));
  }

  #[tokio::test]
  async fn test_fetch_unreachable_is_network_error() {
    // Nothing listens on port 9 on loopback in the test environment.
    let url = Url::parse("http://127.0.0.1:9/search.json").unwrap();
    let client = SearchClient::new(url, Duration::from_secs(2)).unwrap();

    let err = client.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::Network { status: None, .. }));
  }

  #[test]
  fn test_decode_empty_docs() {
    let articles = decode_articles(br#"{"response":{"docs":[]}}"#).unwrap();
    assert!(articles.is_empty());
  }

  #[test]
  fn test_decode_missing_docs_is_error() {
    assert!(decode_articles(br#"{"status":"OK"}"#).unwrap_err().is_decode());
    assert!(decode_articles(br#"{"response":{"docs":null}}"#)
      .unwrap_err()
      .is_decode());
  }

  #[test]
  fn test_decode_tolerates_odd_multimedia() {
    let null_entry =
      decode_articles(br#"{"response":{"docs":[{"headline":{"main":"ok"},"multimedia":[null]}]}}"#)
        .unwrap();
    assert_eq!(null_entry.len(), 1);
    assert_eq!(null_entry[0].headline.as_deref(), Some("ok"));
    assert_eq!(null_entry[0].media_image_url, None);

    let string_field =
      decode_articles(br#"{"response":{"docs":[{"headline":{"main":"ok"},"multimedia":""}]}}"#)
        .unwrap();
    assert_eq!(string_field.len(), 1);
    assert_eq!(string_field[0].media_image_url, None);
  }

  #[test]
  fn test_build_query_url() {
    let config = ApiConfig {
      url: "https://api.example.com/svc/search.json".to_string(),
      query: Some(" climate ".to_string()),
      timeout_secs: 10,
    };
    let url = build_query_url(&config, "k3y").unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.example.com/svc/search.json?q=climate&api-key=k3y"
    );
  }

  #[test]
  fn test_build_query_url_without_query() {
    let config = ApiConfig {
      query: None,
      ..ApiConfig::default()
    };
    let url = build_query_url(&config, "k").unwrap();
    assert_eq!(url.query(), Some("api-key=k"));
  }
}
