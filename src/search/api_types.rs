//! Serde-deserializable types matching the article search API response.
//!
//! These types are separate from domain types to allow lenient deserialization
//! while keeping domain types focused on application needs. Every field is
//! optional and unknown fields are ignored.

use serde::de::IgnoredAny;
use serde::Deserialize;

use super::types::RemoteArticle;

/// Base used to resolve relative multimedia paths.
pub const MEDIA_BASE_URL: &str = "https://www.nytimes.com/";

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub response: Option<ApiResponseBody>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiResponseBody {
  #[serde(default)]
  pub docs: Option<Vec<ApiDoc>>,
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiHeadline {
  #[serde(default)]
  pub main: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiByline {
  #[serde(default)]
  pub original: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiMediaItem {
  #[serde(default)]
  pub url: Option<String>,
}

/// The API has shipped two shapes for multimedia: a list of renditions and,
/// more recently, an object keyed by rendition name. Anything else is kept
/// as `Other` so one odd doc cannot fail the page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiMultimedia {
  List(Vec<Option<ApiMediaItem>>),
  Renditions {
    #[serde(default)]
    default: Option<ApiMediaItem>,
    #[serde(default)]
    thumbnail: Option<ApiMediaItem>,
  },
  Other(IgnoredAny),
}

impl ApiMultimedia {
  fn first_url(&self) -> Option<&str> {
    match self {
      ApiMultimedia::List(items) => items.iter().flatten().find_map(|m| m.url.as_deref()),
      ApiMultimedia::Renditions { default, thumbnail } => default
        .iter()
        .chain(thumbnail.iter())
        .find_map(|m| m.url.as_deref()),
      ApiMultimedia::Other(_) => None,
    }
  }
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiDoc {
  #[serde(default)]
  pub headline: Option<ApiHeadline>,
  #[serde(rename = "abstract", default)]
  pub abstract_text: Option<String>,
  #[serde(default)]
  pub byline: Option<ApiByline>,
  #[serde(default)]
  pub multimedia: Option<ApiMultimedia>,
}

impl ApiDoc {
  /// Lead image URL, resolved to an absolute URL when the API gives a path.
  pub fn media_image_url(&self) -> Option<String> {
    let raw = self.multimedia.as_ref()?.first_url()?.trim();
    if raw.is_empty() {
      return None;
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
      Some(raw.to_string())
    } else {
      Some(format!("{}{}", MEDIA_BASE_URL, raw.trim_start_matches('/')))
    }
  }

  pub fn into_remote(self) -> RemoteArticle {
    let media_image_url = self.media_image_url();
    RemoteArticle {
      headline: self.headline.and_then(|h| h.main),
      abstract_text: self.abstract_text,
      byline: self.byline.and_then(|b| b.original),
      media_image_url,
    }
  }
}
