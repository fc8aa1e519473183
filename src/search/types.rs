/// Article as decoded from one search response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteArticle {
  pub headline: Option<String>,
  pub abstract_text: Option<String>,
  pub byline: Option<String>,
  pub media_image_url: Option<String>,
}

/// Article in the shape handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayArticle {
  pub headline: Option<String>,
  pub abstract_text: Option<String>,
  pub byline: Option<String>,
  pub media_image_url: Option<String>,
}

impl From<&RemoteArticle> for DisplayArticle {
  fn from(article: &RemoteArticle) -> Self {
    Self {
      headline: article.headline.clone(),
      abstract_text: article.abstract_text.clone(),
      byline: article.byline.clone(),
      media_image_url: article.media_image_url.clone(),
    }
  }
}
