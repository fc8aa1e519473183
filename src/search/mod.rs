//! Remote article search: one GET against the search endpoint, decoded leniently.

pub mod api_types;
pub mod client;
pub mod error;
pub mod types;

pub use client::{ArticleFetcher, SearchClient};
pub use error::FetchError;
pub use types::{DisplayArticle, RemoteArticle};
