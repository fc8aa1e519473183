//! Offline-first article search.
//!
//! Articles are fetched from a search API, written through to a local SQLite
//! cache when the user allows it, and served from that cache while the network
//! is down. [`sync::SyncEngine`] ties the pieces together and hands the
//! presentation layer an [`sync::ArticleFeed`].

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod logging;
pub mod search;
pub mod settings;
pub mod sync;
