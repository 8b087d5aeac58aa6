//! Crawler module for URL discovery
//!
//! This module contains the discovery crawl, including:
//! - HTTP fetching with retry logic
//! - Marker-driven link extraction
//! - The checkpointed, rate-limited discovery runs

mod discoverer;
mod fetcher;
mod parser;

pub use discoverer::{dedupe_links, Discoverer, DiscoveryReport, EntityKind, LinkRecord};
pub use fetcher::{
    build_http_client, is_retryable_status, FetchCause, FetchClient, FetchError, FetchResponse,
    RetryPolicy,
};
pub use parser::{extract_links, LinkMarker, ParseError};
