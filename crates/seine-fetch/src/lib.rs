//! # Seine Fetch
//!
//! HTTP fetching for the Seine crawl engine: a `reqwest`-backed
//! implementation of the [`Fetcher`](seine_types::Fetcher) port plus the
//! page extractor that turns a response body into a
//! [`Page`](seine_types::Page).

pub mod extract;
pub mod http;

pub use http::{FetchConfig, HttpFetcher};
