//! Network side of the offline shell cache
//!
//! This crate provides the request/response types shared by the cache
//! controller and the client that fetches them from the upstream origin.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod message;

pub use client::{OriginClient, OriginClientConfig};
pub use error::ProxyError;
pub use fetcher::Fetcher;
pub use message::{FetchMode, FetchRequest, FetchResponse, ResponseType};
