//! Storage backend integration.

mod client;

pub use client::{resolve_url, HttpConnectivityProbe, HttpUploader, Unreachable};
