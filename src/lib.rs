//! # Reelshare
//!
//! Media indexing and streaming server for a local or SMB-mounted video
//! library.
//!
//! - **Root resolution**: mounts a configured SMB share with multi-stage
//!   diagnostics, falling back to a local directory on any failure
//! - **Scanning**: recursive, concurrency-bounded discovery of video
//!   files with change-detection fingerprints and optional metadata
//!   enrichment
//! - **Index cache**: TTL'd single-flight generation cache with
//!   session-stable numeric ids
//! - **Streaming**: byte-range HTTP responses with bounded-chunk reads

pub mod cache;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod media;
pub mod mount;
pub mod providers;
pub mod routes;
pub mod scanner;
pub mod state;
pub mod stream;

pub use state::AppState;
