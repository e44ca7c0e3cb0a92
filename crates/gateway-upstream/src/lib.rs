//! # Gateway Upstream
//!
//! Reqwest-based client for the metered completion API, classifying every
//! transport and HTTP failure into the gateway error taxonomy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;

pub use client::HttpCompletionClient;
