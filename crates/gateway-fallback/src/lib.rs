//! # Gateway Fallback
//!
//! Pre-authored substitute responses for requests the upstream cannot
//! serve. Selection is a pure function over the request: free-form Q&A
//! text is classified into a small fixed category set by keyword matching,
//! structured explanation requests get one generic template populated from
//! the fields the caller supplied. Fallback responses are never cached and
//! never billed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod selector;

pub use selector::{FallbackCategory, FallbackResponse, FallbackSelector};
