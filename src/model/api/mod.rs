//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - byte buffers are serialised as lowercase hex strings;
//! - datetimes are serialised as RFC 3339 strings.

pub mod auth;
pub mod ballot;
pub mod results;
pub mod token;
pub mod vote;
pub mod voter;
