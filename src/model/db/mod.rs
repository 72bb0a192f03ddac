//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - datetimes are serialised in MongoDB's own format;
//! - byte buffers are serialised as lowercase hex strings.

mod ballot;
pub use ballot::{BallotId, EncryptedBallot, SealedBallot};

mod voter;
pub use voter::VoterRecord;
