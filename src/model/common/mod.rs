//! Types shared between the database and API representations.

mod contest;
pub use contest::{BallotPreference, CandidateId, Contests, Position};

#[cfg(test)]
pub use contest::examples;

mod hex;
pub use hex::HexBytes;

mod voter;
pub use voter::{VoteMethod, VoterKey};
