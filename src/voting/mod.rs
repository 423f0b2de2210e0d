//! Vote casting, results and the election lifecycle, on top of the storage traits.

mod closing;
mod error;
pub mod guard;
mod service;
mod tally;

pub use closing::{ElectionCloserFairing, ElectionClosers};
pub use error::{Result, VotingError};
pub use service::{CastVote, ElectionOverview, VotingService};
pub use tally::{CandidateCount, Participation, Tally};
