mod status;

pub use status::ElectionStatus;

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are integers, unique across all elections.
pub type CandidateId = u32;
