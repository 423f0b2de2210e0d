use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The role of an authenticated user, as asserted by the identity provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Voter,
    Auditor,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Something a role may be allowed to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Cast a vote.
    CastVote,
    /// See the results and participation of a closed election.
    ViewResults,
    /// See the results and participation of an election that is still open.
    ViewLiveResults,
    /// Read the audit trail.
    ViewAuditTrail,
    /// Create elections and candidates.
    ManageElections,
}

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;

        match self {
            Self::Admin => &[ViewResults, ViewLiveResults, ViewAuditTrail, ManageElections],
            Self::Voter => &[CastVote, ViewResults],
            Self::Auditor => &[ViewResults, ViewLiveResults, ViewAuditTrail],
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}
