//! Identity asserted by the external identity provider.

mod role;
mod token;

pub use role::{Capability, Role};
pub use token::AuthToken;
