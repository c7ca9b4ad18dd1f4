//! Channel access control.
//!
//! Channels carry their access rules as tags on the creation event. This
//! module reads those tags into a [`ChannelAccess`] descriptor and decides
//! who may read and post.
//!
//! # Rules
//!
//! | Actor                    | Read                          | Post                               |
//! |--------------------------|-------------------------------|------------------------------------|
//! | admin / creator          | yes                           | yes                                |
//! | public or no cohorts     | yes                           | open: yes; gated: shared cohort*   |
//! | cohort / private channel | shared cohort required        | open: yes; gated: shared cohort    |
//!
//! \* a gated channel without cohorts is open to everyone who can read it.
//!
//! [`WriteGate`] adds the actor's whitelist standing and rate limits on top
//! of these rules for use right before a write.

mod authorizer;
mod error;
mod gate;
mod types;

pub use authorizer::{can_access, can_post, ChannelAuthorizer};
pub use error::{AccessError, Result};
pub use gate::WriteGate;
pub use types::{AccessType, ChannelAccess, Visibility};
