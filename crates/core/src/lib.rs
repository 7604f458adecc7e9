//! Fact model for factsync.
//!
//! A fact is a relationship triple `(scope, subject, attribute)` tracked by a
//! remote service: a permission held by a group or user, a condition
//! enforced by a quality gate, a project selected by a gate, or a login
//! belonging to a group.
//!
//! Facts are compared two ways:
//!
//! - **identity** ([`Fact::identity`]) decides which facts the diff pairs up.
//!   Conditions are identified by metric name.
//! - **content** (`==`) decides whether two fact sets have converged. It
//!   covers everything except the remote-assigned id of a condition.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod attribute;
pub mod error;
pub mod fact;
pub mod set;

// Re-export main types
pub use attribute::{Attribute, AttributeKey, Condition, ConditionOp, Permission};
pub use error::{Error, Result};
pub use fact::{Fact, FactIdentity, FactKind, FactScope, Scope};
pub use set::FactSet;
