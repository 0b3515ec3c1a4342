//! # Identra Domain
//!
//! Domain layer of the Identra identity platform: the event catalog for
//! organizations, users, and identity-provider configurations, the write
//! models and command handlers validating changes against them, and the
//! projections materializing the relational read-models.
//!
//! ## Structure
//!
//! - [`org`], [`user`], [`idp`]: event type constants, payload structs, and
//!   lifecycle states per aggregate
//! - [`command`]: the [`command::Commands`] service — write models plus the
//!   add/change/deactivate/reactivate/remove operations
//! - [`projection`]: the read-model reducers
//!   ([`projection::OrgMemberProjection`],
//!   [`projection::IdpConfigProjection`])
//!
//! The engine mechanics (event store, reduction framework, projection
//! runner) live in `identra-core` and its sibling crates; this crate only
//! supplies the domain semantics flowing through them.

pub mod command;
pub mod idp;
pub mod org;
pub mod projection;
pub mod user;

pub use command::{CommandContext, Commands, ObjectDetails};
pub use projection::{IdpConfigProjection, OrgMemberProjection};
