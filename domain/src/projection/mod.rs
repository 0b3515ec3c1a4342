//! Read-model projections.
//!
//! Each projection owns one read-model table and reduces a filtered subset
//! of the event stream — possibly spanning several aggregate types — into
//! idempotent statements against it. Reductions are pure per event: all
//! information a statement needs is in the event payload and metadata, so
//! replays and retries are safe by construction.

pub mod idp_config;
pub mod org_member;

pub use idp_config::IdpConfigProjection;
pub use org_member::OrgMemberProjection;
