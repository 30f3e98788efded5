//! Core domain types for patch mirroring.
//!
//! Remote identifiers live in `ids`; the patch catalog and the remote entities it
//! is compared against live in `patch`.

pub mod ids;
pub mod patch;

pub use ids::{InvalidRepoId, PrNumber, RepoId, Sha};
pub use patch::{
    BranchRef, ContentResult, IdentityError, PackageIdentity, PatchFile, PullRequestRef,
    RemotePatchEntry,
};
