//! Trait abstractions over branch handles.
//!
//! The merge session only talks to branches through these traits, so it
//! can be driven by git repositories in production and by mocks in tests.

use std::collections::BTreeMap;
use std::path::Path;

use crate::location::{BranchLocation, WorkingDirPolicy};
use crate::Result;

/// Everything needed to record a landing commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRequest {
    /// Commit message, without trailers.
    pub message: String,
    /// Revision properties, written as `Key: value` trailers.
    pub revprops: BTreeMap<String, String>,
    /// Authors as `Name <email>`; computed from the merged history when `None`.
    pub authors: Option<Vec<String>>,
    /// Reviews as `reviewer;vote`.
    pub reviews: Vec<String>,
    /// Log the commit instead of writing it.
    pub dry_run: bool,
}

/// Operations on one side of a merge.
///
/// A target handle owns a working tree; a source handle only exposes
/// history for the target to merge from.
#[allow(clippy::missing_errors_doc)]
pub trait BranchOps {
    // === Identity ===

    /// Where this branch lives.
    fn location(&self) -> &BranchLocation;

    /// Working tree root, if this handle has one.
    fn workdir(&self) -> Option<&Path>;

    // === Working tree ===

    /// Restore the working tree to the branch tip with no extra files.
    ///
    /// Safe to call any number of times.
    fn cleanup(&mut self) -> Result<()>;

    /// Merge `other` up to `to_revision` (its tip when `None`).
    fn merge(&mut self, other: &Self, to_revision: Option<&str>) -> Result<()>;

    /// Commit the pending merge, returning the new revision.
    ///
    /// Returns `None` in dry-run mode.
    fn commit(&mut self, request: &CommitRequest) -> Result<Option<String>>;

    /// Copy the tags of `other` onto this branch; `other` wins on collision.
    ///
    /// Returns the number of tags created or moved.
    fn merge_tags(&mut self, other: &Self, dry_run: bool) -> Result<usize>;

    /// Write the current tree (including a pending merge) into `dest`.
    fn export_tree(&self, dest: &Path) -> Result<()>;

    // === History ===

    /// Authors of the history this branch contributes.
    fn authors(&self) -> Result<Vec<String>>;

    /// Issues marked fixed by the most recent landing.
    fn fixed_issues(&self) -> Result<Vec<String>>;

    /// Number of revisions reachable from `revision`.
    fn revision_number(&self, revision: &str) -> Result<usize>;

    /// Number of revisions reachable from the tip.
    fn tip_revision_number(&self) -> Result<usize>;

    /// Id of the tip revision.
    fn last_revision(&self) -> Result<String>;
}

/// Opens target and source handles.
#[allow(clippy::missing_errors_doc)]
pub trait BranchOpener {
    /// Handle type produced by this opener.
    type Branch: BranchOps;

    /// Open the target branch with a working tree placed per `policy`.
    fn open_target(
        &self,
        location: &BranchLocation,
        policy: &WorkingDirPolicy,
    ) -> Result<Self::Branch>;

    /// Open a source branch so that `target` can merge from it.
    fn open_source(&self, location: &BranchLocation, target: &Self::Branch)
    -> Result<Self::Branch>;
}
