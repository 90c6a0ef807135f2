//! Which cache keys a settled mutation makes stale.
//!
//! Every mutation kind invalidates the parent listing and the quota, on
//! success and on failure alike. Renames never change the parent, so one
//! listing is always enough. Renames and deletes can also change folder
//! names inside any breadcrumb chain, so they mark every chain stale.

use std::fmt;

use crate::keys::{KeyPattern, QueryKey};
use crate::types::NodeId;

/// Mutation types known to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Upload,
    Delete,
    Rename,
    CreateFolder,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::CreateFolder => "create-folder",
        };
        f.write_str(name)
    }
}

/// A key family a mutation can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    /// `files:{parentId}` of the mutated node.
    ParentListing,
    /// `quota`
    Quota,
    /// Every `path:{id}`.
    Breadcrumbs,
}

const LISTING_AND_QUOTA: &[Dependent] = &[Dependent::ParentListing, Dependent::Quota];
const LISTING_QUOTA_AND_PATHS: &[Dependent] = &[
    Dependent::ParentListing,
    Dependent::Quota,
    Dependent::Breadcrumbs,
];

/// The invalidation table.
pub const INVALIDATION_TABLE: &[(MutationKind, &[Dependent])] = &[
    (MutationKind::Upload, LISTING_AND_QUOTA),
    (MutationKind::Delete, LISTING_QUOTA_AND_PATHS),
    (MutationKind::Rename, LISTING_QUOTA_AND_PATHS),
    (MutationKind::CreateFolder, LISTING_AND_QUOTA),
];

/// Dependents registered for `kind`.
pub fn dependents(kind: MutationKind) -> &'static [Dependent] {
    INVALIDATION_TABLE
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, deps)| *deps)
        .unwrap_or(&[])
}

/// Key patterns to invalidate once a mutation of `kind` under `parent_id`
/// has settled.
pub fn patterns_for(kind: MutationKind, parent_id: Option<NodeId>) -> Vec<KeyPattern> {
    dependents(kind)
        .iter()
        .map(|dep| match dep {
            Dependent::ParentListing => KeyPattern::Exact(QueryKey::Files(parent_id)),
            Dependent::Quota => KeyPattern::Exact(QueryKey::Quota),
            Dependent::Breadcrumbs => KeyPattern::AllPaths,
        })
        .collect()
}
