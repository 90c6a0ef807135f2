//! Cache keys and the values stored under them.

use std::fmt;

use crate::types::{Crumb, FileNode, NodeId, Quota};

/// Key of one cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// `files:{parentId}`: listing of a folder (`None` = root).
    Files(Option<NodeId>),
    /// `quota`
    Quota,
    /// `path:{id}`: breadcrumb chain of a folder.
    Path(NodeId),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files(Some(id)) => write!(f, "files:{}", id),
            Self::Files(None) => write!(f, "files:root"),
            Self::Quota => write!(f, "quota"),
            Self::Path(id) => write!(f, "path:{}", id),
        }
    }
}

/// Set of keys selected for invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(QueryKey),
    /// Every `path:{id}` entry.
    AllPaths,
}

impl KeyPattern {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Exact(expected) => expected == key,
            Self::AllPaths => matches!(key, QueryKey::Path(_)),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => key.fmt(f),
            Self::AllPaths => write!(f, "path:*"),
        }
    }
}

/// Value stored in the shared cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    Files(Vec<FileNode>),
    Quota(Quota),
    Path(Vec<Crumb>),
}

impl QueryData {
    pub fn into_files(self) -> Option<Vec<FileNode>> {
        match self {
            Self::Files(files) => Some(files),
            _ => None,
        }
    }

    pub fn into_quota(self) -> Option<Quota> {
        match self {
            Self::Quota(quota) => Some(quota),
            _ => None,
        }
    }

    pub fn into_path(self) -> Option<Vec<Crumb>> {
        match self {
            Self::Path(crumbs) => Some(crumbs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(QueryKey::Files(Some(5)).to_string(), "files:5");
        assert_eq!(QueryKey::Files(None).to_string(), "files:root");
        assert_eq!(QueryKey::Quota.to_string(), "quota");
        assert_eq!(QueryKey::Path(9).to_string(), "path:9");
    }

    #[test]
    fn test_pattern_matching() {
        let listing = QueryKey::Files(Some(5));
        assert!(KeyPattern::Exact(listing).matches(&listing));
        assert!(!KeyPattern::Exact(listing).matches(&QueryKey::Files(None)));
        assert!(KeyPattern::AllPaths.matches(&QueryKey::Path(1)));
        assert!(!KeyPattern::AllPaths.matches(&QueryKey::Files(Some(1))));
        assert_eq!(KeyPattern::AllPaths.to_string(), "path:*");
    }
}
