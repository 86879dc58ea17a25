//! Shape fingerprints for pipeline nodes
//!
//! A fingerprint identifies a node's position in the pipeline graph: which
//! stage, at which sibling index, under which ancestor chain. It is a pure
//! function of graph shape, never of state content or instance identity, so
//! a freshly constructed but structurally identical pipeline reuses another
//! instance's cache entries.

use sha2::{Digest, Sha256};

/// Seed folded into a root node's digest in place of a parent fingerprint
const ROOT_SEED: &[u8] = b"stagehand.root.v1";

/// Deterministic identifier for a node's shape-position in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive a node's fingerprint from its stage identity, its position
    /// among its siblings, and its parent's fingerprint.
    ///
    /// The parent fingerprint folds the whole ancestor chain forward, so
    /// changing any ancestor's stage or position changes every descendant's
    /// fingerprint. The sibling index is hashed as a fixed-width integer to
    /// keep repeated stages at the same level distinct.
    pub fn derive(stage_name: &str, sibling_index: usize, parent: Option<&Fingerprint>) -> Self {
        let mut hasher = Sha256::new();
        match parent {
            Some(parent) => hasher.update(parent.0.as_bytes()),
            None => hasher.update(ROOT_SEED),
        }
        hasher.update((sibling_index as u32).to_be_bytes());
        hasher.update(stage_name.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Reconstruct a fingerprint from the stem of a cache file name
    pub(crate) fn from_file_stem(stem: &str) -> Self {
        Self(stem.to_string())
    }

    /// The filesystem-safe hex form, used as the cache file stem
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::derive("load", 0, None);
        let b = Fingerprint::derive("load", 0, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_is_hex() {
        let fp = Fingerprint::derive("load", 0, None);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_stage_name() {
        let a = Fingerprint::derive("load", 0, None);
        let b = Fingerprint::derive("clean", 0, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_with_sibling_index() {
        let parent = Fingerprint::derive("load", 0, None);
        let first = Fingerprint::derive("score", 0, Some(&parent));
        let second = Fingerprint::derive("score", 1, Some(&parent));
        assert_ne!(first, second);
    }

    #[test]
    fn test_fingerprint_changes_with_parent() {
        let parent_a = Fingerprint::derive("load", 0, None);
        let parent_b = Fingerprint::derive("fetch", 0, None);
        let under_a = Fingerprint::derive("score", 0, Some(&parent_a));
        let under_b = Fingerprint::derive("score", 0, Some(&parent_b));
        assert_ne!(under_a, under_b);
    }

    #[test]
    fn test_root_differs_from_child_with_same_name() {
        let root = Fingerprint::derive("load", 0, None);
        let child = Fingerprint::derive("load", 0, Some(&root));
        assert_ne!(root, child);
    }
}
