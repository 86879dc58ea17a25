//! Stage contract: the unit of work a pipeline node executes
//!
//! A stage is a named callable that mutates the accumulated state in place,
//! paired with a cache policy. The name is the stage's identity for
//! fingerprinting, so two processes building the same pipeline shape from
//! equally named stages share cache entries.

use crate::error::StageError;

/// Accumulated pipeline state: an insertion-ordered key-value mapping.
///
/// Every node receives its own private copy of its parent's output, so a
/// stage only ever observes the mutations of its own lineage.
pub type State = serde_json::Map<String, serde_json::Value>;

/// Whether a node's output may be persisted and reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Persist the post-stage state and reuse it on later runs
    #[default]
    Cacheable,
    /// Always execute live; never read or write the cache store.
    /// Counts as a miss for invalidation, so descendants re-execute too.
    NeverCache,
}

/// A unit of work with a stable identity and a cache policy
pub struct Stage {
    name: String,
    policy: CachePolicy,
    func: Box<dyn Fn(&mut State) -> Result<(), StageError>>,
}

impl Stage {
    /// Create a cacheable stage
    ///
    /// # Arguments
    /// * `name` - Stable identity used for fingerprinting; equal names in
    ///   different processes must refer to the same work
    /// * `func` - The callable; mutates the state in place
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut State) -> Result<(), StageError> + 'static,
    {
        Self {
            name: name.into(),
            policy: CachePolicy::Cacheable,
            func: Box::new(func),
        }
    }

    /// Create a stage that always executes live and never touches the
    /// cache store
    pub fn never_cache<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut State) -> Result<(), StageError> + 'static,
    {
        Self {
            policy: CachePolicy::NeverCache,
            ..Self::new(name, func)
        }
    }

    /// Get the stage's identity
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the stage's cache policy
    #[inline]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Run the callable against a state
    pub(crate) fn execute(&self, state: &mut State) -> Result<(), StageError> {
        (self.func)(state)
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_defaults_to_cacheable() {
        let stage = Stage::new("load", |_state| Ok(()));
        assert_eq!(stage.name(), "load");
        assert_eq!(stage.policy(), CachePolicy::Cacheable);
    }

    #[test]
    fn test_never_cache_policy() {
        let stage = Stage::never_cache("fetch", |_state| Ok(()));
        assert_eq!(stage.policy(), CachePolicy::NeverCache);
    }

    #[test]
    fn test_execute_mutates_state() {
        let stage = Stage::new("annotate", |state: &mut State| {
            state.insert("count".to_string(), serde_json::json!(3));
            Ok(())
        });

        let mut state = State::new();
        stage.execute(&mut state).unwrap();
        assert_eq!(state.get("count"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_execute_propagates_failure() {
        let stage = Stage::new("explode", |_state: &mut State| {
            Err("no input rows".into())
        });

        let mut state = State::new();
        let err = stage.execute(&mut state).unwrap_err();
        assert_eq!(err.to_string(), "no input rows");
    }
}
