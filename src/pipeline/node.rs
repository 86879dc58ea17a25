//! Pipeline node, traversal, and the invalidation cascade

use crate::cache::CacheStore;
use crate::error::{PipelineError, Result};
use crate::fingerprint::Fingerprint;
use crate::stage::{CachePolicy, Stage, State};
use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Summary of a single `run` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Stages executed live (cache misses and never-cache stages)
    pub executed: usize,
    /// Stages whose cached snapshot was reused
    pub cache_hits: usize,
    /// Orphaned cache entries removed by the cleanup sweep
    pub swept: usize,
}

/// A node in the pipeline tree.
///
/// Handles are cheap clones of a shared reference; the tree itself owns the
/// children, and each node holds only a weak back-reference to its parent
/// for fingerprint derivation.
#[derive(Clone)]
pub struct PipelineNode {
    inner: Rc<RefCell<NodeInner>>,
}

struct NodeInner {
    stage: Stage,
    parent: Weak<RefCell<NodeInner>>,
    /// Position among the parent's children, fixed at creation
    sibling_index: usize,
    children: Vec<Rc<RefCell<NodeInner>>>,
    /// Memoized for the lifetime of the graph
    fingerprint: OnceCell<Fingerprint>,
    store: Rc<CacheStore>,
}

impl PipelineNode {
    /// Create a root node from a stage and a cache directory
    pub fn root(stage: Stage, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeInner {
                stage,
                parent: Weak::new(),
                sibling_index: 0,
                children: Vec::new(),
                fingerprint: OnceCell::new(),
                store: Rc::new(CacheStore::new(cache_dir.as_ref())),
            })),
        }
    }

    /// Append a child node that runs after this one, with access to the
    /// state it produced. Returns the child so chains can continue fluently;
    /// calling `then` repeatedly on one node forks the pipeline.
    pub fn then(&self, stage: Stage) -> PipelineNode {
        let mut parent = self.inner.borrow_mut();
        let child = Rc::new(RefCell::new(NodeInner {
            stage,
            parent: Rc::downgrade(&self.inner),
            sibling_index: parent.children.len(),
            children: Vec::new(),
            fingerprint: OnceCell::new(),
            store: Rc::clone(&parent.store),
        }));
        parent.children.push(Rc::clone(&child));
        PipelineNode { inner: child }
    }

    /// This node's shape fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        node_fingerprint(&self.inner)
    }

    /// The cache file path backing this node's snapshot
    pub fn cache_path(&self) -> PathBuf {
        self.inner.borrow().store.entry_path(&self.fingerprint())
    }

    /// Execute this node's subtree starting from an empty state
    pub fn run(&self) -> Result<RunReport> {
        self.run_with(&State::new())
    }

    /// Execute this node's subtree.
    ///
    /// The traversal is depth-first and preorder. Each node receives a
    /// private copy of its parent's output, so `initial` is never mutated
    /// and sibling subtrees never observe one another's changes. After the
    /// whole subtree completes, cache entries that no longer correspond to
    /// any visited node are swept from the store; a run aborted by a stage
    /// failure skips the sweep.
    pub fn run_with(&self, initial: &State) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut active = HashSet::new();

        run_node(&self.inner, initial, false, &mut active, &mut report)?;

        let store = Rc::clone(&self.inner.borrow().store);
        report.swept = store.sweep(&active)?;

        Ok(report)
    }
}

impl std::fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("PipelineNode")
            .field("stage", &inner.stage.name())
            .field("sibling_index", &inner.sibling_index)
            .field("children", &inner.children.len())
            .finish()
    }
}

/// Compute (and memoize) a node's fingerprint, walking the ancestor chain
fn node_fingerprint(node: &Rc<RefCell<NodeInner>>) -> Fingerprint {
    let inner = node.borrow();
    inner
        .fingerprint
        .get_or_init(|| {
            let parent_fp = inner.parent.upgrade().map(|p| node_fingerprint(&p));
            Fingerprint::derive(inner.stage.name(), inner.sibling_index, parent_fp.as_ref())
        })
        .clone()
}

/// Execute one node and recurse into its children.
///
/// `forced` is true when any ancestor executed live this run; a cached
/// snapshot is only trustworthy if everything it was derived from was
/// itself reused, so a forced node re-executes even when its own entry is
/// present.
fn run_node(
    node: &Rc<RefCell<NodeInner>>,
    incoming: &State,
    forced: bool,
    active: &mut HashSet<Fingerprint>,
    report: &mut RunReport,
) -> Result<()> {
    let mut state = incoming.clone();

    let miss = {
        let inner = node.borrow();
        let name = inner.stage.name().to_string();

        match inner.stage.policy() {
            CachePolicy::NeverCache => {
                debug!(stage = %name, "never cached, executing");
                inner
                    .stage
                    .execute(&mut state)
                    .map_err(|source| PipelineError::Stage {
                        stage: name,
                        source,
                    })?;
                report.executed += 1;
                true
            }
            CachePolicy::Cacheable => {
                let fp = node_fingerprint(node);
                let mut hit = false;

                if !forced && inner.store.exists(&fp) {
                    match inner.store.load(&fp) {
                        Ok(cached) => {
                            debug!(stage = %name, "deferring to cache");
                            state = cached;
                            hit = true;
                        }
                        Err(PipelineError::CacheCorrupt { path, reason }) => {
                            // Unreadable entry: fall through to a live
                            // execution that overwrites it
                            warn!(
                                stage = %name,
                                path = %path.display(),
                                %reason,
                                "discarding corrupt cache entry"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }

                if hit {
                    report.cache_hits += 1;
                } else {
                    if forced {
                        debug!(stage = %name, "refreshing, ancestor executed");
                    } else {
                        debug!(stage = %name, "stale cache, executing");
                    }
                    inner
                        .stage
                        .execute(&mut state)
                        .map_err(|source| PipelineError::Stage {
                            stage: name,
                            source,
                        })?;
                    inner.store.store(&fp, &state)?;
                    report.executed += 1;
                }

                active.insert(fp);
                !hit
            }
        }
    };

    let children: Vec<_> = node.borrow().children.iter().map(Rc::clone).collect();
    let child_forced = forced || miss;

    for child in &children {
        run_node(child, &state, child_forced, active, report)?;
    }

    Ok(())
}
