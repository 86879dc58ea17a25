//! stagehand - Memoizing pipeline runner
//!
//! Builds linear or branching pipelines of stages over a shared state map
//! and persists each stage's output to an on-disk cache keyed by the
//! pipeline's shape. Re-running an unchanged pipeline loads cached
//! snapshots instead of executing stages; inserting, removing, or
//! reordering stages invalidates exactly the affected subtree, and cache
//! files left behind by earlier shapes are garbage-collected after each
//! successful run.
//!
//! ```no_run
//! use serde_json::json;
//! use stagehand::{PipelineNode, Stage, State};
//!
//! let root = PipelineNode::root(
//!     Stage::new("load", |state: &mut State| {
//!         state.insert("a".to_string(), json!(5));
//!         Ok(())
//!     }),
//!     ".stagehand",
//! );
//! root.then(Stage::new("derive", |state: &mut State| {
//!     let a = state["a"].as_i64().unwrap();
//!     state.insert("b".to_string(), json!(a * 5));
//!     Ok(())
//! }));
//!
//! root.run().unwrap();
//! // A second run with the same shape executes neither stage.
//! root.run().unwrap();
//! ```

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod stage;

pub use cache::{CacheStore, CACHE_EXTENSION};
pub use error::{PipelineError, Result, StageError};
pub use fingerprint::Fingerprint;
pub use pipeline::{PipelineNode, RunReport};
pub use stage::{CachePolicy, Stage, State};
