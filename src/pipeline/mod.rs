//! Pipeline graph construction and execution
//!
//! A pipeline is a tree of nodes, each wrapping a stage. Running a node
//! traverses its subtree depth-first, reusing cached snapshots where the
//! graph shape is unchanged and re-executing everything downstream of a
//! node that ran live.

mod node;

pub use node::{PipelineNode, RunReport};
