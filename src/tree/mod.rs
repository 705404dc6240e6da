//! Virtual host tree: node model and node builder.

pub mod builder;
pub mod node;

pub use builder::NodeBuilder;
pub use node::{ElementData, HostNode, HostTree, NodeId, NodeKind};
