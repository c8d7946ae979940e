//! Versioned prompt history
//!
//! Every edit of a prompt becomes a [`VersionNode`]. Nodes live in a
//! [`Forest`] arena and reference each other by [`NodeId`];
//! [`VersionTree`] applies the edit, selection and flagging rules on top.

mod forest;
mod node;
mod version_tree;

pub use forest::{Forest, PreOrder};
pub use node::{Draft, InvokeEntry, NodeId, VersionNode};
pub use version_tree::{AddOutcome, VersionTree};
