//! Structural construction: scope stack, shared build context, and the
//! builder that turns flat raw nodes into the frame forest.

pub mod builder;
pub mod context;

pub use builder::GraphBuilder;
pub use context::{BuildContext, ScopeStack};
