//! Cross-reference resolution: pluggable resolution tiers and the
//! multi-pass resolver that turns references into typed edges.

pub mod resolver;
pub mod strategy;

pub use resolver::CrossRefResolver;
pub use strategy::{MemoryStrategy, ResolutionResult, ResolutionStrategy, StoreStrategy};
