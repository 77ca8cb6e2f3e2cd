//! Resolution strategy abstraction
//!
//! One interface, two backends: in-memory registries during a full build,
//! and persisted-store lookups during incremental repair where most of the
//! codebase is not in memory. Both implement the same 3-tier lookup:
//! exact qualified name, then scoped to the caller's package, then partial
//! match on the trailing simple name.

use crate::build::BuildContext;
use crate::frame::{Frame, FrameId, FrameKind};
use crate::storage::GraphStore;

/// Outcome of one resolution lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub frame_id: FrameId,
    pub qualified_name: String,
    pub confidence: f32,
}

impl ResolutionResult {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            frame_id: frame.id.clone(),
            qualified_name: frame.qualified_name.clone().unwrap_or_default(),
            confidence: frame.confidence,
        }
    }
}

/// Pluggable backend for resolving symbol names to frames.
pub trait ResolutionStrategy {
    fn resolve_callable_exact(&self, qualified_name: &str) -> Option<ResolutionResult>;

    fn resolve_callable_with_context(
        &self,
        simple_name: &str,
        package_context: &str,
    ) -> Option<ResolutionResult>;

    /// Last resort: trailing-simple-name match, lowest confidence.
    fn resolve_callable_partial(&self, simple_name: &str) -> Option<ResolutionResult>;

    fn resolve_class_exact(&self, qualified_name: &str) -> Option<ResolutionResult>;

    /// Trailing-simple-name match; ties break to the shortest qualified
    /// name.
    fn resolve_class_partial(&self, simple_name: &str) -> Option<ResolutionResult>;

    /// Qualified name of the package containing a frame.
    fn package_qualified_name(&self, frame_id: &FrameId) -> Option<String>;
}

/// Run the full 3-tier callable resolution for a reference.
///
/// Exact always wins over context, which wins over partial; the first tier
/// that produces a result short-circuits the rest.
pub fn resolve_callable(
    strategy: &dyn ResolutionStrategy,
    callee_name: &str,
    caller_id: &FrameId,
) -> Option<ResolutionResult> {
    if let Some(result) = strategy.resolve_callable_exact(callee_name) {
        return Some(result);
    }

    if let Some(package) = strategy.package_qualified_name(caller_id) {
        if let Some(result) = strategy.resolve_callable_with_context(callee_name, &package) {
            return Some(result);
        }
    }

    let simple_name = callee_name.rsplit('.').next().unwrap_or(callee_name);
    strategy.resolve_callable_partial(simple_name)
}

/// Class resolution: exact, then partial on the trailing simple name.
// TODO: add a package-context tier like resolve_callable to disambiguate
// same-named classes in different packages
pub fn resolve_class(strategy: &dyn ResolutionStrategy, class_name: &str) -> Option<ResolutionResult> {
    if let Some(result) = strategy.resolve_class_exact(class_name) {
        return Some(result);
    }

    let simple_name = class_name.rsplit('.').next().unwrap_or(class_name);
    strategy.resolve_class_partial(simple_name)
}

/// Strategy over the in-memory registries of a build context. Used during
/// full builds when every frame is in the arena.
pub struct MemoryStrategy<'a> {
    ctx: &'a BuildContext,
}

impl<'a> MemoryStrategy<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }
}

impl ResolutionStrategy for MemoryStrategy<'_> {
    fn resolve_callable_exact(&self, qualified_name: &str) -> Option<ResolutionResult> {
        self.ctx
            .callable_registry
            .get(qualified_name)
            .map(|&key| ResolutionResult::from_frame(&self.ctx.arena[key]))
    }

    fn resolve_callable_with_context(
        &self,
        simple_name: &str,
        package_context: &str,
    ) -> Option<ResolutionResult> {
        let candidate = format!("{}.{}", package_context, simple_name);
        self.resolve_callable_exact(&candidate)
    }

    fn resolve_callable_partial(&self, simple_name: &str) -> Option<ResolutionResult> {
        let suffix = format!(".{}", simple_name);
        self.ctx
            .callable_registry
            .iter()
            .find(|(qname, _)| qname.ends_with(&suffix) || qname.as_str() == simple_name)
            .map(|(_, &key)| ResolutionResult::from_frame(&self.ctx.arena[key]))
    }

    fn resolve_class_exact(&self, qualified_name: &str) -> Option<ResolutionResult> {
        self.ctx
            .class_registry
            .get(qualified_name)
            .map(|&key| ResolutionResult::from_frame(&self.ctx.arena[key]))
    }

    fn resolve_class_partial(&self, simple_name: &str) -> Option<ResolutionResult> {
        let suffix = format!(".{}", simple_name);
        self.ctx
            .class_registry
            .iter()
            .filter(|(qname, _)| qname.ends_with(&suffix) || qname.as_str() == simple_name)
            .min_by_key(|(qname, _)| qname.len())
            .map(|(_, &key)| ResolutionResult::from_frame(&self.ctx.arena[key]))
    }

    fn package_qualified_name(&self, frame_id: &FrameId) -> Option<String> {
        let key = self.ctx.arena.key_of(frame_id)?;
        self.ctx.arena.enclosing_package_qualified_name(key)
    }
}

/// Strategy over a persisted store. Used during incremental repair; each
/// tier is one blocking lookup round-trip.
pub struct StoreStrategy<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> StoreStrategy<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }
}

impl ResolutionStrategy for StoreStrategy<'_> {
    fn resolve_callable_exact(&self, qualified_name: &str) -> Option<ResolutionResult> {
        self.store
            .find_by_kind_and_qualified_name(FrameKind::Callable, qualified_name)
            .ok()
            .flatten()
            .map(|row| row.resolution_result())
    }

    fn resolve_callable_with_context(
        &self,
        simple_name: &str,
        package_context: &str,
    ) -> Option<ResolutionResult> {
        let candidate = format!("{}.{}", package_context, simple_name);
        self.resolve_callable_exact(&candidate)
    }

    fn resolve_callable_partial(&self, simple_name: &str) -> Option<ResolutionResult> {
        let suffix = format!(".{}", simple_name);
        let rows = self
            .store
            .find_by_kind_and_suffix(FrameKind::Callable, &suffix)
            .ok()?;
        rows.into_iter()
            .min_by_key(|row| row.qualified_name.as_ref().map(|q| q.len()).unwrap_or(usize::MAX))
            .map(|row| row.resolution_result())
    }

    fn resolve_class_exact(&self, qualified_name: &str) -> Option<ResolutionResult> {
        self.store
            .find_by_kind_and_qualified_name(FrameKind::Class, qualified_name)
            .ok()
            .flatten()
            .map(|row| row.resolution_result())
    }

    fn resolve_class_partial(&self, simple_name: &str) -> Option<ResolutionResult> {
        let suffix = format!(".{}", simple_name);
        let rows = self
            .store
            .find_by_kind_and_suffix(FrameKind::Class, &suffix)
            .ok()?;
        rows.into_iter()
            .min_by_key(|row| row.qualified_name.as_ref().map(|q| q.len()).unwrap_or(usize::MAX))
            .map(|row| row.resolution_result())
    }

    fn package_qualified_name(&self, frame_id: &FrameId) -> Option<String> {
        self.store.containing_package_qualified_name(frame_id).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::frame::Frame;

    fn ctx_with_callables(qnames: &[&str]) -> BuildContext {
        let mut ctx = BuildContext::new(Tuning::default());
        for qname in qnames {
            let simple = qname.rsplit('.').next().unwrap();
            let mut frame = Frame::new(FrameKind::Callable)
                .with_name(simple)
                .with_qualified_name(*qname)
                .with_location("test.py", 1, 1, 0, 0);
            frame.compute_id();
            let key = ctx.arena.insert(frame);
            ctx.callable_registry.insert(qname.to_string(), key);
        }
        ctx
    }

    #[test]
    fn test_exact_wins_over_partial() {
        let ctx = ctx_with_callables(&["pkg.helper", "other.very.long.helper"]);
        let strategy = MemoryStrategy::new(&ctx);

        let caller = FrameId::from("nonexistent");
        let result = resolve_callable(&strategy, "pkg.helper", &caller).unwrap();
        assert_eq!(result.qualified_name, "pkg.helper");
    }

    #[test]
    fn test_partial_fallback() {
        let ctx = ctx_with_callables(&["pkg.inner.helper"]);
        let strategy = MemoryStrategy::new(&ctx);

        let caller = FrameId::from("nonexistent");
        let result = resolve_callable(&strategy, "helper", &caller).unwrap();
        assert_eq!(result.qualified_name, "pkg.inner.helper");
    }

    #[test]
    fn test_unresolved_returns_none() {
        let ctx = ctx_with_callables(&["pkg.helper"]);
        let strategy = MemoryStrategy::new(&ctx);

        let caller = FrameId::from("nonexistent");
        assert!(resolve_callable(&strategy, "missing", &caller).is_none());
    }

    #[test]
    fn test_class_partial_prefers_shortest() {
        let mut ctx = BuildContext::new(Tuning::default());
        for qname in ["a.Base", "deeply.nested.pkg.Base"] {
            let mut frame = Frame::new(FrameKind::Class)
                .with_name("Base")
                .with_qualified_name(qname)
                .with_location("test.py", 1, 1, 0, 0);
            frame.compute_id();
            let key = ctx.arena.insert(frame);
            ctx.class_registry.insert(qname.to_string(), key);
        }

        let strategy = MemoryStrategy::new(&ctx);
        let result = resolve_class(&strategy, "Base").unwrap();
        assert_eq!(result.qualified_name, "a.Base");
    }
}
