//! Incremental repair scenarios against an on-store graph: full build,
//! persist, edit one file, diff, repair.

use std::collections::BTreeMap;

use framegraph::build::{BuildContext, GraphBuilder};
use framegraph::edge::EdgeKind;
use framegraph::frame::{FrameId, FrameKind};
use framegraph::handler::HandlerRegistry;
use framegraph::incremental::{parse_single_file, DiffCalculator, RepairEngine, RepairOutcome};
use framegraph::parse::SourceParser;
use framegraph::resolve::CrossRefResolver;
use framegraph::storage::{FrameRow, GraphStore, SqliteStore};
use framegraph::Tuning;

/// Full build over the fixture sources, resolved and persisted.
fn build_and_persist(sources: &[(&str, &str)]) -> SqliteStore {
    let registry = HandlerRegistry::with_builtin_handlers();
    let mut parser = SourceParser::new(&registry).unwrap();

    let mut file_nodes = BTreeMap::new();
    for (path, source) in sources {
        let language = registry
            .detect_language(std::path::Path::new(path))
            .expect("fixture language");
        let nodes = parser.extract_raw_nodes(&language, path, source).unwrap();
        file_nodes.insert(path.to_string(), nodes);
    }

    let mut ctx = BuildContext::new(Tuning::default());
    GraphBuilder::new(&registry).build(&mut ctx, "repo", &file_nodes);
    CrossRefResolver::new(&registry).resolve(&mut ctx, &file_nodes);

    let store = SqliteStore::open_in_memory().unwrap();
    let frame_rows: Vec<FrameRow> = ctx
        .arena
        .iter()
        .map(|(_, frame)| FrameRow::from_frame(frame))
        .collect();
    store.insert_frames(&frame_rows).unwrap();

    let edge_rows: Vec<_> = ctx
        .edges
        .iter()
        .map(framegraph::storage::EdgeRow::from_edge)
        .collect();
    store.insert_edges(&edge_rows).unwrap();

    store
}

/// Re-parse one file, diff against the store, apply the caller-side
/// precondition (detach-delete removed frames, insert added ones), then run
/// the repair engine.
fn reparse_and_repair(store: &SqliteStore, file_path: &str, new_source: &str) -> RepairOutcome {
    let registry = HandlerRegistry::with_builtin_handlers();
    let tuning = Tuning::default();

    let mut parser = SourceParser::new(&registry).unwrap();
    let language = registry
        .detect_language(std::path::Path::new(file_path))
        .expect("fixture language");
    let nodes = parser.extract_raw_nodes(&language, file_path, new_source).unwrap();

    let (ctx, frames) = parse_single_file(&registry, tuning.clone(), "repo", file_path, &nodes);

    let old_ids: Vec<FrameId> = store
        .frames_in_file(file_path)
        .unwrap()
        .into_iter()
        .map(|row| row.id)
        .collect();
    let diff = DiffCalculator::new().compute(&old_ids, &ctx.arena, &frames);

    // Caller precondition: deleted code is detach-deleted, fresh frames are
    // inserted, before repair runs
    let deleted: Vec<FrameId> = diff.deleted_ids.iter().cloned().collect();
    store.delete_frames(&deleted).unwrap();
    let added_rows: Vec<FrameRow> = diff
        .added
        .iter()
        .map(|&key| FrameRow::from_frame(&ctx.arena[key]))
        .collect();
    store.insert_frames(&added_rows).unwrap();

    let engine = RepairEngine::new(store, &registry, &tuning);
    engine.repair(&ctx.arena, &diff, file_path, &ctx.edges, &nodes)
}

const SHAPES_V1: &str = "class Base:\n    pass\n\nclass Foo(Base):\n    def area(self):\n        return 1\n";
const SHAPES_V2: &str = "class Base:\n    pass\n\nclass Foo(NewBase):\n    def area(self):\n        return 1\n";

#[test]
fn inheritance_only_edit_keeps_id_and_repoints_edge() {
    let store = build_and_persist(&[("src/pkg/shapes.py", SHAPES_V1)]);

    let foo_before = store
        .find_by_kind_and_qualified_name(FrameKind::Class, "repo.python_root.pkg.Foo")
        .unwrap()
        .expect("Foo persisted");

    let outcome = reparse_and_repair(&store, "src/pkg/shapes.py", SHAPES_V2);
    assert!(outcome.errors.is_empty(), "repair errors: {:?}", outcome.errors);

    // Identity survived the base-list edit: same id, nothing added
    let foo_after = store
        .find_by_kind_and_qualified_name(FrameKind::Class, "repo.python_root.pkg.Foo")
        .unwrap()
        .expect("Foo still persisted");
    assert_eq!(foo_before.id, foo_after.id);

    // Yet the INHERITS edge was repointed: exactly one, targeting NewBase
    let inherits: Vec<_> = store
        .edges_by_kind(EdgeKind::Inherits)
        .unwrap()
        .into_iter()
        .filter(|e| e.subject == foo_after.id)
        .collect();
    assert_eq!(inherits.len(), 1);

    let target = store.frame_by_id(&inherits[0].object).unwrap().unwrap();
    assert_eq!(target.name.as_deref(), Some("NewBase"));

    let base = store
        .find_by_kind_and_qualified_name(FrameKind::Class, "repo.python_root.pkg.Base")
        .unwrap()
        .unwrap();
    assert!(inherits.iter().all(|e| e.object != base.id));
}

#[test]
fn inherits_repair_is_idempotent() {
    let store = build_and_persist(&[("src/pkg/shapes.py", SHAPES_V1)]);

    reparse_and_repair(&store, "src/pkg/shapes.py", SHAPES_V2);
    let first: Vec<_> = store.edges_by_kind(EdgeKind::Inherits).unwrap();

    reparse_and_repair(&store, "src/pkg/shapes.py", SHAPES_V2);
    let second: Vec<_> = store.edges_by_kind(EdgeKind::Inherits).unwrap();

    assert_eq!(first.len(), second.len());
    let ids = |edges: &[framegraph::storage::EdgeRow]| {
        let mut pairs: Vec<(String, String)> = edges
            .iter()
            .map(|e| (e.subject.to_string(), e.object.to_string()))
            .collect();
        pairs.sort();
        pairs
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn body_edit_recomputes_calls_against_store() {
    let store = build_and_persist(&[
        ("src/util/helpers.py", "def helper():\n    return 1\n"),
        ("src/app/main.py", "def run():\n    return 1\n"),
    ]);
    assert!(store.edges_by_kind(EdgeKind::Calls).unwrap().is_empty());

    let outcome = reparse_and_repair(
        &store,
        "src/app/main.py",
        "def run():\n    return helper()\n",
    );
    assert!(outcome.errors.is_empty(), "repair errors: {:?}", outcome.errors);
    assert_eq!(outcome.calls_edges_added, 1);

    let helper = store
        .find_by_kind_and_qualified_name(FrameKind::Callable, "repo.python_root.util.helper")
        .unwrap()
        .unwrap();
    let run = store
        .find_by_kind_and_qualified_name(FrameKind::Callable, "repo.python_root.app.run")
        .unwrap()
        .unwrap();

    let calls = store.edges_by_kind(EdgeKind::Calls).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].subject, run.id);
    assert_eq!(calls[0].object, helper.id);
}

#[test]
fn body_edit_recomputes_uses_for_added_callable() {
    const COUNTER_V1: &str = "class Counter:\n    def __init__(self):\n        self.count = 0\n    def bump(self):\n        self.count = self.count + 1\n";
    const COUNTER_V2: &str = "class Counter:\n    def __init__(self):\n        self.count = 0\n    def bump(self):\n        self.count = self.count + 2\n";

    let store = build_and_persist(&[("src/pkg/counter.py", COUNTER_V1)]);

    let outcome = reparse_and_repair(&store, "src/pkg/counter.py", COUNTER_V2);
    assert!(outcome.errors.is_empty(), "repair errors: {:?}", outcome.errors);
    assert!(outcome.uses_edges_added > 0);

    let bump = store
        .find_by_kind_and_qualified_name(FrameKind::Callable, "repo.python_root.pkg.Counter.bump")
        .unwrap()
        .unwrap();
    let uses: Vec<_> = store
        .edges_by_kind(EdgeKind::Uses)
        .unwrap()
        .into_iter()
        .filter(|e| e.subject == bump.id)
        .collect();
    assert!(!uses.is_empty());
    assert!(uses.iter().all(|e| e.metadata["field_name"] == "count"));
}

#[test]
fn unchanged_file_repair_leaves_store_stable() {
    let store = build_and_persist(&[("src/pkg/shapes.py", SHAPES_V1)]);

    let frames_before = store.count_frames().unwrap();
    let edges_before = store.count_edges().unwrap();

    let outcome = reparse_and_repair(&store, "src/pkg/shapes.py", SHAPES_V1);
    assert!(outcome.errors.is_empty());
    assert!(outcome.warnings.is_empty());

    assert_eq!(store.count_frames().unwrap(), frames_before);
    assert_eq!(store.count_edges().unwrap(), edges_before);
}
