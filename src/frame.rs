//! Frame types - the nodes of the semantic code graph
//!
//! Every code construct becomes one frame: the codebase root, per-language
//! roots, packages, classes, callables, control-flow blocks, and variables.
//! Frames carry a stable content- or position-derived id so that re-parsing a
//! file reproduces the same identity for unchanged constructs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::confidence::{tier_of, ConfidenceTier};
use crate::graph::FrameKey;

/// Semantic frame types.
///
/// Structural kinds (PACKAGE, CLASS, CALLABLE) carry handler-extracted names;
/// control-flow kinds use positional names derived from their location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameKind {
    /// Root frame of an indexed source tree
    Codebase,
    /// Per-language root (python_root, cpp_root, ...)
    Language,
    /// Package, module, or namespace
    Package,
    /// Class, struct, union, enum, interface
    Class,
    /// Function, method, constructor, lambda
    Callable,
    /// Variable declaration
    Variable,

    // Control flow
    IfBlock,
    ElifBlock,
    ElseBlock,
    ForLoop,
    WhileLoop,
    TryBlock,
    ExceptBlock,
    FinallyBlock,
    SwitchBlock,
    CaseBlock,
    WithBlock,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Codebase => "CODEBASE",
            FrameKind::Language => "LANGUAGE",
            FrameKind::Package => "PACKAGE",
            FrameKind::Class => "CLASS",
            FrameKind::Callable => "CALLABLE",
            FrameKind::Variable => "VARIABLE",
            FrameKind::IfBlock => "IF_BLOCK",
            FrameKind::ElifBlock => "ELIF_BLOCK",
            FrameKind::ElseBlock => "ELSE_BLOCK",
            FrameKind::ForLoop => "FOR_LOOP",
            FrameKind::WhileLoop => "WHILE_LOOP",
            FrameKind::TryBlock => "TRY_BLOCK",
            FrameKind::ExceptBlock => "EXCEPT_BLOCK",
            FrameKind::FinallyBlock => "FINALLY_BLOCK",
            FrameKind::SwitchBlock => "SWITCH_BLOCK",
            FrameKind::CaseBlock => "CASE_BLOCK",
            FrameKind::WithBlock => "WITH_BLOCK",
        }
    }

    /// Control-flow frame kinds (conditionals, loops, exception handling).
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            FrameKind::IfBlock
                | FrameKind::ElifBlock
                | FrameKind::ElseBlock
                | FrameKind::ForLoop
                | FrameKind::WhileLoop
                | FrameKind::TryBlock
                | FrameKind::ExceptBlock
                | FrameKind::FinallyBlock
                | FrameKind::SwitchBlock
                | FrameKind::CaseBlock
                | FrameKind::WithBlock
        )
    }

    /// Structural kinds that create semantic context and carry real names.
    pub fn is_structural(&self) -> bool {
        matches!(self, FrameKind::Class | FrameKind::Callable | FrameKind::Package)
    }

    /// Kinds that push a new scope level when built; their children nest
    /// inside them in the hierarchy.
    pub fn creates_scope(&self) -> bool {
        self.is_structural() || self.is_control_flow()
    }

    /// Whether the name comes from the language handler (structural kinds)
    /// rather than from the frame's position.
    pub fn has_semantic_name(&self) -> bool {
        self.is_structural()
    }
}

impl FromStr for FrameKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CODEBASE" => Ok(FrameKind::Codebase),
            "LANGUAGE" => Ok(FrameKind::Language),
            "PACKAGE" => Ok(FrameKind::Package),
            "CLASS" => Ok(FrameKind::Class),
            "CALLABLE" => Ok(FrameKind::Callable),
            "VARIABLE" => Ok(FrameKind::Variable),
            "IF_BLOCK" => Ok(FrameKind::IfBlock),
            "ELIF_BLOCK" => Ok(FrameKind::ElifBlock),
            "ELSE_BLOCK" => Ok(FrameKind::ElseBlock),
            "FOR_LOOP" => Ok(FrameKind::ForLoop),
            "WHILE_LOOP" => Ok(FrameKind::WhileLoop),
            "TRY_BLOCK" => Ok(FrameKind::TryBlock),
            "EXCEPT_BLOCK" => Ok(FrameKind::ExceptBlock),
            "FINALLY_BLOCK" => Ok(FrameKind::FinallyBlock),
            "SWITCH_BLOCK" => Ok(FrameKind::SwitchBlock),
            "CASE_BLOCK" => Ok(FrameKind::CaseBlock),
            "WITH_BLOCK" => Ok(FrameKind::WithBlock),
            _ => Err(crate::Error::Parse(format!("Unknown frame kind: {}", s))),
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Directly parsed from source
    Parsed,
    /// Created from an import/declaration
    Imported,
    /// Inferred (synthesized package tails, heuristic resolution)
    Inferred,
    /// External placeholder for an unresolved reference target
    External,
    /// Minimal frame created after a parse failure
    ParseFailed,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Parsed => "parsed",
            Provenance::Imported => "imported",
            Provenance::Inferred => "inferred",
            Provenance::External => "external",
            Provenance::ParseFailed => "parse_failed",
        }
    }
}

impl FromStr for Provenance {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parsed" => Ok(Provenance::Parsed),
            "imported" => Ok(Provenance::Imported),
            "inferred" => Ok(Provenance::Inferred),
            "external" => Ok(Provenance::External),
            "parse_failed" => Ok(Provenance::ParseFailed),
            _ => Err(crate::Error::Parse(format!("Unknown provenance: {}", s))),
        }
    }
}

/// Stable frame identity: 16 hex chars of a blake3 content/position hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(String);

impl FrameId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FrameId {
    fn from(s: &str) -> Self {
        FrameId(s.to_string())
    }
}

impl From<String> for FrameId {
    fn from(s: String) -> Self {
        FrameId(s)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field declared on a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub declared_type: Option<String>,
    pub line: u32,
    pub confidence: f32,
}

/// A parameter of a callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub declared_type: Option<String>,
    pub default_value: Option<String>,
    pub position: u32,
}

/// Type-specific payload carried by CLASS and CALLABLE frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FramePayload {
    #[default]
    None,
    Class {
        instance_fields: Vec<FieldInfo>,
        static_fields: Vec<FieldInfo>,
    },
    Callable {
        parameters: Vec<ParameterInfo>,
        return_type: Option<String>,
    },
}

impl FramePayload {
    /// All declared field names (instance + static) for a class payload.
    pub fn field_names(&self) -> Vec<String> {
        match self {
            FramePayload::Class {
                instance_fields,
                static_fields,
            } => instance_fields
                .iter()
                .chain(static_fields.iter())
                .map(|f| f.name.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A node in the semantic code graph.
///
/// Parent/child links are managed by [`crate::graph::FrameArena`]; the three
/// parent-side views (by id, by qualified name, ordered list) are kept in
/// sync by `attach` and must not be mutated directly.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub kind: FrameKind,
    pub name: Option<String>,
    pub qualified_name: Option<String>,

    pub confidence: f32,
    pub provenance: Provenance,
    /// Which resolution pass created this frame
    pub resolution_pass: u8,

    // Source location
    pub file_path: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: Option<String>,

    pub language: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub payload: FramePayload,

    // Multi-parent ownership: three synchronized views plus children.
    // The first element of `parents` is the primary parent.
    pub(crate) parents_by_id: HashMap<FrameId, FrameKey>,
    pub(crate) parents_by_qualified_name: HashMap<String, FrameKey>,
    pub(crate) parents: Vec<FrameKey>,
    pub(crate) children: Vec<FrameKey>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            id: FrameId(String::new()),
            kind,
            name: None,
            qualified_name: None,
            confidence: 1.0,
            provenance: Provenance::Parsed,
            resolution_pass: 1,
            file_path: None,
            start_line: 0,
            end_line: 0,
            start_byte: 0,
            end_byte: 0,
            content: None,
            language: None,
            metadata: serde_json::Map::new(),
            payload: FramePayload::default(),
            parents_by_id: HashMap::new(),
            parents_by_qualified_name: HashMap::new(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_location(
        mut self,
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        start_byte: usize,
        end_byte: usize,
    ) -> Self {
        self.file_path = Some(file_path.into());
        self.start_line = start_line;
        self.end_line = end_line;
        self.start_byte = start_byte;
        self.end_byte = end_byte;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_payload(mut self, payload: FramePayload) -> Self {
        self.payload = payload;
        self
    }

    /// Confidence tier, recomputed from the raw confidence.
    pub fn tier(&self) -> ConfidenceTier {
        tier_of(self.confidence)
    }

    /// Ordered parent keys; the first entry is the primary parent.
    pub fn parents(&self) -> &[FrameKey] {
        &self.parents
    }

    pub fn children(&self) -> &[FrameKey] {
        &self.children
    }

    pub fn has_parent(&self, id: &FrameId) -> bool {
        self.parents_by_id.contains_key(id)
    }

    /// Number of parents in the by-id view; must agree with `parents()`.
    pub fn parent_count_by_id(&self) -> usize {
        self.parents_by_id.len()
    }

    /// Compute the stable id for this frame and store it.
    ///
    /// Control-flow frames hash (file path, scope, kind) only, so edits to
    /// their body never change identity. Semantic frames additionally hash
    /// normalized content: identity survives formatting and comment edits but
    /// changes on any structural edit. A class's base-class list is stripped
    /// before hashing, so inheritance-only edits keep the class id stable.
    pub fn compute_id(&mut self) -> FrameId {
        let scope = self
            .qualified_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("anonymous");
        let file = self.file_path.as_deref().unwrap_or("unknown");

        let key = if self.kind.is_control_flow() {
            // Position-based only: no content component
            format!("{}::{}::{}", file, scope, self.kind.as_str())
        } else {
            let normalized = self
                .content
                .as_deref()
                .map(|c| normalize_content(c, self.kind))
                .unwrap_or_default();
            format!("{}::{}::{}::{}", file, scope, self.kind.as_str(), normalized)
        };

        let hash = blake3::hash(key.as_bytes());
        let hex = hash.to_hex();
        let id = FrameId(hex.as_str()[..16].to_string());
        self.id = id.clone();
        id
    }

    /// Frame heading: the declaration/signature line, separate from the body.
    pub fn heading(&self) -> String {
        let Some(content) = self.content.as_deref() else {
            return String::new();
        };

        if self.kind.is_control_flow() {
            // Control-flow content is already the first line only
            return content.to_string();
        }

        for line in content.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            if stripped.starts_with('#')
                || stripped.starts_with("//")
                || stripped.starts_with("/*")
                || stripped.starts_with('@')
                || stripped.starts_with("import ")
                || stripped.starts_with("from ")
            {
                continue;
            }
            return stripped.to_string();
        }

        content.lines().next().unwrap_or("").to_string()
    }
}

static PY_DOCSTRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*("""[\s\S]*?"""|'''[\s\S]*?''')\s*$"#).expect("docstring regex")
});

static PY_BASE_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\s*class\s+\w+)\s*\([^)]*\)").expect("base list regex"));

static CPP_BASE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*(?:class|struct)\s+\w+(?:\s+final)?)\s*:\s*[^{\n]+").expect("base clause regex")
});

/// Strip the inheritance/extends clause from a class header.
///
/// `class Foo(Base):` → `class Foo:` and `class Foo : public Base {` →
/// `class Foo {`. Identity must not depend on the base-class list; the
/// incremental INHERITS repair relies on this.
pub fn strip_inheritance_clause(content: &str) -> String {
    let content = PY_BASE_LIST.replace(content, "$1");
    let content = CPP_BASE_LIST.replace(&content, "$1");
    content.into_owned()
}

/// Normalize content for stable hashing.
///
/// Removes docstring-only blocks, blank lines, comment-only lines, trailing
/// line comments (with a naive quote-balance check), and all whitespace.
/// Comment detection is heuristic and can misfire inside string literals;
/// acceptable while identity-stability bugs stay theoretical.
pub fn normalize_content(content: &str, kind: FrameKind) -> String {
    let content = if kind == FrameKind::Class {
        strip_inheritance_clause(content)
    } else {
        content.to_string()
    };

    let content = PY_DOCSTRING.replace_all(&content, "");

    let mut normalized_lines = Vec::new();
    for line in content.lines() {
        let mut stripped = line.trim().to_string();
        if stripped.is_empty() {
            continue;
        }
        if stripped.starts_with('#') || stripped.starts_with("//") {
            continue;
        }

        for marker in ["#", "//"] {
            if let Some(pos) = stripped.find(marker) {
                let before = &stripped[..pos];
                if quotes_balanced(before) {
                    stripped = before.trim_end().to_string();
                }
            }
        }
        if stripped.is_empty() {
            continue;
        }

        // Remove all whitespace so `f(x, y)` and `f(x,y)` hash identically
        let collapsed: String = stripped.split_whitespace().collect();
        if !collapsed.is_empty() {
            normalized_lines.push(collapsed);
        }
    }

    normalized_lines.join("\n")
}

fn quotes_balanced(text: &str) -> bool {
    let doubles = text.matches('"').count() - text.matches("\\\"").count();
    let singles = text.matches('\'').count() - text.matches("\\'").count();
    doubles % 2 == 0 && singles % 2 == 0
}
