//! Language handler framework
//!
//! One handler per supported source language. Handlers own all
//! language-specific logic — node-type mapping, name extraction, package
//! hierarchy, imports, base classes, call sites, field usages — so the core
//! never inspects raw source text itself.

pub mod cpp;
pub mod python;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::frame::{FieldInfo, FrameKind, ParameterInfo};
use crate::parse::ParseHandle;
use crate::Result;

/// An import statement extracted from source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub import_path: String,
    pub alias: Option<String>,
    pub is_wildcard: bool,
    pub line: Option<u32>,
}

impl ImportStatement {
    pub fn new(import_path: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            alias: None,
            is_wildcard: false,
            line: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.is_wildcard = true;
        self
    }
}

/// One call site inside a callable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee name as written, possibly dotted/scoped (`obj.method`)
    pub name: String,
    /// 1-indexed line relative to file start
    pub line: u32,
}

/// How a field access reads or writes the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::ReadWrite => "both",
        }
    }
}

/// Which detection pattern produced a field usage. Patterns differ in
/// reliability; see the multipliers in [`crate::config::Tuning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPattern {
    /// Explicit receiver: `self.field`, `this->field`
    Explicit,
    /// Uppercase-identifier heuristic for statics
    UppercaseHeuristic,
    /// Qualified identifier without class verification (`Class::field`)
    QualifiedStatic,
    /// Regex-based extraction fallback
    RegexBased,
}

impl FieldPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPattern::Explicit => "explicit",
            FieldPattern::UppercaseHeuristic => "uppercase_heuristic",
            FieldPattern::QualifiedStatic => "qualified_static",
            FieldPattern::RegexBased => "regex_based",
        }
    }
}

/// One field usage site inside a callable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUsage {
    pub field: String,
    pub line: u32,
    pub access: AccessKind,
    pub pattern: FieldPattern,
}

/// Language-specific operations behind one closed interface.
///
/// Implementations are registered in a [`HandlerRegistry`] at startup and
/// selected by file extension; this is the crate's one bounded extension
/// point.
pub trait LanguageHandler: Send + Sync {
    /// Language name used for registry keys and frame tagging.
    fn language(&self) -> &'static str;

    /// File extensions (with leading dot) this handler owns.
    fn file_extensions(&self) -> &'static [&'static str];

    /// Map a parser-native node type to a semantic frame kind; None means
    /// the node is passed through without materializing a frame.
    fn frame_mapping(&self, node_type: &str) -> Option<FrameKind>;

    // Name extraction

    fn extract_class_name(&self, content: &str) -> Option<String>;
    fn extract_callable_name(&self, content: &str) -> Option<String>;
    fn extract_package_name(&self, content: &str) -> Option<String>;

    /// Language-specific qualified-name separator (`.` or `::`).
    fn separator(&self) -> &'static str;

    /// Compose a qualified name from a context path and a simple name.
    fn build_qualified_name(&self, context_path: &[String], name: &str) -> String {
        let mut parts: Vec<&str> = context_path.iter().map(|s| s.as_str()).collect();
        parts.push(name);
        parts.join(".")
    }

    // Package hierarchy

    /// Package parts (base to leaf) derived from a file's path.
    fn extract_package_hierarchy_from_path(&self, file_path: &str, codebase_root: &str) -> Vec<String>;

    /// Package/namespace declaration found in file content, if the language
    /// has one.
    fn extract_package_from_content(&self, content: &str) -> Option<String>;

    // Cross references

    fn extract_imports(&self, content: &str) -> Result<Vec<ImportStatement>>;

    fn extract_base_classes(&self, content: &str) -> Result<Vec<String>>;

    fn extract_call_sites(&self, content: &str, handle: ParseHandle<'_>) -> Result<Vec<CallSite>>;

    fn extract_field_usages(
        &self,
        content: &str,
        handle: ParseHandle<'_>,
        field_names: &[String],
    ) -> Result<Vec<FieldUsage>>;

    // Structured payloads

    fn extract_instance_fields(&self, class_content: &str) -> Vec<FieldInfo>;
    fn extract_static_fields(&self, class_content: &str) -> Vec<FieldInfo>;
    fn extract_parameters(&self, callable_content: &str) -> Vec<ParameterInfo>;
    fn extract_return_type(&self, callable_content: &str) -> Option<String>;

    // Split declaration/definition languages

    /// Whether the language separates declarations from definitions across
    /// files (header/implementation pairs). Drives the cross-file relink
    /// pass.
    fn has_split_definitions(&self) -> bool {
        false
    }

    /// Class scope extracted from a definition signature
    /// (`Logger::log(...)` → `Logger`); None for free functions.
    fn extract_class_scope(&self, _callable_content: &str) -> Option<String> {
        None
    }
}

/// Helper shared by handlers: strip terminators and whitespace from an
/// extracted name, returning None when nothing identifier-like remains.
pub(crate) fn clean_name(name: &str, terminators: &[char]) -> Option<String> {
    let mut name = name.to_string();
    for &term in terminators {
        if let Some(pos) = name.find(term) {
            name.truncate(pos);
        }
    }
    let name: String = name.split_whitespace().collect();
    if is_valid_identifier(&name) {
        Some(name)
    } else {
        None
    }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Registry of language handlers, selected by file extension.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn LanguageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in handlers.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(python::PythonHandler::new());
        registry.register(cpp::CppHandler::new());
        registry
    }

    pub fn register(&mut self, handler: impl LanguageHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Handler for a language name.
    pub fn get(&self, language: &str) -> Option<&dyn LanguageHandler> {
        self.handlers
            .iter()
            .find(|h| h.language() == language)
            .map(|h| h.as_ref())
    }

    /// Detect language from a file path's extension.
    pub fn detect_language(&self, path: &Path) -> Option<String> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        let dotted = format!(".{}", ext);
        self.handlers
            .iter()
            .find(|h| h.file_extensions().contains(&dotted.as_str()))
            .map(|h| h.language().to_string())
    }

    pub fn supported_languages(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.language().to_string()).collect()
    }

    pub fn all_extensions(&self) -> Vec<&'static str> {
        self.handlers
            .iter()
            .flat_map(|h| h.file_extensions().iter().copied())
            .collect()
    }
}
