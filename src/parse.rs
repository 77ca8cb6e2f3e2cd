//! Raw parse-tree extraction
//!
//! Pure tree-sitter → flat list. Each source file becomes an ordered
//! `Vec<RawNode>` of lightweight data holders (type string, location, text
//! slice, children indices). No relationships, no business logic, and no
//! tree-sitter lifetimes escape this module; downstream consumers treat the
//! array as read-only.

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Language, Node, Parser};

use crate::handler::HandlerRegistry;
use crate::{Error, Result};

/// One flattened parse-tree node.
///
/// `children` are indices into the same array the node came from; index 0 is
/// always the file's root node and spans the whole file.
#[derive(Debug, Clone)]
pub struct RawNode {
    /// Parser-native node type string (e.g. `function_definition`)
    pub node_type: String,
    /// 1-indexed
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: String,
    pub file_path: String,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

/// Borrowed view over one frame's slice of a file's raw nodes.
///
/// Handlers that need parse structure (call sites, field usages) walk the
/// nodes whose byte range falls inside the frame's range.
#[derive(Debug, Clone, Copy)]
pub struct ParseHandle<'a> {
    nodes: &'a [RawNode],
    start_byte: usize,
    end_byte: usize,
}

impl<'a> ParseHandle<'a> {
    pub fn new(nodes: &'a [RawNode], start_byte: usize, end_byte: usize) -> Self {
        Self {
            nodes,
            start_byte,
            end_byte,
        }
    }

    /// Handle spanning a whole file.
    pub fn whole_file(nodes: &'a [RawNode]) -> Self {
        let end = nodes.first().map(|n| n.end_byte).unwrap_or(0);
        Self::new(nodes, 0, end)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes fully contained in the handle's byte range.
    pub fn contained(&self) -> impl Iterator<Item = &'a RawNode> + '_ {
        let (start, end) = (self.start_byte, self.end_byte);
        self.nodes
            .iter()
            .filter(move |n| n.start_byte >= start && n.end_byte <= end)
    }

    /// Contained nodes of a specific type.
    pub fn contained_of_type(&self, node_type: &'a str) -> impl Iterator<Item = &'a RawNode> + '_ {
        self.contained().filter(move |n| n.node_type == node_type)
    }

    pub fn node(&self, index: usize) -> Option<&'a RawNode> {
        self.nodes.get(index)
    }
}

/// Tree-sitter based parser that produces flat raw-node arrays.
pub struct SourceParser {
    parsers: HashMap<String, Parser>,
}

impl SourceParser {
    /// Initialize parsers for every language the registry knows.
    pub fn new(registry: &HandlerRegistry) -> Result<Self> {
        let mut parsers = HashMap::new();
        for language in registry.supported_languages() {
            let grammar = grammar_for(&language)?;
            let mut parser = Parser::new();
            parser
                .set_language(&grammar)
                .map_err(|e| Error::Parse(format!("failed to load {} grammar: {}", language, e)))?;
            parsers.insert(language, parser);
        }
        Ok(Self { parsers })
    }

    /// Extract the flat raw-node array for one file's source text.
    pub fn extract_raw_nodes(
        &mut self,
        language: &str,
        file_path: &str,
        source: &str,
    ) -> Result<Vec<RawNode>> {
        let parser = self
            .parsers
            .get_mut(language)
            .ok_or_else(|| Error::UnknownLanguage(language.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::Parse(format!("tree-sitter produced no tree for {}", file_path)))?;

        let mut raw_nodes = Vec::new();
        visit_node(tree.root_node(), None, source, file_path, &mut raw_nodes);
        Ok(raw_nodes)
    }

    /// Read and extract a file from disk, detecting its language via the
    /// registry.
    pub fn extract_file(
        &mut self,
        registry: &HandlerRegistry,
        file_path: &Path,
    ) -> Result<(String, Vec<RawNode>)> {
        let language = registry
            .detect_language(file_path)
            .ok_or_else(|| Error::UnknownLanguage(file_path.display().to_string()))?;
        let source = std::fs::read_to_string(file_path)?;
        let nodes = self.extract_raw_nodes(&language, &file_path.to_string_lossy(), &source)?;
        Ok((language, nodes))
    }
}

fn grammar_for(language: &str) -> Result<Language> {
    match language {
        "python" => Ok(tree_sitter_python::LANGUAGE.into()),
        "cpp" => Ok(tree_sitter_cpp::LANGUAGE.into()),
        other => Err(Error::UnknownLanguage(other.to_string())),
    }
}

fn visit_node(
    node: Node,
    parent_idx: Option<usize>,
    source: &str,
    file_path: &str,
    raw_nodes: &mut Vec<RawNode>,
) -> usize {
    let current_idx = raw_nodes.len();

    let content = node
        .utf8_text(source.as_bytes())
        .unwrap_or_default()
        .to_string();

    raw_nodes.push(RawNode {
        node_type: node.kind().to_string(),
        // tree-sitter rows are 0-indexed
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        content,
        file_path: file_path.to_string(),
        children: Vec::new(),
        parent: parent_idx,
    });

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        let child_idx = visit_node(child, Some(current_idx), source, file_path, raw_nodes);
        raw_nodes[current_idx].children.push(child_idx);
    }

    current_idx
}

/// Discover source files under a root for every extension the registry
/// handles. Returns sorted paths.
pub fn discover_source_files(root: &Path, registry: &HandlerRegistry) -> Result<Vec<String>> {
    let mut source_files = Vec::new();

    for extension in registry.all_extensions() {
        let pattern = format!("{}/**/*{}", root.display(), extension);
        let paths = glob::glob(&pattern).map_err(|e| Error::Parse(e.to_string()))?;
        for entry in paths.flatten() {
            if entry.is_file() {
                source_files.push(entry.to_string_lossy().into_owned());
            }
        }
    }

    source_files.sort();
    Ok(source_files)
}
