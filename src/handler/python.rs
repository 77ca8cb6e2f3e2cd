//! Python language handler

use std::sync::LazyLock;

use regex::Regex;

use super::{
    clean_name, AccessKind, CallSite, FieldPattern, FieldUsage, ImportStatement, LanguageHandler,
};
use crate::frame::{FieldInfo, FrameKind, ParameterInfo};
use crate::parse::ParseHandle;
use crate::Result;

pub struct PythonHandler;

impl PythonHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonHandler {
    fn default() -> Self {
        Self::new()
    }
}

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+([A-Za-z_][\w.]*(?:\s*,\s*[A-Za-z_][\w.]*)*(?:\s+as\s+\w+)?)")
        .expect("import regex")
});

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*from\s+((?:\.+)?[A-Za-z_][\w.]*|\.+)\s+import\s+(.+)").expect("from-import regex")
});

static BASE_CLASSES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+\w+\s*\((.*?)\)").expect("base classes regex"));

static INSTANCE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*self\.([A-Za-z_]\w*)\s*(?::\s*([^=\n]+?)\s*)?=[^=]").expect("instance field regex")
});

static STATIC_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]+([A-Za-z_]\w*)\s*(?::\s*([^=\n]+?)\s*)?=[^=]").expect("static field regex")
});

static RETURN_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"->\s*([^:\n]+?)\s*:").expect("return type regex"));

impl LanguageHandler for PythonHandler {
    fn language(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".py", ".pyi", ".pyw"]
    }

    fn frame_mapping(&self, node_type: &str) -> Option<FrameKind> {
        match node_type {
            "function_definition" | "async_function_definition" => Some(FrameKind::Callable),
            "class_definition" => Some(FrameKind::Class),
            "if_statement" => Some(FrameKind::IfBlock),
            "elif_clause" => Some(FrameKind::ElifBlock),
            "else_clause" => Some(FrameKind::ElseBlock),
            "for_statement" => Some(FrameKind::ForLoop),
            "while_statement" => Some(FrameKind::WhileLoop),
            "try_statement" => Some(FrameKind::TryBlock),
            "except_clause" => Some(FrameKind::ExceptBlock),
            "finally_clause" => Some(FrameKind::FinallyBlock),
            "with_statement" => Some(FrameKind::WithBlock),
            "match_statement" => Some(FrameKind::SwitchBlock),
            "case_clause" => Some(FrameKind::CaseBlock),
            _ => None,
        }
    }

    fn extract_class_name(&self, content: &str) -> Option<String> {
        let first_line = first_significant_line(content)?;
        let mut parts = first_line.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "class" {
                return parts.next().and_then(|name| clean_name(name, &['(', ':', '{', '<']));
            }
        }
        None
    }

    fn extract_callable_name(&self, content: &str) -> Option<String> {
        let first_line = first_significant_line(content)?;
        let mut parts = first_line.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "def" {
                return parts.next().and_then(|name| clean_name(name, &['(', ':']));
            }
        }
        None
    }

    fn extract_package_name(&self, _content: &str) -> Option<String> {
        // Python packages come from directory structure, not declarations
        None
    }

    fn separator(&self) -> &'static str {
        "."
    }

    fn extract_package_hierarchy_from_path(&self, file_path: &str, _codebase_root: &str) -> Vec<String> {
        let path = std::path::Path::new(file_path);
        let components: Vec<&str> = path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();

        let mut package_parts = Vec::new();
        let mut found_root = false;

        // Exclude the file name itself
        for part in components.iter().take(components.len().saturating_sub(1)) {
            if ["src", "lib", "python"].contains(part) {
                found_root = true;
                continue;
            }
            if found_root && *part != "__pycache__" {
                package_parts.push(part.to_string());
            }
        }

        package_parts
    }

    fn extract_package_from_content(&self, _content: &str) -> Option<String> {
        None
    }

    fn extract_imports(&self, content: &str) -> Result<Vec<ImportStatement>> {
        let mut imports = Vec::new();

        for captures in IMPORT_RE.captures_iter(content) {
            let modules = &captures[1];
            for module in modules.split(',') {
                let module = module.trim();
                if let Some((name, alias)) = module.split_once(" as ") {
                    imports.push(ImportStatement::new(name.trim()).with_alias(alias.trim()));
                } else {
                    imports.push(ImportStatement::new(module));
                }
            }
        }

        for captures in FROM_IMPORT_RE.captures_iter(content) {
            let module = captures[1].trim().to_string();
            let names = captures[2].trim();

            if names == "*" {
                imports.push(ImportStatement::new(module).wildcard());
                continue;
            }

            let names = names.trim_start_matches('(').trim_end_matches(')');
            for name in names.split(',') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                // `from . import x` joins as `.x`; `from .pkg import x` as `.pkg.x`
                let joined = if module.ends_with('.') {
                    format!("{}{}", module, name_part(name))
                } else {
                    format!("{}.{}", module, name_part(name))
                };
                if let Some((_, alias)) = name.split_once(" as ") {
                    imports.push(ImportStatement::new(joined).with_alias(alias.trim()));
                } else {
                    imports.push(ImportStatement::new(joined));
                }
            }
        }

        Ok(imports)
    }

    fn extract_base_classes(&self, content: &str) -> Result<Vec<String>> {
        let Some(first_line) = first_significant_line(content) else {
            return Ok(Vec::new());
        };

        let Some(captures) = BASE_CLASSES_RE.captures(first_line) else {
            return Ok(Vec::new());
        };

        let bases = captures[1]
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.starts_with("metaclass="))
            .map(str::to_string)
            .collect();
        Ok(bases)
    }

    fn extract_call_sites(&self, _content: &str, handle: ParseHandle<'_>) -> Result<Vec<CallSite>> {
        let mut call_sites = Vec::new();

        for node in handle.contained_of_type("call") {
            if let Some(name) = callee_name(&node.content) {
                call_sites.push(CallSite {
                    name,
                    line: node.start_line,
                });
            }
        }

        Ok(call_sites)
    }

    fn extract_field_usages(
        &self,
        _content: &str,
        handle: ParseHandle<'_>,
        field_names: &[String],
    ) -> Result<Vec<FieldUsage>> {
        let mut usages = Vec::new();

        for node in handle.contained_of_type("attribute") {
            let text = node.content.trim();
            let Some((receiver, rest)) = text.split_once('.') else {
                continue;
            };
            if receiver != "self" && receiver != "cls" {
                continue;
            }
            // `self.a.b` touches field `a`
            let field = rest.split('.').next().unwrap_or(rest).trim();
            if !field_names.iter().any(|f| f == field) {
                continue;
            }

            let access = attribute_access_kind(&handle, node);
            usages.push(FieldUsage {
                field: field.to_string(),
                line: node.start_line,
                access,
                pattern: FieldPattern::Explicit,
            });
        }

        Ok(usages)
    }

    fn extract_instance_fields(&self, class_content: &str) -> Vec<FieldInfo> {
        let mut fields: Vec<FieldInfo> = Vec::new();
        for captures in INSTANCE_FIELD_RE.captures_iter(class_content) {
            let name = captures[1].to_string();
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            let line = line_of_match(class_content, captures.get(0).map(|m| m.start()).unwrap_or(0));
            fields.push(FieldInfo {
                name,
                declared_type: captures.get(2).map(|m| m.as_str().trim().to_string()),
                line,
                confidence: 1.0,
            });
        }
        fields
    }

    fn extract_static_fields(&self, class_content: &str) -> Vec<FieldInfo> {
        let mut fields: Vec<FieldInfo> = Vec::new();
        let mut in_method = false;

        for (idx, line) in class_content.lines().enumerate() {
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();

            if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
                in_method = true;
                continue;
            }
            // Back at class-body indentation ends the method
            if in_method && indent <= 4 && !trimmed.is_empty() {
                in_method = false;
            }
            if in_method || indent != 4 {
                continue;
            }

            if let Some(captures) = STATIC_FIELD_RE.captures(line) {
                let name = captures[1].to_string();
                if name == "self" || fields.iter().any(|f| f.name == name) {
                    continue;
                }
                fields.push(FieldInfo {
                    name,
                    declared_type: captures.get(2).map(|m| m.as_str().trim().to_string()),
                    line: idx as u32 + 1,
                    confidence: 1.0,
                });
            }
        }
        fields
    }

    fn extract_parameters(&self, callable_content: &str) -> Vec<ParameterInfo> {
        let Some(params_str) = signature_parameters(callable_content) else {
            return Vec::new();
        };

        let mut parameters = Vec::new();
        for (position, raw) in split_parameters(&params_str).into_iter().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() || raw == "self" || raw == "cls" || raw.starts_with('*') {
                continue;
            }

            let (head, default_value) = match raw.split_once('=') {
                Some((h, d)) => (h.trim(), Some(d.trim().to_string())),
                None => (raw, None),
            };
            let (name, declared_type) = match head.split_once(':') {
                Some((n, t)) => (n.trim(), Some(t.trim().to_string())),
                None => (head, None),
            };
            if name.is_empty() {
                continue;
            }

            parameters.push(ParameterInfo {
                name: name.to_string(),
                declared_type,
                default_value,
                position: position as u32,
            });
        }
        parameters
    }

    fn extract_return_type(&self, callable_content: &str) -> Option<String> {
        let signature = signature_text(callable_content)?;
        RETURN_TYPE_RE
            .captures(&signature)
            .map(|c| c[1].trim().to_string())
    }
}

fn first_significant_line(content: &str) -> Option<&str> {
    content.lines().map(str::trim).find(|l| !l.is_empty())
}

/// `name` or `name as alias` → `name`
fn name_part(name: &str) -> &str {
    name.split_once(" as ").map(|(n, _)| n.trim()).unwrap_or(name)
}

/// Callee text of a call node: everything before the argument list,
/// whitespace collapsed. `obj.method(x)` → `obj.method`.
fn callee_name(call_content: &str) -> Option<String> {
    let head = call_content.split('(').next()?.trim();
    if head.is_empty() {
        return None;
    }
    let collapsed: String = head.split_whitespace().collect();
    // Reject subscripts and other non-name callees
    if collapsed.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        Some(collapsed)
    } else {
        None
    }
}

/// Read/write classification via the enclosing assignment node.
fn attribute_access_kind(handle: &ParseHandle<'_>, node: &crate::parse::RawNode) -> AccessKind {
    let Some(parent_idx) = node.parent else {
        return AccessKind::Read;
    };
    let Some(parent) = handle.node(parent_idx) else {
        return AccessKind::Read;
    };

    // Left side of an assignment starts where the assignment starts
    match parent.node_type.as_str() {
        "assignment" if parent.start_byte == node.start_byte => AccessKind::Write,
        "augmented_assignment" if parent.start_byte == node.start_byte => AccessKind::ReadWrite,
        _ => AccessKind::Read,
    }
}

fn signature_text(callable_content: &str) -> Option<String> {
    let def_pos = callable_content.find("def ")?;
    let rest = &callable_content[def_pos..];
    let colon = matching_signature_end(rest)?;
    Some(rest[..=colon].to_string())
}

fn signature_parameters(callable_content: &str) -> Option<String> {
    let signature = signature_text(callable_content)?;
    let open = signature.find('(')?;
    let mut depth = 0usize;
    for (i, c) in signature[open..].char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(signature[open + 1..open + i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Position of the `:` that terminates a (possibly multi-line) signature.
fn matching_signature_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_parameters(params_str: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in params_str.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parameters.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parameters.push(current.trim().to_string());
    }
    parameters
}

fn line_of_match(content: &str, byte_offset: usize) -> u32 {
    content[..byte_offset].matches('\n').count() as u32 + 1
}
