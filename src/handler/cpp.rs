//! C++ language handler
//!
//! C++ splits declarations (.h) from definitions (.cpp); this handler
//! reports `has_split_definitions` and extracts the class scope from
//! `Class::method` signatures so the resolver can relink methods to their
//! classes across files.

use std::sync::LazyLock;

use regex::Regex;

use super::{
    clean_name, AccessKind, CallSite, FieldPattern, FieldUsage, ImportStatement, LanguageHandler,
};
use crate::frame::{FieldInfo, FrameKind, ParameterInfo};
use crate::parse::ParseHandle;
use crate::Result;

pub struct CppHandler;

impl CppHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CppHandler {
    fn default() -> Self {
        Self::new()
    }
}

static CLASS_SCOPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9_]*)::").expect("class scope regex"));

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"namespace\s+([A-Za-z_]\w*)\s*\{").expect("namespace regex"));

static BASE_CLAUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:class|struct)\s+\w+(?:\s+final)?\s*:\s*([^{]+)").expect("base clause regex"));

static ACCESS_SPECIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(public|private|protected|virtual)\b").expect("access specifier regex"));

static FIELD_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(static\s+)?(?:const\s+)?([A-Za-z_][\w:<>,\s*&]*?)\s+([A-Za-z_]\w*)\s*(?:=[^;]*)?;")
        .expect("field decl regex")
});

static THIS_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"this->([A-Za-z_]\w*)").expect("this field regex"));

static STATIC_FIELD_USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9_]*)::([A-Za-z_]\w*)").expect("static use regex"));

impl LanguageHandler for CppHandler {
    fn language(&self) -> &'static str {
        "cpp"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".c", ".h", ".cpp", ".cxx", ".cc", ".hpp", ".hh", ".hxx"]
    }

    fn frame_mapping(&self, node_type: &str) -> Option<FrameKind> {
        match node_type {
            // Includes constructors and destructors
            "function_definition" => Some(FrameKind::Callable),
            "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => {
                Some(FrameKind::Class)
            }
            "if_statement" => Some(FrameKind::IfBlock),
            "else_clause" => Some(FrameKind::ElseBlock),
            "for_statement" | "for_range_loop" => Some(FrameKind::ForLoop),
            "while_statement" => Some(FrameKind::WhileLoop),
            "switch_statement" => Some(FrameKind::SwitchBlock),
            "case_statement" => Some(FrameKind::CaseBlock),
            "try_statement" => Some(FrameKind::TryBlock),
            "catch_clause" => Some(FrameKind::ExceptBlock),
            _ => None,
        }
    }

    fn extract_class_name(&self, content: &str) -> Option<String> {
        let first_line = first_significant_line(content)?;
        for keyword in ["class", "struct", "union", "enum"] {
            let mut parts = first_line.split_whitespace().peekable();
            while let Some(part) = parts.next() {
                if part == keyword {
                    // `enum class Color` names the class token after `class`
                    let mut candidate = parts.peek().copied()?;
                    if keyword == "enum" && (candidate == "class" || candidate == "struct") {
                        parts.next();
                        candidate = parts.peek().copied()?;
                    }
                    return clean_name(candidate, &['{', ':', '<', ';']);
                }
            }
        }
        None
    }

    fn extract_callable_name(&self, content: &str) -> Option<String> {
        let signature = first_significant_line(content)?;

        // `Logger::log(...)` → `log`; `~Logger()` → `~Logger`
        let before_parens = signature.split('(').next()?;
        let last_token = before_parens.split_whitespace().last()?;
        let name = last_token.rsplit("::").next().unwrap_or(last_token);
        let name = name.trim_start_matches('*').trim_start_matches('&');

        if let Some(stripped) = name.strip_prefix('~') {
            return clean_name(stripped, &['{', ';']).map(|n| format!("~{}", n));
        }
        clean_name(name, &['{', ';', '<'])
    }

    fn extract_package_name(&self, content: &str) -> Option<String> {
        let first_line = first_significant_line(content)?;
        NAMESPACE_RE
            .captures(first_line)
            .map(|c| c[1].to_string())
            .or_else(|| {
                let mut parts = first_line.split_whitespace();
                while let Some(part) = parts.next() {
                    if part == "namespace" {
                        return parts.next().and_then(|n| clean_name(n, &['{', ';']));
                    }
                }
                None
            })
    }

    fn separator(&self) -> &'static str {
        "::"
    }

    fn extract_package_hierarchy_from_path(&self, file_path: &str, _codebase_root: &str) -> Vec<String> {
        let path = std::path::Path::new(file_path);
        let components: Vec<&str> = path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();

        let mut package_parts = Vec::new();
        let mut found_root = false;

        for part in components.iter().take(components.len().saturating_sub(1)) {
            if ["src", "include", "lib"].contains(part) {
                found_root = true;
                continue;
            }
            if found_root {
                package_parts.push(part.to_string());
            }
        }

        package_parts
    }

    fn extract_package_from_content(&self, content: &str) -> Option<String> {
        for line in content.lines().take(50) {
            if let Some(captures) = NAMESPACE_RE.captures(line) {
                return Some(captures[1].to_string());
            }
        }
        None
    }

    fn extract_imports(&self, _content: &str) -> Result<Vec<ImportStatement>> {
        // #include directives are preprocessor file inclusions, not semantic
        // imports; namespaces already become PACKAGE frames. Emitting edges
        // for them would create phantom packages.
        Ok(Vec::new())
    }

    fn extract_base_classes(&self, content: &str) -> Result<Vec<String>> {
        let Some(first_line) = first_significant_line(content) else {
            return Ok(Vec::new());
        };

        let Some(captures) = BASE_CLAUSE_RE.captures(first_line) else {
            return Ok(Vec::new());
        };

        let mut bases = Vec::new();
        for part in captures[1].split(',') {
            let cleaned = ACCESS_SPECIFIER_RE.replace_all(part, "");
            let cleaned = cleaned.trim();
            if let Some(first) = cleaned.split_whitespace().next() {
                if super::is_valid_identifier(first) {
                    bases.push(first.to_string());
                }
            }
        }
        Ok(bases)
    }

    fn extract_call_sites(&self, _content: &str, handle: ParseHandle<'_>) -> Result<Vec<CallSite>> {
        let mut call_sites = Vec::new();

        for node in handle.contained_of_type("call_expression") {
            if let Some(name) = callee_name(&node.content) {
                call_sites.push(CallSite {
                    name,
                    line: node.start_line,
                });
            }
        }

        for node in handle.contained_of_type("new_expression") {
            if let Some(name) = new_expression_callee(&node.content) {
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
        content: &str,
        _handle: ParseHandle<'_>,
        field_names: &[String],
    ) -> Result<Vec<FieldUsage>> {
        let mut usages = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;

            for captures in THIS_FIELD_RE.captures_iter(line) {
                let field = &captures[1];
                if !field_names.iter().any(|f| f == field) {
                    continue;
                }
                let after = &line[captures.get(0).map(|m| m.end()).unwrap_or(0)..];
                let access = if after.trim_start().starts_with('=')
                    && !after.trim_start().starts_with("==")
                {
                    AccessKind::Write
                } else {
                    AccessKind::Read
                };
                usages.push(FieldUsage {
                    field: field.to_string(),
                    line: line_no,
                    access,
                    pattern: FieldPattern::Explicit,
                });
            }

            for captures in STATIC_FIELD_USE_RE.captures_iter(line) {
                let field = &captures[2];
                if !field_names.iter().any(|f| f == field) {
                    continue;
                }
                usages.push(FieldUsage {
                    field: field.to_string(),
                    line: line_no,
                    access: AccessKind::Read,
                    pattern: FieldPattern::QualifiedStatic,
                });
            }
        }

        Ok(usages)
    }

    fn extract_instance_fields(&self, class_content: &str) -> Vec<FieldInfo> {
        extract_fields(class_content, false)
    }

    fn extract_static_fields(&self, class_content: &str) -> Vec<FieldInfo> {
        extract_fields(class_content, true)
    }

    fn extract_parameters(&self, callable_content: &str) -> Vec<ParameterInfo> {
        let Some(signature) = first_significant_line(callable_content) else {
            return Vec::new();
        };
        let Some(open) = signature.find('(') else {
            return Vec::new();
        };
        let Some(close) = signature.rfind(')') else {
            return Vec::new();
        };
        if close <= open {
            return Vec::new();
        }

        let mut parameters = Vec::new();
        for (position, raw) in signature[open + 1..close].split(',').enumerate() {
            let raw = raw.trim();
            if raw.is_empty() || raw == "void" {
                continue;
            }
            let (head, default_value) = match raw.split_once('=') {
                Some((h, d)) => (h.trim(), Some(d.trim().to_string())),
                None => (raw, None),
            };
            // Last token is the name; everything before is the type
            let mut tokens: Vec<&str> = head.split_whitespace().collect();
            let Some(name) = tokens.pop() else { continue };
            let name = name.trim_start_matches(['*', '&']);
            if !super::is_valid_identifier(name) {
                continue;
            }
            let declared_type = if tokens.is_empty() {
                None
            } else {
                Some(tokens.join(" "))
            };
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
        let signature = first_significant_line(callable_content)?;
        let before_parens = signature.split('(').next()?;
        let tokens: Vec<&str> = before_parens.split_whitespace().collect();
        // `void Logger::log` → return type is everything before the last token
        if tokens.len() < 2 {
            return None;
        }
        Some(tokens[..tokens.len() - 1].join(" "))
    }

    fn has_split_definitions(&self) -> bool {
        true
    }

    fn extract_class_scope(&self, callable_content: &str) -> Option<String> {
        let first_line = first_significant_line(callable_content)?;
        CLASS_SCOPE_RE.captures(first_line).map(|c| c[1].to_string())
    }
}

fn first_significant_line(content: &str) -> Option<&str> {
    content.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Callee of a call expression: `obj.method(x)` → `obj.method`,
/// `ns::func(x)` → `ns::func`, `func<T>(x)` → `func`.
fn callee_name(call_content: &str) -> Option<String> {
    let head = call_content.split('(').next()?.trim();
    let head = head.split('<').next()?.trim();
    if head.is_empty() {
        return None;
    }
    let collapsed: String = head.split_whitespace().collect();
    if collapsed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == ':' || c == '-' || c == '>')
    {
        Some(collapsed)
    } else {
        None
    }
}

/// `new MyClass(args)` → `MyClass`
fn new_expression_callee(content: &str) -> Option<String> {
    let rest = content.trim().strip_prefix("new")?.trim();
    let head = rest.split(['(', '<', '[']).next()?.trim();
    if super::is_valid_identifier(head.rsplit("::").next().unwrap_or(head)) {
        Some(head.to_string())
    } else {
        None
    }
}

fn extract_fields(class_content: &str, want_static: bool) -> Vec<FieldInfo> {
    const TYPE_KEYWORD_BLOCKLIST: &[&str] =
        &["return", "class", "struct", "namespace", "using", "typedef", "if", "while", "for", "delete"];

    let mut fields: Vec<FieldInfo> = Vec::new();
    let mut depth = 0i32;

    for (idx, line) in class_content.lines().enumerate() {
        // Only declarations at class-body depth, not inside method bodies
        let at_body_depth = depth == 1;
        depth += line.matches('{').count() as i32;
        depth -= line.matches('}').count() as i32;

        if !at_body_depth {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.contains('(') || trimmed.starts_with("//") {
            continue;
        }

        if let Some(captures) = FIELD_DECL_RE.captures(line) {
            let is_static = captures.get(1).is_some();
            if is_static != want_static {
                continue;
            }
            let declared_type = captures[2].trim().to_string();
            if TYPE_KEYWORD_BLOCKLIST.contains(&declared_type.as_str()) {
                continue;
            }
            let name = captures[3].to_string();
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            fields.push(FieldInfo {
                name,
                declared_type: Some(declared_type),
                line: idx as u32 + 1,
                confidence: 1.0,
            });
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CppHandler {
        CppHandler::new()
    }

    #[test]
    fn test_extract_class_name() {
        let h = handler();
        assert_eq!(h.extract_class_name("class MyClass {"), Some("MyClass".into()));
        assert_eq!(h.extract_class_name("struct Point {"), Some("Point".into()));
        assert_eq!(
            h.extract_class_name("class Derived : public Base {"),
            Some("Derived".into())
        );
        assert_eq!(h.extract_class_name("enum class Color {"), Some("Color".into()));
    }

    #[test]
    fn test_extract_callable_name() {
        let h = handler();
        assert_eq!(h.extract_callable_name("void Logger::log(const std::string& msg) {"), Some("log".into()));
        assert_eq!(h.extract_callable_name("int main() {"), Some("main".into()));
        assert_eq!(h.extract_callable_name("Logger::~Logger() {"), Some("~Logger".into()));
    }

    #[test]
    fn test_extract_class_scope() {
        let h = handler();
        assert_eq!(
            h.extract_class_scope("void Logger::log(const std::string& msg) {"),
            Some("Logger".into())
        );
        assert_eq!(
            h.extract_class_scope("std::string Helper::formatOutput(int x) {"),
            // First uppercase scope wins; `std` is lowercase so skipped
            Some("Helper".into())
        );
        assert_eq!(h.extract_class_scope("int main() {"), None);
    }

    #[test]
    fn test_extract_base_classes() {
        let h = handler();
        assert_eq!(
            h.extract_base_classes("class Derived : public Base {").unwrap(),
            vec!["Base".to_string()]
        );
        assert_eq!(
            h.extract_base_classes("class D : public B1, private B2 {").unwrap(),
            vec!["B1".to_string(), "B2".to_string()]
        );
        assert!(h.extract_base_classes("class Plain {").unwrap().is_empty());
    }

    #[test]
    fn test_imports_deliberately_empty() {
        let h = handler();
        assert!(h.extract_imports("#include \"logger.h\"\n#include <vector>\n").unwrap().is_empty());
    }

    #[test]
    fn test_extract_fields() {
        let h = handler();
        let content = "class Logger {\nprivate:\n    std::string name_;\n    static int count_;\n    void log();\n};\n";
        let instance = h.extract_instance_fields(content);
        assert_eq!(instance.len(), 1);
        assert_eq!(instance[0].name, "name_");

        let statics = h.extract_static_fields(content);
        assert_eq!(statics.len(), 1);
        assert_eq!(statics[0].name, "count_");
    }

    #[test]
    fn test_extract_parameters() {
        let h = handler();
        let params = h.extract_parameters("void log(const std::string& msg, int level = 0) {");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "msg");
        assert_eq!(params[1].name, "level");
        assert_eq!(params[1].default_value.as_deref(), Some("0"));
    }

    #[test]
    fn test_field_usage_patterns() {
        let h = handler();
        let content = "void Logger::log() {\n    this->count = this->count + 1;\n    int x = Config::LIMIT;\n}\n";
        let usages = h
            .extract_field_usages(
                content,
                ParseHandle::new(&[], 0, 0),
                &["count".to_string(), "LIMIT".to_string()],
            )
            .unwrap();

        assert!(usages.iter().any(|u| u.field == "count" && u.pattern == FieldPattern::Explicit));
        assert!(usages.iter().any(|u| u.field == "LIMIT" && u.pattern == FieldPattern::QualifiedStatic));
        assert!(usages.iter().any(|u| u.access == AccessKind::Write));
    }
}
