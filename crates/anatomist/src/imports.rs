//! # Import Extraction & Resolution
//!
//! Walks a tree-sitter Python syntax tree and collects the module identifiers
//! the file imports. Handles:
//! - `import a.b.c` -> `a.b.c`, plus the packages it executes (`a`, `a.b`) as implied entries
//! - `from a.b import c` -> `a.b`
//! - aliases (`import a.b as x`, `from a import b as y`): the alias is ignored
//! - relative imports (`from ..core import engine`), resolved against the
//!   importing file's own package; those that climb above the project root are dropped

use crate::ImportSet;
use common::module_id::{package_of, prefixes};
use std::path::Path;
use tree_sitter::Node;

/// Extracts the `ImportSet` of a parsed Python source file.
///
/// `file_path` is the project-relative path of the file; it is only needed to
/// resolve relative imports. Imports nested inside functions, `if` or `try`
/// blocks are collected too since they are still spelled out statically.
///
/// # Examples
/// ```ignore
/// let source = b"import foo.bar\nfrom .utils import baz";
/// let mut parser = tree_sitter::Parser::new();
/// parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
/// let tree = parser.parse(source, None).unwrap();
/// let imports = extract_imports(source, tree.root_node(), Path::new("pkg/main.py"));
/// assert!(imports.contains("foo.bar"));
/// assert!(imports.contains("pkg.utils"));
/// ```
pub fn extract_imports(source: &[u8], root: Node, file_path: &Path) -> ImportSet {
    let package = package_of(file_path);
    let mut imports = ImportSet::new();

    let mut cursor = root.walk();
    'walk: loop {
        let node = cursor.node();
        let is_import = match node.kind() {
            "import_statement" => {
                collect_plain_import(source, node, &mut imports);
                true
            }
            "import_from_statement" => {
                collect_from_import(source, node, package.as_deref(), &mut imports);
                true
            }
            _ => false,
        };

        if !is_import && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    imports
}

/// `import a.b.c [as x], d` -> `a.b.c`, `d`, with `a` and `a.b` implied.
fn collect_plain_import(source: &[u8], node: Node, imports: &mut ImportSet) {
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let dotted = match name.kind() {
            "dotted_name" => Some(name),
            "aliased_import" => name.child_by_field_name("name"),
            _ => None,
        };
        if let Some(text) = dotted.and_then(|n| node_text(source, n)) {
            for prefix in prefixes(&text) {
                if prefix.len() == text.len() {
                    imports.insert(prefix);
                } else {
                    imports.insert_implied(prefix);
                }
            }
        }
    }
}

/// `from a.b import c` -> `a.b`; `from ..x import y` -> resolved against `package`.
fn collect_from_import(source: &[u8], node: Node, package: Option<&str>, imports: &mut ImportSet) {
    let Some(module) = node.child_by_field_name("module_name") else {
        return;
    };
    let Some(text) = node_text(source, module) else {
        return;
    };

    match module.kind() {
        "dotted_name" => imports.insert(text),
        "relative_import" => {
            let dots = text.chars().take_while(|&c| c == '.').count();
            let dotted = &text[dots..];
            if let Some(resolved) = package.and_then(|p| resolve_relative(p, dots, dotted)) {
                imports.insert(resolved);
            }
        }
        _ => {}
    }
}

/// Node text with all whitespace removed (`a . b` is legal Python for `a.b`).
fn node_text(source: &[u8], node: Node) -> Option<String> {
    let text = node.utf8_text(source).ok()?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        None
    } else {
        Some(compact)
    }
}

/// Resolves a relative import against the importing file's package.
///
/// One dot is the package itself, each further dot climbs one level. Returns
/// `None` when the import climbs above the project root or names nothing.
///
/// # Examples
/// ```
/// use anatomist::imports::resolve_relative;
///
/// assert_eq!(resolve_relative("tests.unit", 1, "helpers").as_deref(), Some("tests.unit.helpers"));
/// assert_eq!(resolve_relative("tests.unit", 2, "").as_deref(), Some("tests"));
/// assert_eq!(resolve_relative("tests", 3, "x"), None);
/// ```
pub fn resolve_relative(package: &str, dots: usize, dotted: &str) -> Option<String> {
    if dots == 0 {
        return None;
    }

    let mut parts: Vec<&str> = if package.is_empty() {
        Vec::new()
    } else {
        package.split('.').collect()
    };
    let climb = dots - 1;
    if climb > parts.len() {
        return None;
    }
    parts.truncate(parts.len() - climb);
    if !dotted.is_empty() {
        parts.extend(dotted.split('.'));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}
