//! Tree-sitter host that turns a Python file into its `ImportSet`.
//!
//! Failures are soft: an unreadable file, invalid UTF-8 or a syntax error
//! produce an empty `ImportSet` with a `ParseWarning` attached.

use std::fs::File;
use std::path::Path;

use memmap2::MmapOptions;
use tree_sitter::{Node, Parser};

use crate::imports::extract_imports;
use crate::{AnatomistError, ImportSet, ParseWarning};

/// Outcome of parsing one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImports {
    pub imports: ImportSet,
    pub warning: Option<ParseWarning>,
}

impl ParsedImports {
    fn failed(path: &Path, message: String) -> Self {
        tracing::warn!(path = %path.display(), "{message}; treating as importing nothing");
        Self {
            imports: ImportSet::new(),
            warning: Some(ParseWarning {
                path: path.to_path_buf(),
                message,
            }),
        }
    }
}

/// Owns a tree-sitter parser loaded with the Python grammar.
///
/// Not shared across threads; parallel callers create one host per worker.
///
/// # Example
/// ```no_run
/// use anatomist::ParserHost;
/// use std::path::Path;
///
/// let mut host = ParserHost::new().unwrap();
/// let parsed = host.parse_file(Path::new("/project"), Path::new("tests/test_api.py"));
/// for module in parsed.imports.iter() {
///     println!("{module}");
/// }
/// ```
pub struct ParserHost {
    parser: Parser,
}

impl ParserHost {
    /// Creates a new parser host with the Python grammar loaded.
    ///
    /// # Errors
    /// Returns `AnatomistError::ParseFailure` if the tree-sitter parser
    /// fails to initialize with the Python language.
    pub fn new() -> Result<Self, AnatomistError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| {
                AnatomistError::ParseFailure(format!("Failed to load Python grammar: {}", e))
            })?;
        Ok(Self { parser })
    }

    /// Reads `project_root/rel_path` through a memory map and extracts its imports.
    pub fn parse_file(&mut self, project_root: &Path, rel_path: &Path) -> ParsedImports {
        let abs = project_root.join(rel_path);
        let file = match File::open(&abs) {
            Ok(f) => f,
            Err(e) => return ParsedImports::failed(rel_path, format!("unreadable: {e}")),
        };
        let len = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => return ParsedImports::failed(rel_path, format!("unreadable: {e}")),
        };
        if len == 0 {
            return ParsedImports::default();
        }
        if len > u32::MAX as u64 {
            return ParsedImports::failed(rel_path, "file exceeds 4GB".to_string());
        }

        // SAFETY: read-only map; the file handle outlives the mmap.
        let mmap = match unsafe { MmapOptions::new().map(&file) } {
            Ok(m) => m,
            Err(e) => return ParsedImports::failed(rel_path, format!("unreadable: {e}")),
        };
        self.parse_source(rel_path, &mmap)
    }

    /// Extracts imports from in-memory source. `rel_path` anchors relative imports.
    pub fn parse_source(&mut self, rel_path: &Path, source: &[u8]) -> ParsedImports {
        if std::str::from_utf8(source).is_err() {
            return ParsedImports::failed(rel_path, "not valid UTF-8".to_string());
        }

        let Some(tree) = self.parser.parse(source, None) else {
            return ParsedImports::failed(rel_path, "tree-sitter parse returned None".to_string());
        };

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return ParsedImports::failed(rel_path, format!("syntax error near line {line}"));
        }

        ParsedImports {
            imports: extract_imports(source, root, rel_path),
            warning: None,
        }
    }
}

/// 1-indexed line of the first `ERROR` or missing node, following only
/// subtrees that contain one.
fn first_error_line(root: Node) -> Option<usize> {
    let mut node = root;
    loop {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        let next = {
            let mut cursor = node.walk();
            let found = node
                .children(&mut cursor)
                .find(|c| c.is_missing() || c.has_error());
            found
        };
        node = next?;
    }
}
