//! Tree-sitter based structural parser for JSX/TSX sources
//!
//! Produces the addressable units used for targeted edits: imports, exports,
//! declarations, functions and JSX elements, in document order, down to a
//! fixed nesting depth.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Collected nodes nest at most this deep (top-level units are depth 0).
pub const MAX_NODE_DEPTH: usize = 6;

// ═══════════════════════════════════════════════════════════════════════════
//  THREAD-LOCAL PARSER POOL
// ═══════════════════════════════════════════════════════════════════════════
//
// Parsers are reused per thread; scoring fans out over many files and
// creating a parser per call is wasted work.

thread_local! {
    static TSX_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - a missing grammar surfaces as a failed parse
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into());
        p
    });

    static TS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        p
    });

    static JS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_javascript::LANGUAGE.into());
        p
    });
}

/// Grammar used for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Tsx,
    TypeScript,
    /// Plain JavaScript; the grammar accepts JSX.
    JavaScript,
}

impl Dialect {
    pub fn from_path(path: &Path) -> Option<Self> {
        crate::project::FileType::from_path(path).dialect()
    }
}

/// Kind tag for a structural node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Import,
    Export,
    Function,
    Class,
    Declaration,
    TypeDeclaration,
    Element,
    Expression,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Import => "import",
            NodeKind::Export => "export",
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::Declaration => "declaration",
            NodeKind::TypeDeclaration => "type",
            NodeKind::Element => "element",
            NodeKind::Expression => "expression",
        }
    }
}

/// An addressable, line-ranged unit of a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralNode {
    /// `node_<n>`, numbered in document order within one parse pass
    pub id: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Byte offsets of the node text in the parsed content
    pub start_byte: usize,
    pub end_byte: usize,
    pub code_snippet: String,
    pub kind: NodeKind,
    /// Nesting level among collected nodes
    pub depth: usize,
    /// Declared name or JSX tag, when there is one
    #[serde(default)]
    pub name: Option<String>,
}

impl StructuralNode {
    /// True when `other` lies entirely inside this node.
    pub fn contains(&self, other: &StructuralNode) -> bool {
        self.start_byte <= other.start_byte
            && other.end_byte <= self.end_byte
            && (self.start_byte, self.end_byte) != (other.start_byte, other.end_byte)
    }
}

/// Parse JSX/TSX content into structural nodes.
///
/// Returns an empty list when the content does not parse cleanly; callers
/// treat that as "not eligible for node-level edits", never as an error.
pub fn parse(content: &str) -> Vec<StructuralNode> {
    parse_with_dialect(content, Dialect::Tsx)
}

/// Parse using the grammar implied by the file extension.
pub fn parse_for_path(path: &Path, content: &str) -> Vec<StructuralNode> {
    match Dialect::from_path(path) {
        Some(dialect) => parse_with_dialect(content, dialect),
        None => Vec::new(),
    }
}

pub fn parse_with_dialect(content: &str, dialect: Dialect) -> Vec<StructuralNode> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    let Some(tree) = parse_tree(content, dialect) else {
        return Vec::new();
    };
    let root = tree.root_node();
    if root.has_error() {
        return Vec::new();
    }

    let mut nodes = Vec::new();
    collect_nodes(root, content, 0, &mut nodes);
    nodes
}

/// Whether `content` parses without syntax errors in the file's grammar.
///
/// Non-source paths always pass; there is nothing to check them against.
pub fn parses_cleanly(path: &Path, content: &str) -> bool {
    match Dialect::from_path(path) {
        Some(dialect) => {
            parse_tree(content, dialect).is_some_and(|tree| !tree.root_node().has_error())
        }
        None => true,
    }
}

fn parse_tree(content: &str, dialect: Dialect) -> Option<Tree> {
    match dialect {
        Dialect::Tsx => TSX_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        Dialect::TypeScript => TS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        Dialect::JavaScript => JS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
    }
}

fn collect_nodes(parent: Node, content: &str, depth: usize, out: &mut Vec<StructuralNode>) {
    let mut cursor = parent.walk();
    for child in parent.named_children(&mut cursor) {
        match classify(&child, content, depth) {
            Some(found) => {
                let id = format!("node_{}", out.len() + 1);
                out.push(StructuralNode {
                    id,
                    start_line: child.start_position().row + 1,
                    end_line: child.end_position().row + 1,
                    start_byte: child.start_byte(),
                    end_byte: child.end_byte(),
                    code_snippet: node_text(&child, content).to_string(),
                    kind: found.kind,
                    depth,
                    name: found.name,
                });
                if depth + 1 < MAX_NODE_DEPTH {
                    // Exported declarations are collected once, at the export.
                    let body = found.descend_into.unwrap_or(child);
                    collect_nodes(body, content, depth + 1, out);
                }
            }
            None => collect_nodes(child, content, depth, out),
        }
    }
}

struct Classified<'tree> {
    kind: NodeKind,
    name: Option<String>,
    descend_into: Option<Node<'tree>>,
}

fn classify<'tree>(node: &Node<'tree>, content: &str, depth: usize) -> Option<Classified<'tree>> {
    let simple = |kind: NodeKind, name: Option<String>| Classified {
        kind,
        name,
        descend_into: None,
    };

    match node.kind() {
        "import_statement" => Some(simple(NodeKind::Import, None)),
        "export_statement" => {
            let declaration = node
                .child_by_field_name("declaration")
                .or_else(|| first_declaration_child(node));
            match declaration.and_then(|decl| classify(&decl, content, depth).map(|c| (decl, c))) {
                Some((decl, inner)) => Some(Classified {
                    kind: inner.kind,
                    name: inner.name,
                    descend_into: Some(inner.descend_into.unwrap_or(decl)),
                }),
                None => match node.child_by_field_name("value") {
                    Some(value)
                        if matches!(value.kind(), "function_expression" | "function" | "class") =>
                    {
                        let kind = if value.kind() == "class" {
                            NodeKind::Class
                        } else {
                            NodeKind::Function
                        };
                        Some(Classified {
                            kind,
                            name: field_text(&value, "name", content),
                            descend_into: Some(value),
                        })
                    }
                    _ => Some(simple(NodeKind::Export, export_value_name(node, content))),
                },
            }
        }
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            Some(simple(NodeKind::Function, field_text(node, "name", content)))
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            Some(simple(NodeKind::Class, field_text(node, "name", content)))
        }
        "lexical_declaration" | "variable_declaration" => {
            let name = first_named_child_of_kind(node, "variable_declarator")
                .and_then(|declarator| field_text(&declarator, "name", content));
            Some(simple(NodeKind::Declaration, name))
        }
        "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
            Some(simple(NodeKind::TypeDeclaration, field_text(node, "name", content)))
        }
        "jsx_element" => {
            let name = node
                .child_by_field_name("open_tag")
                .and_then(|tag| field_text(&tag, "name", content));
            Some(simple(NodeKind::Element, name))
        }
        "jsx_self_closing_element" => {
            Some(simple(NodeKind::Element, field_text(node, "name", content)))
        }
        "expression_statement" if depth == 0 => Some(simple(NodeKind::Expression, None)),
        _ => None,
    }
}

fn first_declaration_child<'tree>(node: &Node<'tree>) -> Option<Node<'tree>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| {
        matches!(
            child.kind(),
            "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
                | "abstract_class_declaration"
                | "class"
                | "lexical_declaration"
                | "variable_declaration"
                | "interface_declaration"
                | "type_alias_declaration"
                | "enum_declaration"
        )
    });
    found
}

fn first_named_child_of_kind<'tree>(node: &Node<'tree>, kind: &str) -> Option<Node<'tree>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| child.kind() == kind);
    found
}

/// `export default Foo;` names `Foo`.
fn export_value_name(node: &Node, content: &str) -> Option<String> {
    node.child_by_field_name("value")
        .filter(|value| value.kind() == "identifier")
        .map(|value| node_text(&value, content).to_string())
}

fn field_text(node: &Node, field: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(&child, content).to_string())
        .filter(|text| !text.is_empty())
}

fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
    content.get(node.start_byte()..node.end_byte()).unwrap_or("")
}
