/// Static syntax check for remediation scripts.
///
/// Runs entirely in-process: nothing is written and nothing is spawned
/// before a script passes. The source is parsed with the tree-sitter
/// shell grammar; any error or missing node in the tree rejects it.
///
/// The grammar is more lenient than `sh` in a few places, so the tree is
/// then walked for what `sh -n` would still refuse: compound commands
/// with an empty body, reserved words used as command names, and bash
/// constructs that a POSIX shell cannot parse.
use tree_sitter::{Node, Parser, Tree};

use crate::error::RemediationError;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    /// 1-based line where the offending construct starts
    pub line: usize,
    pub reason: String,
}

impl From<SyntaxError> for RemediationError {
    fn from(e: SyntaxError) -> Self {
        RemediationError::InvalidSource {
            line: e.line,
            reason: e.reason,
        }
    }
}

/// Words that end or continue a compound command. A POSIX shell refuses
/// them in command position; the grammar accepts them as plain words.
const RESERVED: &[&str] = &["then", "else", "elif", "fi", "do", "done", "esac", "in"];

/// Compound command kinds whose body must hold at least one command,
/// with the token that opens the body.
const BODIES: &[(&str, &str)] = &[
    ("do_group", "do"),
    ("compound_statement", "{"),
    ("subshell", "("),
    ("if_statement", "then"),
    ("elif_clause", "then"),
    ("else_clause", "else"),
];

/// Tokens and clauses that close a body opened by one of [`BODIES`].
const BODY_END: &[&str] = &["done", "}", ")", "fi", "elif_clause", "else_clause"];

/// Bash-only syntax, rejected by `/bin/sh`.
const BASH_ONLY: &[(&str, &str)] = &[
    ("array", "arrays are not POSIX sh"),
    ("process_substitution", "process substitution is not POSIX sh"),
    ("herestring_redirect", "here-strings are not POSIX sh"),
];

/// Validates `source`, returning the first error found.
pub fn check(source: &str) -> Result<(), SyntaxError> {
    if let Some(offset) = source.find('\0') {
        return Err(error_at(line_of(source, offset), "NUL byte in source"));
    }

    let tree = parse(source)?;
    let root = tree.root_node();
    if !has_command(root) {
        return Err(error_at(1, "empty script"));
    }
    if root.has_error() {
        return Err(first_error(root, source).unwrap_or_else(|| error_at(1, "syntax error")));
    }
    match first_rejected(root, source) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn parse(source: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_bash::LANGUAGE.into())
        .map_err(|e| error_at(1, format!("shell grammar unavailable: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| error_at(1, "parser gave up"))
}

fn error_at(line: usize, reason: impl Into<String>) -> SyntaxError {
    SyntaxError {
        line,
        reason: reason.into(),
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn node_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// First word of the node's text, for error messages.
fn snippet<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source
        .get(node.byte_range())
        .and_then(|text| text.split_whitespace().next())
        .unwrap_or_default()
}

/// Anything besides comments (a shebang is a comment too).
fn has_command(root: Node<'_>) -> bool {
    let mut cursor = root.walk();
    let found = root.children(&mut cursor).any(|child| child.kind() != "comment");
    found
}

/// Pre-order search for the first `ERROR` or missing node.
fn first_error(node: Node<'_>, source: &str) -> Option<SyntaxError> {
    if node.is_missing() {
        return Some(error_at(node_line(node), format!("missing '{}'", node.kind())));
    }
    if node.is_error() {
        let reason = match snippet(node, source) {
            "" => "unexpected end of script".to_string(),
            word => format!("unexpected '{word}'"),
        };
        return Some(error_at(node_line(node), reason));
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(|child| first_error(child, source))
}

/// Pre-order search over a well-formed tree for what `sh` still refuses.
fn first_rejected(node: Node<'_>, source: &str) -> Option<SyntaxError> {
    let kind = node.kind();

    if let Some((_, reason)) = BASH_ONLY.iter().find(|(k, _)| *k == kind) {
        return Some(error_at(node_line(node), *reason));
    }
    if kind == "command" {
        if let Some(name) = node.child_by_field_name("name") {
            let word = snippet(name, source);
            if RESERVED.contains(&word) {
                return Some(error_at(node_line(name), format!("unexpected '{word}'")));
            }
        }
    }
    if let Some((_, open)) = BODIES.iter().find(|(k, _)| *k == kind) {
        if body_is_empty(node, open) {
            return Some(error_at(node_line(node), format!("empty body after '{open}'")));
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(|child| first_rejected(child, source))
}

/// True when no command sits between the `open` token and the end of
/// the body.
fn body_is_empty(node: Node<'_>, open: &str) -> bool {
    let mut cursor = node.walk();
    let mut inside = false;
    for child in node.children(&mut cursor) {
        if !inside {
            inside = child.kind() == open;
            continue;
        }
        if BODY_END.contains(&child.kind()) {
            break;
        }
        if child.is_named() && child.kind() != "comment" {
            return false;
        }
    }
    true
}
