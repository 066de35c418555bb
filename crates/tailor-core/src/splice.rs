//! Splicing replacement text into a file by structural node range

use crate::parser::StructuralNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpliceError {
    #[error("replacement for {node_id} is out of bounds ({start}..{end} in {len} bytes)")]
    OutOfBounds {
        node_id: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("replacements for {first} and {second} overlap")]
    Overlap { first: String, second: String },
    #[error("content at {node_id} no longer matches the parsed snippet")]
    StaleSnippet { node_id: String },
}

/// One node's replacement text, addressed by the node's byte range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub node_id: String,
    pub start_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    /// The node text the replacement was generated against
    pub original: String,
    pub text: String,
}

impl Replacement {
    pub fn for_node(node: &StructuralNode, text: impl Into<String>) -> Self {
        Self {
            node_id: node.id.clone(),
            start_line: node.start_line,
            start_byte: node.start_byte,
            end_byte: node.end_byte,
            original: node.code_snippet.clone(),
            text: text.into(),
        }
    }
}

/// Apply all replacements to `content`.
///
/// Replacements are applied in descending order of start position so an
/// edit never shifts the offsets of an edit not yet applied. Every range is
/// checked against the content and against its neighbours before anything is
/// changed, so an error means nothing was spliced.
pub fn splice(content: &str, replacements: &[Replacement]) -> Result<String, SpliceError> {
    let mut ordered: Vec<&Replacement> = replacements.iter().collect();
    ordered.sort_by(|a, b| {
        b.start_line
            .cmp(&a.start_line)
            .then(b.start_byte.cmp(&a.start_byte))
    });

    for r in &ordered {
        if r.start_byte > r.end_byte
            || r.end_byte > content.len()
            || !content.is_char_boundary(r.start_byte)
            || !content.is_char_boundary(r.end_byte)
        {
            return Err(SpliceError::OutOfBounds {
                node_id: r.node_id.clone(),
                start: r.start_byte,
                end: r.end_byte,
                len: content.len(),
            });
        }
        if content[r.start_byte..r.end_byte] != r.original {
            return Err(SpliceError::StaleSnippet {
                node_id: r.node_id.clone(),
            });
        }
    }

    // Descending order: each entry must end at or before the previous one starts.
    for pair in ordered.windows(2) {
        let (later, earlier) = (pair[0], pair[1]);
        if earlier.end_byte > later.start_byte {
            return Err(SpliceError::Overlap {
                first: earlier.node_id.clone(),
                second: later.node_id.clone(),
            });
        }
    }

    let mut result = content.to_string();
    for r in ordered {
        result.replace_range(r.start_byte..r.end_byte, &r.text);
    }
    Ok(result)
}

/// Drop targets nested inside another target, keeping the outermost.
pub fn collapse_nested(targets: Vec<StructuralNode>) -> Vec<StructuralNode> {
    let outer: Vec<bool> = targets
        .iter()
        .map(|node| !targets.iter().any(|other| other.contains(node)))
        .collect();

    let mut kept: Vec<StructuralNode> = targets
        .into_iter()
        .zip(outer)
        .filter_map(|(node, keep)| keep.then_some(node))
        .collect();
    kept.sort_by_key(|n| n.start_byte);
    kept.dedup_by(|a, b| a.start_byte == b.start_byte && a.end_byte == b.end_byte);
    kept
}
