#![forbid(unsafe_code)]

//! Graph to text.
//!
//! Each dialect writes its own statements and then the metadata lines from
//! [`mb_core::metadata::encode`], so everything the grammar cannot express
//! survives a parse of the output.

mod er;
mod flowchart;
mod sequence;

use mb_core::metadata::encode;
use mb_core::{Diagram, Dialect, GraphError, NodeKind, Theme};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("cannot emit an invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),
}

/// Indentation of statements inside the diagram body.
const INDENT: &str = "    ";

/// Emit with the built-in theme.
pub fn emit(diagram: &Diagram) -> Result<String, EmitError> {
    emit_with_theme(diagram, &Theme::default())
}

/// Emit `diagram` as text in its own dialect. Attributes are compared with
/// `theme` to decide what needs a `style` line or a metadata entry.
pub fn emit_with_theme(diagram: &Diagram, theme: &Theme) -> Result<String, EmitError> {
    diagram.validate()?;

    for node in &diagram.nodes {
        if node.kind() != NodeKind::Anchor && !is_plain_id(&node.id) {
            warn!(id = %node.id, "node id will not read back as a single identifier");
        }
    }

    let palette = theme.dialect(diagram.dialect);
    let mut output = match diagram.dialect {
        Dialect::Flowchart => flowchart::emit(diagram, palette),
        Dialect::EntityRelationship => er::emit(diagram),
        Dialect::Sequence => sequence::emit(diagram),
    };

    let metadata = encode(diagram, theme);
    debug!(
        dialect = diagram.dialect.as_str(),
        statements = output.lines().count(),
        metadata = metadata.len(),
        "emitted diagram"
    );
    for line in metadata {
        output.push_str(&line);
        output.push('\n');
    }
    Ok(output)
}

/// Label text as written between quotes: line breaks become `<br/>` and
/// double quotes become `#quot;`.
pub(crate) fn escape_label(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for ch in label.chars() {
        match ch {
            '\n' => escaped.push_str("<br/>"),
            '"' => escaped.push_str("#quot;"),
            '\r' => {}
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Word characters joined by single `-` or `.` separators.
pub(crate) fn is_plain_id(id: &str) -> bool {
    let mut previous_separator = true;
    for ch in id.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            previous_separator = false;
        } else if matches!(ch, '-' | '.') && !previous_separator {
            previous_separator = true;
        } else {
            return false;
        }
    }
    !previous_separator
}
