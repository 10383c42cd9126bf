use crate::ast::{Argument, Block, DocumentNode};
use std::fmt::{self, Display, Write};

/// One indentation step.
pub const INDENTATION: &str = "    ";

/// Renders a document forest back to configuration text.
///
/// Output is canonical rather than byte-identical to whatever was parsed:
/// one argument per line, nested blocks indented one step per level, nodes
/// separated by a blank line and a trailing newline at the end.
pub fn to_config_string(nodes: &[DocumentNode]) -> String {
    let mut out = String::new();
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing into a String cannot fail.
        let _ = write_node(&mut out, node);
        out.push('\n');
    }
    out
}

impl Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, self)
    }
}

fn write_node<W: Write>(out: &mut W, node: &DocumentNode) -> fmt::Result {
    write!(out, "{}", node.name)?;
    if let Some(label) = &node.label {
        write!(out, " \"{label}\"")?;
    }
    write_body(out, &node.arguments, &node.blocks, 0)
}

/// Writes ` {`, the body at `depth + 1`, and the closing brace at `depth`.
fn write_body<W: Write>(
    out: &mut W,
    arguments: &[Argument],
    blocks: &[Block],
    depth: usize,
) -> fmt::Result {
    if arguments.is_empty() && blocks.is_empty() {
        return write!(out, " {{ }}");
    }
    out.write_str(" {\n")?;
    let inner = INDENTATION.repeat(depth + 1);
    for arg in arguments {
        writeln!(out, "{inner}{} = {}", arg.name, arg.value)?;
    }
    for block in blocks {
        write!(out, "{inner}{}", block.name)?;
        write_body(out, &block.arguments, &block.blocks, depth + 1)?;
        out.write_char('\n')?;
    }
    write!(out, "{}}}", INDENTATION.repeat(depth))
}
