use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum AlloyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error("Could not access configuration file `{path}`: {message}")]
    #[diagnostic(code(config::io))]
    Io { path: String, message: String },
}

/// Syntax problems found while reading configuration text. The parser reports
/// these and keeps going, so a broken document still yields a partial tree.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("Unexpected token")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected {expected}, but found this")]
        span: SourceSpan,
        expected: String,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The file ended while {expected} was still expected.")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("File ended unexpectedly here")]
        span: SourceSpan,
        expected: String,
    },

    #[error("Unbalanced value")]
    #[diagnostic(
        code(parser::unbalanced_value),
        help("Every `{opener}` in an argument value needs a matching closer.")
    )]
    UnbalancedValue {
        #[source_code]
        src: NamedSource<String>,
        #[label("This value is never closed")]
        span: SourceSpan,
        opener: String,
    },

    #[error("Missing closing brace for `{name}`")]
    #[diagnostic(
        code(parser::missing_closing_brace),
        help("Add a `}}` to close the body of `{name}`.")
    )]
    MissingClosingBrace {
        #[source_code]
        src: NamedSource<String>,
        #[label("This body is never closed")]
        span: SourceSpan,
        name: String,
    },

    #[error("Unterminated label")]
    #[diagnostic(
        code(parser::unterminated_label),
        help("Component labels are quoted strings, e.g. `prometheus.scrape \"default\" {{ }}`.")
    )]
    UnterminatedLabel {
        #[source_code]
        src: NamedSource<String>,
        #[label("Label starts here")]
        span: SourceSpan,
    },
}

impl ParserError {
    /// Byte offset of the labelled span.
    pub fn offset(&self) -> usize {
        match self {
            ParserError::UnexpectedToken { span, .. }
            | ParserError::UnexpectedEof { span, .. }
            | ParserError::UnbalancedValue { span, .. }
            | ParserError::MissingClosingBrace { span, .. }
            | ParserError::UnterminatedLabel { span, .. } => span.offset(),
        }
    }
}

/// Failures loading the component catalog.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SchemaError {
    #[error("Invalid schema catalog at line {line}, column {column}: {message}")]
    #[diagnostic(
        code(schema::invalid_json),
        help("The catalog maps category names to component names to component schemas.")
    )]
    Json {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Could not read schema catalog `{path}`: {message}")]
    #[diagnostic(code(schema::io))]
    Io { path: String, message: String },
}

/// Problems binding a parsed document to the schema registry. Each one drops
/// the offending unit and synthesis continues.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Unknown component `{name}`")]
    #[diagnostic(
        code(synthesis::unknown_component),
        help("No schema in the catalog is named `{name}`; the node was skipped.")
    )]
    UnknownComponent { name: String },

    #[error("Component `{component}` has no argument `{path}`")]
    #[diagnostic(code(synthesis::unknown_argument))]
    UnknownArgument { component: String, path: String },

    #[error("Component `{component}` has no block `{path}`")]
    #[diagnostic(code(synthesis::unknown_block))]
    UnknownBlock { component: String, path: String },

    #[error("Block `{path}` of `{component}` may only appear once")]
    #[diagnostic(
        code(synthesis::duplicate_block),
        help("Only the first occurrence was kept.")
    )]
    DuplicateBlock { component: String, path: String },

    #[error("Component `{id}` is declared more than once")]
    #[diagnostic(
        code(synthesis::duplicate_instance),
        help("Labels must be unique per component kind.")
    )]
    DuplicateInstance { id: String },

    #[error("Component `{component}` requires a label")]
    #[diagnostic(
        code(synthesis::missing_label),
        help("Write the component as `{component} \"name\" {{ ... }}`.")
    )]
    MissingLabel { component: String },
}

/// Rejections from interactive graph edits. The graph is left unchanged.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cannot connect `{from}` ({from_type}) to `{to}` ({to_type})")]
    #[diagnostic(
        code(graph::type_mismatch),
        help("Only list arguments accept exports of a different type.")
    )]
    TypeMismatch {
        from: String,
        from_type: String,
        to: String,
        to_type: String,
    },

    #[error("No component instance `{id}`")]
    #[diagnostic(code(graph::unknown_instance))]
    UnknownInstance { id: String },

    #[error("Component `{instance}` has no export `{export}`")]
    #[diagnostic(code(graph::unknown_export))]
    UnknownExport { instance: String, export: String },

    #[error("Component `{instance}` has no argument `{path}`")]
    #[diagnostic(code(graph::unknown_argument))]
    UnknownArgument { instance: String, path: String },

    #[error("`{from}` is already connected to `{to}`")]
    #[diagnostic(code(graph::already_connected))]
    AlreadyConnected { from: String, to: String },

    #[error("No edge with id `{id}`")]
    #[diagnostic(code(graph::unknown_edge))]
    UnknownEdge { id: String },

    #[error("Component `{id}` already exists")]
    #[diagnostic(code(graph::duplicate_instance))]
    DuplicateInstance { id: String },

    #[error("`{path}` of `{instance}` is required and cannot be unchecked")]
    #[diagnostic(code(graph::required_slot))]
    RequiredSlot { instance: String, path: String },

    #[error("Component `{instance}` has no block `{path}`")]
    #[diagnostic(code(graph::unknown_block))]
    UnknownBlock { instance: String, path: String },

    #[error("Block `{path}` of `{instance}` is not repeatable")]
    #[diagnostic(
        code(graph::not_repeatable),
        help("Only repeatable blocks can have more than one instance.")
    )]
    NotRepeatable { instance: String, path: String },
}
