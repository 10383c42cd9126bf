use crate::ast::DocumentNode;
use crate::error::{AlloyError, ParserError, SynthesisError};
use crate::graph::Graph;
use crate::parser::{ParsedDocument, Parser};
use crate::schema::SchemaRegistry;
use crate::serialization::to_config_string;
use crate::synthesizer::Synthesizer;
use crate::utils::get_line_and_column;
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// File extension of configuration documents.
pub const CONFIG_EXTENSION: &str = "alloy";
/// Name used for configuration text that did not come from a file.
pub const DEFAULT_CONFIG_NAME: &str = "config.alloy";

/// Everything known about one configuration document: the parsed forest, the
/// graph synthesized from it and every diagnostic met on the way.
///
/// Serializing the result keeps the diagnostics as rendered messages.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub document: Vec<DocumentNode>,
    pub graph: Graph,
    pub diagnostics: Vec<String>,
    #[serde(skip)]
    pub syntax_errors: Vec<ParserError>,
    #[serde(skip)]
    pub synthesis_errors: Vec<SynthesisError>,
}

impl AnalysisResult {
    pub fn is_clean(&self) -> bool {
        self.syntax_errors.is_empty() && self.synthesis_errors.is_empty()
    }

    /// Serializes the analysis into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the analysis into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }
}

/// Parses `source` leniently and binds it to `registry`.
///
/// Never fails: syntax errors leave a partial forest, unknown components are
/// skipped, and both show up in [`AnalysisResult::diagnostics`].
pub fn analyze(source: &str, file_name: &str, registry: &SchemaRegistry) -> AnalysisResult {
    let parsed = Parser::new_with_name(source, file_name.to_string()).parse_document();
    let synthesis = Synthesizer::new(registry).synthesize(&parsed.nodes);

    let mut diagnostics: Vec<String> = parsed
        .diagnostics
        .iter()
        .map(|err| {
            let (line, column) = get_line_and_column(source, err.offset());
            format!("{file_name}:{line}:{column}: {err}")
        })
        .collect();
    diagnostics.extend(synthesis.diagnostics.iter().map(|err| format!("{file_name}: {err}")));

    AnalysisResult {
        document: parsed.nodes,
        graph: synthesis.graph,
        diagnostics,
        syntax_errors: parsed.diagnostics,
        synthesis_errors: synthesis.diagnostics,
    }
}

/// Lenient parse: a best-effort forest plus syntax diagnostics.
pub fn parse(source: &str) -> ParsedDocument {
    Parser::new(source).parse_document()
}

/// Strict parse for callers that must not accept a partial tree.
///
/// # Errors
/// Returns the first syntax error found in `source`.
pub fn parse_strict(source: &str, file_name: &str) -> Result<Vec<DocumentNode>, AlloyError> {
    Ok(Parser::new_with_name(source, file_name.to_string())
        .parse_document()
        .into_result()?)
}

/// Renders the live graph as configuration text.
pub fn export_config(graph: &Graph) -> String {
    to_config_string(&graph.to_document())
}

/// Reads and analyzes a configuration file.
///
/// # Errors
/// Returns [`AlloyError::Io`] if the file cannot be read.
pub fn load_config(path: impl AsRef<Path>, registry: &SchemaRegistry) -> Result<AnalysisResult, AlloyError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| io_error(path, &e))?;
    info!("loaded configuration {}", path.display());
    Ok(analyze(&source, &path.display().to_string(), registry))
}

/// Writes the exported graph to `path`. The text is written to a temporary
/// file in the same directory first and then renamed over the destination.
///
/// # Errors
/// Returns [`AlloyError::Io`] if writing or renaming fails.
pub fn save_config(path: impl AsRef<Path>, graph: &Graph) -> Result<(), AlloyError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let text = export_config(graph);

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(path, &e))?;
    file.write_all(text.as_bytes()).map_err(|e| io_error(path, &e))?;
    file.persist(path).map_err(|e| io_error(path, &e.error))?;
    info!("saved configuration {} ({} components)", path.display(), graph.len());
    Ok(())
}

fn io_error(path: &Path, err: &std::io::Error) -> AlloyError {
    AlloyError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lenient() {
        let parsed = parse("a { x = 1 y : 2 }");
        assert_eq!(parsed.nodes.len(), 1);
        assert!(!parsed.is_clean());
    }

    #[test]
    fn test_parse_strict_fails_on_first_error() {
        let err = parse_strict("a { x = [1, 2 }", DEFAULT_CONFIG_NAME).unwrap_err();
        assert!(matches!(err, AlloyError::Parser(_)));
        assert!(parse_strict("a { x = 1 }", DEFAULT_CONFIG_NAME).is_ok());
    }

    #[test]
    fn test_analyze_without_schemas_reports_unknown_components() {
        let result = analyze("a { }\nb { }", "test.alloy", &SchemaRegistry::new());
        assert_eq!(result.document.len(), 2);
        assert!(result.graph.is_empty());
        assert_eq!(
            result.diagnostics,
            vec!["test.alloy: Unknown component `a`", "test.alloy: Unknown component `b`"]
        );
    }

    #[test]
    fn test_syntax_diagnostics_carry_position() {
        let result = analyze("a {\n  x : 1\n}", "test.alloy", &SchemaRegistry::new());
        assert!(result.diagnostics[0].starts_with("test.alloy:2:5: "));
    }
}
