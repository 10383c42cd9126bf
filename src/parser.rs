use crate::ast::{Argument, Block, DocumentNode};
use crate::error::ParserError;
use crate::lexer::{tokenize, Token, TokenType};
use crate::utils::get_line_and_column;
use log::{debug, warn};
use miette::{NamedSource, SourceSpan};

/// Output of a lenient parse: every node that could be recovered plus the
/// syntax diagnostics met on the way.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub nodes: Vec<DocumentNode>,
    pub diagnostics: Vec<ParserError>,
}

impl ParsedDocument {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Turns the lenient result into a strict one, failing on the first diagnostic.
    ///
    /// # Errors
    /// Returns the first [`ParserError`] recorded during parsing.
    pub fn into_result(self) -> Result<Vec<DocumentNode>, ParserError> {
        match self.diagnostics.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.nodes),
        }
    }
}

/// A recursive descent parser for block configuration text.
///
/// ```text
/// Document ::= { Node }
/// Node     ::= Name [ Label ] "{" Body "}"
/// Body     ::= { Name "=" Value | Name "{" Body "}" }
/// Value    ::= Balanced | Call | Scalar [ "[" Balanced "]" ]
/// ```
#[derive(Debug)]
pub struct Parser<'a> {
    source: NamedSource<String>,
    tokens: Vec<Token>,
    position: usize,
    source_text: &'a str,
    diagnostics: Vec<ParserError>,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Self {
        Self::new_with_name(source_text, "config.alloy".to_string())
    }

    pub fn new_with_name(source_text: &'a str, name: String) -> Self {
        Self {
            source: NamedSource::new(name, source_text.to_string()),
            tokens: tokenize(source_text),
            position: 0,
            source_text,
            diagnostics: Vec::new(),
        }
    }

    // === Main Parsing Methods ===

    /// Document ::= { Node }
    pub fn parse_document(&mut self) -> ParsedDocument {
        let mut nodes = Vec::new();
        while !self.check(&TokenType::Eof) {
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        debug!(
            "parsed {} nodes with {} diagnostics",
            nodes.len(),
            self.diagnostics.len()
        );
        ParsedDocument {
            nodes,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    /// Node ::= Name [ Label ] "{" Body "}"
    fn parse_node(&mut self) -> Option<DocumentNode> {
        let name_token = self.current_token().clone();
        let name = match &name_token.ttype {
            TokenType::Text(s) => s.clone(),
            _ => {
                self.report_unexpected("a component name");
                self.advance();
                return None;
            }
        };
        self.advance();

        let mut label = None;
        if self.check(&TokenType::Quote) {
            label = self.parse_label();
        } else if let TokenType::Text(s) = &self.current_token().ttype {
            // Unquoted label: keep it so the node is not lost.
            let s = s.clone();
            self.report_unexpected("a quoted label or `{`");
            self.advance();
            label = Some(s);
        }

        let (arguments, blocks) = if self.match_token(&TokenType::LBrace) {
            self.parse_body(&name, &name_token)
        } else {
            self.report_unexpected("`{`");
            (Vec::new(), Vec::new())
        };

        Some(DocumentNode {
            name,
            label,
            arguments,
            blocks,
        })
    }

    /// Label ::= '"' Text '"'
    fn parse_label(&mut self) -> Option<String> {
        let open = self.current_token().clone();
        self.advance();
        let label = match &self.current_token().ttype {
            TokenType::Text(s) => {
                let s = s.clone();
                self.advance();
                s
            }
            _ => String::new(),
        };
        if !self.match_token(&TokenType::Quote) {
            self.report(ParserError::UnterminatedLabel {
                src: self.source.clone(),
                span: span_of(&open),
            });
        }
        Some(label)
    }

    /// Body ::= { Name "=" Value | Name "{" Body "}" }
    ///
    /// Stops after the `}` that closes the body; that brace is consumed.
    fn parse_body(&mut self, owner: &str, opened_by: &Token) -> (Vec<Argument>, Vec<Block>) {
        let mut arguments = Vec::new();
        let mut blocks = Vec::new();

        loop {
            let token = self.current_token().clone();
            match &token.ttype {
                TokenType::Eof => {
                    self.report(ParserError::MissingClosingBrace {
                        src: self.source.clone(),
                        span: span_of(opened_by),
                        name: owner.to_string(),
                    });
                    break;
                }
                TokenType::RBrace => {
                    self.advance();
                    break;
                }
                TokenType::Text(name) => {
                    self.advance();
                    let symbol = self.current_token().ttype.clone();
                    match symbol {
                        TokenType::Text(ref s) if s == "=" => {
                            self.advance();
                            if let Some(value) = self.parse_value() {
                                arguments.push(Argument::new(name.clone(), value));
                            }
                        }
                        TokenType::LBrace => {
                            self.advance();
                            let (nested_args, nested_blocks) = self.parse_body(name, &token);
                            blocks.push(Block {
                                name: name.clone(),
                                arguments: nested_args,
                                blocks: nested_blocks,
                            });
                        }
                        // Left in place so the next round can resync on it.
                        _ => self.report_unexpected(&format!("`=` or `{{` after `{name}`")),
                    }
                }
                _ => {
                    self.report_unexpected("an argument or block name");
                    self.advance();
                }
            }
        }

        (arguments, blocks)
    }

    /// Value ::= Balanced | Call | Scalar [ "[" Balanced "]" ]
    ///
    /// Returns the exact source text of the value.
    fn parse_value(&mut self) -> Option<String> {
        let start = self.current_token().clone();
        let end = match &start.ttype {
            TokenType::Eof => {
                self.report_unexpected("a value");
                return None;
            }
            TokenType::RBrace => {
                // Leave the brace for the enclosing body.
                self.report_unexpected("a value");
                return None;
            }
            // Trivia never reaches the parser; `tokenize` drops it.
            TokenType::RBracket | TokenType::Whitespace | TokenType::Comment(_) => {
                self.report_unexpected("a value");
                self.advance();
                return None;
            }
            TokenType::LBrace | TokenType::LBracket | TokenType::Quote | TokenType::Backtick => {
                self.consume_balanced()
            }
            TokenType::Text(text) if paren_balance(text) > 0 => self.consume_call(),
            TokenType::Text(_) => {
                self.advance();
                if self.check(&TokenType::LBracket) {
                    // Index expression, e.g. `env["HOME"]`.
                    self.consume_balanced()
                } else {
                    start.pos_end
                }
            }
        };
        Some(self.source_text[start.pos_start..end].to_string())
    }

    /// Consumes a region opened by the current token up to its matching closer
    /// and returns the byte offset just past it. Nested openers of the same
    /// kind increase the depth.
    fn consume_balanced(&mut self) -> usize {
        let open = self.current_token().clone();
        let Some(closer) = open.ttype.closer() else {
            self.advance();
            return open.pos_end;
        };
        self.advance();

        let mut depth = 1usize;
        let mut end = open.pos_end;
        loop {
            let token = self.current_token().clone();
            if token.ttype == TokenType::Eof {
                self.report(ParserError::UnbalancedValue {
                    src: self.source.clone(),
                    span: span_of(&open),
                    opener: open_text(&open.ttype),
                });
                return end;
            }
            end = token.pos_end;
            self.advance();
            if token.ttype == closer {
                depth -= 1;
                if depth == 0 {
                    return end;
                }
            } else if token.ttype == open.ttype {
                depth += 1;
            }
        }
    }

    /// Consumes a wrapper call such as `concat(` ... `)`. Parentheses are
    /// counted in text tokens outside quoted regions.
    fn consume_call(&mut self) -> usize {
        let open = self.current_token().clone();
        let mut depth: i64 = 0;
        let mut quoted: Option<TokenType> = None;
        let mut end = open.pos_end;
        loop {
            let token = self.current_token().clone();
            match &token.ttype {
                TokenType::Eof => {
                    self.report(ParserError::UnbalancedValue {
                        src: self.source.clone(),
                        span: span_of(&open),
                        opener: open.ttype.as_text().unwrap_or("(").to_string(),
                    });
                    return end;
                }
                TokenType::Quote | TokenType::Backtick => {
                    quoted = match quoted {
                        Some(ref q) if *q == token.ttype => None,
                        None => Some(token.ttype.clone()),
                        other => other,
                    };
                }
                TokenType::Text(text) if quoted.is_none() => depth += paren_balance(text),
                _ => {}
            }
            end = token.pos_end;
            self.advance();
            if quoted.is_none() && depth <= 0 {
                return end;
            }
        }
    }

    // === Token Helper Methods ===

    fn current_token(&self) -> &Token {
        // The stream always ends with Eof and `advance` never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, ttype: &TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: &TokenType) -> bool {
        std::mem::discriminant(&self.current_token().ttype) == std::mem::discriminant(ttype)
    }

    fn report_unexpected(&mut self, expected: &str) {
        let token = self.current_token().clone();
        let err = if token.ttype == TokenType::Eof {
            ParserError::UnexpectedEof {
                src: self.source.clone(),
                span: (self.source_text.len(), 0).into(),
                expected: expected.to_string(),
            }
        } else {
            ParserError::UnexpectedToken {
                src: self.source.clone(),
                span: span_of(&token),
                expected: format!("{expected} (found {})", token.ttype.describe()),
            }
        };
        self.report(err);
    }

    fn report(&mut self, err: ParserError) {
        let offset = err.offset();
        let (line, column) = get_line_and_column(self.source_text, offset);
        warn!("{}:{line}:{column}: {err}", self.source.name());
        self.diagnostics.push(err);
    }
}

fn span_of(token: &Token) -> SourceSpan {
    (token.pos_start, token.pos_end - token.pos_start).into()
}

fn open_text(ttype: &TokenType) -> String {
    match ttype {
        TokenType::LBrace => "{",
        TokenType::LBracket => "[",
        TokenType::Quote => "\"",
        TokenType::Backtick => "`",
        _ => "(",
    }
    .to_string()
}

fn paren_balance(text: &str) -> i64 {
    text.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    fn parse_ok(source: &str) -> Vec<DocumentNode> {
        let parsed = Parser::new_with_name(source, "test.alloy".to_string()).parse_document();
        if let Some(err) = parsed.diagnostics.into_iter().next() {
            panic!("{:?}", Report::new(err));
        }
        parsed.nodes
    }

    fn parse_lenient(source: &str) -> ParsedDocument {
        Parser::new(source).parse_document()
    }

    fn value_of(source: &str) -> String {
        let nodes = parse_ok(&format!("n {{\n  v = {source}\n}}"));
        nodes[0].arguments[0].value.clone()
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_ok("").is_empty());
        assert!(parse_ok("  // only a comment\n").is_empty());
    }

    #[test]
    fn test_simple_node() {
        let nodes = parse_ok(r#"a.b { x = 1 y = "hi" }"#);
        assert_eq!(
            nodes,
            vec![DocumentNode {
                name: "a.b".to_string(),
                label: None,
                arguments: vec![Argument::new("x", "1"), Argument::new("y", "\"hi\"")],
                blocks: vec![],
            }]
        );
    }

    #[test]
    fn test_labelled_empty_node() {
        let nodes = parse_ok(r#"foo "mylabel" { }"#);
        assert_eq!(nodes, vec![DocumentNode::new("foo").with_label("mylabel")]);
    }

    #[test]
    fn test_nested_blocks() {
        let nodes = parse_ok("a { b { c = 1 } }");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].blocks.len(), 1);
        assert_eq!(nodes[0].blocks[0].name, "b");
        assert_eq!(nodes[0].blocks[0].arguments, vec![Argument::new("c", "1")]);
    }

    #[test]
    fn test_repeated_blocks_keep_order() {
        let nodes = parse_ok(
            r#"discovery.relabel "x" {
                rule { action = "drop" }
                rule { action = "keep" }
            }"#,
        );
        let rules: Vec<_> = nodes[0]
            .blocks
            .iter()
            .map(|b| b.arguments[0].value.as_str())
            .collect();
        assert_eq!(rules, vec!["\"drop\"", "\"keep\""]);
    }

    #[test]
    fn test_multiple_nodes() {
        let nodes = parse_ok("a { }\nb \"l\" { x = 2 }\nc { }");
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_string_value_keeps_inner_whitespace() {
        assert_eq!(value_of(r#""hello  world""#), r#""hello  world""#);
    }

    #[test]
    fn test_list_value() {
        assert_eq!(value_of("[a.out, b.out]"), "[a.out, b.out]");
    }

    #[test]
    fn test_nested_list_value() {
        assert_eq!(value_of("[[1, 2], [3]]"), "[[1, 2], [3]]");
    }

    #[test]
    fn test_object_value() {
        assert_eq!(
            value_of(r#"{ "__address__" = "localhost:9090" }"#),
            r#"{ "__address__" = "localhost:9090" }"#
        );
    }

    #[test]
    fn test_list_of_objects_value() {
        let value = "[{ a = \"1\" }, { b = [2] }]";
        assert_eq!(value_of(value), value);
    }

    #[test]
    fn test_raw_string_value() {
        assert_eq!(value_of("`C:\\path \"x\"`"), "`C:\\path \"x\"`");
    }

    #[test]
    fn test_brackets_inside_string_do_not_count() {
        assert_eq!(value_of(r#"["a]", "b"]"#), r#"["a]", "b"]"#);
    }

    #[test]
    fn test_concat_call_value() {
        assert_eq!(value_of("concat([a.out], [b.out2])"), "concat([a.out], [b.out2])");
    }

    #[test]
    fn test_generic_call_value() {
        assert_eq!(value_of(r#"sys.env("API_KEY")"#), r#"sys.env("API_KEY")"#);
        assert_eq!(value_of(r#"concat(x, f(")"))"#), r#"concat(x, f(")"))"#);
    }

    #[test]
    fn test_index_expression_value() {
        assert_eq!(value_of(r#"env["HOME"]"#), r#"env["HOME"]"#);
    }

    #[test]
    fn test_values_followed_by_more_arguments() {
        let nodes = parse_ok("n {\n a = [1]\n b = \"x\"\n c = 3\n inner { }\n}");
        let args: Vec<_> = nodes[0]
            .arguments
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(args, vec![("a", "[1]"), ("b", "\"x\""), ("c", "3")]);
        assert_eq!(nodes[0].blocks.len(), 1);
    }

    #[test]
    fn test_unexpected_symbol_is_reported_and_parsing_continues() {
        let parsed = parse_lenient("a { x : 1 y = 2 }");
        assert!(!parsed.is_clean());
        assert!(matches!(
            parsed.diagnostics[0],
            ParserError::UnexpectedToken { .. }
        ));
        assert_eq!(parsed.nodes.len(), 1);
        assert!(parsed.nodes[0].argument("y").is_some());
    }

    #[test]
    fn test_stray_bracket_as_value_is_skipped() {
        let parsed = parse_lenient("a { x = ] y = 2 }");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            &parsed.diagnostics[0],
            ParserError::UnexpectedToken { expected, .. } if expected.starts_with("a value")
        ));
        assert_eq!(parsed.nodes[0].arguments, vec![Argument::new("y", "2")]);
    }

    #[test]
    fn test_comment_before_value() {
        let nodes = parse_ok("a { x = /* note */ 1 }");
        assert_eq!(nodes[0].arguments, vec![Argument::new("x", "1")]);
    }

    #[test]
    fn test_missing_closing_brace() {
        let parsed = parse_lenient("a { x = 1");
        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(parsed.nodes[0].arguments, vec![Argument::new("x", "1")]);
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| matches!(d, ParserError::MissingClosingBrace { name, .. } if name == "a")));
    }

    #[test]
    fn test_unbalanced_list_value() {
        let parsed = parse_lenient("a { x = [1, 2 }");
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| matches!(d, ParserError::UnbalancedValue { opener, .. } if opener == "[")));
    }

    #[test]
    fn test_stray_closing_brace_at_top_level() {
        let parsed = parse_lenient("} a { }");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.nodes, vec![DocumentNode::new("a")]);
    }

    #[test]
    fn test_unterminated_label() {
        let parsed = parse_lenient("a \"lbl");
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| matches!(d, ParserError::UnterminatedLabel { .. })));
    }

    #[test]
    fn test_strict_result() {
        assert!(parse_lenient("a { x = }").into_result().is_err());
        assert!(parse_lenient("a { x = 1 }").into_result().is_ok());
    }
}
