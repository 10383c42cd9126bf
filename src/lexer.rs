use log::debug;

/// Represents the different kinds of tokens that the lexer can produce.
///
/// Only the structural delimiters are recognised. Everything else (identifiers,
/// operators, numbers, function calls) is an opaque [`TokenType::Text`] run that
/// the parser stitches back together from source spans.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input file.
    Eof,
    /// A run of whitespace outside a quoted region.
    Whitespace,
    /// A `// line` or `/* block */` comment outside a quoted region.
    Comment(String),

    // == Content ==
    /// A whitespace-free run of non-delimiter characters, or the whole body of
    /// a quoted region.
    Text(String),

    // == Delimiters ==
    /// Left Brace: `{`
    LBrace,
    /// Right Brace: `}`
    RBrace,
    /// Left Bracket: `[`
    LBracket,
    /// Right Bracket: `]`
    RBracket,
    /// Double quote. Opens and closes a string region.
    Quote,
    /// Backtick. Opens and closes a raw string region.
    Backtick,
}

impl TokenType {
    /// The character that closes a region opened by this token, if it is an opener.
    pub fn closer(&self) -> Option<TokenType> {
        match self {
            TokenType::LBrace => Some(TokenType::RBrace),
            TokenType::LBracket => Some(TokenType::RBracket),
            TokenType::Quote => Some(TokenType::Quote),
            TokenType::Backtick => Some(TokenType::Backtick),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TokenType::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_text(&self, expected: &str) -> bool {
        self.as_text() == Some(expected)
    }

    /// Human readable form for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenType::Eof => "end of file".to_string(),
            TokenType::Whitespace => "whitespace".to_string(),
            TokenType::Comment(_) => "a comment".to_string(),
            TokenType::Text(s) => format!("`{s}`"),
            TokenType::LBrace => "`{`".to_string(),
            TokenType::RBrace => "`}`".to_string(),
            TokenType::LBracket => "`[`".to_string(),
            TokenType::RBracket => "`]`".to_string(),
            TokenType::Quote => "`\"`".to_string(),
            TokenType::Backtick => "`` ` ``".to_string(),
        }
    }
}

/// A token with its type and byte position in the source.
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
    // Closing character of the quoted region we are inside, if any.
    quoted: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            position: 0,
            quoted: None,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        debug!("lexed {} tokens from {} bytes", tokens.len(), self.input.len());
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start_pos = self.position;

        if let Some(closing) = self.quoted {
            let ttype = match self.peek() {
                None => TokenType::Eof,
                Some(&c) if c == closing => {
                    self.advance();
                    self.quoted = None;
                    delimiter(c)
                }
                Some(_) => self.read_quoted_body(closing),
            };
            return Token::new(ttype, start_pos, self.position);
        }

        let ttype = if let Some(char) = self.advance() {
            match char {
                '{' => TokenType::LBrace,
                '}' => TokenType::RBrace,
                '[' => TokenType::LBracket,
                ']' => TokenType::RBracket,
                '"' | '`' => {
                    self.quoted = Some(char);
                    delimiter(char)
                }
                '/' if self.peek() == Some(&'/') => self.read_line_comment(),
                '/' if self.peek() == Some(&'*') => self.read_block_comment(),
                c if c.is_whitespace() => self.read_whitespace(),
                c => self.read_text(c),
            }
        } else {
            TokenType::Eof
        };

        Token::new(ttype, start_pos, self.position)
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn read_whitespace(&mut self) -> TokenType {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        TokenType::Whitespace
    }

    fn read_line_comment(&mut self) -> TokenType {
        self.advance(); // Consume the second '/'
        let start = self.position;
        while let Some(c) = self.peek() {
            if *c == '\n' {
                break;
            }
            self.advance();
        }
        TokenType::Comment(self.input[start..self.position].trim().to_string())
    }

    fn read_block_comment(&mut self) -> TokenType {
        self.advance(); // Consume the '*'
        let start = self.position;
        let mut end = start;
        while self.peek().is_some() {
            if self.rest().starts_with("*/") {
                end = self.position;
                self.advance();
                self.advance();
                return TokenType::Comment(self.input[start..end].trim().to_string());
            }
            self.advance();
            end = self.position;
        }
        // Unclosed block comments swallow the rest of the input.
        TokenType::Comment(self.input[start..end].trim().to_string())
    }

    /// Reads everything up to (not including) the closing character. There is
    /// no escape handling, so `\"` still terminates a double-quoted region.
    fn read_quoted_body(&mut self, closing: char) -> TokenType {
        let start = self.position;
        while let Some(&c) = self.peek() {
            if c == closing {
                break;
            }
            self.advance();
        }
        TokenType::Text(self.input[start..self.position].to_string())
    }

    fn read_text(&mut self, first_char: char) -> TokenType {
        let start = self.position - first_char.len_utf8();
        while let Some(&c) = self.peek() {
            if c.is_whitespace() || is_delimiter(c) {
                break;
            }
            let rest = self.rest();
            if rest.starts_with("//") || rest.starts_with("/*") {
                break;
            }
            self.advance();
        }
        TokenType::Text(self.input[start..self.position].to_string())
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '{' | '}' | '[' | ']' | '"' | '`')
}

fn delimiter(c: char) -> TokenType {
    if c == '`' {
        TokenType::Backtick
    } else {
        TokenType::Quote
    }
}

/// Lexes `input` and drops whitespace and comments, leaving the stream the
/// parser consumes. The trailing [`TokenType::Eof`] is kept.
pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new(input)
        .lex()
        .into_iter()
        .filter(|t| !matches!(t.ttype, TokenType::Whitespace | TokenType::Comment(_)))
        .collect()
}
