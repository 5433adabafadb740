//! Tokenizer producing Python's logical-line token stream
//! (NEWLINE / INDENT / DEDENT plus names, numbers, strings and operators).

use crate::errors::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    String,
    Op,
    Newline,
    Indent,
    Dedent,
    EndMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "<<", ">>", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "^=", "@=", "->", ":=",
];
const ONE_CHAR_OPS: &str = "+-*/%@&|^~<>()[]{},:.;=";

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    depth: usize,
}

/// Tokenize a whole source unit.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        line_start: 0,
        tokens: Vec::new(),
        indents: vec![0],
        depth: 0,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column())
    }

    fn push(&mut self, kind: TokenKind, text: String, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            text,
            line,
            column,
        });
    }

    fn consume_newline(&mut self) {
        if self.peek(0) == Some('\r') && self.peek(1) == Some('\n') {
            self.pos += 2;
        } else {
            self.pos += 1;
        }
        self.line += 1;
        self.line_start = self.pos;
    }

    fn last_is_line_end(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if !self.handle_indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let Some(c) = self.peek(0) else { break };
            match c {
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if matches!(self.peek(1), Some('\n') | Some('\r')) => {
                    self.pos += 1;
                    self.consume_newline();
                }
                '\n' | '\r' => {
                    if self.depth == 0 && !self.last_is_line_end() {
                        let (line, column) = (self.line, self.column());
                        self.push(TokenKind::Newline, String::new(), line, column);
                    }
                    self.consume_newline();
                    at_line_start = self.depth == 0;
                }
                '"' | '\'' => self.lex_string(String::new())?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => self.lex_number()?,
                c if c == '_' || c.is_alphabetic() => self.lex_name()?,
                _ => self.lex_operator()?,
            }
        }

        if !self.last_is_line_end() {
            let (line, column) = (self.line, self.column());
            self.push(TokenKind::Newline, String::new(), line, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            let line = self.line;
            self.push(TokenKind::Dedent, String::new(), line, 1);
        }
        let line = self.line;
        self.push(TokenKind::EndMarker, String::new(), line, 1);
        Ok(())
    }

    /// Measure leading whitespace of a physical line. Returns `false` for
    /// blank and comment-only lines, which produce no tokens.
    fn handle_indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0usize;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width += 8 - width % 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                if self.peek(0).is_some() {
                    self.consume_newline();
                }
                return Ok(false);
            }
            Some('\n') | Some('\r') => {
                self.consume_newline();
                return Ok(false);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        let (line, column) = (self.line, self.column());
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, String::new(), line, column);
        } else if width < current {
            while self.indents.last().is_some_and(|top| *top > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, String::new(), line, column);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' || c == '\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn lex_name(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c == '_' || c.is_alphanumeric())
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if matches!(self.peek(0), Some('"') | Some('\''))
            && STRING_PREFIXES.contains(&text.to_ascii_lowercase().as_str())
        {
            return self.lex_string_at(text, line, column);
        }
        self.push(TokenKind::Name, text, line, column);
        Ok(())
    }

    fn lex_string(&mut self, prefix: String) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        self.lex_string_at(prefix, line, column)
    }

    fn lex_string_at(&mut self, prefix: String, line: usize, column: usize) -> Result<(), ParseError> {
        let Some(quote) = self.peek(0) else {
            return Err(self.error("expected string quote"));
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let start = self.pos;
        self.pos += if triple { 3 } else { 1 };
        loop {
            let Some(c) = self.peek(0) else {
                return Err(ParseError::new("unterminated string literal", line, column));
            };
            match c {
                '\\' => {
                    self.pos += 1;
                    if matches!(self.peek(0), Some('\n') | Some('\r')) {
                        self.consume_newline();
                    } else {
                        self.pos += 1;
                    }
                }
                '\n' | '\r' => {
                    if !triple {
                        return Err(ParseError::new("unterminated string literal", line, column));
                    }
                    self.consume_newline();
                }
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        let body: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::String, format!("{prefix}{body}"), line, column);
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        let start = self.pos;
        let radix_prefix = self.peek(0) == Some('0')
            && matches!(self.peek(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.pos += 2;
            while self
                .peek(0)
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
        } else {
            self.eat_digits();
            if self.peek(0) == Some('.') && self.peek(1) != Some('.') {
                self.pos += 1;
                self.eat_digits();
            }
            if matches!(self.peek(0), Some('e' | 'E')) {
                let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
                if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1 + sign;
                    self.eat_digits();
                }
            }
            if matches!(self.peek(0), Some('j' | 'J')) {
                self.pos += 1;
            }
        }
        if self.peek(0).is_some_and(|c| c == '_' || c.is_alphabetic()) {
            let keyword_follows = ["if", "else", "and", "or", "in", "is", "not", "for"]
                .iter()
                .any(|kw| self.starts_with(kw));
            if !keyword_follows {
                return Err(self.error("invalid numeric literal"));
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::Number, text, line, column);
        Ok(())
    }

    fn eat_digits(&mut self) {
        while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn lex_operator(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column());
        for op in THREE_CHAR_OPS.iter().chain(TWO_CHAR_OPS.iter()) {
            if self.starts_with(op) {
                self.pos += op.len();
                self.push(TokenKind::Op, (*op).to_string(), line, column);
                return Ok(());
            }
        }
        let Some(c) = self.peek(0) else {
            return Err(self.error("unexpected end of input"));
        };
        if !ONE_CHAR_OPS.contains(c) {
            return Err(self.error(format!("unexpected character {c:?}")));
        }
        match c {
            '(' | '[' | '{' => self.depth += 1,
            ')' | ']' | '}' => {
                if self.depth == 0 {
                    return Err(self.error(format!("unmatched {c:?}")));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.pos += 1;
        self.push(TokenKind::Op, c.to_string(), line, column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_indent_and_dedent() {
        use TokenKind::*;
        let tokens = kinds("if x:\n    y = 1\nz\n");
        assert_eq!(
            tokens,
            vec![
                Name, Name, Op, Newline, Indent, Name, Op, Number, Newline, Dedent, Name,
                Newline, EndMarker
            ]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        let tokens = kinds("x = 1\n\n   # comment\n\ny = 2\n");
        assert_eq!(
            tokens.iter().filter(|k| **k == TokenKind::Newline).count(),
            2
        );
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("x = (1,\n     2)\n");
        assert_eq!(
            tokens.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn test_string_prefixes_and_triple_quotes() {
        let tokens = tokenize("a = rb'\\d'\nb = \"\"\"multi\nline\"\"\"\nc = f\"{x}\"\n").unwrap();
        let strings: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::String)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(strings, vec!["rb'\\d'", "\"\"\"multi\nline\"\"\"", "f\"{x}\""]);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("x = 0xFF + 1_000 + 1.5e-3 + .5 + 3j\n").unwrap();
        let numbers: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["0xFF", "1_000", "1.5e-3", ".5", "3j"]);
    }

    #[test]
    fn test_longest_operator_match() {
        let tokens = tokenize("x **= 2 // 3\n").unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Op)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(ops, vec!["**=", "//"]);
    }

    #[test]
    fn test_bad_dedent_is_error() {
        let err = tokenize("if x:\n        y\n    z\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(tokenize("x = 'abc\n").is_err());
    }
}
