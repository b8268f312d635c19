//! Tokenizer for action scripts
//!
//! Produces Python-style NEWLINE/INDENT/DEDENT tokens. Newlines inside
//! brackets are ignored, `#` starts a comment.

use crate::core::{NetpilotError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Str(String),
    /// f-string split into literal text and embedded expression sources
    FStr(Vec<FPart>),
    Int(i64),
    Float(f64),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Text(String),
    Expr(String),
}

/// Operators, longest first so `==` wins over `=`
const OPS: &[&str] = &[
    "**", "==", "!=", "<=", ">=", "+=", "-=", "*=", "//", "->", "(", ")", "[", "]", "{", "}",
    ",", ":", ".", "=", "<", ">", "+", "-", "*", "/", "%",
];

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<(Token, usize)>,
    _src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
            _src: src,
        }
    }

    fn err(&self, msg: impl std::fmt::Display) -> NetpilotError {
        NetpilotError::tool(format!("syntax error on line {}: {}", self.line, msg))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Token) {
        self.tokens.push((tok, self.line));
    }

    /// Tokenize the whole input; each token carries its line number
    pub fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.handle_indent()? {
                    continue;
                }
            }

            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        if !matches!(self.tokens.last(), Some((Token::Newline, _)) | None) {
                            self.push(Token::Newline);
                        }
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '"' | '\'' => {
                    let s = self.read_string(c)?;
                    self.push(Token::Str(s));
                }
                c if c.is_ascii_digit() => self.read_number()?,
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while let Some(c) = self.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    let quote = self.peek();
                    let is_prefix = matches!(word.as_str(), "f" | "r" | "rf" | "fr" | "b");
                    if is_prefix && matches!(quote, Some('"') | Some('\'')) {
                        let raw = word.contains('r');
                        let body = if raw {
                            self.read_raw_string(quote.unwrap_or('"'))?
                        } else {
                            self.read_string(quote.unwrap_or('"'))?
                        };
                        if word.contains('f') {
                            let parts = self.split_fstring(&body)?;
                            self.push(Token::FStr(parts));
                        } else {
                            self.push(Token::Str(body));
                        }
                    } else {
                        self.push(Token::Name(word));
                    }
                }
                _ => self.read_op()?,
            }
        }

        if !matches!(self.tokens.last(), Some((Token::Newline, _)) | None) {
            self.push(Token::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent);
        }
        self.push(Token::Eof);
        Ok(self.tokens)
    }

    /// Measure indentation at line start. Returns true if the line was blank.
    fn handle_indent(&mut self) -> Result<bool> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width += 4,
                '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                // keep at_line_start semantics by re-entering
                return self.handle_indent();
            }
            Some('#') => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                    return self.handle_indent();
                }
                return Ok(true);
            }
            _ => {}
        }

        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(Token::Indent);
        } else {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(Token::Dedent);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(self.err("inconsistent indentation"));
            }
        }
        Ok(false)
    }

    fn read_number(&mut self) -> Result<()> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let v = text
                .parse::<f64>()
                .map_err(|e| self.err(format!("bad number '{}': {}", text, e)))?;
            self.push(Token::Float(v));
        } else {
            let v = text
                .parse::<i64>()
                .map_err(|e| self.err(format!("bad number '{}': {}", text, e)))?;
            self.push(Token::Int(v));
        }
        Ok(())
    }

    fn triple_quoted(&self, quote: char) -> bool {
        self.peek() == Some(quote) && self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)
    }

    fn read_string(&mut self, quote: char) -> Result<String> {
        let triple = self.triple_quoted(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut out = String::new();

        loop {
            let c = self.peek().ok_or_else(|| self.err("unterminated string"))?;
            if triple && self.triple_quoted(quote) {
                self.pos += 3;
                return Ok(out);
            }
            if !triple && c == quote {
                self.pos += 1;
                return Ok(out);
            }
            if !triple && c == '\n' {
                return Err(self.err("unterminated string"));
            }
            self.pos += 1;
            match c {
                '\\' => {
                    let esc = self.peek().ok_or_else(|| self.err("unterminated string"))?;
                    self.pos += 1;
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => self.line += 1,
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                '\n' => {
                    self.line += 1;
                    out.push('\n');
                }
                c => out.push(c),
            }
        }
    }

    fn read_raw_string(&mut self, quote: char) -> Result<String> {
        let triple = self.triple_quoted(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| self.err("unterminated string"))?;
            if triple && self.triple_quoted(quote) {
                self.pos += 3;
                return Ok(out);
            }
            if !triple && c == quote {
                self.pos += 1;
                return Ok(out);
            }
            if c == '\n' {
                if !triple {
                    return Err(self.err("unterminated string"));
                }
                self.line += 1;
            }
            if c == '\\' && self.peek_at(1) == Some(quote) {
                out.push('\\');
                out.push(quote);
                self.pos += 2;
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
    }

    fn split_fstring(&self, body: &str) -> Result<Vec<FPart>> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = body.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    if !text.is_empty() {
                        parts.push(FPart::Text(std::mem::take(&mut text)));
                    }
                    let mut expr = String::new();
                    let mut nesting = 0;
                    loop {
                        let c = chars
                            .next()
                            .ok_or_else(|| self.err("unterminated '{' in f-string"))?;
                        match c {
                            '{' | '[' | '(' => nesting += 1,
                            ']' | ')' => nesting -= 1,
                            '}' if nesting == 0 => break,
                            '}' => nesting -= 1,
                            _ => {}
                        }
                        expr.push(c);
                    }
                    // format specs are dropped: {value:>10} renders as {value}
                    let expr = match expr.rfind(':') {
                        Some(i) if !expr[i..].contains(['"', '\'', ']', ')']) => {
                            expr[..i].to_string()
                        }
                        _ => expr,
                    };
                    parts.push(FPart::Expr(expr.trim().to_string()));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(FPart::Text(text));
        }
        Ok(parts)
    }

    fn read_op(&mut self) -> Result<()> {
        for op in OPS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, oc)| self.peek_at(i) == Some(oc));
            if matches {
                self.pos += len;
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(Token::Op(op));
                return Ok(());
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.err(format!("unexpected character '{}'", c)))
    }
}
