//! Source tokeniser.
//!
//! Input is consumed line by line. Each line is first broken into
//! lexemes: runs of alphanumerics and `_`, single punctuation
//! characters, with `;` opening a comment that runs to end of line.
//! The scanner then classifies lexemes into tokens, joining several
//! where the dialect calls for it: doubled operators (`<<`, `>>`, `**`,
//! `//`), prefixed integers (`$`, `%`), real literals with optional
//! signed exponents, and label definitions terminated by `:`.

use std::collections::VecDeque;

use crate::diag::{Abort, Diagnostics, Phase};
use crate::encode;
use crate::symtab::SymbolTable;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Mnemonic,
    Assembler,
    Operator,
    Integer,
    Float,
    /// Label definition, `name:`.
    Target,
    /// Any other identifier.
    Label,
    ArgSep,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Text as it appeared in the source.
    pub text: String,
    /// Upper cased form used for table lookups.
    pub name: String,
    pub value: Option<Value>,
    pub line: u32,
}

impl Token {
    fn new(kind: TokenKind, text: &str, name: String, line: u32) -> Token {
        Token {
            kind,
            text: text.to_string(),
            name,
            value: None,
            line,
        }
    }

    fn operator(text: String, line: u32) -> Token {
        Token {
            kind: TokenKind::Operator,
            name: text.clone(),
            text,
            value: None,
            line,
        }
    }

    fn number(kind: TokenKind, text: String, value: Value, line: u32) -> Token {
        Token {
            kind,
            name: text.clone(),
            text,
            value: Some(value),
            line,
        }
    }

    pub fn eof(line: u32) -> Token {
        Token {
            kind: TokenKind::Eof,
            text: String::new(),
            name: String::new(),
            value: None,
            line,
        }
    }

    /// Kind and source text, for "expected X but saw ..." messages.
    pub fn describe(&self) -> String {
        format!("{:?}/{:?}", self.kind, self.text)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Break one line into lexemes, dropping whitespace and comments.
fn split_lexemes(line: &str) -> Vec<&str> {
    let mut lexemes = Vec::new();
    let mut chars = line.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c == ';' {
            break;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut end = start + c.len_utf8();
        chars.next();
        if is_word_char(c) {
            while let Some(&(i, d)) = chars.peek() {
                if !is_word_char(d) {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
        }
        lexemes.push(&line[start..end]);
    }
    lexemes
}

/// Pull-model token source over one program text.
pub struct TokenStream<'a> {
    lines: std::str::Split<'a, char>,
    linebuf: VecDeque<&'a str>,
    line: u32,
    spinreals: bool,
    pushed: Option<Token>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str, spinreals: bool) -> TokenStream<'a> {
        TokenStream {
            lines: source.split('\n'),
            linebuf: VecDeque::new(),
            line: 0,
            spinreals,
            pushed: None,
        }
    }

    /// Return a token to the stream; the next fetch yields it again.
    pub fn push_back(&mut self, token: Token) {
        self.pushed = Some(token);
    }

    /// Fetch the next token. Identifier modifiers (`^`, `#`) are only
    /// absorbed when the combined name is already a known symbol, so
    /// `x^2` stays an xor expression unless `x^` names a memory label.
    pub fn next_token(
        &mut self,
        symtbl: &SymbolTable,
        diag: &mut Diagnostics,
    ) -> Result<Token, Abort> {
        if let Some(token) = self.pushed.take() {
            return Ok(token);
        }
        loop {
            if self.linebuf.is_empty() {
                match self.lines.next() {
                    Some(text) => {
                        self.line += 1;
                        self.linebuf = split_lexemes(text).into_iter().collect();
                        continue;
                    }
                    None => return Ok(Token::eof(self.line)),
                }
            }
            let lex = match self.linebuf.pop_front() {
                Some(l) => l,
                None => continue,
            };
            let up = lex.to_uppercase();

            if encode::is_mnemonic(&up) {
                return Ok(Token::new(TokenKind::Mnemonic, lex, up, self.line));
            }
            if up == "EQU" || up == "MEM" {
                return Ok(Token::new(TokenKind::Assembler, lex, up, self.line));
            }
            if up == "INT" {
                return Ok(Token::new(TokenKind::Operator, lex, up, self.line));
            }
            if matches!(lex, "<" | ">" | "*" | "/") {
                let mut optxt = String::from(lex);
                if self.linebuf.front() == Some(&lex) {
                    self.linebuf.pop_front();
                    optxt.push_str(lex);
                }
                if optxt == "<" || optxt == ">" {
                    diag.error(
                        Phase::Scan,
                        self.line,
                        format!("Invalid operator {:?}", optxt),
                    )?;
                    continue;
                }
                return Ok(Token::operator(optxt, self.line));
            }
            if matches!(lex, "|" | "^" | "&" | "+" | "-" | "~" | "!" | "(" | ")") {
                return Ok(Token::operator(lex.to_string(), self.line));
            }
            if lex == "$" || lex == "%" {
                match self.scan_prefixed_integer(lex, diag)? {
                    Some(token) => return Ok(token),
                    None => continue,
                }
            }
            if lex.starts_with(|c: char| c.is_ascii_digit()) {
                match self.scan_number(lex, diag)? {
                    Some(token) => return Ok(token),
                    None => continue,
                }
            }
            if lex.starts_with(|c: char| c.is_ascii_alphabetic()) {
                if self.linebuf.front() == Some(&":") {
                    self.linebuf.pop_front();
                    return Ok(Token::new(TokenKind::Target, lex, up, self.line));
                }
                if let Some(&modifier) = self.linebuf.front() {
                    if modifier == "^" || modifier == "#" {
                        let name = format!("{}{}", up, modifier);
                        if symtbl.contains(&name) {
                            self.linebuf.pop_front();
                            let text = format!("{}{}", lex, modifier);
                            return Ok(Token {
                                kind: TokenKind::Label,
                                text,
                                name,
                                value: None,
                                line: self.line,
                            });
                        }
                    }
                }
                return Ok(Token::new(TokenKind::Label, lex, up, self.line));
            }
            if lex == "," {
                return Ok(Token::new(TokenKind::ArgSep, lex, up, self.line));
            }
            if lex == "\u{feff}" {
                continue;
            }
            diag.error(
                Phase::Scan,
                self.line,
                format!("Unrecognised input {:?}", lex),
            )?;
        }
    }

    /// `$`/`%` prefixed hexadecimal and binary literals. The digit run
    /// arrives as the following lexeme; underscores are stripped.
    fn scan_prefixed_integer(
        &mut self,
        prefix: &str,
        diag: &mut Diagnostics,
    ) -> Result<Option<Token>, Abort> {
        let base = if prefix == "$" { 16 } else { 2 };
        let digits = match self.linebuf.pop_front() {
            Some(d) => d,
            None => {
                diag.error(
                    Phase::Scan,
                    self.line,
                    "End of line scanning for integer".to_string(),
                )?;
                return Ok(None);
            }
        };
        let text = format!("{}{}", prefix, digits);
        match i64::from_str_radix(&digits.replace('_', ""), base) {
            Ok(v) => Ok(Some(Token::number(
                TokenKind::Integer,
                text,
                Value::Int(v),
                self.line,
            ))),
            Err(_) => {
                diag.error(
                    Phase::Scan,
                    self.line,
                    format!("Invalid integer literal {:?}", text),
                )?;
                Ok(None)
            }
        }
    }

    /// Numeric literals beginning with a digit: decimal, `0x`/`0b`
    /// prefixed integers, and reals such as `1.5e-4` whose fraction,
    /// exponent sign and exponent arrive as separate lexemes.
    fn scan_number(&mut self, lex: &str, diag: &mut Diagnostics) -> Result<Option<Token>, Abort> {
        let intpart = lex.to_lowercase();
        if self.linebuf.front() == Some(&".") {
            self.linebuf.pop_front();
            let frac = match self.linebuf.pop_front() {
                Some(f) => f,
                None => {
                    diag.error(
                        Phase::Scan,
                        self.line,
                        "End of line scanning numeric".to_string(),
                    )?;
                    return Ok(None);
                }
            };
            let mut text = format!("{}.{}", intpart, frac);
            if frac.ends_with('e') {
                match (self.linebuf.pop_front(), self.linebuf.pop_front()) {
                    (Some(sign), Some(exp)) => {
                        text.push_str(sign);
                        text.push_str(exp);
                    }
                    _ => {
                        diag.error(
                            Phase::Scan,
                            self.line,
                            "End of line scanning numeric".to_string(),
                        )?;
                        return Ok(None);
                    }
                }
            }
            return match text.parse::<f64>() {
                Ok(v) => Ok(Some(Token::number(
                    TokenKind::Float,
                    text,
                    Value::Real(v),
                    self.line,
                ))),
                Err(_) => {
                    diag.error(
                        Phase::Scan,
                        self.line,
                        format!("Invalid numeric literal {:?}", text),
                    )?;
                    Ok(None)
                }
            };
        }
        if self.spinreals && (intpart == "1" || intpart == "2") {
            let value = if intpart == "1" { 1.0 } else { 2.0 };
            let mut token = Token::number(
                TokenKind::Float,
                format!("{}.0", intpart),
                Value::Real(value),
                self.line,
            );
            token.text = intpart;
            return Ok(Some(token));
        }
        let digits = intpart.replace('_', "");
        let (base, run) = if let Some(hex) = digits.strip_prefix("0x") {
            (16, hex)
        } else if let Some(bin) = digits.strip_prefix("0b") {
            (2, bin)
        } else {
            (10, digits.as_str())
        };
        match i64::from_str_radix(run, base) {
            Ok(v) => Ok(Some(Token::number(
                TokenKind::Integer,
                intpart,
                Value::Int(v),
                self.line,
            ))),
            Err(_) => {
                diag.error(
                    Phase::Scan,
                    self.line,
                    format!("Invalid integer literal {:?}", lex),
                )?;
                Ok(None)
            }
        }
    }
}
