//! Tokenizer for the selector query language (spec §4.6).

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    Dollar,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match, // =~
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src, bytes: src.as_bytes(), pos: 0 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, (usize, String)> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let offset = self.pos;
            let Some(b) = self.peek_byte() else {
                out.push(Token { kind: TokenKind::Eof, offset });
                break;
            };
            let kind = match b {
                b'$' => { self.pos += 1; TokenKind::Dollar }
                b'.' if !self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) => {
                    self.pos += 1;
                    TokenKind::Dot
                }
                b'(' => { self.pos += 1; TokenKind::LParen }
                b')' => { self.pos += 1; TokenKind::RParen }
                b'[' => { self.pos += 1; TokenKind::LBracket }
                b']' => { self.pos += 1; TokenKind::RBracket }
                b',' => { self.pos += 1; TokenKind::Comma }
                b'=' => {
                    self.pos += 1;
                    match self.peek_byte() {
                        Some(b'=') => { self.pos += 1; TokenKind::Eq }
                        Some(b'~') => { self.pos += 1; TokenKind::Match }
                        _ => return Err((offset, "expected '==' or '=~'".into())),
                    }
                }
                b'!' => {
                    self.pos += 1;
                    match self.peek_byte() {
                        Some(b'=') => { self.pos += 1; TokenKind::Ne }
                        _ => return Err((offset, "expected '!='".into())),
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'"' => {
                    let s = self.lex_string(offset)?;
                    TokenKind::Str(s)
                }
                b'-' | b'0'..=b'9' => self.lex_number(offset)?,
                b if b.is_ascii_alphabetic() || b == b'_' => self.lex_ident_or_keyword(offset),
                other => {
                    return Err((offset, format!("unexpected character '{}'", other as char)));
                }
            };
            out.push(Token { kind, offset });
        }
        Ok(out)
    }

    fn lex_string(&mut self, offset: usize) -> Result<String, (usize, String)> {
        self.pos += 1; // opening quote
        let mut s = String::new();
        loop {
            match self.peek_byte() {
                None => return Err((offset, "unterminated string literal".into())),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek_byte() {
                        Some(b'n') => { s.push('\n'); self.pos += 1; }
                        Some(b't') => { s.push('\t'); self.pos += 1; }
                        Some(b'r') => { s.push('\r'); self.pos += 1; }
                        Some(b'\\') => { s.push('\\'); self.pos += 1; }
                        Some(b'"') => { s.push('"'); self.pos += 1; }
                        Some(b'x') => {
                            self.pos += 1;
                            let hex = self.src.get(self.pos..self.pos + 2)
                                .ok_or_else(|| (offset, "truncated \\xNN escape".to_string()))?;
                            let byte = u8::from_str_radix(hex, 16)
                                .map_err(|_| (offset, "invalid \\xNN escape".to_string()))?;
                            s.push(byte as char);
                            self.pos += 2;
                        }
                        _ => return Err((offset, "invalid escape sequence".into())),
                    }
                }
                Some(_) => {
                    let start = self.pos;
                    while let Some(b) = self.peek_byte() {
                        if b == b'"' || b == b'\\' {
                            break;
                        }
                        self.pos += 1;
                    }
                    s.push_str(&self.src[start..self.pos]);
                }
            }
        }
        Ok(s)
    }

    fn lex_number(&mut self, offset: usize) -> Result<TokenKind, (usize, String)> {
        let start = self.pos;
        if self.peek_byte() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_byte() == Some(b'.') && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| (offset, "invalid number literal".to_string()))
    }

    fn lex_ident_or_keyword(&mut self, _offset: usize) -> TokenKind {
        let start = self.pos;
        while self.peek_byte().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        match word.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "IN" => TokenKind::In,
            _ => TokenKind::Ident(word.to_string()),
        }
    }
}
