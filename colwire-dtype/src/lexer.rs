use std::borrow::Cow;

use colwire_error::{ColwireError, ColwireResult, colwire_err};

use crate::Number;

/// A cursor over type-name or SQL literal text.
///
/// The lexer works on characters rather than tokens so that the same cursor can be handed down
/// through nested type constructors and per-type literal parsers. Errors report the byte
/// position at which parsing failed.
#[derive(Debug, Clone)]
pub struct TypeLexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeLexer<'a> {
    /// Create a cursor at the start of `input`.
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// The full input text.
    pub fn input(&self) -> &'a str {
        self.input
    }

    /// The current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor back to an offset previously returned by [`TypeLexer::pos`].
    pub fn reset(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    /// The text that has not been consumed yet.
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Look at the next character without consuming it or skipping whitespace.
    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Consume and return the next character.
    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip any whitespace at the cursor.
    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next_char();
        }
    }

    /// Whether only whitespace remains.
    pub fn eof(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }

    /// Whether the next non-whitespace character is `c`.
    pub fn is_char_ahead(&mut self, c: char) -> bool {
        self.skip_whitespace();
        self.peek() == Some(c)
    }

    /// Consume `c` if it is the next non-whitespace character.
    pub fn try_consume(&mut self, c: char) -> bool {
        if self.is_char_ahead(c) {
            self.next_char();
            true
        } else {
            false
        }
    }

    /// Require `c` to be the next non-whitespace character.
    pub fn consume(&mut self, c: char) -> ColwireResult<()> {
        if self.try_consume(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    /// Read an identifier, or a backtick / double-quote quoted identifier.
    pub fn bare_word(&mut self) -> ColwireResult<Cow<'a, str>> {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ ('`' | '"')) => {
                self.next_char();
                self.quoted(quote).map(Cow::Owned)
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
                {
                    self.next_char();
                }
                Ok(Cow::Borrowed(&self.input[start..self.pos]))
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Whether the next non-whitespace character can start a bare word.
    pub fn is_word_ahead(&mut self) -> bool {
        self.skip_whitespace();
        self.peek()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '`' || c == '"')
    }

    /// Consume the text of a numeric literal without interpreting it.
    pub fn number_text(&mut self) -> ColwireResult<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.next_char();
        }

        let rest = self.remaining().as_bytes();
        let radix_digits: Option<fn(&char) -> bool> = match rest {
            [b'0', b'x' | b'X', ..] => Some(|c| c.is_ascii_hexdigit()),
            [b'0', b'b' | b'B', d, ..] if matches!(d, b'0' | b'1') => Some(|c| *c == '0' || *c == '1'),
            _ => None,
        };

        let digits_start;
        if let Some(is_digit) = radix_digits {
            self.pos += 2;
            digits_start = self.pos;
            self.take_while(is_digit);
        } else {
            digits_start = self.pos;
            self.take_while(char::is_ascii_digit);
            if self.peek() == Some('.') {
                self.next_char();
                self.take_while(char::is_ascii_digit);
            }
            let mantissa_end = self.pos;
            if matches!(self.peek(), Some('e' | 'E')) {
                self.next_char();
                if matches!(self.peek(), Some('-' | '+')) {
                    self.next_char();
                }
                let exponent_start = self.pos;
                self.take_while(char::is_ascii_digit);
                if self.pos == exponent_start {
                    self.pos = mantissa_end;
                }
            }
        }

        let digits = &self.input[digits_start..self.pos];
        if !digits.bytes().any(|b| b.is_ascii_hexdigit()) {
            self.pos = start;
            return Err(self.error("expected number"));
        }
        Ok(&self.input[start..self.pos])
    }

    /// Read a numeric literal into its narrowest exact representation.
    pub fn number_literal(&mut self) -> ColwireResult<Number> {
        let start = self.pos;
        let text = self.number_text()?;
        Number::parse(text).map_err(|e| e.with_context(format!("at position {start}")))
    }

    /// Read a single-quoted string literal, resolving backslash escapes and doubled quotes.
    pub fn string_literal(&mut self) -> ColwireResult<String> {
        self.consume('\'')?;
        self.quoted('\'')
    }

    /// Build a syntax error pointing at the cursor.
    pub fn error(&self, msg: impl AsRef<str>) -> ColwireError {
        colwire_err!(
            Syntax: "{} at position {} in '{}'",
            msg.as_ref(),
            self.pos,
            self.input
        )
    }

    fn take_while(&mut self, pred: impl Fn(&char) -> bool) {
        while self.peek().is_some_and(|c| pred(&c)) {
            self.next_char();
        }
    }

    /// Read up to the closing `quote`; the opening quote has been consumed.
    fn quoted(&mut self, quote: char) -> ColwireResult<String> {
        let mut out = String::new();
        loop {
            match self.next_char() {
                None => return Err(self.error(format!("unterminated {quote}-quoted text"))),
                Some('\\') => {
                    let escaped = self
                        .next_char()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'x' => {
                            let hex = self.remaining().get(..2).unwrap_or_default();
                            let byte = u8::from_str_radix(hex, 16)
                                .map_err(|_| self.error("invalid \\x escape"))?;
                            if !byte.is_ascii() {
                                return Err(self.error(format!(
                                    "\\x{hex} escape is not an ASCII character"
                                )));
                            }
                            self.pos += 2;
                            out.push(char::from(byte));
                        }
                        other => out.push(other),
                    }
                }
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.next_char();
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }
}
