//! Tokenizer shared by the DDS and DAS text grammars.

use crate::error::{ProcessorError, ProcessorResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Word(String),
    Quoted(String),
    Sym(char),
}

pub(crate) fn tokenize(src: &str, symbols: &str) -> ProcessorResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if symbols.contains(c) {
            tokens.push(Token::Sym(c));
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    Some('"') => break,
                    Some(ch) => text.push(ch),
                    None => return Err(ProcessorError::Dap("unterminated string".to_string())),
                }
            }
            tokens.push(Token::Quoted(text));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || symbols.contains(ch) || ch == '"' {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }

    Ok(tokens)
}

/// Cursor over a token list.
pub(crate) struct Tokens {
    tokens: Vec<Token>,
    pos: usize,
}

impl Tokens {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn next(&mut self) -> ProcessorResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ProcessorError::Dap("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    pub(crate) fn word(&mut self) -> ProcessorResult<String> {
        match self.next()? {
            Token::Word(w) => Ok(w),
            other => Err(ProcessorError::Dap(format!("expected a name, found {:?}", other))),
        }
    }

    pub(crate) fn expect(&mut self, sym: char) -> ProcessorResult<()> {
        match self.next()? {
            Token::Sym(c) if c == sym => Ok(()),
            other => Err(ProcessorError::Dap(format!("expected '{}', found {:?}", sym, other))),
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> ProcessorResult<()> {
        let word = self.word()?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(ProcessorError::Dap(format!("expected '{}', found '{}'", keyword, word)))
        }
    }

    /// Consume `sym` if it is next.
    pub(crate) fn eat(&mut self, sym: char) -> bool {
        if self.peek() == Some(&Token::Sym(sym)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}
