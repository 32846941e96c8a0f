//! Tokenizer for the supported shell dialect.

use super::ast::{TextOrVar, Word, WordPiece};
use super::parser::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// A word (command name, argument, assignment or redirect target).
    Word(Word),
    /// `|`
    Pipe,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `;`
    Semi,
    /// End of line.
    Newline,
    /// `<`
    RedirectIn,
    /// `>`
    RedirectOut,
    /// `>>`
    RedirectAppend,
    /// `2>`
    RedirectErr,
    /// `2>>`
    RedirectErrAppend,
}

/// Short printable name of a token, for error messages.
pub(crate) fn describe(token: &Token) -> &'static str {
    match token {
        Token::Word(_) => "word",
        Token::Pipe => "|",
        Token::AndIf => "&&",
        Token::OrIf => "||",
        Token::Semi => ";",
        Token::Newline => "newline",
        Token::RedirectIn => "<",
        Token::RedirectOut => ">",
        Token::RedirectAppend => ">>",
        Token::RedirectErr => "2>",
        Token::RedirectErrAppend => "2>>",
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
    }
    .run()
}

/// Accumulates pieces of the word currently being lexed.
#[derive(Default)]
struct WordBuilder {
    pieces: Vec<WordPiece>,
    bare: String,
}

impl WordBuilder {
    fn is_empty(&self) -> bool {
        self.pieces.is_empty() && self.bare.is_empty()
    }

    fn push_char(&mut self, c: char) {
        self.bare.push(c);
    }

    fn push_piece(&mut self, piece: WordPiece) {
        self.flush_bare();
        self.pieces.push(piece);
    }

    fn flush_bare(&mut self) {
        if !self.bare.is_empty() {
            self.pieces
                .push(WordPiece::Text(std::mem::take(&mut self.bare)));
        }
    }

    fn finish_into(&mut self, tokens: &mut Vec<Token>) {
        self.flush_bare();
        if !self.pieces.is_empty() {
            tokens.push(Token::Word(Word {
                pieces: std::mem::take(&mut self.pieces),
            }));
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        let mut word = WordBuilder::default();

        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    word.finish_into(&mut tokens);
                }
                '\n' => {
                    self.bump();
                    word.finish_into(&mut tokens);
                    tokens.push(Token::Newline);
                }
                '#' if word.is_empty() => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '|' => {
                    self.bump();
                    word.finish_into(&mut tokens);
                    if self.peek() == Some('|') {
                        self.bump();
                        tokens.push(Token::OrIf);
                    } else {
                        tokens.push(Token::Pipe);
                    }
                }
                '&' => {
                    self.bump();
                    if self.peek() == Some('&') {
                        self.bump();
                        word.finish_into(&mut tokens);
                        tokens.push(Token::AndIf);
                    } else {
                        return Err(ParseError::Unsupported("background execution with '&'"));
                    }
                }
                ';' => {
                    self.bump();
                    word.finish_into(&mut tokens);
                    tokens.push(Token::Semi);
                }
                '<' => {
                    self.bump();
                    if self.peek() == Some('<') {
                        return Err(ParseError::Unsupported("here-documents"));
                    }
                    word.finish_into(&mut tokens);
                    tokens.push(Token::RedirectIn);
                }
                '>' => {
                    self.bump();
                    word.finish_into(&mut tokens);
                    if self.peek() == Some('>') {
                        self.bump();
                        tokens.push(Token::RedirectAppend);
                    } else {
                        tokens.push(Token::RedirectOut);
                    }
                }
                // An io-number is only recognised as its own token.
                '2' if word.is_empty() && self.peek_at(1) == Some('>') => {
                    self.bump();
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        tokens.push(Token::RedirectErrAppend);
                    } else {
                        tokens.push(Token::RedirectErr);
                    }
                }
                '(' | ')' => return Err(ParseError::Unsupported("subshells")),
                '`' => return Err(ParseError::Unsupported("command substitution")),
                '\'' => {
                    self.bump();
                    let text = self.single_quoted()?;
                    word.push_piece(WordPiece::SingleQuoted(text));
                }
                '"' => {
                    self.bump();
                    let parts = self.double_quoted()?;
                    word.push_piece(WordPiece::DoubleQuoted(parts));
                }
                '$' => {
                    self.bump();
                    self.dollar(&mut word)?;
                }
                '\\' => {
                    self.bump();
                    match self.bump() {
                        None => return Err(ParseError::TrailingBackslash),
                        Some('\n') => {} // line continuation
                        Some(escaped) => word.push_char(escaped),
                    }
                }
                other => {
                    self.bump();
                    word.push_char(other);
                }
            }
        }

        word.finish_into(&mut tokens);
        Ok(tokens)
    }

    fn single_quoted(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnclosedSingleQuote),
                Some('\'') => return Ok(text),
                Some(c) => text.push(c),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<Vec<TextOrVar>, ParseError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut flush = |text: &mut String, parts: &mut Vec<TextOrVar>| {
            if !text.is_empty() {
                parts.push(TextOrVar::Text(std::mem::take(text)));
            }
        };

        loop {
            match self.bump() {
                None => return Err(ParseError::UnclosedDoubleQuote),
                Some('"') => break,
                Some('`') => return Err(ParseError::Unsupported("command substitution")),
                Some('\\') => match self.bump() {
                    None => return Err(ParseError::UnclosedDoubleQuote),
                    Some(escaped @ ('"' | '\\' | '$' | '`')) => text.push(escaped),
                    Some('\n') => {}
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                },
                Some('$') => match self.peek() {
                    Some('(') => return Err(ParseError::Unsupported("command substitution")),
                    Some('{') => {
                        self.bump();
                        let name = self.var_name();
                        if name.is_empty() || self.peek() != Some('}') {
                            return Err(ParseError::BadBraceExpansion);
                        }
                        self.bump();
                        flush(&mut text, &mut parts);
                        parts.push(TextOrVar::Var(name));
                    }
                    Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                        let name = self.var_name();
                        flush(&mut text, &mut parts);
                        parts.push(TextOrVar::Var(name));
                    }
                    _ => text.push('$'),
                },
                Some(other) => text.push(other),
            }
        }

        flush(&mut text, &mut parts);
        Ok(parts)
    }

    fn dollar(&mut self, word: &mut WordBuilder) -> Result<(), ParseError> {
        match self.peek() {
            Some('(') => Err(ParseError::Unsupported("command substitution")),
            Some('{') => {
                self.bump();
                let name = self.var_name();
                if name.is_empty() || self.peek() != Some('}') {
                    return Err(ParseError::BadBraceExpansion);
                }
                self.bump();
                word.push_piece(WordPiece::Var(name));
                Ok(())
            }
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                let name = self.var_name();
                word.push_piece(WordPiece::Var(name));
                Ok(())
            }
            _ => {
                word.push_char('$');
                Ok(())
            }
        }
    }

    fn var_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }
}
