//! Abstract syntax tree for the supported shell dialect.

/// A parsed shell program: statements separated by `;` or newlines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    /// Top-level statements, in source order.
    pub statements: Vec<AndOrList>,
}

/// A pipeline followed by `&&`/`||` continuations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndOrList {
    /// The leading pipeline.
    pub first: Pipeline,
    /// Continuations, evaluated left to right with short-circuiting.
    pub rest: Vec<(AndOr, Pipeline)>,
}

/// Connective between pipelines in a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOr {
    /// `&&` — run the next pipeline only on success.
    And,
    /// `||` — run the next pipeline only on failure.
    Or,
}

/// One or more simple commands connected by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Pipeline elements; always at least one.
    pub elements: Vec<SimpleCommand>,
}

/// A single command: optional assignment prefixes, words, redirections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    /// `NAME=value` prefixes (or the whole command, when `words` is empty).
    pub assignments: Vec<Assignment>,
    /// Command name and arguments, before expansion.
    pub words: Vec<Word>,
    /// Redirections, in source order.
    pub redirects: Vec<Redirect>,
}

/// A `NAME=value` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Variable name.
    pub name: String,
    /// Unexpanded value.
    pub value: Word,
}

/// A redirection and its target word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// What is redirected, and how.
    pub kind: RedirectKind,
    /// Target path, before expansion.
    pub target: Word,
}

/// Supported redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `< file`
    In,
    /// `> file`
    Out,
    /// `>> file`
    Append,
    /// `2> file`
    ErrOut,
    /// `2>> file`
    ErrAppend,
}

/// An unexpanded word: a concatenation of pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Pieces in source order; expansion concatenates them.
    pub pieces: Vec<WordPiece>,
}

/// One piece of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPiece {
    /// Unquoted literal text (escapes already resolved).
    Text(String),
    /// Single-quoted text, taken verbatim.
    SingleQuoted(String),
    /// Double-quoted text with embedded expansions.
    DoubleQuoted(Vec<TextOrVar>),
    /// An unquoted `$NAME` expansion, subject to field splitting.
    Var(String),
}

/// Content inside double quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOrVar {
    /// Literal text.
    Text(String),
    /// A `$NAME` expansion (no field splitting inside quotes).
    Var(String),
}
