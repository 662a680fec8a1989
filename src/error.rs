use std::{convert::From, fmt};

/// A position within the assembly source: 1-based line, 0-based column,
/// and the length of the offending span in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub length: usize,
}
impl Pos {
    pub fn new(line: usize, column: usize, length: usize) -> Pos { Pos { line, column, length } }
}
impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "line {}, col {}", self.line, self.column) }
}

/// Simple custom Error for the sim86 project
pub struct Error {
    pub kind: ErrorKind,
    pub pos: Option<Pos>,
    pub msg: String,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// unrecognized character or malformed literal in the source
    Lex,
    /// error in syntax of assembly code
    Syntax,
    /// a label or variable was defined more than once
    DuplicateSymbol,
    /// a non-mnemonic operation word that is not db/dw
    UnknownDirective,
    /// neither operand pins down a byte/word width
    AmbiguousWidth,
    /// a legal-looking but unencodable operand pairing
    UnsupportedCombination,
    /// reference to a label or variable that was never defined
    UndefinedSymbol,
    /// underlying io error
    IO,
    /// error raised by the machine code program itself
    Runtime,
    /// a run exceeded its instruction budget
    StepLimit,
    /// test criterion evaluated to false
    Test,
    /// catch-all for other errors
    General,
}

/// Typed completion hints attached to assembly errors. A front end can
/// render these directly in its autocomplete popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    Instruction(&'static str),
    Register16(&'static str),
    Register8(&'static str),
    Define(&'static str),
    Variable16(String),
    Variable8(String),
    Label(String),
    Constant16(u16),
    Constant8(u8),
}

impl Error {
    pub fn new(kind: ErrorKind, pos: Option<Pos>, message: &str) -> Error {
        Error {
            kind,
            pos,
            msg: String::from(message),
            suggestions: Vec::new(),
        }
    }
    pub fn with_suggestions(mut self, suggestions: Vec<Suggestion>) -> Error {
        self.suggestions = suggestions;
        self
    }
    /// True for every kind produced while assembling (as opposed to running).
    pub fn is_assembly(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Lex
                | ErrorKind::Syntax
                | ErrorKind::DuplicateSymbol
                | ErrorKind::UnknownDirective
                | ErrorKind::AmbiguousWidth
                | ErrorKind::UnsupportedCombination
                | ErrorKind::UndefinedSymbol
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::new(ErrorKind::IO, None, e.to_string().as_str()) }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}: {}", red!("sim86::Error"), self.msg) }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(pos) = self.pos {
            write!(f, "{}: {}", pos, self.msg)
        } else {
            write!(f, "{}", self.msg)
        }
    }
}
impl std::error::Error for Error {}
