/*!
  The error model shared by every compiler pass. Each problem the pipeline can detect is a
  typed `ErrorKind` rendering a fixed message template, wrapped in a `CompilerError` that
  carries a severity and a source span. Errors are ordered first by severity and then by
  position, and structurally equal errors are collapsed before being surfaced.

  In fatal mode the first `Severity::Error` aborts the build by being returned as the `Err`
  of `ErrorList::push`, which every pass propagates with `?`. In batch mode every pass
  records the error, applies its documented recovery heuristic, and keeps going.
*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use thiserror::Error;

/// `Error` sorts before `Warning` so that a sorted error list leads with the blockers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
  Error,
  Warning
}

impl Display for Severity {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Severity::Error   => write!(f, "error"),
      Severity::Warning => write!(f, "warning")
    }
  }
}

/// The closed taxonomy of problems the pipeline reports. Every variant renders a fixed
/// message template; free-form text only ever appears inside a template's slots.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
pub enum ErrorKind {
  #[error("syntax error: {0}")]
  Syntax(String),

  #[error("{feature} is not allowed by the active dialect (controlled by {flag})")]
  DialectSyntax {
    feature : String,
    flag    : &'static str
  },

  #[error("undefined symbol `{0}`")]
  UndefinedSymbol(DefaultAtom),

  #[error("recursive macro reference: {0}")]
  RecursiveMacro(String),

  #[error("`{opcode}` expects {expected} argument(s) but was given {found}")]
  ParameterCount {
    opcode   : DefaultAtom,
    expected : usize,
    found    : usize
  },

  #[error("malformed number literal `{literal}`: {reason}")]
  NumberFormat {
    literal : String,
    reason  : String
  },

  #[error("unexpected token `{text}` where {expected} was expected")]
  UnexpectedToken {
    text     : DefaultAtom,
    expected : &'static str
  },
}

/// An `ErrorKind` pinned to a source span: 1-based line and column plus a length in
/// characters of the offending token.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CompilerError {
  pub severity : Severity,
  pub line     : u32,
  pub column   : u32,
  pub length   : u32,
  pub kind     : ErrorKind
}

impl CompilerError {

  pub fn error_at(kind: ErrorKind, line: u32, column: u32, length: u32) -> CompilerError {
    CompilerError { severity: Severity::Error, line, column, length, kind }
  }

  pub fn warning_at(kind: ErrorKind, line: u32, column: u32, length: u32) -> CompilerError {
    CompilerError { severity: Severity::Warning, line, column, length, kind }
  }

  /// A configuration-level error with no meaningful source position.
  pub fn configuration(kind: ErrorKind) -> CompilerError {
    CompilerError::error_at(kind, 0, 0, 0)
  }
}

impl Display for CompilerError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}: {}: {}", self.line, self.column, self.severity, self.kind)
  }
}

impl PartialOrd for CompilerError {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for CompilerError {
  fn cmp(&self, other: &Self) -> Ordering {
    self.severity.cmp(&other.severity)
        .then(self.line.cmp(&other.line))
        .then(self.column.cmp(&other.column))
        .then(self.length.cmp(&other.length))
        // Message text as a last resort so the order is total and stable.
        .then_with(|| self.kind.to_string().cmp(&other.kind.to_string()))
  }
}

/**
  The accumulator every pass writes into. In fatal mode, pushing an `Error`-severity entry
  hands the error straight back to the caller so the build aborts on first contact;
  warnings are recorded either way.
*/
#[derive(Clone, Debug, Default)]
pub struct ErrorList {
  errors : Vec<CompilerError>,
  fatal  : bool
}

impl ErrorList {

  pub fn new(fatal: bool) -> ErrorList {
    ErrorList { errors: Vec::new(), fatal }
  }

  pub fn push(&mut self, error: CompilerError) -> Result<(), CompilerError> {
    match self.fatal && error.severity == Severity::Error {

      true => Err(error),

      false => {
        self.errors.push(error);
        Ok(())
      }

    }
  }

  /// Sorts by severity then position and drops structural duplicates. Called once, after
  /// the last pass has run.
  pub fn finish(&mut self) {
    self.errors.sort();
    self.errors.dedup();
  }

  pub fn error_count(&self) -> usize {
    self.errors.iter().filter(|e| e.severity == Severity::Error).count()
  }

  pub fn warning_count(&self) -> usize {
    self.errors.iter().filter(|e| e.severity == Severity::Warning).count()
  }

  pub fn has_errors(&self) -> bool {
    self.error_count() > 0
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn len(&self) -> usize {
    self.errors.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, CompilerError> {
    self.errors.iter()
  }
}
