/*!
  The tokenizer turns raw source text into a flat token stream: words, numbers, strings,
  comments, instruction-break markers, and the two single-character tokens `:` and `,`.
  It performs no semantic validation beyond lexical well-formedness; every later pass
  walks this stream through the shared driver.

  The scan is a single left-to-right pass over the characters with an explicit state
  machine (`ScanState`). Two invariants hold on the output: the token list always ends
  with exactly one `InstructionBreak`, and no two `InstructionBreak` tokens are adjacent.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::errors::{CompilerError, ErrorKind, ErrorList};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TokenKind {
  Word,
  Number,
  String,
  Comment,
  InstructionBreak,
  /// Only `:` and `,` are ever emitted.
  SingleChar(char)
}

/// A 1-based line/column pair, used for symbol stacks and diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SourcePosition {
  pub line   : u32,
  pub column : u32
}

impl Display for SourcePosition {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Immutable once produced. `text` holds the decoded content for strings (quotes
/// stripped, escapes applied) and the raw spelling for everything else.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Token {
  pub kind   : TokenKind,
  pub text   : DefaultAtom,
  pub line   : u32,
  pub column : u32,
  pub length : u32
}

impl Token {

  pub fn position(&self) -> SourcePosition {
    SourcePosition { line: self.line, column: self.column }
  }

  /// A synthetic token sharing this token's span, used by the macro resolver when it
  /// rewrites local label names.
  pub fn with_text(&self, text: DefaultAtom) -> Token {
    Token { kind: self.kind, text, line: self.line, column: self.column, length: self.length }
  }
}

impl Display for Token {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.kind {
      TokenKind::InstructionBreak => write!(f, "<break>"),
      _                           => write!(f, "{}", self.text)
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanState {
  Whitespace,
  InWord,
  InNumber,
  InString,
  InStringEscaped,
  InComment
}

/// Word tokens accept letters, digits, underscore, and the brackets of the explicit
/// register syntax `r[N]`.
fn is_word_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '[' || c == ']'
}

fn is_word_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_' || c == '['
}

/**
  Tokenizes `source`. Lexical problems are recorded in `errors`; in batch mode the scan
  recovers (an illegal character inside a word is folded into the word so downstream
  passes see a recognizable-but-invalid identifier, an unterminated string is closed at
  the line break) and continues so later, independent errors still surface. In fatal
  mode the first error is returned immediately.
*/
pub fn tokenize(source: &str, errors: &mut ErrorList) -> Result<Vec<Token>, CompilerError> {
  let mut scanner = Scanner::new();
  for c in source.chars() {
    scanner.consume(c, errors)?;
  }
  scanner.finish(errors)?;
  Ok(scanner.tokens)
}

struct Scanner {
  tokens       : Vec<Token>,
  state        : ScanState,
  buffer       : String,
  // Span of the token being accumulated.
  start_line   : u32,
  start_column : u32,
  // Cursor position of the character being consumed.
  line         : u32,
  column       : u32,
  // Length in characters of the current token's source spelling; differs from
  // `buffer.len()` for strings, whose quotes and escapes are decoded away.
  source_length : u32,
  pending_sign  : Option<char>
}

impl Scanner {

  fn new() -> Scanner {
    Scanner {
      tokens        : Vec::new(),
      state         : ScanState::Whitespace,
      buffer        : String::new(),
      start_line    : 1,
      start_column  : 1,
      line          : 1,
      column        : 1,
      source_length : 0,
      pending_sign  : None
    }
  }

  fn consume(&mut self, c: char, errors: &mut ErrorList) -> Result<(), CompilerError> {
    // A sign is only a token character when a digit follows it.
    if let Some(sign) = self.pending_sign.take() {
      match c.is_ascii_digit() {

        true => {
          self.begin(ScanState::InNumber);
          self.start_column -= 1; // the sign sits one column back
          self.buffer.push(sign);
          self.source_length = 1;
        }

        false => {
          let error = CompilerError::error_at(
            ErrorKind::Syntax(format!("stray `{}` is not part of a number literal", sign)),
            self.line, self.column.saturating_sub(1), 1
          );
          errors.push(error)?;
        }

      }
    }

    match c {
      '\n' => self.line_break(errors)?,
      _    => self.character(c, errors)?
    }

    match c {
      '\n' => {
        self.line += 1;
        self.column = 1;
      }
      _ => {
        self.column += 1;
      }
    }
    Ok(())
  }

  fn character(&mut self, c: char, errors: &mut ErrorList) -> Result<(), CompilerError> {
    match self.state {

      ScanState::Whitespace => {
        match c {
          ' ' | '\t' | '\r'       => {}
          _ if is_word_start(c)   => { self.begin(ScanState::InWord);   self.push_char(c); }
          _ if c.is_ascii_digit() => { self.begin(ScanState::InNumber); self.push_char(c); }
          '+' | '-'               => { self.pending_sign = Some(c); }
          '"'                     => { self.begin(ScanState::InString); self.source_length = 1; }
          ';' | '#'               => { self.begin(ScanState::InComment); self.push_char(c); }
          ':' | ','               => self.single_char(c),
          _                       => self.illegal_character(c, errors)?
        }
      }

      ScanState::InWord => {
        match c {
          _ if is_word_char(c) => self.push_char(c),
          ' ' | '\t' | '\r' => {
            self.flush();
            self.state = ScanState::Whitespace;
          }
          ':' | ',' => {
            self.flush();
            self.state = ScanState::Whitespace;
            self.single_char(c);
          }
          ';' | '#' => {
            self.flush();
            self.begin(ScanState::InComment);
            self.push_char(c);
          }
          '"' => {
            self.flush();
            self.begin(ScanState::InString);
            self.source_length = 1;
          }
          _ => self.illegal_character(c, errors)?
        }
      }

      ScanState::InNumber => {
        // Numbers carry their radix spelling, so any alphanumeric continues the token;
        // only a non-alphanumeric character delimits it.
        match c {
          _ if c.is_ascii_alphanumeric() => self.push_char(c),
          ' ' | '\t' | '\r' => {
            self.flush();
            self.state = ScanState::Whitespace;
          }
          ':' | ',' => {
            self.flush();
            self.state = ScanState::Whitespace;
            self.single_char(c);
          }
          ';' | '#' => {
            self.flush();
            self.begin(ScanState::InComment);
            self.push_char(c);
          }
          _ => self.illegal_character(c, errors)?
        }
      }

      ScanState::InString => {
        self.source_length += 1;
        match c {
          '"'  => {
            self.flush();
            self.state = ScanState::Whitespace;
          }
          '\\' => self.state = ScanState::InStringEscaped,
          _    => self.buffer.push(c)
        }
      }

      ScanState::InStringEscaped => {
        self.source_length += 1;
        // A single escape character: `\n` becomes a newline, anything else is passed
        // through literally.
        match c {
          'n' => self.buffer.push('\n'),
          _   => self.buffer.push(c)
        }
        self.state = ScanState::InString;
      }

      ScanState::InComment => self.push_char(c)

    } // end match on state
    Ok(())
  }

  fn line_break(&mut self, errors: &mut ErrorList) -> Result<(), CompilerError> {
    match self.state {

      ScanState::InString | ScanState::InStringEscaped => {
        // Recoverable: close the string at the break so later, independent errors on
        // other lines can still be found.
        let error = CompilerError::error_at(
          ErrorKind::Syntax("string literal is not terminated before the end of the line".into()),
          self.start_line, self.start_column, self.source_length
        );
        errors.push(error)?;
        self.flush();
      }

      ScanState::InWord | ScanState::InNumber | ScanState::InComment => self.flush(),

      ScanState::Whitespace => {}

    }
    self.state = ScanState::Whitespace;
    self.instruction_break();
    Ok(())
  }

  fn illegal_character(&mut self, c: char, errors: &mut ErrorList) -> Result<(), CompilerError> {
    let error = CompilerError::error_at(
      ErrorKind::Syntax(format!("illegal character `{}`", c)),
      self.line, self.column, 1
    );
    errors.push(error)?;
    // Recovery heuristic: fold the bad character into the current word so downstream
    // stages see a recognizable-but-invalid identifier instead of a truncated one.
    if self.state == ScanState::InWord {
      self.push_char(c);
    }
    Ok(())
  }

  fn begin(&mut self, state: ScanState) {
    self.state = state;
    self.start_line = self.line;
    self.start_column = self.column;
    self.source_length = 0;
  }

  fn push_char(&mut self, c: char) {
    self.buffer.push(c);
    self.source_length += 1;
  }

  fn single_char(&mut self, c: char) {
    let mut spelling = [0u8; 4];
    self.tokens.push(Token {
      kind   : TokenKind::SingleChar(c),
      text   : DefaultAtom::from(c.encode_utf8(&mut spelling) as &str),
      line   : self.line,
      column : self.column,
      length : 1
    });
  }

  fn instruction_break(&mut self) {
    // Consecutive breaks collapse to one.
    if let Some(last) = self.tokens.last() {
      if last.kind == TokenKind::InstructionBreak {
        return;
      }
    }
    self.tokens.push(Token {
      kind   : TokenKind::InstructionBreak,
      text   : DefaultAtom::from(""),
      line   : self.line,
      column : self.column,
      length : 0
    });
  }

  fn flush(&mut self) {
    let kind = match self.state {
      ScanState::InWord                                => TokenKind::Word,
      ScanState::InNumber                              => TokenKind::Number,
      ScanState::InString | ScanState::InStringEscaped => TokenKind::String,
      ScanState::InComment                             => TokenKind::Comment,
      ScanState::Whitespace                            => return
    };
    self.tokens.push(Token {
      kind,
      text   : DefaultAtom::from(self.buffer.as_str()),
      line   : self.start_line,
      column : self.start_column,
      length : self.source_length
    });
    self.buffer.clear();
    self.source_length = 0;
  }

  fn finish(&mut self, errors: &mut ErrorList) -> Result<(), CompilerError> {
    if let Some(sign) = self.pending_sign.take() {
      let error = CompilerError::error_at(
        ErrorKind::Syntax(format!("stray `{}` is not part of a number literal", sign)),
        self.line, self.column.saturating_sub(1), 1
      );
      errors.push(error)?;
    }
    self.line_break(errors)?;
    // `line_break` collapses, so an entirely empty source still needs its one break.
    if self.tokens.is_empty() {
      self.instruction_break();
    }
    Ok(())
  }
}
