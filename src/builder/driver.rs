/*!
  The shared token-stream driver. Every compiler pass is a `TokenHandler`; the one
  generic `walk` function owns the state machine and the passes differ only in what they
  do per callback. The driver understands just enough structure to route tokens: label
  lookahead, macro declaration lines, macro bodies, and the end-of-line markers.

  The lookahead rule: a `Word` token immediately followed by a `:` token is a label
  declaration, in both top-level and macro-body contexts. The lookahead is exactly one
  token, so a comment between the word and the colon defeats it.
*/

use std::ops::Range;

use crate::dialect::DialectOptions;
use crate::errors::{CompilerError, ErrorKind, ErrorList};
use crate::keyword::Keyword;
use crate::token::{Token, TokenKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverState {
  InstructionStart,
  InstructionArgs,
  MacroDeclaration,
  MacroDeclarationArgs,
  MacroDeclarationArgsEnded,
  MacroInstructionStart,
  MacroInstructionArgs,
  MacroEnded
}

/**
  The callback set a pass can implement. Every method defaults to a no-op so a pass only
  writes the callbacks it cares about. Callbacks receive the token's index into the
  walked list, the token itself, and the shared error list; returning `Err` aborts the
  walk (fatal mode does this on the first recorded error).
*/
#[allow(unused_variables)]
pub trait TokenHandler {

  fn on_instruction_start(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_instruction_args(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_label_declaration(&mut self, index: usize, name: &Token, colon: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_declaration(&mut self, index: usize, name: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_declaration_args(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_instruction_start(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_instruction_args(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_label_declaration(&mut self, index: usize, name: &Token, colon: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_instruction_break(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  fn on_macro_instruction_break(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

  /// Fired on the `endmacro`/`mend` keyword so the receiving pass can check the end
  /// keyword against the dialect.
  fn on_macro_ended(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError> { Ok(()) }

}

/// Looks a word up in the keyword set, downgrading a dialect case violation to a
/// recorded error so the walk still sees the intended structure.
fn keyword_of(token: &Token, options: DialectOptions, errors: &mut ErrorList)
  -> Result<Option<Keyword>, CompilerError>
{
  match Keyword::lookup(&token.text, options) {
    Ok(keyword) => Ok(keyword),
    Err(kind) => {
      errors.push(CompilerError::error_at(kind, token.line, token.column, token.length))?;
      Keyword::lookup(&token.text, DialectOptions::PERMISSIVE)
             .map_err(|_| unreachable_lookup(token))
    }
  }
}

// `Keyword::lookup` only fails under the strict case flag, which the permissive retry
// clears; this error is an internal invariant, not a user-facing one.
fn unreachable_lookup(token: &Token) -> CompilerError {
  CompilerError::error_at(
    ErrorKind::Syntax(format!("keyword lookup failed twice for `{}`", token.text)),
    token.line, token.column, token.length
  )
}

fn unexpected(token: &Token, expected: &'static str) -> CompilerError {
  CompilerError::error_at(
    ErrorKind::UnexpectedToken { text: token.text.clone(), expected },
    token.line, token.column, token.length
  )
}

/// True when `index + 1` inside `range` holds a `:` token.
fn colon_follows(tokens: &[Token], range: &Range<usize>, index: usize) -> bool {
  match index + 1 < range.end {
    true  => tokens[index + 1].kind == TokenKind::SingleChar(':'),
    false => false
  }
}

/**
  Walks `tokens[range]` from `initial_state`, dispatching to `handler`. Returns the
  state the walk ended in; a walk that began at `InstructionStart` but did not end there
  records an unterminated-macro error. A `macro` keyword inside a macro body is a fatal
  error regardless of mode.
*/
pub fn walk<H: TokenHandler>(
  tokens        : &[Token],
  range         : Range<usize>,
  initial_state : DriverState,
  handler       : &mut H,
  options       : DialectOptions,
  errors        : &mut ErrorList
) -> Result<DriverState, CompilerError>
{
  let mut state = initial_state;
  let mut index = range.start;

  while index < range.end {
    let token = &tokens[index];

    // Comments never change state or reach a handler.
    if token.kind == TokenKind::Comment {
      index += 1;
      continue;
    }

    match state {

      DriverState::InstructionStart => {
        match token.kind {
          TokenKind::InstructionBreak => handler.on_instruction_break(index, token, errors)?,
          TokenKind::Word => {
            if colon_follows(tokens, &range, index) {
              handler.on_label_declaration(index, token, &tokens[index + 1], errors)?;
              index += 1; // consume the colon
            } else if keyword_of(token, options, errors)? == Some(Keyword::Macro) {
              state = DriverState::MacroDeclaration;
            } else {
              handler.on_instruction_start(index, token, errors)?;
              state = DriverState::InstructionArgs;
            }
          }
          _ => errors.push(unexpected(token, "an instruction, label, or macro declaration"))?
        }
      }

      DriverState::InstructionArgs => {
        match token.kind {
          TokenKind::InstructionBreak => {
            handler.on_instruction_break(index, token, errors)?;
            state = DriverState::InstructionStart;
          }
          TokenKind::Word | TokenKind::Number | TokenKind::String | TokenKind::SingleChar(',')
            => handler.on_instruction_args(index, token, errors)?,
          _ => errors.push(unexpected(token, "an instruction argument"))?
        }
      }

      DriverState::MacroDeclaration => {
        match token.kind {
          TokenKind::Word => {
            handler.on_macro_declaration(index, token, errors)?;
            state = DriverState::MacroDeclarationArgs;
          }
          TokenKind::InstructionBreak => {
            errors.push(CompilerError::error_at(
              ErrorKind::Syntax("macro declaration is missing a name".into()),
              token.line, token.column, 1
            ))?;
            state = DriverState::MacroInstructionStart;
          }
          _ => errors.push(unexpected(token, "a macro name"))?
        }
      }

      DriverState::MacroDeclarationArgs => {
        match token.kind {
          TokenKind::Word => handler.on_macro_declaration_args(index, token, errors)?,
          TokenKind::SingleChar(',') => {}
          TokenKind::SingleChar(':') => {
            if options.contains(crate::dialect::STRICT_NO_COLON_AFTER_MACRO) {
              errors.push(CompilerError::error_at(
                ErrorKind::DialectSyntax {
                  feature : "a colon after the macro parameter list".to_string(),
                  flag    : crate::dialect::flag_name(crate::dialect::STRICT_NO_COLON_AFTER_MACRO)
                },
                token.line, token.column, 1
              ))?;
            }
            state = DriverState::MacroDeclarationArgsEnded;
          }
          TokenKind::InstructionBreak => state = DriverState::MacroInstructionStart,
          _ => errors.push(unexpected(token, "a macro parameter"))?
        }
      }

      DriverState::MacroDeclarationArgsEnded => {
        match token.kind {
          TokenKind::InstructionBreak => state = DriverState::MacroInstructionStart,
          _ => errors.push(unexpected(token, "the end of the macro declaration line"))?
        }
      }

      DriverState::MacroInstructionStart => {
        match token.kind {
          TokenKind::InstructionBreak => handler.on_macro_instruction_break(index, token, errors)?,
          TokenKind::Word => {
            if colon_follows(tokens, &range, index) {
              handler.on_macro_label_declaration(index, token, &tokens[index + 1], errors)?;
              index += 1;
            } else {
              match keyword_of(token, options, errors)? {
                Some(Keyword::Macro) => {
                  // Macros cannot nest. Fatal even in batch mode: there is no sane
                  // recovery point for the rest of the body.
                  return Err(CompilerError::error_at(
                    ErrorKind::Syntax("macro definitions cannot be nested".into()),
                    token.line, token.column, token.length
                  ));
                }
                Some(Keyword::EndMacro) | Some(Keyword::Mend) => {
                  handler.on_macro_ended(index, token, errors)?;
                  state = DriverState::MacroEnded;
                }
                _ => {
                  handler.on_macro_instruction_start(index, token, errors)?;
                  state = DriverState::MacroInstructionArgs;
                }
              }
            }
          }
          _ => errors.push(unexpected(token, "an instruction, label, or end of macro"))?
        }
      }

      DriverState::MacroInstructionArgs => {
        match token.kind {
          TokenKind::InstructionBreak => {
            handler.on_macro_instruction_break(index, token, errors)?;
            state = DriverState::MacroInstructionStart;
          }
          TokenKind::Word | TokenKind::Number | TokenKind::String | TokenKind::SingleChar(',')
            => handler.on_macro_instruction_args(index, token, errors)?,
          _ => errors.push(unexpected(token, "an instruction argument"))?
        }
      }

      DriverState::MacroEnded => {
        match token.kind {
          TokenKind::InstructionBreak => {
            handler.on_instruction_break(index, token, errors)?;
            state = DriverState::InstructionStart;
          }
          _ => errors.push(unexpected(token, "the end of the line after the macro end keyword"))?
        }
      }

    } // end match on state

    index += 1;
  }

  // A top-level walk must come back out of any macro definition it entered.
  if initial_state == DriverState::InstructionStart && state != DriverState::InstructionStart {
    let position = tokens.get(range.end.saturating_sub(1));
    let (line, column) = match position {
      Some(token) => (token.line, token.column),
      None        => (0, 0)
    };
    errors.push(CompilerError::error_at(
      ErrorKind::Syntax("source ended inside a macro definition".into()),
      line, column, 1
    ))?;
  }

  Ok(state)
}
