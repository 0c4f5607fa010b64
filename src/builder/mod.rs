/*!
  The Builder runs the compilation pipeline over one source text: tokenize, record and
  validate macros, resolve macros into the flat stream, read labels, emit bytecode. The
  passes share the token-stream driver in `driver` and communicate only through the
  immutable artifacts each one hands to the next.

  A build never partially succeeds: if any `Error`-severity problem was recorded, the
  program is discarded and the caller gets zero bytecode alongside the error list.
*/

pub mod driver;
pub mod emitter;
pub mod labels;
pub mod macros;
pub mod resolver;

use crate::bytecode::ProgramStorage;
use crate::dialect::DialectOptions;
use crate::errors::{CompilerError, ErrorList};
use crate::token::{tokenize, SourcePosition, Token};

use self::driver::DriverState;
use self::emitter::BytecodeEmitter;
use self::labels::{LabelReader, LabelTable};
use self::macros::{validate_macros, MacroReader, MacroTable};
use self::resolver::MacroResolver;

/// Everything one build produces. All fields are frozen once the build returns; a
/// rebuild produces an entirely new `Build`.
#[derive(Debug)]
pub struct Build {
  pub tokens        : Vec<Token>,
  pub resolved      : Vec<Token>,
  pub macros        : MacroTable,
  pub labels        : LabelTable,
  pub program       : ProgramStorage,
  /// Per emitted instruction index: the macro call-site chain plus the instruction's
  /// own source position.
  pub symbol_stacks : Vec<Vec<SourcePosition>>,
  pub errors        : ErrorList
}

/**
  Compiles `source` under `options`. With `fatal_errors` the first `Error`-severity
  problem aborts and is returned as the `Err`; otherwise all recoverable problems are
  accumulated, deduplicated, and ordered in the returned `Build`.
*/
pub fn build(source: &str, options: DialectOptions, fatal_errors: bool)
  -> Result<Build, CompilerError>
{
  options.validate()?;
  let mut errors = ErrorList::new(fatal_errors);

  let tokens = tokenize(source, &mut errors)?;
  let full = 0..tokens.len();

  let mut reader = MacroReader::new(options);
  driver::walk(&tokens, full.clone(), DriverState::InstructionStart,
               &mut reader, options, &mut errors)?;
  let table = reader.into_table();
  validate_macros(&table, options, &mut errors)?;

  let mut resolver = MacroResolver::new(&tokens, &table, options);
  driver::walk(&tokens, full, DriverState::InstructionStart,
               &mut resolver, options, &mut errors)?;
  let (resolved, symbol_stacks) = resolver.into_output();

  let mut label_reader = LabelReader::new(options);
  driver::walk(&resolved, 0..resolved.len(), DriverState::InstructionStart,
               &mut label_reader, options, &mut errors)?;
  let labels = label_reader.into_table();

  let mut bytecode_emitter = BytecodeEmitter::new(&labels, options);
  driver::walk(&resolved, 0..resolved.len(), DriverState::InstructionStart,
               &mut bytecode_emitter, options, &mut errors)?;
  let mut program = bytecode_emitter.into_program();

  errors.finish();
  if errors.has_errors() {
    program = ProgramStorage::new();
  }

  Ok(Build {
    tokens,
    resolved,
    macros: table,
    labels,
    program,
    symbol_stacks,
    errors
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Instruction;
  use crate::dialect::{STRICT_KEYWORD_ENDMACRO, STRICT_KEYWORD_MEND};
  use crate::keyword::Keyword;

  fn build_permissive(source: &str) -> Build {
    build(source, DialectOptions::PERMISSIVE, false).unwrap()
  }

  #[test]
  fn a_clean_build_produces_one_word_per_line() {
    let built = build_permissive("addi r1, r1, 5\naddi r1, r1, 3\nsysout r1\nsysterm");
    assert!(built.errors.is_empty());
    assert_eq!(built.program.len(), 4);
    assert_eq!(built.symbol_stacks.len(), 4);
  }

  #[test]
  fn macro_calls_inline_before_emission() {
    let built = build_permissive(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\ninc r1\ninc r1\nsysterm"
    );
    assert!(built.errors.is_empty());
    assert_eq!(built.program.len(), 3);
    let first = Instruction::decode(built.program.words[0]).unwrap();
    let second = Instruction::decode(built.program.words[1]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.keyword, Keyword::Addi);
  }

  #[test]
  fn macro_local_labels_never_collide_across_expansions() {
    let built = build_permissive(
      "macro spin reg1:\ntop: subi reg1, reg1, 1\nbgt reg1, zero, top\nmend\nspin r1\nspin r2\nsysterm"
    );
    assert!(built.errors.is_empty());
    assert_eq!(built.labels.len(), 2);
    // Both expansions' branches target their own label.
    let first_branch = Instruction::decode(built.program.words[1]).unwrap();
    let second_branch = Instruction::decode(built.program.words[3]).unwrap();
    assert_eq!(first_branch.immediate, Some(-1));
    assert_eq!(second_branch.immediate, Some(-1));
  }

  #[test]
  fn a_failed_build_yields_zero_bytecode() {
    let built = build_permissive("addi r1, r1, 5\nbogus r1\nsysterm");
    assert!(built.errors.has_errors());
    assert!(built.program.is_empty());
  }

  #[test]
  fn the_string_sysout_opcode_has_no_source_spelling() {
    // `sysoutstr` is an encoding detail, never a source keyword. The line must fail
    // loudly; were it dropped instead, the jmp displacement would cross a missing word.
    let built = build_permissive("jmp done\nsysoutstr r1\ndone: systerm");
    assert!(built.errors.has_errors());
    assert!(built.program.is_empty());
  }

  #[test]
  fn recursion_is_always_caught_before_emission() {
    let built = build_permissive("macro a\nb\nmend\nmacro b\na r1\nmend\na\nsysterm");
    assert!(built.errors.has_errors());
    assert!(built.program.is_empty());
  }

  #[test]
  fn an_invalid_dialect_configuration_never_parses() {
    let options = DialectOptions::PERMISSIVE
      .with(STRICT_KEYWORD_ENDMACRO)
      .with(STRICT_KEYWORD_MEND);
    assert!(build("systerm", options, false).is_err());
  }

  #[test]
  fn fatal_mode_aborts_on_the_first_error() {
    let result = build("bogus r1\nalso_bogus r2", DialectOptions::PERMISSIVE, true);
    assert!(result.is_err());
  }

  #[test]
  fn strict_legacy_accepts_its_own_conventions() {
    let source = "macro inc reg1\naddi reg1, reg1, 1\nmend\ninc r1\nsysterm";
    let built = build(source, DialectOptions::STRICT_LEGACY, false).unwrap();
    assert!(built.errors.is_empty(), "unexpected: {:?}", built.errors);
    assert_eq!(built.program.len(), 2);
  }

  #[test]
  fn strict_modern_requires_exact_case() {
    let built = build("ADDI r1, r1, 5\nsysterm", DialectOptions::STRICT_MODERN, false).unwrap();
    assert!(built.errors.has_errors());
  }

  #[test]
  fn errors_come_back_sorted_and_deduplicated() {
    let built = build_permissive("bogus r1\naddi r1, r1, 99999");
    let mut last = (0, 0);
    for error in built.errors.iter() {
      let position = (error.line, error.column);
      assert!(position >= last);
      last = position;
    }
    // The resolver and emitter both see the undefined word once in the output.
    let undefined = built.errors.iter()
      .filter(|e| matches!(e.kind, crate::errors::ErrorKind::UndefinedSymbol(_)))
      .count();
    assert_eq!(undefined, 1);
  }
}
