/*!
  The bytecode emitter: the final pass over the resolved stream. Each instruction line
  becomes exactly one 32-bit word. By the time a line reaches this pass every macro has
  been inlined, so any non-keyword instruction word here is an undefined symbol the
  resolver has already reported; the emitter records the same error and moves on, and
  deduplication collapses the pair.

  The instruction counter advances once per attempted line whether or not a word was
  emitted, keeping branch displacements and symbol stacks aligned with the label
  reader's numbering. A build that recorded any error discards the program wholesale,
  so a gap never reaches execution.
*/

use string_cache::DefaultAtom;

use crate::bytecode::{Instruction, ProgramStorage};
use crate::dialect::DialectOptions;
use crate::errors::{CompilerError, ErrorKind, ErrorList};
use crate::keyword::{InstructionFormat, Keyword, Register};
use crate::number::NumberLiteral;
use crate::token::{Token, TokenKind};
use crate::builder::driver::TokenHandler;
use crate::builder::labels::LabelTable;

pub struct BytecodeEmitter<'a> {
  options : DialectOptions,
  labels  : &'a LabelTable,
  program : ProgramStorage,
  pending : Vec<Token>,
  index   : usize
}

impl<'a> BytecodeEmitter<'a> {

  pub fn new(labels: &'a LabelTable, options: DialectOptions) -> BytecodeEmitter<'a> {
    BytecodeEmitter {
      options,
      labels,
      program : ProgramStorage::new(),
      pending : Vec::new(),
      index   : 0
    }
  }

  pub fn into_program(self) -> ProgramStorage {
    self.program
  }

  fn register_operand(&self, token: &Token, errors: &mut ErrorList)
    -> Result<Option<Register>, CompilerError>
  {
    if token.kind != TokenKind::Word {
      errors.push(CompilerError::error_at(
        ErrorKind::UnexpectedToken { text: token.text.clone(), expected: "a register" },
        token.line, token.column, token.length
      ))?;
      return Ok(None);
    }
    match Register::lookup(&token.text, self.options) {
      Ok(Some(register)) => Ok(Some(register)),
      Ok(None) => {
        errors.push(CompilerError::error_at(
          ErrorKind::UndefinedSymbol(token.text.clone()),
          token.line, token.column, token.length
        ))?;
        Ok(None)
      }
      Err(kind) => {
        errors.push(CompilerError::error_at(kind, token.line, token.column, token.length))?;
        Ok(None)
      }
    }
  }

  fn immediate_operand(&self, token: &Token, errors: &mut ErrorList)
    -> Result<Option<i16>, CompilerError>
  {
    if token.kind != TokenKind::Number {
      errors.push(CompilerError::error_at(
        ErrorKind::UnexpectedToken { text: token.text.clone(), expected: "a number" },
        token.line, token.column, token.length
      ))?;
      return Ok(None);
    }
    match NumberLiteral::parse(&token.text, self.options) {
      Ok(literal) => Ok(Some(literal.value)),
      Err(kind) => {
        errors.push(CompilerError::error_at(kind, token.line, token.column, token.length))?;
        Ok(None)
      }
    }
  }

  /// Resolves a label operand to the relative displacement from the current instruction.
  fn label_operand(&self, token: &Token, errors: &mut ErrorList)
    -> Result<Option<i16>, CompilerError>
  {
    if token.kind != TokenKind::Word {
      errors.push(CompilerError::error_at(
        ErrorKind::UnexpectedToken { text: token.text.clone(), expected: "a label" },
        token.line, token.column, token.length
      ))?;
      return Ok(None);
    }
    let canonical = self.options.canonical(&token.text);
    let target = match self.labels.index_of(&canonical) {
      Some(target) => target,
      None => {
        errors.push(CompilerError::error_at(
          ErrorKind::UndefinedSymbol(token.text.clone()),
          token.line, token.column, token.length
        ))?;
        return Ok(None);
      }
    };
    let displacement = target as i64 - self.index as i64;
    if displacement < i16::MIN as i64 || displacement > i16::MAX as i64 {
      errors.push(CompilerError::error_at(
        ErrorKind::NumberFormat {
          literal : token.text.to_string(),
          reason  : "branch displacement does not fit in 16 bits".to_string()
        },
        token.line, token.column, token.length
      ))?;
      return Ok(None);
    }
    Ok(Some(displacement as i16))
  }

  /// Turns the pending line into at most one instruction word, recording any problem.
  fn assemble(&mut self, errors: &mut ErrorList)
    -> Result<Option<Instruction>, CompilerError>
  {
    let first = self.pending[0].clone();
    let keyword = match Keyword::lookup(&first.text, self.options) {
      Ok(keyword) => keyword,
      Err(_) => {
        // The resolver walked the same stream and has already recorded the dialect
        // error; fold the spelling and continue.
        Keyword::lookup(&first.text, DialectOptions::PERMISSIVE).unwrap_or(None)
      }
    };
    let keyword = match keyword {
      Some(keyword) => keyword,
      None => {
        errors.push(CompilerError::error_at(
          ErrorKind::UndefinedSymbol(first.text.clone()),
          first.line, first.column, first.length
        ))?;
        return Ok(None);
      }
    };
    if !keyword.is_opcode() {
      errors.push(CompilerError::error_at(
        ErrorKind::UnexpectedToken {
          text     : first.text.clone(),
          expected : "an executable instruction"
        },
        first.line, first.column, first.length
      ))?;
      return Ok(None);
    }

    let arguments: Vec<Token> = self.pending[1..]
      .iter()
      .filter(|t| t.kind != TokenKind::SingleChar(','))
      .cloned()
      .collect();
    if arguments.len() != keyword.operand_count() {
      errors.push(CompilerError::error_at(
        ErrorKind::ParameterCount {
          opcode   : DefaultAtom::from(keyword.spelling()),
          expected : keyword.operand_count(),
          found    : arguments.len()
        },
        first.line, first.column, first.length
      ))?;
      return Ok(None);
    }

    match keyword.format() {

      InstructionFormat::RegisterTriple => {
        let a = self.register_operand(&arguments[0], errors)?;
        let b = self.register_operand(&arguments[1], errors)?;
        let c = self.register_operand(&arguments[2], errors)?;
        match (a, b, c) {
          (Some(a), Some(b), Some(c)) => Ok(Some(Instruction {
            keyword,
            registers : vec![a, b, c],
            immediate : None
          })),
          _ => Ok(None)
        }
      }

      InstructionFormat::RegisterImmediate => {
        let a = self.register_operand(&arguments[0], errors)?;
        let b = self.register_operand(&arguments[1], errors)?;
        let immediate = self.immediate_operand(&arguments[2], errors)?;
        match (a, b, immediate) {
          (Some(a), Some(b), Some(immediate)) => Ok(Some(Instruction {
            keyword,
            registers : vec![a, b],
            immediate : Some(immediate)
          })),
          _ => Ok(None)
        }
      }

      InstructionFormat::RegisterLabel => {
        let a = self.register_operand(&arguments[0], errors)?;
        let b = self.register_operand(&arguments[1], errors)?;
        let displacement = self.label_operand(&arguments[2], errors)?;
        match (a, b, displacement) {
          (Some(a), Some(b), Some(displacement)) => Ok(Some(Instruction {
            keyword,
            registers : vec![a, b],
            immediate : Some(displacement)
          })),
          _ => Ok(None)
        }
      }

      InstructionFormat::Other => self.assemble_bespoke(keyword, &arguments, errors)

    } // end match on format
  }

  fn assemble_bespoke(&mut self, keyword: Keyword, arguments: &[Token], errors: &mut ErrorList)
    -> Result<Option<Instruction>, CompilerError>
  {
    match keyword {

      Keyword::Systerm => Ok(Some(Instruction {
        keyword,
        registers : vec![],
        immediate : None
      })),

      Keyword::Jmp | Keyword::Bo => {
        match self.label_operand(&arguments[0], errors)? {
          Some(displacement) => Ok(Some(Instruction {
            keyword,
            registers : vec![],
            immediate : Some(displacement)
          })),
          None => Ok(None)
        }
      }

      Keyword::Ldpc | Keyword::Stpc | Keyword::Sysin => {
        match self.register_operand(&arguments[0], errors)? {
          Some(register) => Ok(Some(Instruction {
            keyword,
            registers : vec![register],
            immediate : None
          })),
          None => Ok(None)
        }
      }

      // The source keyword `sysout` commits to a concrete opcode here, from the
      // argument's lexical kind.
      Keyword::SysoutReg => {
        let argument = &arguments[0];
        match argument.kind {
          TokenKind::String => {
            match self.program.intern_string(&argument.text) {
              Some(offset) => Ok(Some(Instruction {
                keyword   : Keyword::SysoutStr,
                registers : vec![],
                immediate : Some(offset as i16)
              })),
              None => {
                errors.push(CompilerError::error_at(
                  ErrorKind::Syntax("the string constant pool is full".into()),
                  argument.line, argument.column, argument.length
                ))?;
                Ok(None)
              }
            }
          }
          _ => {
            match self.register_operand(argument, errors)? {
              Some(register) => Ok(Some(Instruction {
                keyword   : Keyword::SysoutReg,
                registers : vec![register],
                immediate : None
              })),
              None => Ok(None)
            }
          }
        }
      }

      // Anything without an emission path, `sysoutstr` included: it exists only as an
      // encoded opcode and has no source spelling. A keyword that cannot assemble must
      // surface as an error, never as a quietly missing word.
      _ => {
        let first = &self.pending[0];
        errors.push(CompilerError::error_at(
          ErrorKind::UnexpectedToken {
            text     : first.text.clone(),
            expected : "an executable instruction"
          },
          first.line, first.column, first.length
        ))?;
        Ok(None)
      }
    }
  }
}

impl<'a> TokenHandler for BytecodeEmitter<'a> {

  fn on_instruction_start(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.pending.push(token.clone());
    Ok(())
  }

  fn on_instruction_args(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.pending.push(token.clone());
    Ok(())
  }

  fn on_instruction_break(&mut self, _index: usize, _token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if self.pending.is_empty() {
      return Ok(());
    }
    let assembled = self.assemble(errors)?;
    if let Some(instruction) = assembled {
      self.program.push(instruction.encode());
    }
    self.pending.clear();
    // The counter advances even when nothing was emitted, keeping displacements and
    // symbol stacks aligned with the label reader.
    self.index += 1;
    Ok(())
  }
}
