/*!
  The virtual machine. An `Emulator` owns one assembled program, the register file, the
  sparse memory, the input queue, and the output buffer, for the lifetime of one
  execution session; a rebuild discards it.

  Execution is synchronous and single-stepped: `step` fetches the word at the program
  counter, decodes it, executes it, and advances the counter by one unless the
  instruction left the machine waiting for input. `run` loops `step` until any of the
  termination flags is raised; cancellation is cooperative through `force_terminate`,
  polled between instructions and inside the input drain.
*/

pub mod environment;
pub mod executor;
pub mod storage;

use std::collections::VecDeque;

use prettytable::{format, Table};
use thiserror::Error;

use crate::bytecode::{Instruction, ProgramStorage};
use crate::keyword::{Register, Word, REGISTER_COUNT};

use self::storage::{process_random, MainStorage, RandomSource, RegisterStorage};

/// Runtime failures. All of these are fatal: they set `error_terminated` and end the
/// session.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EmulatorException {
  #[error("program counter {pc} is outside the program (length {length})")]
  ProgramCounterOutOfRange { pc: u16, length: usize },

  #[error("undecodable instruction word {word:#010x} at {pc}")]
  UndecodableInstruction { word: Word, pc: u16 },

  #[error("string constant offset {offset} points outside the pool")]
  BadStringOffset { offset: u16 }
}

/// The termination-ish flags, all independently observable. The machine is running
/// exactly when none of them is raised.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecutionFlags {
  pub terminated       : bool,
  pub force_terminated : bool,
  pub error_terminated : bool,
  pub expecting_input  : bool
}

impl ExecutionFlags {
  pub fn effectively_terminated(self) -> bool {
    self.terminated || self.force_terminated || self.error_terminated || self.expecting_input
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: format::TableFormat =
    format::FormatBuilder::new()
      .column_separator('|')
      .separator(
        format::LinePosition::Title,
        format::LineSeparator::new('-', '+', '+', '+')
      )
      .padding(1, 1)
      .build();
}

pub struct Emulator {
  pub(crate) program     : ProgramStorage,
  pub(crate) registers   : RegisterStorage,
  pub(crate) memory      : MainStorage,
  pub(crate) flags       : ExecutionFlags,
  pub(crate) input_lines : VecDeque<String>,
  pub(crate) output      : String,
  pub(crate) warnings    : Vec<String>
}

impl Emulator {

  pub fn new(program: ProgramStorage) -> Emulator {
    Emulator::with_random(program, process_random())
  }

  /// Constructs with an injected random source, so tests can seed the reset noise.
  pub fn with_random(program: ProgramStorage, mut random: Box<dyn RandomSource>) -> Emulator {
    let registers = RegisterStorage::reset(random.as_mut());
    Emulator {
      program,
      registers,
      memory      : MainStorage::new(random),
      flags       : ExecutionFlags::default(),
      input_lines : VecDeque::new(),
      output      : String::new(),
      warnings    : Vec::new()
    }
  }

  // region Inspection

  pub fn register(&self, register: Register) -> i32 {
    self.registers.read(register)
  }

  pub fn pc(&self) -> u16 {
    self.registers.pc
  }

  pub fn overflow(&self) -> bool {
    self.registers.overflow
  }

  pub fn flags(&self) -> ExecutionFlags {
    self.flags
  }

  pub fn output(&self) -> &str {
    &self.output
  }

  pub fn warnings(&self) -> &[String] {
    &self.warnings
  }

  pub fn read_memory(&mut self, address: i32) -> i32 {
    self.memory.read(address)
  }

  pub fn write_memory(&mut self, address: i32, value: i32) {
    self.memory.write(address, value);
  }

  // endregion

  /// Queues one line for `sysin` and clears `expecting_input` so a stalled instruction
  /// retries on the next step.
  pub fn queue_input_line(&mut self, line: &str) {
    self.input_lines.push_back(line.to_string());
    self.flags.expecting_input = false;
  }

  pub fn force_terminate(&mut self) {
    self.flags.force_terminated = true;
  }

  /**
    Executes the instruction at the program counter. A counter outside the program or a
    word that does not decode is fatal. The counter advances by one afterwards unless
    the instruction left the machine expecting input, so that instruction retries.
  */
  pub fn step(&mut self) -> Result<(), EmulatorException> {
    if self.flags.effectively_terminated() {
      return Ok(());
    }
    let pc = self.registers.pc;
    let word = match self.program.words.get(pc as usize) {
      Some(&word) => word,
      None => {
        self.flags.error_terminated = true;
        return Err(EmulatorException::ProgramCounterOutOfRange {
          pc,
          length: self.program.len()
        });
      }
    };
    let instruction = match Instruction::decode(word) {
      Some(instruction) => instruction,
      None => {
        self.flags.error_terminated = true;
        return Err(EmulatorException::UndecodableInstruction { word, pc });
      }
    };

    #[cfg(feature = "trace_execution")]
    println!("{:>5}  {}", pc, instruction);

    if let Err(exception) = self.execute(&instruction) {
      self.flags.error_terminated = true;
      return Err(exception);
    }
    if !self.flags.expecting_input {
      self.registers.pc = self.registers.pc.wrapping_add(1);
    }
    Ok(())
  }

  /// Steps until the machine is effectively terminated. The caller owns any fuel limit.
  pub fn run(&mut self) -> Result<(), EmulatorException> {
    while !self.flags.effectively_terminated() {
      self.step()?;
    }
    Ok(())
  }

  // region State display

  pub fn register_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row!["register", "decimal", "hex"]);
    for index in 0..REGISTER_COUNT {
      let register = Register::from_field(index as u8);
      let name = match index {
        0  => "r0 (zero)".to_string(),
        29 => "r29 (sp)".to_string(),
        _  => format!("r{}", index)
      };
      let value = self.registers.read(register);
      table.add_row(row![name, value, format!("{:#010x}", value as u32)]);
    }
    table.add_row(row!["pc", self.registers.pc, format!("{:#06x}", self.registers.pc)]);
    table.add_row(row!["overflow", self.registers.overflow, ""]);
    table
  }

  /// Only the cells touched so far; untouched memory has no value to show yet.
  pub fn memory_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row!["address", "decimal", "hex"]);
    let mut addresses: Vec<i32> = self.memory.cells().keys().copied().collect();
    addresses.sort_unstable();
    for address in addresses {
      let value = self.memory.cells()[&address];
      table.add_row(row![
        format!("{:#010x}", address as u32),
        value,
        format!("{:#010x}", value as u32)
      ]);
    }
    table
  }

  // endregion
}
