/*!
  An assembler and virtual machine for the ourMIPS teaching architecture: a small
  MIPS-inspired assembly language with macros, labels, and three surface dialects,
  compiled to fixed-width 32-bit bytecode and executed on a 32-register machine with
  sparse word-addressed memory.

  The two entry points are `builder::build`, which turns source text into a `Build`
  (bytecode, label table, source mapping, and diagnostics), and `Emulator`, which runs
  the resulting program step by step or to completion.
*/

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prettytable;

pub mod builder;
pub mod bytecode;
pub mod dialect;
pub mod emulator;
pub mod errors;
pub mod keyword;
pub mod number;
pub mod token;

pub use builder::{build, Build};
pub use bytecode::{Instruction, ProgramStorage};
pub use dialect::DialectOptions;
pub use emulator::{Emulator, EmulatorException, ExecutionFlags};
pub use errors::{CompilerError, ErrorKind, ErrorList, Severity};
pub use keyword::{Keyword, Register};
