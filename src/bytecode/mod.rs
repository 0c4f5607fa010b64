/*!
  The bytecode layer: the bit-level field codec (`binary`), the decoded instruction form
  shared by the encoder and the executor (`instruction`), and the assembled program with
  its string pool (`program`).
*/

pub mod binary;
pub mod instruction;
pub mod program;

pub use self::instruction::Instruction;
pub use self::program::ProgramStorage;
