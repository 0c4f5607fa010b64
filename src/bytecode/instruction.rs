/*!
  The decoded form of a single instruction word. The assembler builds an `Instruction`
  from source operands and encodes it; the executor decodes a fetched word back into one
  before dispatching on the keyword.
*/

use std::fmt::{Display, Formatter};

use crate::bytecode::binary;
use crate::keyword::{InstructionFormat, Keyword, Register, Word};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
  pub keyword   : Keyword,
  pub registers : Vec<Register>,
  /// A 16-bit immediate, a branch displacement, or a string-pool offset, depending on
  /// the keyword.
  pub immediate : Option<i16>
}

impl Instruction {

  pub fn encode(&self) -> Word {
    let mut word = self.keyword.pattern();
    for (slot, register) in self.registers.iter().enumerate() {
      word = binary::with_register(word, slot, *register);
    }
    if let Some(immediate) = self.immediate {
      word = binary::with_immediate(word, immediate);
    }
    word
  }

  /// Recovers the instruction a word encodes, or `None` when the opcode bits match
  /// nothing defined.
  pub fn decode(word: Word) -> Option<Instruction> {
    let keyword = Keyword::from_pattern(word)?;

    let (registers, immediate) = match keyword.format() {

      InstructionFormat::RegisterTriple => (
        vec![
          binary::register_field(word, 0),
          binary::register_field(word, 1),
          binary::register_field(word, 2)
        ],
        None
      ),

      InstructionFormat::RegisterImmediate
      | InstructionFormat::RegisterLabel => (
        vec![binary::register_field(word, 0), binary::register_field(word, 1)],
        Some(binary::immediate_field(word))
      ),

      InstructionFormat::Other => {
        match keyword {
          Keyword::Systerm
            => (vec![], None),
          Keyword::Sysin | Keyword::SysoutReg | Keyword::Ldpc | Keyword::Stpc
            => (vec![binary::register_field(word, 0)], None),
          Keyword::Jmp | Keyword::Bo | Keyword::SysoutStr
            => (vec![], Some(binary::immediate_field(word))),
          _ => return None
        }
      }

    }; // end match on format

    Some(Instruction { keyword, registers, immediate })
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.keyword)?;
    let mut separator = " ";
    for register in self.registers.iter() {
      write!(f, "{}{}", separator, register)?;
      separator = ", ";
    }
    if let Some(immediate) = self.immediate {
      match self.keyword {
        // The offset of an interned string, not a numeric operand.
        Keyword::SysoutStr => write!(f, "{}@{}", separator, immediate as u16)?,
        _                  => write!(f, "{}{}", separator, immediate)?
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn reg(index: u8) -> Register {
    Register::new(index).unwrap()
  }

  #[test]
  fn triple_round_trips() {
    let instruction = Instruction {
      keyword   : Keyword::Add,
      registers : vec![reg(1), reg(2), reg(3)],
      immediate : None
    };
    assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));
  }

  #[test]
  fn bitwise_sub_op_survives_register_fields() {
    let instruction = Instruction {
      keyword   : Keyword::Xnor,
      registers : vec![reg(31), reg(30), reg(29)],
      immediate : None
    };
    let word = instruction.encode();
    assert_eq!(Instruction::decode(word), Some(instruction));
  }

  #[test]
  fn negative_displacement_round_trips() {
    let instruction = Instruction {
      keyword   : Keyword::Beq,
      registers : vec![reg(4), reg(5)],
      immediate : Some(-7)
    };
    assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));
  }

  #[test]
  fn magic_shapes_round_trip() {
    let systerm = Instruction { keyword: Keyword::Systerm, registers: vec![], immediate: None };
    assert_eq!(Instruction::decode(systerm.encode()), Some(systerm));

    let sysout = Instruction {
      keyword   : Keyword::SysoutReg,
      registers : vec![reg(9)],
      immediate : None
    };
    assert_eq!(Instruction::decode(sysout.encode()), Some(sysout));

    let string = Instruction {
      keyword   : Keyword::SysoutStr,
      registers : vec![],
      immediate : Some(0x0123)
    };
    assert_eq!(Instruction::decode(string.encode()), Some(string));
  }

  #[test]
  fn canonical_words_survive_decode_then_encode() {
    // Canonical words carry zeros in their don't-care bits, which is all the encoder
    // ever produces. One word per format class plus the bespoke shapes.
    let words = [
      binary::with_register(
        binary::with_register(
          binary::with_register(Keyword::Add.pattern(), 0, reg(1)),
          1, reg(2)
        ),
        2, reg(3)
      ),
      binary::with_immediate(
        binary::with_register(
          binary::with_register(Keyword::Addi.pattern(), 0, reg(1)),
          1, reg(1)
        ),
        -12
      ),
      binary::with_immediate(
        binary::with_register(
          binary::with_register(Keyword::Beq.pattern(), 0, reg(4)),
          1, reg(5)
        ),
        -7
      ),
      Keyword::Systerm.pattern(),
      binary::with_immediate(Keyword::Jmp.pattern(), 3),
      binary::with_register(Keyword::Sysin.pattern(), 0, reg(2)),
      binary::with_immediate(Keyword::SysoutStr.pattern(), 0x0123)
    ];
    for &word in words.iter() {
      let decoded = Instruction::decode(word).unwrap();
      assert_eq!(decoded.encode(), word, "word {:#010x}", word);
    }
  }

  #[test]
  fn garbage_words_do_not_decode() {
    assert_eq!(Instruction::decode(0), None);
    assert_eq!(Instruction::decode(0x6000_0000), None);
  }

  #[test]
  fn display_reads_like_source() {
    let instruction = Instruction {
      keyword   : Keyword::Addi,
      registers : vec![reg(1), reg(1)],
      immediate : Some(-12)
    };
    assert_eq!(format!("{}", instruction), "addi r1, r1, -12");
  }
}
