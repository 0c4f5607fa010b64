/*!
  Bit-level field access on 32-bit instruction words.

  ```text
  31       26 25    21 20    16 15    11 10                 0
  +----------+--------+--------+--------+--------------------+
  |  opcode  | reg A  | reg B  | reg C  |                    |
  +----------+--------+--------+--------+--------------------+
                               | 15              immediate 0 |
  ```

  The three register fields are fixed 5-bit slots; the immediate occupies the low 16
  bits and overlaps field C, so no format uses both. Immediates are stored as the
  unsigned reinterpretation of their `i16` value.
*/

use crate::keyword::{Register, Word};

/// Shift amounts of the three register fields, in operand order.
pub const REGISTER_FIELD_SHIFTS : [u32; 3] = [21, 16, 11];
pub const REGISTER_FIELD_MASK   : Word     = 0x1F;

pub fn with_register(word: Word, slot: usize, register: Register) -> Word {
  let shift = REGISTER_FIELD_SHIFTS[slot];
  (word & !(REGISTER_FIELD_MASK << shift)) | ((register.index() as Word) << shift)
}

pub fn register_field(word: Word, slot: usize) -> Register {
  let shift = REGISTER_FIELD_SHIFTS[slot];
  Register::from_field(((word >> shift) & REGISTER_FIELD_MASK) as u8)
}

pub fn with_immediate(word: Word, immediate: i16) -> Word {
  (word & 0xFFFF_0000) | (immediate as u16 as Word)
}

pub fn immediate_field(word: Word) -> i16 {
  (word & 0xFFFF) as u16 as i16
}
