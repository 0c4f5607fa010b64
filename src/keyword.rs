/*!
  The closed keyword set: every opcode of the instruction set plus the four structural
  keywords (`macro`, `endmacro`, `mend`, `alias`) that never reach the encoder.

  Opcode variants carry their full 32-bit pattern as the enum discriminant. The base
  pattern occupies the top 6 bits of the instruction word. Two groups share a base
  pattern and are disambiguated by a wider mask: the bitwise group (or/and/xor/xnor,
  sub-op in the low 3 bits, which no register field reaches) and the magic group
  (systerm/sysin/sysout variants, sub-op in bits 18..16, between the register field and
  the immediate). Structural keywords use small discriminants with a zero top-6 field,
  which no mask result can produce.

  Order-dependencies:
      `Keyword::from_pattern`
      `binary::encode_instruction`
      `binary::try_decode_instruction`
*/

use std::convert::TryFrom;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_enum::TryFromPrimitive;
use strum_macros::EnumString;

use crate::dialect::{DialectOptions, flag_name, STRICT_CASE_SENSITIVE_DESCRIPTORS};
use crate::errors::ErrorKind;

pub type Word = u32;

pub const OPCODE_SHIFT : u32  = 26;
pub const OPCODE_MASK  : Word = 0xFC00_0000;
/// Shared base of or/and/xor/xnor; the wider mask keeps the low 3 sub-op bits.
pub const BITWISE_BASE : Word = 0x3400_0000;
pub const BITWISE_MASK : Word = 0xFC00_0007;
/// Shared base of the magic instructions; the wider mask keeps bits 18..16.
pub const MAGIC_BASE   : Word = 0xFC00_0000;
pub const MAGIC_MASK   : Word = 0xFC07_0000;

/// Operand shape of an opcode, driving both assembly-side arity checks and the codec's
/// field layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InstructionFormat {
  /// Three register operands at the fixed 5-bit fields.
  RegisterTriple,
  /// Two register operands plus a 16-bit immediate in the low bits.
  RegisterImmediate,
  /// Two register operands plus a label resolved to a relative displacement.
  RegisterLabel,
  /// Bespoke arity: systerm, jmp, bo, ldpc, stpc, and the magic I/O opcodes.
  Other
}

#[derive(
EnumString, TryFromPrimitive,
Clone,      Copy, Eq, PartialEq, Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u32)]
pub enum Keyword {
  // Structural keywords (no bit pattern; never encoded) //
  Macro    = 1,
  EndMacro = 2,
  Mend     = 3,
  /// Reserved. Participates in name-collision checks, rejected at use sites.
  Alias    = 4,

  // Register-register-register //
  Add  = 0x0400_0000,
  Sub  = 0x0800_0000,
  Shl  = 0x1400_0000,
  Shr  = 0x1800_0000,
  Rol  = 0x1C00_0000,
  Ror  = 0x2000_0000,

  // Bitwise group: shared base, sub-op in the low 3 bits //
  Or   = 0x3400_0000,
  And  = 0x3400_0001,
  Xor  = 0x3400_0002,
  Xnor = 0x3400_0003,

  // Register-register-immediate //
  Addi = 0x0C00_0000,
  Subi = 0x1000_0000,
  Shli = 0x2400_0000,
  Shri = 0x2800_0000,
  Roli = 0x2C00_0000,
  Rori = 0x3000_0000,
  Ldd  = 0x3800_0000,
  Sto  = 0x3C00_0000,

  // Register-register-label branches //
  Beq  = 0x4000_0000,
  Bneq = 0x4400_0000,
  Bgt  = 0x4800_0000,

  // Bespoke arities //
  Jmp  = 0x4C00_0000,
  Bo   = 0x5000_0000,
  Ldpc = 0x5400_0000,
  Stpc = 0x5800_0000,

  // Magic group: shared base, sub-op in bits 18..16 //
  Systerm   = 0xFC00_0000,
  Sysin     = 0xFC01_0000,
  /// The source keyword `sysout` with a register argument.
  #[strum(serialize = "sysout")]
  SysoutReg = 0xFC02_0000,
  /// The source keyword `sysout` with a string argument; only ever produced at encode
  /// time, never parsed directly from source.
  #[strum(disabled = "true")]
  SysoutStr = 0xFC03_0000,
}

impl Keyword {

  pub fn pattern(self) -> Word {
    self as Word
  }

  /// Structural keywords carry a zero top-6 field and are never encodable.
  pub fn is_opcode(self) -> bool {
    self.pattern() & OPCODE_MASK != 0
  }

  pub fn spelling(self) -> &'static str {
    match self {
      Keyword::Macro     => "macro",
      Keyword::EndMacro  => "endmacro",
      Keyword::Mend      => "mend",
      Keyword::Alias     => "alias",
      Keyword::Add       => "add",
      Keyword::Sub       => "sub",
      Keyword::Shl       => "shl",
      Keyword::Shr       => "shr",
      Keyword::Rol       => "rol",
      Keyword::Ror       => "ror",
      Keyword::Or        => "or",
      Keyword::And       => "and",
      Keyword::Xor       => "xor",
      Keyword::Xnor      => "xnor",
      Keyword::Addi      => "addi",
      Keyword::Subi      => "subi",
      Keyword::Shli      => "shli",
      Keyword::Shri      => "shri",
      Keyword::Roli      => "roli",
      Keyword::Rori      => "rori",
      Keyword::Ldd       => "ldd",
      Keyword::Sto       => "sto",
      Keyword::Beq       => "beq",
      Keyword::Bneq      => "bneq",
      Keyword::Bgt       => "bgt",
      Keyword::Jmp       => "jmp",
      Keyword::Bo        => "bo",
      Keyword::Ldpc      => "ldpc",
      Keyword::Stpc      => "stpc",
      Keyword::Systerm   => "systerm",
      Keyword::Sysin     => "sysin",
      Keyword::SysoutReg => "sysout",
      Keyword::SysoutStr => "sysout"
    }
  }

  pub fn format(self) -> InstructionFormat {
    match self {
      | Keyword::Add | Keyword::Sub
      | Keyword::Shl | Keyword::Shr | Keyword::Rol | Keyword::Ror
      | Keyword::Or  | Keyword::And | Keyword::Xor | Keyword::Xnor
        => InstructionFormat::RegisterTriple,

      | Keyword::Addi | Keyword::Subi
      | Keyword::Shli | Keyword::Shri | Keyword::Roli | Keyword::Rori
      | Keyword::Ldd  | Keyword::Sto
        => InstructionFormat::RegisterImmediate,

      | Keyword::Beq | Keyword::Bneq | Keyword::Bgt
        => InstructionFormat::RegisterLabel,

      _ => InstructionFormat::Other
    }
  }

  /// The number of source arguments the opcode requires.
  pub fn operand_count(self) -> usize {
    match self.format() {
      InstructionFormat::RegisterTriple    => 3,
      InstructionFormat::RegisterImmediate => 3,
      InstructionFormat::RegisterLabel     => 3,
      InstructionFormat::Other => {
        match self {
          Keyword::Systerm => 0,
          _                => 1
        }
      }
    }
  }

  /**
    Recovers a keyword from a raw instruction word. The top 6 bits are masked first; if
    they match a shared base pattern the wider group mask disambiguates the member. A bit
    pattern matching no defined opcode yields `None`, which the executor must treat as an
    error, never as a silent no-op.
  */
  pub fn from_pattern(word: Word) -> Option<Keyword> {
    let masked = match word & OPCODE_MASK {
      BITWISE_BASE => word & BITWISE_MASK,
      MAGIC_BASE   => word & MAGIC_MASK,
      top          => top
    };
    match Keyword::try_from(masked) {
      Ok(keyword) if keyword.is_opcode() => Some(keyword),
      _                                  => None
    }
  }

  /**
    Looks a source word up in the keyword set, honoring the dialect's case rule: the
    lookup itself is case-insensitive, but under `StrictCaseSensitiveDescriptors` a
    spelling that only matches after case folding is a dialect error.
  */
  pub fn lookup(text: &str, options: DialectOptions) -> Result<Option<Keyword>, ErrorKind> {
    let folded = text.to_ascii_lowercase();
    match Keyword::from_str(&folded) {
      Err(_) => Ok(None),
      Ok(keyword) => {
        if options.contains(STRICT_CASE_SENSITIVE_DESCRIPTORS) && text != folded {
          return Err(ErrorKind::DialectSyntax {
            feature : format!("mixed-case keyword `{}`", text),
            flag    : flag_name(STRICT_CASE_SENSITIVE_DESCRIPTORS)
          });
        }
        Ok(Some(keyword))
      }
    }
  }
}

impl Display for Keyword {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.spelling())
  }
}

/// One of the 32 general-purpose register slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Register(u8);

pub const REGISTER_COUNT: usize = 32;

lazy_static! {
  static ref REGISTER_ALIASES: HashMap<&'static str, u8> = {
    let mut aliases = HashMap::new();
    aliases.insert("zero", 0u8);
    aliases.insert("sp", 29u8);
    aliases
  };
}

impl Register {

  pub const ZERO          : Register = Register(0);
  pub const STACK_POINTER : Register = Register(29);

  pub fn new(index: u8) -> Option<Register> {
    match (index as usize) < REGISTER_COUNT {
      true  => Some(Register(index)),
      false => None
    }
  }

  pub fn index(self) -> usize {
    self.0 as usize
  }

  /// Constructs from a 5-bit instruction field. The mask makes the range invariant hold
  /// by construction.
  pub(crate) fn from_field(bits: u8) -> Register {
    Register(bits & 0x1F)
  }

  /**
    Parses a register spelling: `rN`, the explicit `r[N]`, or a named alias. Case folds
    like keywords do; under the strict case flag a folded-only match is a dialect error.
  */
  pub fn lookup(text: &str, options: DialectOptions) -> Result<Option<Register>, ErrorKind> {
    let folded = text.to_ascii_lowercase();
    let parsed = Register::parse_folded(&folded);
    if parsed.is_some()
      && options.contains(STRICT_CASE_SENSITIVE_DESCRIPTORS)
      && text != folded
    {
      return Err(ErrorKind::DialectSyntax {
        feature : format!("mixed-case register `{}`", text),
        flag    : flag_name(STRICT_CASE_SENSITIVE_DESCRIPTORS)
      });
    }
    Ok(parsed)
  }

  fn parse_folded(folded: &str) -> Option<Register> {
    if let Some(&index) = REGISTER_ALIASES.get(folded) {
      return Register::new(index);
    }
    let digits = match folded.strip_prefix("r[") {
      Some(rest) => rest.strip_suffix(']')?,
      None       => folded.strip_prefix('r')?
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      return None;
    }
    digits.parse::<u8>().ok().and_then(Register::new)
  }
}

impl Display for Register {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "r{}", self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn spellings_round_trip() {
    for keyword in [
      Keyword::Add, Keyword::Subi, Keyword::Xnor, Keyword::Beq,
      Keyword::Systerm, Keyword::Sysin, Keyword::Mend
    ].iter() {
      assert_eq!(Keyword::from_str(keyword.spelling()), Ok(*keyword));
    }
  }

  #[test]
  fn sysout_parses_to_register_variant() {
    assert_eq!(Keyword::from_str("sysout"), Ok(Keyword::SysoutReg));
    assert!(Keyword::from_str("sysoutstr").is_err());
  }

  #[test]
  fn patterns_recover_through_masks() {
    assert_eq!(Keyword::from_pattern(0x0400_0000), Some(Keyword::Add));
    // Register fields do not disturb recovery.
    assert_eq!(Keyword::from_pattern(0x0400_0000 | (1 << 21) | (2 << 16) | (3 << 11)),
               Some(Keyword::Add));
    // Bitwise group disambiguates on the low bits.
    assert_eq!(Keyword::from_pattern(BITWISE_BASE | (5 << 11) | 3), Some(Keyword::Xnor));
    // Magic group disambiguates on bits 18..16.
    assert_eq!(Keyword::from_pattern(MAGIC_BASE), Some(Keyword::Systerm));
    assert_eq!(Keyword::from_pattern(MAGIC_BASE | (2 << 16) | (7 << 21)),
               Some(Keyword::SysoutReg));
  }

  #[test]
  fn unknown_patterns_decode_to_none() {
    assert_eq!(Keyword::from_pattern(0), None);
    assert_eq!(Keyword::from_pattern(0x6000_0000), None);
    // A magic-group selector with no member.
    assert_eq!(Keyword::from_pattern(MAGIC_BASE | (5 << 16)), None);
  }

  #[test]
  fn structural_keywords_are_not_opcodes() {
    assert!(!Keyword::Macro.is_opcode());
    assert!(!Keyword::Alias.is_opcode());
    assert!(Keyword::Systerm.is_opcode());
  }

  #[test]
  fn case_folding_and_strictness() {
    let permissive = DialectOptions::PERMISSIVE;
    assert_eq!(Keyword::lookup("ADDI", permissive), Ok(Some(Keyword::Addi)));
    assert!(Keyword::lookup("ADDI", DialectOptions::STRICT_MODERN).is_err());
    assert_eq!(Keyword::lookup("addi", DialectOptions::STRICT_MODERN), Ok(Some(Keyword::Addi)));
  }

  #[test]
  fn register_spellings() {
    let permissive = DialectOptions::PERMISSIVE;
    assert_eq!(Register::lookup("r0", permissive), Ok(Some(Register::ZERO)));
    assert_eq!(Register::lookup("r[17]", permissive), Ok(Register::new(17)));
    assert_eq!(Register::lookup("sp", permissive), Ok(Some(Register::STACK_POINTER)));
    assert_eq!(Register::lookup("zero", permissive), Ok(Some(Register::ZERO)));
    assert_eq!(Register::lookup("r32", permissive), Ok(None));
    assert_eq!(Register::lookup("rx", permissive), Ok(None));
  }

  #[test]
  fn operand_counts() {
    assert_eq!(Keyword::Add.operand_count(), 3);
    assert_eq!(Keyword::Ldd.operand_count(), 3);
    assert_eq!(Keyword::Systerm.operand_count(), 0);
    assert_eq!(Keyword::Jmp.operand_count(), 1);
    assert_eq!(Keyword::SysoutReg.operand_count(), 1);
  }
}
