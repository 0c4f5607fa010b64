/*!
  Dialect configuration. A `DialectOptions` value is a plain `u32` bit set of independent
  strictness flags; named presets combine subsets of them. Flags change which literal
  spellings, macro syntax, and ordering rules are legal without changing the semantics of
  a valid program.

  Bit layout (one flag per bit, low to high):

  ```text
  bit 0  STRICT_NON_DECIMAL_NUMBER_LENGTHS   hex needs >= 4 digits, binary >= 16
  bit 1  STRICT_DECIMAL_NUMBER_LENGTHS       decimal literals >= 2^15 are rejected
  bit 2  STRICT_CASE_SENSITIVE_DESCRIPTORS   keywords/registers must match exact case
  bit 3  STRICT_KEYWORD_ENDMACRO             macro bodies must close with `endmacro`
  bit 4  STRICT_KEYWORD_MEND                 macro bodies must close with `mend`
  bit 5  STRICT_NO_COLON_AFTER_MACRO         no colon after a macro parameter list
  bit 6  STRICT_MACRO_DEFINITION_ORDER       macros must be defined before referenced
  bit 7  STRICT_MACRO_ARGUMENT_NAMES         parameters match (reg|const|label)<digits>
  ```
*/

use string_cache::DefaultAtom;

use crate::errors::{CompilerError, ErrorKind};

pub const STRICT_NON_DECIMAL_NUMBER_LENGTHS : u32 = 1 << 0;
pub const STRICT_DECIMAL_NUMBER_LENGTHS     : u32 = 1 << 1;
pub const STRICT_CASE_SENSITIVE_DESCRIPTORS : u32 = 1 << 2;
pub const STRICT_KEYWORD_ENDMACRO           : u32 = 1 << 3;
pub const STRICT_KEYWORD_MEND               : u32 = 1 << 4;
pub const STRICT_NO_COLON_AFTER_MACRO       : u32 = 1 << 5;
pub const STRICT_MACRO_DEFINITION_ORDER     : u32 = 1 << 6;
pub const STRICT_MACRO_ARGUMENT_NAMES       : u32 = 1 << 7;

/// The flag name as it appears in `DialectSyntaxError` messages.
pub fn flag_name(flag: u32) -> &'static str {
  match flag {
    STRICT_NON_DECIMAL_NUMBER_LENGTHS => "StrictNonDecimalNumberLengths",
    STRICT_DECIMAL_NUMBER_LENGTHS     => "StrictDecimalNumberLengths",
    STRICT_CASE_SENSITIVE_DESCRIPTORS => "StrictCaseSensitiveDescriptors",
    STRICT_KEYWORD_ENDMACRO           => "StrictKeywordEndmacro",
    STRICT_KEYWORD_MEND               => "StrictKeywordMend",
    STRICT_NO_COLON_AFTER_MACRO       => "StrictNoColonAfterMacro",
    STRICT_MACRO_DEFINITION_ORDER     => "StrictMacroDefinitionOrder",
    STRICT_MACRO_ARGUMENT_NAMES       => "StrictMacroArgumentNames",
    _                                 => "UnknownFlag"
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DialectOptions(pub u32);

impl DialectOptions {

  /// The permissive default dialect: every flag off.
  pub const PERMISSIVE: DialectOptions = DialectOptions(0);

  /// The older strict dialect: `mend`, strict literal spellings, no colon after macro
  /// parameters, definition-before-use, and the fixed parameter naming convention.
  pub const STRICT_LEGACY: DialectOptions = DialectOptions(
    STRICT_NON_DECIMAL_NUMBER_LENGTHS
      | STRICT_DECIMAL_NUMBER_LENGTHS
      | STRICT_KEYWORD_MEND
      | STRICT_NO_COLON_AFTER_MACRO
      | STRICT_MACRO_DEFINITION_ORDER
      | STRICT_MACRO_ARGUMENT_NAMES
  );

  /// The newer strict dialect: `endmacro`, exact-case descriptors, and
  /// definition-before-use.
  pub const STRICT_MODERN: DialectOptions = DialectOptions(
    STRICT_CASE_SENSITIVE_DESCRIPTORS
      | STRICT_KEYWORD_ENDMACRO
      | STRICT_MACRO_DEFINITION_ORDER
  );

  pub fn contains(self, flag: u32) -> bool {
    self.0 & flag != 0
  }

  pub fn with(self, flag: u32) -> DialectOptions {
    DialectOptions(self.0 | flag)
  }

  /**
    Rejects an inconsistent configuration before any parsing begins. The two required
    end-keyword flags are mutually exclusive: a macro body cannot be required to close
    with both `endmacro` and `mend`.
  */
  pub fn validate(self) -> Result<(), CompilerError> {
    match self.contains(STRICT_KEYWORD_ENDMACRO) && self.contains(STRICT_KEYWORD_MEND) {
      true => Err(CompilerError::configuration(ErrorKind::Syntax(
        "dialect flags StrictKeywordEndmacro and StrictKeywordMend are mutually exclusive".into()
      ))),
      false => Ok(())
    }
  }

  /**
    The canonical spelling of an identifier under this dialect: descriptors and symbol
    names fold to lower case unless the dialect is case sensitive.
  */
  pub fn canonical(self, text: &str) -> DefaultAtom {
    match self.contains(STRICT_CASE_SENSITIVE_DESCRIPTORS) {
      true  => DefaultAtom::from(text),
      false => DefaultAtom::from(text.to_ascii_lowercase().as_str())
    }
  }
}

impl Default for DialectOptions {
  fn default() -> DialectOptions {
    DialectOptions::PERMISSIVE
  }
}
