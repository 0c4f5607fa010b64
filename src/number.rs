/*!
  Number literals. Every literal denotes a 16-bit immediate, but the source spelling is
  preserved so that a literal can be rendered back in the radix notation it was written
  in. Four non-decimal spellings are accepted: `0x`/`0b` prefixes and the trailing
  `h`/`b` radix suffixes, all case-insensitive.

  Values outside `i16` are reinterpreted by two's complement when they fit in 16 bits
  (so `0xffff` and `65535` both denote `-1`); the decimal reinterpretation is a dialect
  extension gated by `StrictDecimalNumberLengths`.
*/

use std::fmt::{Display, Formatter};

use crate::dialect::{
  DialectOptions,
  flag_name,
  STRICT_DECIMAL_NUMBER_LENGTHS,
  STRICT_NON_DECIMAL_NUMBER_LENGTHS
};
use crate::errors::ErrorKind;

/// The radix notation a literal was written in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SourceFormat {
  Decimal,
  HexPrefix,    // 0xff1b
  HexSuffix,    // 0ff1bh
  BinaryPrefix, // 0b1010
  BinarySuffix  // 1010b
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NumberLiteral {
  pub value  : i16,
  pub format : SourceFormat
}

impl NumberLiteral {

  pub fn decimal(value: i16) -> NumberLiteral {
    NumberLiteral { value, format: SourceFormat::Decimal }
  }

  /**
    Parses the spelling of a `Number` token. The tokenizer guarantees the text is an
    optional sign followed by alphanumerics; everything else about the spelling is
    validated here. Dialect flags gate digit counts, not values: under
    `StrictNonDecimalNumberLengths` hex literals need all four digits and binary
    literals all sixteen.
  */
  pub fn parse(text: &str, options: DialectOptions) -> Result<NumberLiteral, ErrorKind> {
    let folded = text.to_ascii_lowercase();

    if let Some(digits) = folded.strip_prefix("0x") {
      return NumberLiteral::parse_radix(text, digits, 16, SourceFormat::HexPrefix, options);
    }
    if let Some(digits) = folded.strip_prefix("0b") {
      return NumberLiteral::parse_radix(text, digits, 2, SourceFormat::BinaryPrefix, options);
    }
    if let Some(digits) = folded.strip_suffix('h') {
      return NumberLiteral::parse_radix(text, digits, 16, SourceFormat::HexSuffix, options);
    }
    if let Some(digits) = folded.strip_suffix('b') {
      return NumberLiteral::parse_radix(text, digits, 2, SourceFormat::BinarySuffix, options);
    }

    NumberLiteral::parse_decimal(text, &folded, options)
  }

  fn parse_decimal(text: &str, folded: &str, options: DialectOptions)
    -> Result<NumberLiteral, ErrorKind>
  {
    let value: i64 = folded.parse().map_err(|_| ErrorKind::NumberFormat {
      literal : text.to_string(),
      reason  : "not a valid decimal number".to_string()
    })?;

    if value > i16::MAX as i64 && value <= u16::MAX as i64 {
      // Reinterpretation of the unsigned spelling, unless the dialect forbids it.
      if options.contains(STRICT_DECIMAL_NUMBER_LENGTHS) {
        return Err(ErrorKind::DialectSyntax {
          feature : format!("decimal literal `{}` above {}", text, i16::MAX),
          flag    : flag_name(STRICT_DECIMAL_NUMBER_LENGTHS)
        });
      }
      return Ok(NumberLiteral::decimal(value as u16 as i16));
    }

    if value < i16::MIN as i64 || value > i16::MAX as i64 {
      return Err(ErrorKind::NumberFormat {
        literal : text.to_string(),
        reason  : "does not fit in 16 bits".to_string()
      });
    }

    Ok(NumberLiteral::decimal(value as i16))
  }

  fn parse_radix(
    text    : &str,
    digits  : &str,
    radix   : u32,
    format  : SourceFormat,
    options : DialectOptions
  ) -> Result<NumberLiteral, ErrorKind>
  {
    if digits.is_empty() {
      return Err(ErrorKind::NumberFormat {
        literal : text.to_string(),
        reason  : "has no digits".to_string()
      });
    }

    let value = u32::from_str_radix(digits, radix).map_err(|_| ErrorKind::NumberFormat {
      literal : text.to_string(),
      reason  : format!("not a valid base-{} number", radix)
    })?;

    if value > u16::MAX as u32 {
      return Err(ErrorKind::NumberFormat {
        literal : text.to_string(),
        reason  : "does not fit in 16 bits".to_string()
      });
    }

    if options.contains(STRICT_NON_DECIMAL_NUMBER_LENGTHS) {
      let required = match radix {
        16 => 4,
        _  => 16
      };
      if digits.len() < required {
        return Err(ErrorKind::DialectSyntax {
          feature : format!("{}-digit base-{} literal `{}`", digits.len(), radix, text),
          flag    : flag_name(STRICT_NON_DECIMAL_NUMBER_LENGTHS)
        });
      }
    }

    Ok(NumberLiteral { value: value as u16 as i16, format })
  }

  /**
    Renders the literal back in its source radix. Suffix spellings whose leading digit
    would be alphabetic gain a leading `0` so the result tokenizes as a number again
    (`0ffffh`, never `ffffh`).
  */
  pub fn format(&self) -> String {
    let bits = self.value as u16;
    match self.format {
      SourceFormat::Decimal      => self.value.to_string(),
      SourceFormat::HexPrefix    => format!("0x{:x}", bits),
      SourceFormat::BinaryPrefix => format!("0b{:b}", bits),
      SourceFormat::HexSuffix    => {
        let digits = format!("{:x}", bits);
        match digits.as_bytes()[0].is_ascii_alphabetic() {
          true  => format!("0{}h", digits),
          false => format!("{}h", digits)
        }
      }
      SourceFormat::BinarySuffix => format!("{:b}b", bits)
    }
  }
}

impl Display for NumberLiteral {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.format())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PERMISSIVE: DialectOptions = DialectOptions::PERMISSIVE;

  #[test]
  fn decimal_spellings() {
    assert_eq!(NumberLiteral::parse("42", PERMISSIVE).unwrap().value, 42);
    assert_eq!(NumberLiteral::parse("-12", PERMISSIVE).unwrap().value, -12);
    assert_eq!(NumberLiteral::parse("+7", PERMISSIVE).unwrap().value, 7);
    assert_eq!(NumberLiteral::parse("-32768", PERMISSIVE).unwrap().value, i16::MIN);
  }

  #[test]
  fn radix_spellings() {
    assert_eq!(NumberLiteral::parse("0xff1b", PERMISSIVE).unwrap().value, 0xff1bu16 as i16);
    assert_eq!(NumberLiteral::parse("0FF1BH", PERMISSIVE).unwrap().value, 0xff1bu16 as i16);
    assert_eq!(NumberLiteral::parse("0b1010", PERMISSIVE).unwrap().value, 10);
    assert_eq!(NumberLiteral::parse("1010b", PERMISSIVE).unwrap().value, 10);
  }

  #[test]
  fn unsigned_spellings_reinterpret() {
    assert_eq!(NumberLiteral::parse("0xffff", PERMISSIVE).unwrap().value, -1);
    assert_eq!(NumberLiteral::parse("65535", PERMISSIVE).unwrap().value, -1);
    assert_eq!(NumberLiteral::parse("32768", PERMISSIVE).unwrap().value, i16::MIN);
  }

  #[test]
  fn out_of_range_is_rejected() {
    assert!(NumberLiteral::parse("65536", PERMISSIVE).is_err());
    assert!(NumberLiteral::parse("-32769", PERMISSIVE).is_err());
    assert!(NumberLiteral::parse("0x10000", PERMISSIVE).is_err());
    assert!(NumberLiteral::parse("0x", PERMISSIVE).is_err());
    assert!(NumberLiteral::parse("12three", PERMISSIVE).is_err());
  }

  #[test]
  fn strict_decimal_forbids_reinterpretation() {
    let strict = PERMISSIVE.with(STRICT_DECIMAL_NUMBER_LENGTHS);
    assert!(NumberLiteral::parse("32768", strict).is_err());
    assert_eq!(NumberLiteral::parse("32767", strict).unwrap().value, i16::MAX);
  }

  #[test]
  fn strict_non_decimal_requires_full_width() {
    let strict = PERMISSIVE.with(STRICT_NON_DECIMAL_NUMBER_LENGTHS);
    assert!(NumberLiteral::parse("0xff", strict).is_err());
    assert!(NumberLiteral::parse("1010b", strict).is_err());
    assert_eq!(NumberLiteral::parse("0x00ff", strict).unwrap().value, 0xff);
    assert_eq!(NumberLiteral::parse("0000000000001010b", strict).unwrap().value, 10);
  }

  #[test]
  fn formatting_round_trips_through_parse() {
    for text in ["42", "-1", "0xff1b", "0ffffh", "0b1010", "1010b"].iter() {
      let parsed = NumberLiteral::parse(text, PERMISSIVE).unwrap();
      let reparsed = NumberLiteral::parse(&parsed.format(), PERMISSIVE).unwrap();
      assert_eq!(parsed, reparsed, "literal `{}` did not survive formatting", text);
    }
  }

  #[test]
  fn suffix_spelling_never_leads_with_a_letter() {
    let literal = NumberLiteral { value: -1, format: SourceFormat::HexSuffix };
    assert_eq!(literal.format(), "0ffffh");
  }
}
