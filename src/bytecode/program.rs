/*!
  The assembled program: the instruction words in execution order plus the string pool
  that `sysout` string operands point into. Strings are stored NUL-terminated, and the
  16-bit offset of a string's first byte is what the instruction word carries.
*/

use crate::keyword::Word;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProgramStorage {
  pub words   : Vec<Word>,
  string_pool : Vec<u8>
}

impl ProgramStorage {

  pub fn new() -> ProgramStorage {
    ProgramStorage::default()
  }

  pub fn push(&mut self, word: Word) {
    self.words.push(word);
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /**
    Appends `text` to the pool and returns the offset of its first byte, or `None` when
    the pool has outgrown the 16-bit offset space of the instruction word.
  */
  pub fn intern_string(&mut self, text: &str) -> Option<u16> {
    let offset = self.string_pool.len();
    if offset + text.len() + 1 > u16::MAX as usize + 1 {
      return None;
    }
    self.string_pool.extend_from_slice(text.as_bytes());
    self.string_pool.push(0);
    Some(offset as u16)
  }

  /// Reads the NUL-terminated string at `offset`. An out-of-range or corrupt offset
  /// yields `None` rather than garbage.
  pub fn string_at(&self, offset: u16) -> Option<&str> {
    let start = offset as usize;
    let pool = self.string_pool.get(start..)?;
    let end = pool.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&pool[..end]).ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interned_strings_read_back() {
    let mut program = ProgramStorage::new();
    let first = program.intern_string("hello").unwrap();
    let second = program.intern_string("").unwrap();
    let third = program.intern_string("wörld").unwrap();
    assert_eq!(program.string_at(first), Some("hello"));
    assert_eq!(program.string_at(second), Some(""));
    assert_eq!(program.string_at(third), Some("wörld"));
    assert_eq!(second, first + 6); // "hello\0"
  }

  #[test]
  fn bad_offsets_read_as_none() {
    let mut program = ProgramStorage::new();
    program.intern_string("x").unwrap();
    assert_eq!(program.string_at(100), None);
  }
}
