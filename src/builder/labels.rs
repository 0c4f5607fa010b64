/*!
  The label reader: one forward pass over the resolved stream assigning each label
  declaration its 0-based instruction index. Labels bind to the next instruction line,
  so a label on its own line and a label sharing the instruction's line mean the same
  thing, and a trailing label binds one past the last instruction.
*/

use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::dialect::DialectOptions;
use crate::errors::{CompilerError, ErrorKind, ErrorList};
use crate::token::Token;
use crate::builder::driver::TokenHandler;
use crate::builder::macros::is_identifier;

/**
  Two labels may legally share one instruction index, so lookups go through the full
  declaration map; the bimap only keeps one name per index, for rendering an index back
  to a label during disassembly.
*/
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
  display      : BiMap<DefaultAtom, usize>,
  declarations : HashMap<DefaultAtom, (Token, usize)>
}

impl LabelTable {

  pub fn declare(&mut self, name: DefaultAtom, token: Token, index: usize, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if let Some((original, original_index)) = self.declarations.get(&name) {
      let error = CompilerError::error_at(
        ErrorKind::Syntax(format!(
          "label `{}` is already declared at {} (instruction {})",
          name, original.position(), original_index
        )),
        token.line, token.column, token.length
      );
      return errors.push(error);
    }
    self.display.insert(name.clone(), index);
    self.declarations.insert(name, (token, index));
    Ok(())
  }

  pub fn index_of(&self, name: &DefaultAtom) -> Option<usize> {
    self.declarations.get(name).map(|&(_, index)| index)
  }

  pub fn name_at(&self, index: usize) -> Option<&DefaultAtom> {
    self.display.get_by_right(&index)
  }

  pub fn len(&self) -> usize {
    self.declarations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.declarations.is_empty()
  }
}

pub struct LabelReader {
  options : DialectOptions,
  labels  : LabelTable,
  counter : usize
}

impl LabelReader {

  pub fn new(options: DialectOptions) -> LabelReader {
    LabelReader { options, labels: LabelTable::default(), counter: 0 }
  }

  pub fn into_table(self) -> LabelTable {
    self.labels
  }
}

impl TokenHandler for LabelReader {

  fn on_label_declaration(&mut self, _index: usize, name: &Token, _colon: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    // Rewritten macro-local labels carry the `@name[n]_` prefix and are trusted; user
    // labels must be plain identifiers.
    if !name.text.starts_with('@') && !is_identifier(&name.text) {
      let error = CompilerError::error_at(
        ErrorKind::Syntax(format!("`{}` is not a legal label name", name.text)),
        name.line, name.column, name.length
      );
      return errors.push(error);
    }
    let canonical = self.options.canonical(&name.text);
    self.labels.declare(canonical, name.clone(), self.counter, errors)
  }

  fn on_instruction_start(&mut self, _index: usize, _token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.counter += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builder::driver::{walk, DriverState};
  use crate::token::tokenize;

  fn read_labels(source: &str) -> (LabelTable, ErrorList) {
    let mut errors = ErrorList::new(false);
    let tokens = tokenize(source, &mut errors).unwrap();
    let mut reader = LabelReader::new(DialectOptions::PERMISSIVE);
    walk(&tokens, 0..tokens.len(), DriverState::InstructionStart,
         &mut reader, DialectOptions::PERMISSIVE, &mut errors).unwrap();
    (reader.into_table(), errors)
  }

  fn index_of(labels: &LabelTable, name: &str) -> Option<usize> {
    labels.index_of(&DefaultAtom::from(name))
  }

  #[test]
  fn labels_bind_to_the_next_instruction() {
    let (labels, errors) = read_labels(
      "start: addi r1, r1, 1\nmiddle:\nsub r1, r1, r2\nend: systerm"
    );
    assert!(errors.is_empty());
    assert_eq!(index_of(&labels, "start"), Some(0));
    assert_eq!(index_of(&labels, "middle"), Some(1));
    assert_eq!(index_of(&labels, "end"), Some(2));
  }

  #[test]
  fn two_labels_may_share_one_index() {
    let (labels, errors) = read_labels("first:\nsecond:\nsysterm");
    assert!(errors.is_empty());
    assert_eq!(index_of(&labels, "first"), Some(0));
    assert_eq!(index_of(&labels, "second"), Some(0));
    // Display lookup still resolves the shared index to one of them.
    assert!(labels.name_at(0).is_some());
  }

  #[test]
  fn duplicate_labels_are_reported_with_both_positions() {
    let (labels, errors) = read_labels("here: addi r1, r1, 1\nhere: systerm");
    assert_eq!(errors.error_count(), 1);
    // The first declaration wins.
    assert_eq!(index_of(&labels, "here"), Some(0));
    let message = errors.iter().next().unwrap().to_string();
    assert!(message.contains("1:1"), "message should name the original: {}", message);
  }

  #[test]
  fn trailing_label_binds_past_the_last_instruction() {
    let (labels, errors) = read_labels("addi r1, r1, 1\ndone:");
    assert!(errors.is_empty());
    assert_eq!(index_of(&labels, "done"), Some(1));
  }
}
