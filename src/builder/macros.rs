/*!
  Macro recording and validation.

  The `MacroReader` is the first pass over the raw tokens: it records each macro's name,
  parameters, local labels, body token range, and the external references its body makes
  to other macros. The validator then resolves every macro's reference graph with an
  explicit white/grey/black coloring, so cycles are found without call-stack recursion
  and each macro is resolved exactly once no matter how many call sites it has.
*/

use std::collections::HashMap;
use std::ops::Range;

use string_cache::DefaultAtom;

use crate::dialect::{
  DialectOptions,
  flag_name,
  STRICT_KEYWORD_ENDMACRO,
  STRICT_KEYWORD_MEND,
  STRICT_MACRO_ARGUMENT_NAMES,
  STRICT_MACRO_DEFINITION_ORDER
};
use crate::errors::{CompilerError, ErrorKind, ErrorList};
use crate::keyword::Keyword;
use crate::token::Token;
use crate::builder::driver::TokenHandler;

/// A recorded macro. Owns no body tokens; the body range indexes into the original
/// token list, and includes the final instruction break before the end keyword.
#[derive(Clone, Debug)]
pub struct Macro {
  pub name         : DefaultAtom,
  pub name_token   : Token,
  pub parameters   : Vec<DefaultAtom>,
  pub local_labels : Vec<DefaultAtom>,
  pub body         : Range<usize>,
  /// Instruction-start words in the body that are neither keywords, parameters, nor
  /// local labels; candidate calls to other macros, deduplicated by name.
  pub references   : Vec<Token>
}

/// The macro arena plus a canonical-name index into it. Arena order is lexical
/// definition order, which the strict-ordering check relies on.
#[derive(Clone, Debug, Default)]
pub struct MacroTable {
  pub macros : Vec<Macro>,
  names      : HashMap<DefaultAtom, usize>
}

impl MacroTable {

  pub fn id_of(&self, name: &DefaultAtom) -> Option<usize> {
    self.names.get(name).copied()
  }

  pub fn get(&self, id: usize) -> &Macro {
    &self.macros[id]
  }

  pub fn len(&self) -> usize {
    self.macros.len()
  }

  pub fn is_empty(&self) -> bool {
    self.macros.is_empty()
  }
}

pub fn is_identifier(text: &str) -> bool {
  let mut chars = text.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The fixed parameter naming convention of the legacy dialect.
fn is_conventional_parameter(text: &str) -> bool {
  let digits = ["reg", "const", "label"]
    .iter()
    .find_map(|prefix| text.strip_prefix(prefix));
  match digits {
    Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
    None         => false
  }
}

/// The macro currently being recorded.
struct MacroBuild {
  name         : DefaultAtom,
  name_token   : Token,
  registrable  : bool,
  parameters   : Vec<DefaultAtom>,
  local_labels : Vec<DefaultAtom>,
  references   : Vec<Token>,
  body_start   : Option<usize>
}

pub struct MacroReader {
  options : DialectOptions,
  table   : MacroTable,
  current : Option<MacroBuild>
}

impl MacroReader {

  pub fn new(options: DialectOptions) -> MacroReader {
    MacroReader { options, table: MacroTable::default(), current: None }
  }

  /// An unterminated trailing macro is dropped here; the driver has already reported it.
  pub fn into_table(self) -> MacroTable {
    self.table
  }

  fn note_body(&mut self, index: usize) {
    if let Some(current) = self.current.as_mut() {
      current.body_start.get_or_insert(index);
    }
  }
}

impl TokenHandler for MacroReader {

  fn on_macro_declaration(&mut self, _index: usize, name: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    let canonical = self.options.canonical(&name.text);
    let mut registrable = true;

    if !is_identifier(&name.text) {
      errors.push(CompilerError::error_at(
        ErrorKind::Syntax(format!("`{}` is not a legal macro name", name.text)),
        name.line, name.column, name.length
      ))?;
      registrable = false;
    }
    if Keyword::lookup(&name.text, DialectOptions::PERMISSIVE)
              .unwrap_or(None)
              .is_some()
    {
      errors.push(CompilerError::error_at(
        ErrorKind::Syntax(format!("macro name `{}` collides with a keyword", name.text)),
        name.line, name.column, name.length
      ))?;
      registrable = false;
    }
    if let Some(&original) = self.table.names.get(&canonical) {
      let first = &self.table.macros[original].name_token;
      errors.push(CompilerError::error_at(
        ErrorKind::Syntax(format!(
          "macro `{}` is already defined at {}", name.text, first.position()
        )),
        name.line, name.column, name.length
      ))?;
      registrable = false;
    }

    self.current = Some(MacroBuild {
      name         : canonical,
      name_token   : name.clone(),
      registrable,
      parameters   : Vec::new(),
      local_labels : Vec::new(),
      references   : Vec::new(),
      body_start   : None
    });
    Ok(())
  }

  fn on_macro_declaration_args(&mut self, _index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if !is_identifier(&token.text) {
      errors.push(CompilerError::error_at(
        ErrorKind::Syntax(format!("`{}` is not a legal macro parameter name", token.text)),
        token.line, token.column, token.length
      ))?;
      return Ok(());
    }
    if self.options.contains(STRICT_MACRO_ARGUMENT_NAMES)
      && !is_conventional_parameter(&token.text.to_ascii_lowercase())
    {
      errors.push(CompilerError::error_at(
        ErrorKind::DialectSyntax {
          feature : format!("macro parameter `{}` outside the reg/const/label<N> convention", token.text),
          flag    : flag_name(STRICT_MACRO_ARGUMENT_NAMES)
        },
        token.line, token.column, token.length
      ))?;
    }

    let canonical = self.options.canonical(&token.text);
    if let Some(current) = self.current.as_mut() {
      match current.parameters.contains(&canonical) {
        true => errors.push(CompilerError::error_at(
          ErrorKind::Syntax(format!("duplicate macro parameter `{}`", token.text)),
          token.line, token.column, token.length
        ))?,
        false => current.parameters.push(canonical)
      }
    }
    Ok(())
  }

  fn on_macro_instruction_start(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.note_body(index);
    let keyword = match Keyword::lookup(&token.text, self.options) {
      Ok(keyword) => keyword,
      Err(kind) => {
        // Recorded here and again by the resolver's walk; deduplication collapses them.
        errors.push(CompilerError::error_at(kind, token.line, token.column, token.length))?;
        Keyword::lookup(&token.text, DialectOptions::PERMISSIVE).unwrap_or(None)
      }
    };
    if keyword.is_some() {
      return Ok(());
    }

    let options = self.options;
    let canonical = options.canonical(&token.text);
    if let Some(current) = self.current.as_mut() {
      let own_symbol = current.parameters.contains(&canonical)
        || current.local_labels.contains(&canonical);
      let recorded = current.references.iter().any(|r| {
        options.canonical(&r.text) == canonical
      });
      if !own_symbol && !recorded {
        current.references.push(token.clone());
      }
    }
    Ok(())
  }

  fn on_macro_instruction_args(&mut self, index: usize, _token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.note_body(index);
    Ok(())
  }

  fn on_macro_label_declaration(&mut self, index: usize, name: &Token, _colon: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.note_body(index);
    if !is_identifier(&name.text) {
      errors.push(CompilerError::error_at(
        ErrorKind::Syntax(format!("`{}` is not a legal label name", name.text)),
        name.line, name.column, name.length
      ))?;
      return Ok(());
    }
    let canonical = self.options.canonical(&name.text);
    if let Some(current) = self.current.as_mut() {
      if !current.local_labels.contains(&canonical) {
        current.local_labels.push(canonical);
      }
    }
    Ok(())
  }

  fn on_macro_instruction_break(&mut self, index: usize, _token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.note_body(index);
    Ok(())
  }

  fn on_macro_ended(&mut self, index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    let folded = (*token.text).to_ascii_lowercase();
    let required = match (
      self.options.contains(STRICT_KEYWORD_ENDMACRO),
      self.options.contains(STRICT_KEYWORD_MEND)
    ) {
      (true, _) => Some(("endmacro", STRICT_KEYWORD_ENDMACRO)),
      (_, true) => Some(("mend", STRICT_KEYWORD_MEND)),
      _         => None
    };
    if let Some((keyword, flag)) = required {
      if folded != keyword {
        errors.push(CompilerError::error_at(
          ErrorKind::DialectSyntax {
            feature : format!("closing a macro with `{}`", token.text),
            flag    : flag_name(flag)
          },
          token.line, token.column, token.length
        ))?;
      }
    }

    if let Some(current) = self.current.take() {
      let body = current.body_start.unwrap_or(index)..index;
      let recorded = Macro {
        name         : current.name.clone(),
        name_token   : current.name_token,
        parameters   : current.parameters,
        local_labels : current.local_labels,
        body,
        references   : current.references
      };
      if current.registrable {
        self.table.names.insert(current.name, self.table.macros.len());
        self.table.macros.push(recorded);
      }
    }
    Ok(())
  }
}

// region Validation

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Color {
  White,
  Grey,
  Black
}

/**
  Resolves every macro's reference graph. Unknown references are `UndefinedSymbol`
  errors; a grey-on-grey hit is a cycle, reported with the full reference chain; under
  `StrictMacroDefinitionOrder` a reference to a macro defined lexically later is a
  dialect error. Black macros are never revisited, so each macro is resolved once.
*/
pub fn validate_macros(table: &MacroTable, options: DialectOptions, errors: &mut ErrorList)
  -> Result<(), CompilerError>
{
  let mut colors = vec![Color::White; table.len()];

  for root in 0..table.len() {
    if colors[root] != Color::White {
      continue;
    }
    colors[root] = Color::Grey;
    // (macro id, index of the next reference to resolve)
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

    while let Some(&(id, ref_index)) = stack.last() {
      if ref_index >= table.get(id).references.len() {
        colors[id] = Color::Black;
        stack.pop();
        continue;
      }
      if let Some(top) = stack.last_mut() {
        top.1 += 1;
      }

      let token = &table.get(id).references[ref_index];
      let target = match table.id_of(&options.canonical(&token.text)) {
        Some(target) => target,
        None => {
          errors.push(CompilerError::error_at(
            ErrorKind::UndefinedSymbol(token.text.clone()),
            token.line, token.column, token.length
          ))?;
          continue;
        }
      };

      if options.contains(STRICT_MACRO_DEFINITION_ORDER) && target > id {
        errors.push(CompilerError::error_at(
          ErrorKind::DialectSyntax {
            feature : format!("reference to macro `{}` before its definition", token.text),
            flag    : flag_name(STRICT_MACRO_DEFINITION_ORDER)
          },
          token.line, token.column, token.length
        ))?;
      }

      match colors[target] {
        Color::Black => {}
        Color::Grey  => {
          let cycle_start = stack.iter().position(|&(m, _)| m == target).unwrap_or(0);
          let mut chain: Vec<&str> = stack[cycle_start..]
            .iter()
            .map(|&(m, _)| &*table.get(m).name)
            .collect();
          chain.push(&table.get(target).name);
          errors.push(CompilerError::error_at(
            ErrorKind::RecursiveMacro(chain.join(" -> ")),
            token.line, token.column, token.length
          ))?;
        }
        Color::White => {
          colors[target] = Color::Grey;
          stack.push((target, 0));
        }
      }
    }
  }
  Ok(())
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builder::driver::{walk, DriverState};
  use crate::token::tokenize;

  fn read_macros(source: &str, options: DialectOptions) -> (MacroTable, ErrorList) {
    let mut errors = ErrorList::new(false);
    let tokens = tokenize(source, &mut errors).unwrap();
    let mut reader = MacroReader::new(options);
    let range = 0..tokens.len();
    walk(&tokens, range, DriverState::InstructionStart, &mut reader, options, &mut errors)
      .unwrap();
    (reader.into_table(), errors)
  }

  #[test]
  fn records_name_parameters_and_labels() {
    let (table, errors) = read_macros(
      "macro countdown reg1, const1:\ntop: subi reg1, reg1, const1\nbgt reg1, zero, top\nmend",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert_eq!(table.len(), 1);
    let recorded = table.get(0);
    assert_eq!(&*recorded.name, "countdown");
    assert_eq!(recorded.parameters.len(), 2);
    assert_eq!(&*recorded.local_labels[0], "top");
    assert!(recorded.references.is_empty());
  }

  #[test]
  fn parameters_are_not_references() {
    // A parameter used as an argument never counts as a call to another macro.
    let (table, errors) = read_macros(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert!(table.get(0).references.is_empty());
  }

  #[test]
  fn calls_to_other_macros_are_references() {
    let (table, errors) = read_macros(
      "macro double reg1\ninc reg1\ninc reg1\nmend\nmacro inc reg1\naddi reg1, reg1, 1\nmend",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    let double = table.get(0);
    // Deduplicated by name.
    assert_eq!(double.references.len(), 1);
    assert_eq!(&*double.references[0].text, "inc");
  }

  #[test]
  fn keyword_collision_is_rejected() {
    let (table, errors) = read_macros("macro add reg1\nmend", DialectOptions::PERMISSIVE);
    assert!(errors.has_errors());
    assert!(table.is_empty());
  }

  #[test]
  fn strict_parameter_names_are_enforced() {
    let options = DialectOptions::PERMISSIVE.with(STRICT_MACRO_ARGUMENT_NAMES);
    let (_, errors) = read_macros("macro inc counter\naddi counter, counter, 1\nmend", options);
    assert!(errors.has_errors());
    let (_, errors) = read_macros("macro inc reg1\naddi reg1, reg1, 1\nmend", options);
    assert!(errors.is_empty());
  }

  #[test]
  fn wrong_end_keyword_is_dialect_gated() {
    let options = DialectOptions::PERMISSIVE.with(STRICT_KEYWORD_ENDMACRO);
    let (_, errors) = read_macros("macro inc reg1\naddi reg1, reg1, 1\nmend", options);
    assert!(errors.has_errors());
    let (_, errors) = read_macros("macro inc reg1\naddi reg1, reg1, 1\nendmacro", options);
    assert!(errors.is_empty());
    // The end keyword folds before comparison unless case strictness says otherwise.
    let (_, errors) = read_macros("macro inc reg1\naddi reg1, reg1, 1\nENDMACRO", options);
    assert!(errors.is_empty());
  }

  #[test]
  fn direct_recursion_is_caught() {
    let (table, mut errors) = read_macros("macro loop\nloop\nmend", DialectOptions::PERMISSIVE);
    validate_macros(&table, DialectOptions::PERMISSIVE, &mut errors).unwrap();
    let recursive = errors.iter().any(|e| matches!(e.kind, ErrorKind::RecursiveMacro(_)));
    assert!(recursive);
  }

  #[test]
  fn indirect_recursion_reports_the_chain() {
    let (table, mut errors) = read_macros(
      "macro a\nb\nmend\nmacro b\na\nmend",
      DialectOptions::PERMISSIVE
    );
    validate_macros(&table, DialectOptions::PERMISSIVE, &mut errors).unwrap();
    let chain = errors.iter().find_map(|e| match &e.kind {
      ErrorKind::RecursiveMacro(chain) => Some(chain.clone()),
      _                                => None
    });
    assert_eq!(chain.as_deref(), Some("a -> b -> a"));
  }

  #[test]
  fn unknown_reference_is_undefined_symbol() {
    let (table, mut errors) = read_macros("macro a\nmystery r1\nmend", DialectOptions::PERMISSIVE);
    validate_macros(&table, DialectOptions::PERMISSIVE, &mut errors).unwrap();
    assert!(errors.iter().any(|e| matches!(e.kind, ErrorKind::UndefinedSymbol(_))));
  }

  #[test]
  fn strict_order_rejects_forward_references() {
    let options = DialectOptions::PERMISSIVE.with(STRICT_MACRO_DEFINITION_ORDER);
    let (table, mut errors) = read_macros(
      "macro double reg1\ninc reg1\ninc reg1\nmend\nmacro inc reg1\naddi reg1, reg1, 1\nmend",
      options
    );
    validate_macros(&table, options, &mut errors).unwrap();
    assert!(errors.iter().any(|e| matches!(e.kind, ErrorKind::DialectSyntax { .. })));
  }
}
