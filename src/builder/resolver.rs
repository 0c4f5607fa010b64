/*!
  The macro resolver: the second pass over the raw tokens, producing the flat resolved
  stream that the label reader and the emitter consume. Macro definitions contribute
  nothing to the output; a macro-call line is replaced by the macro's body, re-walked
  through the shared driver with this same handler, with parameters substituted and
  local labels rewritten to globally-unique names.

  The expansion state is an explicit stack of frames rather than data hidden in the call
  stack, so nesting depth, bound arguments, and per-macro expansion ordinals are all
  inspectable. Parameter lookups search frames innermost-first, so an inner binding
  shadows an outer one of the same name.
*/

use string_cache::DefaultAtom;

use crate::dialect::{DialectOptions, flag_name, STRICT_MACRO_DEFINITION_ORDER};
use crate::errors::{CompilerError, ErrorKind, ErrorList};
use crate::keyword::Keyword;
use crate::token::{SourcePosition, Token, TokenKind};
use crate::builder::driver::{walk, DriverState, TokenHandler};
use crate::builder::macros::MacroTable;

/// One active expansion. `ordinal` is the macro's completed-expansion count at the time
/// the call was entered; it names this expansion in rewritten labels.
#[derive(Clone, Debug)]
pub struct ExpansionFrame {
  pub macro_id  : usize,
  pub call_site : SourcePosition,
  pub bindings  : Vec<Token>,
  pub ordinal   : usize
}

pub struct MacroResolver<'a> {
  tokens           : &'a [Token],
  table            : &'a MacroTable,
  options          : DialectOptions,
  resolved         : Vec<Token>,
  /// One entry per resolved instruction line: the chain of call-site positions plus the
  /// instruction's own position, for breakpoint/source mapping.
  symbol_stacks    : Vec<Vec<SourcePosition>>,
  pending          : Vec<Token>,
  frames           : Vec<ExpansionFrame>,
  expansion_counts : Vec<usize>
}

impl<'a> MacroResolver<'a> {

  pub fn new(tokens: &'a [Token], table: &'a MacroTable, options: DialectOptions)
    -> MacroResolver<'a>
  {
    MacroResolver {
      tokens,
      table,
      options,
      resolved         : Vec::new(),
      symbol_stacks    : Vec::new(),
      pending          : Vec::new(),
      frames           : Vec::new(),
      expansion_counts : vec![0; table.len()]
    }
  }

  pub fn into_output(self) -> (Vec<Token>, Vec<Vec<SourcePosition>>) {
    (self.resolved, self.symbol_stacks)
  }

  /**
    Applies the active expansion frames to one body token: a parameter name becomes the
    bound argument token, a local label name is rewritten to its globally-unique form,
    anything else passes through unchanged.
  */
  fn substitute(&self, token: &Token) -> Token {
    if token.kind != TokenKind::Word {
      return token.clone();
    }
    let canonical = self.options.canonical(&token.text);
    for frame in self.frames.iter().rev() {
      let definition = self.table.get(frame.macro_id);
      if let Some(slot) = definition.parameters.iter().position(|p| *p == canonical) {
        return match frame.bindings.get(slot) {
          Some(bound) => bound.clone(),
          None        => token.clone()
        };
      }
      if definition.local_labels.contains(&canonical) {
        let unique = format!("@{}[{}]_{}", definition.name, frame.ordinal, canonical);
        return token.with_text(DefaultAtom::from(unique.as_str()));
      }
    }
    token.clone()
  }

  /// Flushes the pending line to the resolved stream and records its symbol stack.
  fn flush(&mut self, break_token: &Token) {
    let own = self.pending[0].position();
    let mut stack: Vec<SourcePosition> = self.frames.iter().map(|f| f.call_site).collect();
    stack.push(own);
    self.symbol_stacks.push(stack);
    self.resolved.append(&mut self.pending);
    self.resolved.push(break_token.clone());
  }

  /**
    Decides what the accumulated line is: a primitive instruction flushes through; a
    call to a recorded macro expands in place by re-walking the body range with this
    resolver; an unknown word is an `UndefinedSymbol` that passes through anyway so the
    later passes can keep walking.
  */
  fn finish_line(&mut self, break_token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if self.pending.is_empty() {
      // Keep label-only lines terminated without ever doubling a break.
      if let Some(last) = self.resolved.last() {
        if last.kind != TokenKind::InstructionBreak {
          self.resolved.push(break_token.clone());
        }
      }
      return Ok(());
    }

    let first = self.pending[0].clone();
    let keyword = match Keyword::lookup(&first.text, self.options) {
      Ok(keyword) => keyword,
      Err(kind) => {
        errors.push(CompilerError::error_at(kind, first.line, first.column, first.length))?;
        Keyword::lookup(&first.text, DialectOptions::PERMISSIVE).unwrap_or(None)
      }
    };
    if keyword.is_some() {
      self.flush(break_token);
      return Ok(());
    }

    let canonical = self.options.canonical(&first.text);
    let id = match self.table.id_of(&canonical) {
      Some(id) => id,
      None => {
        errors.push(CompilerError::error_at(
          ErrorKind::UndefinedSymbol(first.text.clone()),
          first.line, first.column, first.length
        ))?;
        self.flush(break_token);
        return Ok(());
      }
    };

    if self.frames.is_empty() && self.options.contains(STRICT_MACRO_DEFINITION_ORDER) {
      let definition = self.table.get(id).name_token.position();
      let call = first.position();
      if (call.line, call.column) < (definition.line, definition.column) {
        errors.push(CompilerError::error_at(
          ErrorKind::DialectSyntax {
            feature : format!("call to macro `{}` before its definition", first.text),
            flag    : flag_name(STRICT_MACRO_DEFINITION_ORDER)
          },
          first.line, first.column, first.length
        ))?;
      }
    }

    // A cycle the validator has already reported; expanding would not terminate.
    if self.frames.iter().any(|f| f.macro_id == id) {
      self.pending.clear();
      return Ok(());
    }

    let bindings: Vec<Token> = self.pending[1..]
      .iter()
      .filter(|t| t.kind != TokenKind::SingleChar(','))
      .cloned()
      .collect();
    let expected = self.table.get(id).parameters.len();
    if bindings.len() != expected {
      errors.push(CompilerError::error_at(
        ErrorKind::ParameterCount {
          opcode   : first.text.clone(),
          expected,
          found    : bindings.len()
        },
        first.line, first.column, first.length
      ))?;
      self.pending.clear();
      return Ok(());
    }

    self.pending.clear();
    let ordinal = self.expansion_counts[id];
    self.frames.push(ExpansionFrame {
      macro_id  : id,
      call_site : first.position(),
      bindings,
      ordinal
    });
    let tokens = self.tokens;
    let body = self.table.get(id).body.clone();
    let options = self.options;
    walk(tokens, body, DriverState::MacroInstructionStart, self, options, errors)?;
    self.frames.pop();
    self.expansion_counts[id] += 1;
    Ok(())
  }
}

impl<'a> TokenHandler for MacroResolver<'a> {

  fn on_instruction_start(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.pending.push(token.clone());
    Ok(())
  }

  fn on_instruction_args(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.pending.push(token.clone());
    Ok(())
  }

  fn on_label_declaration(&mut self, _index: usize, name: &Token, colon: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.resolved.push(name.clone());
    self.resolved.push(colon.clone());
    Ok(())
  }

  fn on_instruction_break(&mut self, _index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    self.finish_line(token, errors)
  }

  // The macro-body callbacks fire both while the outer walk crosses a definition (no
  // active frames; definitions emit nothing) and while a body is being expanded.

  fn on_macro_instruction_start(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if !self.frames.is_empty() {
      let substituted = self.substitute(token);
      self.pending.push(substituted);
    }
    Ok(())
  }

  fn on_macro_instruction_args(&mut self, _index: usize, token: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if !self.frames.is_empty() {
      let substituted = self.substitute(token);
      self.pending.push(substituted);
    }
    Ok(())
  }

  fn on_macro_label_declaration(&mut self, _index: usize, name: &Token, colon: &Token, _errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if !self.frames.is_empty() {
      let substituted = self.substitute(name);
      self.resolved.push(substituted);
      self.resolved.push(colon.clone());
    }
    Ok(())
  }

  fn on_macro_instruction_break(&mut self, _index: usize, token: &Token, errors: &mut ErrorList)
    -> Result<(), CompilerError>
  {
    if !self.frames.is_empty() {
      return self.finish_line(token, errors);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builder::driver;
  use crate::builder::macros::{validate_macros, MacroReader};
  use crate::token::tokenize;

  fn resolve(source: &str, options: DialectOptions) -> (Vec<Token>, Vec<Vec<SourcePosition>>, ErrorList) {
    let mut errors = ErrorList::new(false);
    let tokens = tokenize(source, &mut errors).unwrap();
    let mut reader = MacroReader::new(options);
    driver::walk(&tokens, 0..tokens.len(), DriverState::InstructionStart,
                 &mut reader, options, &mut errors).unwrap();
    let table = reader.into_table();
    validate_macros(&table, options, &mut errors).unwrap();
    let mut resolver = MacroResolver::new(&tokens, &table, options);
    driver::walk(&tokens, 0..tokens.len(), DriverState::InstructionStart,
                 &mut resolver, options, &mut errors).unwrap();
    let (resolved, stacks) = resolver.into_output();
    (resolved, stacks, errors)
  }

  fn words(resolved: &[Token]) -> Vec<String> {
    resolved.iter()
            .filter(|t| t.kind != TokenKind::InstructionBreak)
            .map(|t| t.text.to_string())
            .collect()
  }

  #[test]
  fn primitive_lines_pass_through() {
    let (resolved, stacks, errors) = resolve("addi r1, r1, 5\nsysterm", DialectOptions::PERMISSIVE);
    assert!(errors.is_empty());
    assert_eq!(words(&resolved), vec!["addi", "r1", ",", "r1", ",", "5", "systerm"]);
    assert_eq!(stacks.len(), 2);
    assert_eq!(stacks[1], vec![SourcePosition { line: 2, column: 1 }]);
  }

  #[test]
  fn parameters_substitute_at_the_call_site() {
    let (resolved, _, errors) = resolve(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\ninc r7",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert_eq!(words(&resolved), vec!["addi", "r7", ",", "r7", ",", "1"]);
  }

  #[test]
  fn double_expansion_emits_two_lines() {
    let (resolved, stacks, errors) = resolve(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\ninc r1\ninc r1",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert_eq!(
      words(&resolved),
      vec!["addi", "r1", ",", "r1", ",", "1", "addi", "r1", ",", "r1", ",", "1"]
    );
    // Each expanded line carries its call site above its own body position.
    assert_eq!(stacks.len(), 2);
    assert_eq!(stacks[0].len(), 2);
    assert_eq!(stacks[0][0], SourcePosition { line: 4, column: 1 });
    assert_eq!(stacks[1][0], SourcePosition { line: 5, column: 1 });
  }

  #[test]
  fn local_labels_get_distinct_names_per_expansion() {
    let (resolved, _, errors) = resolve(
      "macro spin reg1:\ntop: subi reg1, reg1, 1\nbgt reg1, zero, top\nmend\nspin r1\nspin r2",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    let labels: Vec<String> = words(&resolved)
      .into_iter()
      .filter(|w| w.starts_with('@'))
      .collect();
    // Declaration + reference per expansion, consistent within and distinct across.
    assert_eq!(labels, vec![
      "@spin[0]_top", "@spin[0]_top",
      "@spin[1]_top", "@spin[1]_top"
    ]);
  }

  #[test]
  fn nested_calls_stack_their_frames() {
    let (resolved, stacks, errors) = resolve(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\nmacro double reg1:\ninc reg1\ninc reg1\nmend\ndouble r3",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert_eq!(
      words(&resolved),
      vec!["addi", "r3", ",", "r3", ",", "1", "addi", "r3", ",", "r3", ",", "1"]
    );
    // call site of `double`, call site of `inc` inside it, then the body line.
    assert_eq!(stacks[0].len(), 3);
  }

  #[test]
  fn unknown_instruction_passes_through_with_an_error() {
    let (resolved, _, errors) = resolve("mystery r1, r2\nsysterm", DialectOptions::PERMISSIVE);
    assert!(errors.iter().any(|e| matches!(e.kind, ErrorKind::UndefinedSymbol(_))));
    // Pass-through recovery keeps the line so later passes can continue.
    assert_eq!(words(&resolved)[0], "mystery");
    assert!(words(&resolved).contains(&"systerm".to_string()));
  }

  #[test]
  fn wrong_call_arity_is_reported() {
    let (_, _, errors) = resolve(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\ninc r1, r2",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.iter().any(|e| matches!(e.kind, ErrorKind::ParameterCount { .. })));
  }

  #[test]
  fn strict_order_rejects_call_before_definition() {
    let options = DialectOptions::PERMISSIVE.with(STRICT_MACRO_DEFINITION_ORDER);
    let (_, _, errors) = resolve(
      "inc r1\nmacro inc reg1\naddi reg1, reg1, 1\nmend",
      options
    );
    assert!(errors.iter().any(|e| matches!(e.kind, ErrorKind::DialectSyntax { .. })));
  }

  #[test]
  fn labels_on_call_lines_precede_the_expansion() {
    let (resolved, _, errors) = resolve(
      "macro inc reg1:\naddi reg1, reg1, 1\nmend\nstart: inc r1",
      DialectOptions::PERMISSIVE
    );
    assert!(errors.is_empty());
    assert_eq!(words(&resolved), vec!["start", ":", "addi", "r1", ",", "r1", ",", "1"]);
  }
}
