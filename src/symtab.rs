//! Symbol table: an append-only sequence of declarations with LIFO scopes.
//!
//! Scopes are not a separate structure – a scope is just the table length at
//! entry, and closing rewinds to that mark. Lookup scans most-recent-first so
//! inner declarations shadow outer ones for free.

use std::fmt;

/// Hard cap on the number of live declarations. Exceeding it is reported as
/// a compile error, never truncated.
pub const MAX_SYMBOLS: usize = 200;

/// What a name was declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
  Block,
  Var,
  Const,
  Proc,
}

/// One declaration. Immutable once appended.
///
/// `level` is the lexical nesting depth of the declaring block (0 =
/// outermost); `slot` is the zero-based offset of the name within that
/// block's activation record (0 and unused for procedures). `block_id` is
/// the per-program instance number of the declaring block, which makes
/// [`Declaration::external_name`] unique even when the same surface name is
/// declared in several blocks.
#[derive(Debug, Clone)]
pub struct Declaration {
  pub block_id: u32,
  pub kind: SymKind,
  pub name: String,
  pub level: i32,
  pub slot: i32,
}

impl Declaration {
  /// Deterministic assembly-level symbol for this declaration.
  pub fn external_name(&self) -> String {
    format!("{}.{}", self.name, self.block_id)
  }
}

impl fmt::Display for Declaration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.external_name())
  }
}

/// Saved table position, returned by [`SymbolTable::mark`].
pub type ScopeMark = usize;

#[derive(Debug, Default)]
pub struct SymbolTable {
  decls: Vec<Declaration>,
}

impl SymbolTable {
  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  /// Append a declaration. Returns `None` when the table is full; the
  /// caller turns that into a capacity error with a source line attached.
  pub fn declare(
    &mut self,
    kind: SymKind,
    name: &str,
    level: i32,
    slot: i32,
    block_id: u32,
  ) -> Option<&Declaration> {
    if self.decls.len() >= MAX_SYMBOLS {
      return None;
    }
    self.decls.push(Declaration {
      block_id,
      kind,
      name: name.to_string(),
      level,
      slot,
    });
    self.decls.last()
  }

  /// Find the most recent declaration of `name` whose kind is in `kinds`.
  /// Later declarations win, which is exactly the shadowing rule.
  pub fn resolve(&self, name: &str, kinds: &[SymKind]) -> Option<&Declaration> {
    self
      .decls
      .iter()
      .rev()
      .find(|d| d.name == name && kinds.contains(&d.kind))
  }

  /// Open a scope: remember the current table length.
  pub fn mark(&self) -> ScopeMark {
    self.decls.len()
  }

  /// Close the scope opened at `mark`, discarding everything declared since.
  pub fn rewind(&mut self, mark: ScopeMark) {
    self.decls.truncate(mark);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table_with(names: &[(&str, SymKind, u32)]) -> SymbolTable {
    let mut table = SymbolTable::new();
    for (i, (name, kind, block)) in names.iter().enumerate() {
      table
        .declare(*kind, name, 0, i as i32, *block)
        .expect("declare failed");
    }
    table
  }

  #[test]
  fn later_declarations_shadow_earlier_ones() {
    let mut table = SymbolTable::new();
    table.declare(SymKind::Var, "x", 0, 0, 1).unwrap();
    table.declare(SymKind::Var, "x", 1, 0, 2).unwrap();
    let found = table.resolve("x", &[SymKind::Var]).unwrap();
    assert_eq!(found.block_id, 2);
    assert_eq!(found.level, 1);
  }

  #[test]
  fn rewind_restores_the_outer_declaration() {
    let mut table = SymbolTable::new();
    table.declare(SymKind::Var, "x", 0, 0, 1).unwrap();
    let mark = table.mark();
    table.declare(SymKind::Var, "x", 1, 0, 2).unwrap();
    assert_eq!(table.resolve("x", &[SymKind::Var]).unwrap().block_id, 2);
    table.rewind(mark);
    assert_eq!(table.resolve("x", &[SymKind::Var]).unwrap().block_id, 1);
  }

  #[test]
  fn resolve_filters_by_kind() {
    let table = table_with(&[("p", SymKind::Proc, 1), ("v", SymKind::Var, 1)]);
    assert!(table.resolve("p", &[SymKind::Var, SymKind::Const]).is_none());
    assert!(table.resolve("p", &[SymKind::Proc]).is_some());
    assert!(table.resolve("v", &[SymKind::Proc]).is_none());
    assert!(table.resolve("missing", &[SymKind::Var]).is_none());
  }

  #[test]
  fn a_var_shadowing_a_const_still_resolves_as_var() {
    let mut table = SymbolTable::new();
    table.declare(SymKind::Const, "n", 0, 0, 1).unwrap();
    table.declare(SymKind::Var, "n", 1, 0, 2).unwrap();
    // Most-recent-first with a kind filter: the inner var wins for
    // var-or-const lookups, the const is only reachable once the inner
    // scope is rewound.
    let found = table.resolve("n", &[SymKind::Var, SymKind::Const]).unwrap();
    assert_eq!(found.kind, SymKind::Var);
  }

  #[test]
  fn external_names_carry_the_block_instance() {
    let table = table_with(&[("sq", SymKind::Proc, 3)]);
    assert_eq!(table.resolve("sq", &[SymKind::Proc]).unwrap().external_name(), "sq.3");
  }

  #[test]
  fn table_capacity_is_enforced() {
    let mut table = SymbolTable::new();
    for i in 0..MAX_SYMBOLS {
      assert!(table.declare(SymKind::Var, &format!("v{i}"), 0, i as i32, 1).is_some());
    }
    assert!(table.declare(SymKind::Var, "overflow", 0, 0, 1).is_none());
  }
}
