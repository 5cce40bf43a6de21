//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis, one symbol at a time.
//! - `symtab` holds declarations and implements the LIFO scope discipline.
//! - `labels` allocates control-flow labels and statement-local temps.
//! - `emit` collects the instruction and deferred-data streams.
//! - `codegen` is the fused parser/resolver/generator driving all of them.
//! - `error` centralises the error type shared by the other modules.

pub mod error;
pub mod labels;
pub mod symtab;
pub mod tokenizer;

mod codegen;
mod emit;

pub use error::{CompileError, CompileResult};

/// Compile a PL/0 source string into IBM 701 assembly.
///
/// All-or-nothing: on error nothing of the partial output survives, and the
/// error carries the 1-based line of the first (and only) failure.
pub fn compile(source: &str) -> CompileResult<String> {
  codegen::Compiler::new(source).run()
}

#[cfg(test)]
mod tests {
  use assert_matches::assert_matches;

  use super::*;

  #[test]
  fn the_documented_example_compiles() {
    let asm = compile("var x; begin x := 1; print x end.").expect("compile failed");
    assert!(asm.contains("tr .print-number"));
    assert!(asm.contains("\tstop 1 # @1"));
  }

  #[test]
  fn the_documented_example_without_period_fails() {
    let err = compile("var x; begin x := 1 end").expect_err("expected an error");
    assert_matches!(
      &err,
      CompileError::Expected { expected, .. } if expected == "period"
    );
    assert_eq!(err.line(), 1);
    assert_eq!(
      err.to_string(),
      "@1: unexpected symbol; expected: period [got: end of input]"
    );
  }
}
