//! The fused parser, scope resolver and code generator.
//!
//! One recursive-descent pass: every grammar production both advances the
//! token stream and appends IBM 701 instructions to the output streams.
//! There is no AST and no intermediate representation – the grammar is
//! narrow enough that each production knows exactly which instruction
//! sequence it stands for.
//!
//! The target machine has a single accumulator (AC) and a
//! multiplier-quotient register (MQ), no index registers and no hardware
//! call stack. Procedure activation therefore goes through a runtime frame
//! pointer table (`.levels`, one entry per lexical level, supplied by
//! `stack.a`): a slot at lexical level L, position P lives at
//! `levels[L] + 2*P` (two half-words per slot), and every prologue saves
//! the previous occupant of its level entry so recursion restores it on
//! return.

use std::mem;

use crate::emit::Emitter;
use crate::error::{CompileError, CompileResult};
use crate::labels::Labels;
use crate::symtab::{Declaration, SymKind, SymbolTable};
use crate::tokenizer::{Scanner, Symbol, Token};

/// One compilation session. All compiler state lives here; two sessions
/// cannot interfere.
pub struct Compiler<'a> {
  scanner: Scanner<'a>,
  /// Single-token lookahead.
  tok: Token,
  /// Text of the most recently accepted identifier or number.
  accepted: String,
  symtab: SymbolTable,
  labels: Labels,
  emit: Emitter,
  /// Lexical level of the block being compiled; -1 outside any block.
  level: i32,
  /// Per-program block-instance counter, used for external naming.
  blocks: u32,
}

impl<'a> Compiler<'a> {
  pub fn new(source: &'a str) -> Compiler<'a> {
    Compiler {
      scanner: Scanner::new(source),
      tok: Token {
        sym: Symbol::Eof,
        text: String::new(),
        line: 1,
      },
      accepted: String::new(),
      symtab: SymbolTable::new(),
      labels: Labels::new(),
      emit: Emitter::new(),
      level: -1,
      blocks: 0,
    }
  }

  /// Compile the whole program and return the assembly text, or the first
  /// error. Nothing is returned on failure; output is all-or-nothing.
  pub fn run(mut self) -> CompileResult<String> {
    self.code(
      "# self-load.a, stack.a, print.a, and print-number.a are supplied with the IBM 701 emulator",
      "",
    );
    self.code("# See basepath.com/701", "");
    self.code("", "incl self-load.a");
    self.program()?;
    Ok(self.emit.finish())
  }

  // ---- token stream primitives ----

  fn advance(&mut self) -> CompileResult<()> {
    self.tok = self.scanner.advance()?;
    Ok(())
  }

  /// Consume the current token if it is of the given kind, stashing its
  /// text in `self.accepted`.
  fn accept(&mut self, sym: Symbol) -> CompileResult<bool> {
    if self.tok.sym == sym {
      self.accepted = mem::take(&mut self.tok.text);
      self.advance()?;
      return Ok(true);
    }
    Ok(false)
  }

  fn expect(&mut self, sym: Symbol) -> CompileResult<()> {
    if self.accept(sym)? {
      return Ok(());
    }
    Err(CompileError::Expected {
      line: self.tok.line,
      expected: sym.to_string(),
      found: self.tok.describe(),
    })
  }

  // ---- symbol table wrappers ----

  /// Declare `name` in the open scope and return its external name.
  fn declare(&mut self, kind: SymKind, name: &str, slot: i32) -> CompileResult<String> {
    let line = self.tok.line;
    match self.symtab.declare(kind, name, self.level, slot, self.blocks) {
      Some(decl) => Ok(decl.external_name()),
      None => Err(CompileError::TooManySymbols { line }),
    }
  }

  fn resolve(&self, name: &str, kinds: &[SymKind]) -> CompileResult<Declaration> {
    self
      .symtab
      .resolve(name, kinds)
      .cloned()
      .ok_or_else(|| CompileError::Undeclared {
        line: self.tok.line,
        name: name.to_string(),
      })
  }

  // ---- emission helpers ----

  fn code(&mut self, label: &str, text: &str) {
    self.emit.code(label, text, self.tok.line);
  }

  fn data(&mut self, label: &str, text: &str) {
    self.emit.data(label, text, self.tok.line);
  }

  /// Push `operand` (an assembler operand such as `=0` or `=5`) onto the
  /// runtime stack via the `.push` helper.
  fn push_operand(&mut self, operand: &str, comment: &str) {
    self.code("", &format!("-loadmq {operand}"));
    self.code("", "radd *");
    self.code("", &format!("tr .push{comment}"));
  }

  /// Leave the address of `levels[level]` in the address field of AC. The
  /// next instruction must be a `storea`.
  fn frame_ptr_addr(&mut self, level: i32) {
    self.code("", "-radd =@.levels");
    self.code("", &format!("-add ={}", level * 2));
    self.code("", "aleft 18");
  }

  /// Leave the active frame base address for `level` in AC.
  fn frame_ptr(&mut self, level: i32) {
    self.frame_ptr_addr(level);
    self.code("", "storea *+1");
    self.code("", "-radd 0");
  }

  /// Leave the address of slot `slot` of the active frame at `level` in
  /// the address field of AC. Slot -1 is the saved-frame-pointer admin
  /// word below the autos.
  fn stack_addr(&mut self, level: i32, slot: i32) {
    self.frame_ptr(level);
    self.code("", &format!("-add ={}", slot * 2));
    self.code("", "aleft 18");
  }

  // ---- productions ----

  /// program = block "." — plus the fixed entry and tail framing.
  fn program(&mut self) -> CompileResult<()> {
    // Point levels[0] at the base of the runtime stack.
    self.code("", "-radd =@.levels");
    self.code("", "aleft 18");
    self.code("", "storea *+3");
    self.code("", "-radd .stx");
    self.code("", "-add =2");
    self.code("", "-store 0");
    self.advance()?;
    self.block()?;
    self.expect(Symbol::Period)?;
    self.code("", "stop 1");
    for i in 1..=self.labels.max_temps() {
      self.code(&format!("$temp{i}"), " word");
    }
    self.code("", "incl print.a");
    self.code("", "incl print-number.a");
    self.code("", "incl stack.a");
    Ok(())
  }

  /// block = [consts] [vars] {procedures} statement.
  ///
  /// Returns the number of auto slots (consts + vars) declared, which the
  /// enclosing procedure epilogue needs to size its stack deallocation.
  fn block(&mut self) -> CompileResult<i32> {
    self.level += 1;
    let start_label = self.labels.new_label();
    self.blocks += 1;
    let scope = self.symtab.mark();
    let mut slots = 0;
    if self.accept(Symbol::Const)? {
      loop {
        self.expect(Symbol::Ident)?;
        let name = self.accepted.clone();
        self.expect(Symbol::Eql)?;
        self.expect(Symbol::Number)?;
        self.declare(SymKind::Const, &name, slots)?;
        // Constants occupy frame slots like variables so that addressing
        // stays uniform across shadowed and recursive activations.
        let value = format!("={}", self.accepted);
        self.push_operand(&value, " # push constant");
        slots += 1;
        if !self.accept(Symbol::Comma)? {
          break;
        }
      }
      self.expect(Symbol::Semicolon)?;
    }
    if self.accept(Symbol::Var)? {
      loop {
        self.expect(Symbol::Ident)?;
        let name = self.accepted.clone();
        let ext = self.declare(SymKind::Var, &name, slots)?;
        self.data(&ext, "word");
        self.push_operand("=0", " # push var");
        slots += 1;
        if !self.accept(Symbol::Comma)? {
          break;
        }
      }
      self.expect(Symbol::Semicolon)?;
    }
    // Go around the procedure bodies that follow.
    self.code("", &format!("tr {start_label}"));
    while self.accept(Symbol::Procedure)? {
      self.expect(Symbol::Ident)?;
      let name = self.accepted.clone();
      // Declared at the enclosing level, before the body is compiled, so
      // siblings, the enclosing block and the procedure itself can call it.
      let entry = self.declare(SymKind::Proc, &name, 0)?;
      self.prologue(&entry);
      self.expect(Symbol::Semicolon)?;
      let autos = self.block()?;
      self.expect(Symbol::Semicolon)?;
      self.epilogue(autos);
    }
    self.code(&start_label, "noop");
    self.statement()?;
    self.symtab.rewind(scope);
    self.level -= 1;
    Ok(slots)
  }

  /// Procedure entry sequence, executed on every call. The call site left
  /// its own address in AC.
  fn prologue(&mut self, entry: &str) {
    self.code(entry, "add =2");
    self.code("", "aleft 6"); // keep the 12 address bits only
    self.code("", "aright 6");
    self.code("", "lright 53"); // into mq (53 = 35 + 18)
    self.code("", "radd *");
    self.code("", "tr .push # push rtn addr");
    // Save whatever frame pointer currently occupies the callee's level,
    // so returning restores it; this is what makes recursion work.
    self.frame_ptr(self.level + 1);
    self.code("", "lright 35");
    self.code("", "radd *");
    self.code("", "tr .push # push prev frame ptr");
    self.frame_ptr_addr(self.level + 1);
    self.code("", "storea *+3");
    self.code("", "-radd .stx");
    self.code("", "-add =2");
    self.code("", "-store 0 # set new frame ptr to autos");
  }

  /// Procedure return sequence: restore the caller's frame pointer at this
  /// level and pop the whole activation (admin words + autos) in bulk.
  fn epilogue(&mut self, autos: i32) {
    self.code("", "noop # restore frame ptr");
    self.stack_addr(self.level + 1, -1);
    self.code("", "storea *+1");
    self.code("", "-radd 0"); // prev frame ptr in ac
    let temp = self.labels.new_temp();
    self.code("", &format!("-store {temp}"));
    self.frame_ptr_addr(self.level + 1);
    self.code("", "storea *+2");
    self.code("", &format!("-radd {temp}"));
    self.code("", "-store 0"); // back into the levels array
    self.code("", &format!("-radd ={}", autos * 2 + 4)); // half-words to pop
    self.code("", "tr .trpop");
    self.labels.release_temp();
  }

  /// statement = assignment | call | print | begin..end | if | while.
  /// Temps never live across statement boundaries.
  fn statement(&mut self) -> CompileResult<()> {
    self.labels.reset_temps();
    if self.accept(Symbol::Ident)? {
      let name = self.accepted.clone();
      let temp = self.labels.new_temp();
      let target = self.resolve(&name, &[SymKind::Var])?;
      self.expect(Symbol::Becomes)?;
      self.expression()?;
      self.code("", &format!("-store {temp}"));
      self.stack_addr(target.level, target.slot);
      self.code("", "storea *+2");
      self.code("", &format!("-radd {temp}")); // value of rhs in ac
      self.code("", "-store 0"); // store it onto the stack
      self.labels.release_temp();
    } else if self.accept(Symbol::Call)? {
      self.expect(Symbol::Ident)?;
      let name = self.accepted.clone();
      let proc = self.resolve(&name, &[SymKind::Proc])?;
      self.code("", "radd *");
      self.code("", &format!("tr {}", proc.external_name()));
    } else if self.accept(Symbol::Print)? {
      self.expression()?;
      self.code("", "lright 35");
      self.code("", "radd *");
      self.code("", "tr .print-number");
    } else if self.accept(Symbol::Begin)? {
      loop {
        self.statement()?;
        if !self.accept(Symbol::Semicolon)? {
          break;
        }
      }
      self.expect(Symbol::End)?;
    } else if self.accept(Symbol::If)? {
      let false_label = self.condition()?;
      self.expect(Symbol::Then)?;
      self.statement()?;
      self.code(&false_label, "noop");
    } else if self.accept(Symbol::While)? {
      let loop_label = self.labels.new_label();
      self.code(&loop_label, "noop");
      let false_label = self.condition()?;
      self.expect(Symbol::Do)?;
      self.statement()?;
      self.code("", &format!("tr {loop_label}"));
      self.code(&false_label, "noop");
    } else {
      return Err(CompileError::StatementSyntax {
        line: self.tok.line,
        found: self.tok.describe(),
      });
    }
    Ok(())
  }

  /// condition = "odd" expression | expression relop expression.
  ///
  /// Returns the label control transfers to when the condition is false;
  /// the caller places a `noop` there to mark the join point.
  fn condition(&mut self) -> CompileResult<String> {
    let temp = self.labels.new_temp();
    let false_label = self.labels.new_label();
    let label = self.labels.new_label();
    if self.accept(Symbol::Odd)? {
      self.expression()?;
      self.code("", "aleft 34");
      self.code("", "trov *+1"); // discharge overflow set by the high bits
      self.code("", "aleft 1");
      self.code("", &format!("trov {label}"));
      self.code("", &format!("tr {false_label}"));
      self.code(&label, "noop");
    } else {
      self.expression()?;
      let op = self.tok.sym;
      if !matches!(
        op,
        Symbol::Eql | Symbol::Neq | Symbol::Lss | Symbol::Leq | Symbol::Gtr | Symbol::Geq
      ) {
        return Err(CompileError::InvalidConditionOperator {
          line: self.tok.line,
          found: self.tok.describe(),
        });
      }
      self.code("", &format!("-store {temp}"));
      self.advance()?;
      self.expression()?;
      self.code("", &format!("-sub {temp}")); // ac = right - left
      // Fixed branch sequence per operator over the zero/plus flags of the
      // difference. These sequences are the contract with the emulator.
      match op {
        Symbol::Eql => {
          self.code("", &format!("trzero {label}"));
          self.code("", &format!("tr {false_label}"));
          self.code(&label, "noop");
        }
        Symbol::Neq => {
          self.code("", &format!("trzero {false_label}"));
        }
        Symbol::Lss => {
          self.code("", &format!("trzero {false_label}"));
          self.code("", &format!("trplus {label}"));
          self.code("", &format!("tr {false_label}"));
          self.code(&label, "noop");
        }
        Symbol::Leq => {
          self.code("", &format!("trzero {label}"));
          self.code("", &format!("trplus {label}"));
          self.code("", &format!("tr {false_label}"));
          self.code(&label, "noop");
        }
        Symbol::Gtr => {
          self.code("", &format!("trzero {false_label}"));
          self.code("", &format!("trplus {false_label}"));
        }
        Symbol::Geq => {
          self.code("", &format!("trzero {label}"));
          self.code("", &format!("trplus {false_label}"));
          self.code(&label, "noop");
        }
        _ => unreachable!("operator validated above"),
      }
    }
    self.labels.release_temp();
    Ok(false_label)
  }

  /// expression = ["+"|"-"] term { ("+"|"-") term }.
  fn expression(&mut self) -> CompileResult<()> {
    let temp = self.labels.new_temp();
    let negate = if self.tok.sym == Symbol::Plus || self.tok.sym == Symbol::Minus {
      let sign = self.tok.sym;
      self.advance()?;
      sign == Symbol::Minus
    } else {
      false
    };
    self.term()?;
    if negate {
      // Unary minus: reverse-subtract the value from itself spilled.
      self.code("", &format!("-store {temp}"));
      self.code("", &format!("-rsub {temp}"));
    }
    while self.tok.sym == Symbol::Plus || self.tok.sym == Symbol::Minus {
      let op = self.tok.sym;
      self.code("", &format!("-store {temp}"));
      self.advance()?;
      self.term()?;
      if op == Symbol::Plus {
        self.code("", &format!("-add {temp}"));
      } else {
        let temp2 = self.labels.new_temp();
        self.code("", &format!("-store {temp2}"));
        self.code("", &format!("-radd {temp}"));
        self.code("", &format!("-sub {temp2}"));
        self.labels.release_temp();
      }
    }
    self.labels.release_temp();
    Ok(())
  }

  /// term = factor { ("*"|"/") factor }.
  fn term(&mut self) -> CompileResult<()> {
    self.factor()?;
    while self.tok.sym == Symbol::Times || self.tok.sym == Symbol::Slash {
      let op = self.tok.sym;
      let temp = self.labels.new_temp();
      self.code("", &format!("-store {temp}"));
      self.advance()?;
      self.factor()?;
      if op == Symbol::Times {
        // Double-width product: align the least significant half into AC.
        self.code("", "lright 35");
        self.code("", &format!("-mpy {temp}"));
        self.code("", "lleft 35");
      } else {
        let temp2 = self.labels.new_temp();
        self.code("", &format!("-store {temp2}"));
        self.code("", &format!("-radd {temp}"));
        self.code("", "lright 35");
        self.code("", &format!("-div {temp2}"));
        self.code("", "lleft 35");
        self.labels.release_temp();
      }
      self.labels.release_temp();
    }
    Ok(())
  }

  /// factor = ident | number | "(" expression ")".
  fn factor(&mut self) -> CompileResult<()> {
    if self.accept(Symbol::Ident)? {
      let name = self.accepted.clone();
      let decl = self.resolve(&name, &[SymKind::Var, SymKind::Const])?;
      self.stack_addr(decl.level, decl.slot);
      self.code("", "storea *+1");
      self.code("", "-radd 0"); // value of the var/const in ac
    } else if self.accept(Symbol::Number)? {
      let value = self.accepted.clone();
      self.code("", &format!("-radd ={value}"));
    } else if self.accept(Symbol::Lparen)? {
      self.expression()?;
      self.expect(Symbol::Rparen)?;
    } else {
      return Err(CompileError::FactorSyntax {
        line: self.tok.line,
        found: self.tok.describe(),
      });
    }
    Ok(())
  }
}
