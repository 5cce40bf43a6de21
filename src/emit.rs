//! Output assembly as two independently built line streams.
//!
//! Instructions are appended in program order as parsing proceeds; storage
//! declarations go to a deferred data stream. The final text is the
//! instruction stream followed by the data stream, which reproduces the
//! layout the downstream assembler expects without any file-rewind tricks.
//!
//! Every line has the fixed shape `label <TAB> text # @<source-line>`.

#[derive(Debug, Default)]
pub struct Emitter {
  code: Vec<String>,
  data: Vec<String>,
}

impl Emitter {
  pub fn new() -> Emitter {
    Emitter::default()
  }

  /// Append one line to the instruction stream.
  pub fn code(&mut self, label: &str, text: &str, line: u32) {
    self.code.push(format!("{label}\t{text} # @{line}"));
  }

  /// Append one line to the deferred data stream.
  pub fn data(&mut self, label: &str, text: &str, line: u32) {
    self.data.push(format!("{label}\t{text} # @{line}"));
  }

  /// Concatenate the two streams: instructions first, then data.
  pub fn finish(self) -> String {
    let mut out = String::new();
    for line in self.code.iter().chain(self.data.iter()) {
      out.push_str(line);
      out.push('\n');
    }
    out
  }

  /// Instruction lines emitted so far. Used by tests to inspect sequences.
  pub fn code_lines(&self) -> &[String] {
    &self.code
  }

  /// Data lines emitted so far.
  pub fn data_lines(&self) -> &[String] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lines_have_the_fixed_shape() {
    let mut emitter = Emitter::new();
    emitter.code("$1", "noop", 3);
    emitter.code("", "tr $1", 4);
    assert_eq!(emitter.code_lines(), ["$1\tnoop # @3", "\ttr $1 # @4"]);
  }

  #[test]
  fn finish_appends_data_after_code() {
    let mut emitter = Emitter::new();
    emitter.code("", "stop 1", 2);
    emitter.data("x.1", "word", 1);
    assert_eq!(emitter.finish(), "\tstop 1 # @2\nx.1\tword # @1\n");
  }
}
