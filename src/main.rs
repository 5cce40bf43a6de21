//! Command-line driver: compile one source file to `out.a` beside it.

use std::path::Path;
use std::{env, fs, process};

fn main() {
  let args: Vec<String> = env::args().collect();
  if args.len() != 2 {
    let program = args.first().map(String::as_str).unwrap_or("rpl0c");
    eprintln!("usage: {program} <source-file>");
    process::exit(1);
  }

  let path = Path::new(&args[1]);
  let source = fs::read_to_string(path).unwrap_or_else(|err| {
    eprintln!("error: can't open {}: {err}", path.display());
    process::exit(1);
  });

  let asm = rpl0c::compile(&source).unwrap_or_else(|err| {
    eprintln!("error: {err}");
    process::exit(1);
  });

  let out_path = path.with_file_name("out.a");
  fs::write(&out_path, asm).unwrap_or_else(|err| {
    eprintln!("error: can't write {}: {err}", out_path.display());
    process::exit(1);
  });
  println!("Compiled OK");
}
