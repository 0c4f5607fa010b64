/*!
  A small command-line driver: assemble one source file and run it, feeding `sysin` from
  standard input and writing the program's output to standard output.

  ```text
  ourmips [--legacy | --modern] [--registers] <source file>
  ```
*/

use std::env;
use std::fs;
use std::io::{self, BufRead};
use std::process;

use ourmips::{build, DialectOptions, Emulator};

const USAGE: &str = "usage: ourmips [--legacy | --modern] [--registers] <source file>";

fn main() {
  if let Err(message) = run() {
    eprintln!("{}", message);
    process::exit(1);
  }
}

fn run() -> Result<(), String> {
  let mut options = DialectOptions::PERMISSIVE;
  let mut show_registers = false;
  let mut path: Option<String> = None;

  for argument in env::args().skip(1) {
    match argument.as_str() {
      "--legacy"    => options = DialectOptions::STRICT_LEGACY,
      "--modern"    => options = DialectOptions::STRICT_MODERN,
      "--registers" => show_registers = true,
      _             => path = Some(argument)
    }
  }
  let path = path.ok_or_else(|| USAGE.to_string())?;
  let source = fs::read_to_string(&path)
    .map_err(|error| format!("cannot read {}: {}", path, error))?;

  let built = build(&source, options, false).map_err(|error| error.to_string())?;
  if built.errors.has_errors() {
    for error in built.errors.iter() {
      eprintln!("{}: {}", path, error);
    }
    return Err(format!(
      "{} error(s), {} warning(s)",
      built.errors.error_count(),
      built.errors.warning_count()
    ));
  }

  let mut emulator = Emulator::new(built.program);
  let stdin = io::stdin();
  let mut lines = stdin.lock().lines();
  loop {
    emulator.run().map_err(|exception| exception.to_string())?;
    if !emulator.flags().expecting_input {
      break;
    }
    match lines.next() {
      Some(line) => {
        let line = line.map_err(|error| error.to_string())?;
        emulator.queue_input_line(&line);
      }
      // Input exhausted while the program still wants more.
      None => break
    }
  }

  print!("{}", emulator.output());
  for warning in emulator.warnings() {
    eprintln!("{}: warning: {}", path, warning);
  }
  if show_registers {
    emulator.register_table().printstd();
  }
  Ok(())
}
