//! Command-line driver.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser as CliParser;
use log::debug;
use snafu::ResultExt;

use crate::dump::{dump_program, dump_tokens};
use crate::error::{CompileResult, ReadSourceSnafu, WriteOutputSnafu};
use crate::parser::parse;
use crate::tokenizer::tokenize;

#[derive(CliParser, Debug)]
#[clap(name = "compile", about = "Compile a small C-like language to x86-64 assembly")]
pub struct Cli {
  /// Source file to compile
  #[clap(value_parser)]
  pub input: PathBuf,

  /// Write assembly to FILE instead of stdout
  #[clap(short, long, value_name = "FILE")]
  pub output: Option<PathBuf>,

  /// Print the token stream and stop
  #[clap(long)]
  pub dump_tokens: bool,

  /// Print the type-resolved syntax tree and stop
  #[clap(long)]
  pub dump_ast: bool,

  /// Enable debug logging
  #[clap(short, long)]
  pub verbose: bool,
}

/// Read the input, run the requested stage and write its output.
pub fn run(cli: &Cli) -> CompileResult<()> {
  let source = fs::read_to_string(&cli.input).context(ReadSourceSnafu { path: &cli.input })?;
  debug!("read {} bytes from {}", source.len(), cli.input.display());

  let text = if cli.dump_tokens {
    dump_tokens(&tokenize(&source)?, &source)
  } else if cli.dump_ast {
    dump_program(&parse(tokenize(&source)?, &source)?)
  } else {
    crate::generate_assembly(&source)?
  };

  emit(cli.output.as_deref(), &text)
}

fn emit(output: Option<&Path>, text: &str) -> CompileResult<()> {
  match output {
    Some(path) => {
      fs::write(path, text).context(WriteOutputSnafu { path })?;
      debug!("wrote {}", path.display());
      Ok(())
    }
    None => io::stdout()
      .lock()
      .write_all(text.as_bytes())
      .context(WriteOutputSnafu { path: "<stdout>" }),
  }
}
