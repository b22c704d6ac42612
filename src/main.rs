use std::process;

use clap::Parser;
use log::LevelFilter;

use minicc::cli::{Cli, run};

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(err) = run(&cli) {
    eprintln!("{err}");
    process::exit(1);
  }
}

/// `RUST_LOG` takes precedence over the `--verbose` default.
fn init_logging(verbose: bool) {
  let level = if verbose {
    LevelFilter::Debug
  } else {
    LevelFilter::Warn
  };
  env_logger::Builder::new()
    .filter_level(level)
    .parse_default_env()
    .init();
}
