//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` turns source text into a flat token vector.
//! - `parser` builds the type-resolved [`ast::Program`], registering every
//!   variable in its function's [`env::ScopeTree`] along the way.
//! - `env` assigns stack slots once parsing is done.
//! - `codegen` lowers each defined function into [`asm::OutputRecord`]s,
//!   which `asm` renders as AT&T assembly.

pub mod asm;
pub mod ast;
pub mod cli;
pub mod codegen;
pub mod dump;
pub mod env;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;

use std::fs;
use std::path::Path;

use snafu::ResultExt;

pub use error::{CompileError, CompileResult};

use codegen::FunctionCode;
use error::ReadSourceSnafu;

/// Run every stage up to code generation.
pub fn compile_program(source: &str) -> CompileResult<Vec<FunctionCode>> {
  let tokens = tokenizer::tokenize(source)?;
  let mut program = parser::parse(tokens, source)?;
  program.allocate_frames();
  codegen::generate(&mut program)
}

/// Compile a source string into AT&T assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let functions = compile_program(source)?;
  Ok(
    functions
      .iter()
      .map(|code| asm::render(&code.records))
      .collect(),
  )
}

pub fn compile_file(path: &Path) -> CompileResult<String> {
  let source = fs::read_to_string(path).context(ReadSourceSnafu { path })?;
  generate_assembly(&source)
}
