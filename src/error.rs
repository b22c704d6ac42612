//! Shared error utilities used across the compilation pipeline.
//!
//! Every failure is fatal: the first error produced by any stage is bubbled
//! up with `?` and rendered as a single diagnostic line. Source-anchored
//! errors carry a 1-based line/column computed from the offending byte.

use std::fmt;
use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Line/column pair used to anchor diagnostics in the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
  pub line: usize,
  pub column: usize,
}

impl Position {
  /// Translate a byte offset into a line/column pair.
  pub fn locate(source: &str, loc: usize) -> Self {
    let safe_loc = loc.min(source.len());
    let prefix = source.get(..safe_loc).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |idx| idx + 1);
    let column = prefix[line_start..].chars().count() + 1;
    Self { line, column }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("cannot write {}: {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },

  #[snafu(display("{pos}: lexical error: {message}"))]
  Lexical { pos: Position, message: String },

  #[snafu(display("{pos}: syntax error: {message}"))]
  Syntax { pos: Position, message: String },

  #[snafu(display("{pos}: semantic error: {message}"))]
  Semantic { pos: Position, message: String },

  #[snafu(display(
    "semantic error: '{name}' is used before its declaration completes in function '{function}'"
  ))]
  UseBeforeDeclaration { function: String, name: String },

  #[snafu(display("internal error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Unrecognised input at byte offset `loc`.
  pub fn lexical(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::Lexical {
      pos: Position::locate(source, loc),
      message: message.into(),
    }
  }

  /// Grammar violation anchored at byte offset `loc`.
  pub fn syntax(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::Syntax {
      pos: Position::locate(source, loc),
      message: message.into(),
    }
  }

  /// Declaration, scoping or typing violation anchored at byte offset `loc`.
  pub fn semantic(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::Semantic {
      pos: Position::locate(source, loc),
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn position_counts_lines_and_columns() {
    let source = "int main(void) {\n  return 0;\n}\n";
    let loc = source.find("return").unwrap();
    assert_eq!(Position::locate(source, loc), Position { line: 2, column: 3 });
    assert_eq!(Position::locate(source, 0), Position { line: 1, column: 1 });
  }

  #[test]
  fn out_of_range_offset_is_clamped() {
    let pos = Position::locate("ab", 99);
    assert_eq!(pos, Position { line: 1, column: 3 });
  }

  #[test]
  fn diagnostics_render_on_one_line() {
    let err = CompileError::semantic("int x;\nint x;", 11, "redeclaration of 'x'");
    let rendered = err.to_string();
    assert_eq!(rendered, "2:5: semantic error: redeclaration of 'x'");
    assert!(!rendered.contains('\n'));
  }
}
