use std::fmt;

use crate::tokenizer::Keyword;

/// Builtin type tags. Every value lives in one machine word regardless of
/// its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
  Int,
  Char,
  Void,
}

impl Type {
  /// Map a type keyword to its type tag.
  pub fn from_keyword(kw: Keyword) -> Option<Self> {
    match kw {
      Keyword::Int => Some(Type::Int),
      Keyword::Char => Some(Type::Char),
      Keyword::Void => Some(Type::Void),
      _ => None,
    }
  }

  pub fn is_void(self) -> bool {
    matches!(self, Type::Void)
  }

  /// Scalars can be stored in a variable slot and used as operands.
  pub fn is_scalar(self) -> bool {
    matches!(self, Type::Int | Type::Char)
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Type::Int => "int",
      Type::Char => "char",
      Type::Void => "void",
    };
    f.write_str(name)
  }
}
