//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising keywords,
//! punctuators, identifiers and literals. Multi-character punctuators are
//! matched before single-character ones to avoid ambiguity. The stream ends
//! at exhaustion; there is no explicit end-of-file token.

use std::fmt;

use crate::error::{CompileError, CompileResult};

/// Largest decimal literal the lexer accepts. Only `-2147483648` may use it;
/// the parser rejects it anywhere else.
pub const LITERAL_LIMIT: i64 = 1 << 31;

/// Reserved words of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Int,
  Char,
  Void,
  Return,
  If,
  Else,
  For,
  While,
  Do,
  Break,
  Continue,
}

impl Keyword {
  const ALL: [Keyword; 11] = [
    Keyword::Int,
    Keyword::Char,
    Keyword::Void,
    Keyword::Return,
    Keyword::If,
    Keyword::Else,
    Keyword::For,
    Keyword::While,
    Keyword::Do,
    Keyword::Break,
    Keyword::Continue,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Keyword::Int => "int",
      Keyword::Char => "char",
      Keyword::Void => "void",
      Keyword::Return => "return",
      Keyword::If => "if",
      Keyword::Else => "else",
      Keyword::For => "for",
      Keyword::While => "while",
      Keyword::Do => "do",
      Keyword::Break => "break",
      Keyword::Continue => "continue",
    }
  }

  fn from_ident(ident: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|kw| kw.as_str() == ident)
  }
}

/// Operators and separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Assign,
  PlusAssign,
  MinusAssign,
  Increment,
  Decrement,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  AndAnd,
  OrOr,
  Bang,
  Tilde,
  Question,
  Colon,
  Semicolon,
  Comma,
  OpenParen,
  CloseParen,
  OpenBrace,
  CloseBrace,
}

impl Punct {
  // Longest spellings first so that `<=` is never split into `<` `=`.
  const BY_LENGTH: [Punct; 28] = [
    Punct::PlusAssign,
    Punct::MinusAssign,
    Punct::Increment,
    Punct::Decrement,
    Punct::Eq,
    Punct::Ne,
    Punct::Le,
    Punct::Ge,
    Punct::AndAnd,
    Punct::OrOr,
    Punct::Plus,
    Punct::Minus,
    Punct::Star,
    Punct::Slash,
    Punct::Percent,
    Punct::Assign,
    Punct::Lt,
    Punct::Gt,
    Punct::Bang,
    Punct::Tilde,
    Punct::Question,
    Punct::Colon,
    Punct::Semicolon,
    Punct::Comma,
    Punct::OpenParen,
    Punct::CloseParen,
    Punct::OpenBrace,
    Punct::CloseBrace,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Punct::Plus => "+",
      Punct::Minus => "-",
      Punct::Star => "*",
      Punct::Slash => "/",
      Punct::Percent => "%",
      Punct::Assign => "=",
      Punct::PlusAssign => "+=",
      Punct::MinusAssign => "-=",
      Punct::Increment => "++",
      Punct::Decrement => "--",
      Punct::Eq => "==",
      Punct::Ne => "!=",
      Punct::Lt => "<",
      Punct::Le => "<=",
      Punct::Gt => ">",
      Punct::Ge => ">=",
      Punct::AndAnd => "&&",
      Punct::OrOr => "||",
      Punct::Bang => "!",
      Punct::Tilde => "~",
      Punct::Question => "?",
      Punct::Colon => ":",
      Punct::Semicolon => ";",
      Punct::Comma => ",",
      Punct::OpenParen => "(",
      Punct::CloseParen => ")",
      Punct::OpenBrace => "{",
      Punct::CloseBrace => "}",
    }
  }
}

/// Kinds of tokens recognised by the front-end. Literal and identifier
/// tokens carry their decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
  Num(i64),
  Char(u8),
  Ident(String),
  Keyword(Keyword),
  Punct(Punct),
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TokenKind::Num(value) => write!(f, "{value}"),
      TokenKind::Char(value) => write!(f, "'{}'", value.escape_ascii()),
      TokenKind::Ident(name) => f.write_str(name),
      TokenKind::Keyword(kw) => f.write_str(kw.as_str()),
      TokenKind::Punct(punct) => f.write_str(punct.as_str()),
    }
  }
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  pub fn new(kind: TokenKind, loc: usize, len: usize) -> Self {
    Self { kind, loc, len }
  }

  pub fn is_punct(&self, punct: Punct) -> bool {
    self.kind == TokenKind::Punct(punct)
  }

  pub fn is_keyword(&self, kw: Keyword) -> bool {
    self.kind == TokenKind::Keyword(kw)
  }
}

/// Lex the input into a flat vector of tokens.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if input[i..].starts_with("//") {
      i = input[i..].find('\n').map_or(bytes.len(), |end| i + end + 1);
      continue;
    }

    if input[i..].starts_with("/*") {
      let Some(end) = input[i + 2..].find("*/") else {
        return Err(CompileError::lexical(input, i, "unterminated comment"));
      };
      i += end + 4;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i64>()
        .map_err(|err| CompileError::lexical(input, start, format!("invalid number '{text}': {err}")))?;
      if value > LITERAL_LIMIT {
        return Err(CompileError::lexical(
          input,
          start,
          format!("integer literal '{text}' is too large for 'int'"),
        ));
      }
      tokens.push(Token::new(TokenKind::Num(value), start, i - start));
      continue;
    }

    if c == b'\'' {
      let (value, len) = char_literal(input, i)?;
      tokens.push(Token::new(TokenKind::Char(value), i, len));
      i += len;
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let text = &input[start..i];
      let kind = match Keyword::from_ident(text) {
        Some(kw) => TokenKind::Keyword(kw),
        None => TokenKind::Ident(text.to_string()),
      };
      tokens.push(Token::new(kind, start, i - start));
      continue;
    }

    if let Some(punct) = Punct::BY_LENGTH
      .into_iter()
      .find(|punct| input[i..].starts_with(punct.as_str()))
    {
      let len = punct.as_str().len();
      tokens.push(Token::new(TokenKind::Punct(punct), i, len));
      i += len;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lexical(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  Ok(tokens)
}

/// Decode a character literal starting at the opening quote. Returns the
/// byte value and the literal's length in the source.
fn char_literal(input: &str, start: usize) -> CompileResult<(u8, usize)> {
  let bytes = input.as_bytes();
  let unterminated = || CompileError::lexical(input, start, "unterminated character literal");

  let mut i = start + 1;
  let value = match bytes.get(i) {
    Some(b'\\') => {
      i += 1;
      let escaped = match bytes.get(i).ok_or_else(unterminated)? {
        b'n' => b'\n',
        b't' => b'\t',
        b'r' => b'\r',
        b'0' => 0,
        b'\\' => b'\\',
        b'\'' => b'\'',
        b'"' => b'"',
        other => {
          return Err(CompileError::lexical(
            input,
            i - 1,
            format!("unknown escape sequence '\\{}'", other.escape_ascii()),
          ));
        }
      };
      i += 1;
      escaped
    }
    Some(b'\'') => {
      return Err(CompileError::lexical(input, start, "empty character literal"));
    }
    Some(&byte) if byte.is_ascii() && byte != b'\n' => {
      i += 1;
      byte
    }
    Some(_) => {
      return Err(CompileError::lexical(
        input,
        i,
        "character literal must be a single ASCII character",
      ));
    }
    None => return Err(unterminated()),
  };

  if bytes.get(i) != Some(&b'\'') {
    return Err(unterminated());
  }
  Ok((value, i + 1 - start))
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>) -> String {
  match token {
    Some(t) => t.kind.to_string(),
    None => "EOF".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
      .unwrap()
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn keywords_identifiers_and_literals() {
    assert_eq!(
      kinds("int main(void) { return 42; }"),
      vec![
        TokenKind::Keyword(Keyword::Int),
        TokenKind::Ident("main".into()),
        TokenKind::Punct(Punct::OpenParen),
        TokenKind::Keyword(Keyword::Void),
        TokenKind::Punct(Punct::CloseParen),
        TokenKind::Punct(Punct::OpenBrace),
        TokenKind::Keyword(Keyword::Return),
        TokenKind::Num(42),
        TokenKind::Punct(Punct::Semicolon),
        TokenKind::Punct(Punct::CloseBrace),
      ]
    );
  }

  #[test]
  fn longest_punctuator_wins() {
    assert_eq!(
      kinds("a<=b++&&c-=1"),
      vec![
        TokenKind::Ident("a".into()),
        TokenKind::Punct(Punct::Le),
        TokenKind::Ident("b".into()),
        TokenKind::Punct(Punct::Increment),
        TokenKind::Punct(Punct::AndAnd),
        TokenKind::Ident("c".into()),
        TokenKind::Punct(Punct::MinusAssign),
        TokenKind::Num(1),
      ]
    );
  }

  #[test]
  fn keyword_prefix_is_an_identifier() {
    assert_eq!(
      kinds("integer returns"),
      vec![
        TokenKind::Ident("integer".into()),
        TokenKind::Ident("returns".into()),
      ]
    );
  }

  #[test]
  fn character_literals_decode_escapes() {
    assert_eq!(
      kinds(r"'a' '\n' '\0' '\''"),
      vec![
        TokenKind::Char(b'a'),
        TokenKind::Char(b'\n'),
        TokenKind::Char(0),
        TokenKind::Char(b'\''),
      ]
    );
  }

  #[test]
  fn comments_are_skipped() {
    assert_eq!(
      kinds("1 // one\n/* two\n */ 3"),
      vec![TokenKind::Num(1), TokenKind::Num(3)]
    );
  }

  #[test]
  fn locations_point_into_the_source() {
    let source = "return  foo;";
    let tokens = tokenize(source).unwrap();
    assert_eq!(token_text(&tokens[1], source), "foo");
    assert_eq!(tokens[1].loc, 8);
  }

  #[test]
  fn rejects_unknown_characters() {
    let err = tokenize("int x = 1 @ 2;").unwrap_err();
    assert!(matches!(err, CompileError::Lexical { .. }));
    assert_eq!(err.to_string(), "1:11: lexical error: invalid token: '@'");
  }

  #[test]
  fn rejects_oversized_and_malformed_numbers() {
    assert!(tokenize("99999999999").is_err());
    assert!(tokenize("12abc").is_err());
    assert_eq!(
      tokenize("2147483649").unwrap_err().to_string(),
      "1:1: lexical error: integer literal '2147483649' is too large for 'int'"
    );
  }

  #[test]
  fn int_min_magnitude_is_a_token() {
    assert_eq!(
      kinds("-2147483648"),
      vec![TokenKind::Punct(Punct::Minus), TokenKind::Num(2147483648)]
    );
  }

  #[test]
  fn rejects_unterminated_char_literal() {
    assert!(matches!(
      tokenize("'a").unwrap_err(),
      CompileError::Lexical { .. }
    ));
    assert!(tokenize("''").is_err());
  }

  #[test]
  fn empty_input_yields_no_tokens() {
    assert!(tokenize("  \n\t").unwrap().is_empty());
  }
}
