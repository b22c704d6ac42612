//! Recursive-descent parser producing a type-resolved [`Program`].
//!
//! Parsing and semantic checking happen in one pass: declarations register
//! bindings in the current function's [`ScopeTree`] as soon as they are
//! seen, calls are checked against the program's function map, and every
//! expression node gets its type from the checked constructors in
//! [`crate::ast`]. The first violation aborts the parse.
//!
//! - `mod.rs` holds the token cursor and top-level function declarations.
//! - `stmt.rs` parses statements and block structure.
//! - `expr.rs` holds the precedence-climbing expression helpers.

mod expr;
mod stmt;

use std::mem;

use log::debug;

use crate::asm::Register;
use crate::ast::{FunctionSignature, Param, Program, TypeError};
use crate::env::{ScopeId, ScopeTree};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Keyword, Punct, Token, TokenKind, describe_token};
use crate::ty::Type;

/// Parse a whole translation unit.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser::new(tokens, source);

  if parser.stream.is_eof() {
    return Err(CompileError::syntax(source, 0, "program is empty"));
  }

  while !parser.stream.is_eof() {
    parser.function()?;
  }

  for record in parser.program.functions().filter(|record| !record.is_defined()) {
    debug!(
      "'{}' is declared but not defined; leaving it to the linker",
      record.signature.name
    );
  }

  Ok(parser.program)
}

/// Every parameter is passed in a register.
const MAX_PARAMS: usize = Register::PARAMETERS.len();

struct Parser<'a> {
  stream: TokenStream<'a>,
  program: Program,
  /// Scope tree of the function whose body is being parsed.
  scopes: ScopeTree,
  scope: ScopeId,
  return_type: Type,
  /// Number of loops enclosing the current statement.
  loop_depth: usize,
  /// Variable whose initializer is being parsed, with the scope that owns
  /// it. Names in the initializer resolve past it.
  pending: Option<(ScopeId, String)>,
}

impl<'a> Parser<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    let scopes = ScopeTree::new();
    let scope = scopes.root();
    Self {
      stream: TokenStream::new(tokens, source),
      program: Program::new(),
      scopes,
      scope,
      return_type: Type::Void,
      loop_depth: 0,
      pending: None,
    }
  }

  /// `type name ( params ) ;` or `type name ( params ) { body }`
  fn function(&mut self) -> CompileResult<()> {
    let return_type = self.type_specifier()?;
    let (name, name_loc) = self.stream.get_ident()?;
    self.stream.skip(Punct::OpenParen)?;

    let mut scopes = ScopeTree::new();
    let params = self.params(&mut scopes)?;
    let signature = FunctionSignature {
      name: name.clone(),
      return_type,
      params,
    };

    self
      .program
      .declare(signature.clone(), scopes.clone())
      .map_err(|err| self.semantic_error(name_loc, err.to_string()))?;

    if self.stream.equal(Punct::Semicolon) {
      debug!("forward declaration of '{name}'");
      return Ok(());
    }

    if self.program.get(&name).is_some_and(|record| record.is_defined()) {
      return Err(self.semantic_error(name_loc, format!("redefinition of function '{name}'")));
    }

    self.stream.skip(Punct::OpenBrace)?;
    self.scope = scopes.root();
    self.scopes = scopes;
    self.return_type = return_type;
    self.loop_depth = 0;

    let body = self.block_items()?;
    let scopes = mem::take(&mut self.scopes);
    debug!(
      "parsed '{name}': {} statement(s), {} scope(s)",
      body.len(),
      scopes.len()
    );
    self
      .program
      .define(signature, scopes, body)
      .map_err(|err| self.semantic_error(name_loc, err.to_string()))
  }

  /// Parameter list after the opening parenthesis, through the closing one.
  /// Parameters are registered in the function's root scope.
  fn params(&mut self, scopes: &mut ScopeTree) -> CompileResult<Vec<Param>> {
    let mut params = Vec::new();
    if self.stream.equal(Punct::CloseParen) {
      return Ok(params);
    }
    if self.stream.peek().is_some_and(|token| token.is_keyword(Keyword::Void))
      && self
        .stream
        .peek_at(1)
        .is_some_and(|token| token.is_punct(Punct::CloseParen))
    {
      self.stream.advance();
      self.stream.advance();
      return Ok(params);
    }

    loop {
      let ty_loc = self.stream.loc();
      let ty = self.type_specifier()?;
      let (name, name_loc) = self.stream.get_ident()?;
      if !ty.is_scalar() {
        return Err(self.semantic_error(ty_loc, format!("parameter '{name}' declared void")));
      }
      if params.len() == MAX_PARAMS {
        return Err(self.semantic_error(
          name_loc,
          format!("functions take at most {MAX_PARAMS} parameters"),
        ));
      }
      let root = scopes.root();
      scopes
        .register(root, &name, ty)
        .map_err(|_| self.semantic_error(name_loc, format!("redefinition of parameter '{name}'")))?;
      params.push(Param { ty, name });

      if self.stream.equal(Punct::Comma) {
        continue;
      }
      self.stream.skip(Punct::CloseParen)?;
      return Ok(params);
    }
  }

  fn type_specifier(&mut self) -> CompileResult<Type> {
    if let Some(token) = self.stream.peek()
      && let TokenKind::Keyword(kw) = token.kind
      && let Some(ty) = Type::from_keyword(kw)
    {
      self.stream.advance();
      return Ok(ty);
    }
    let got = describe_token(self.stream.peek());
    Err(CompileError::syntax(
      self.stream.source,
      self.stream.loc(),
      format!("expected a type, but got \"{got}\""),
    ))
  }

  fn at_type_specifier(&self) -> bool {
    matches!(
      self.stream.peek().map(|token| &token.kind),
      Some(TokenKind::Keyword(Keyword::Int | Keyword::Char | Keyword::Void))
    )
  }

  fn semantic_error(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::semantic(self.stream.source, loc, message)
  }

  fn type_error(&self, loc: usize, err: TypeError) -> CompileError {
    self.semantic_error(loc, err.to_string())
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_at(&self, ahead: usize) -> Option<&Token> {
    self.tokens.get(self.pos + ahead)
  }

  fn advance(&mut self) -> Option<&Token> {
    let token = self.tokens.get(self.pos)?;
    self.pos += 1;
    Some(token)
  }

  /// Byte offset of the current token, or the end of input.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Consume the current token if it is the provided punctuator.
  fn equal(&mut self, punct: Punct) -> bool {
    if self.peek().is_some_and(|token| token.is_punct(punct)) {
      self.pos += 1;
      return true;
    }
    false
  }

  /// Consume the current token if it is the provided keyword.
  fn equal_keyword(&mut self, kw: Keyword) -> bool {
    if self.peek().is_some_and(|token| token.is_keyword(kw)) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, punct: Punct) -> CompileResult<()> {
    if self.equal(punct) {
      Ok(())
    } else {
      Err(self.unexpected(punct.as_str()))
    }
  }

  fn skip_keyword(&mut self, kw: Keyword) -> CompileResult<()> {
    if self.equal_keyword(kw) {
      Ok(())
    } else {
      Err(self.unexpected(kw.as_str()))
    }
  }

  fn unexpected(&self, expected: &str) -> CompileError {
    let got = describe_token(self.peek());
    CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected \"{expected}\", but got \"{got}\""),
    )
  }

  /// Parse the current token as an identifier, returning its name and location.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && let TokenKind::Ident(name) = &token.kind
    {
      let ident = (name.clone(), token.loc);
      self.pos += 1;
      return Ok(ident);
    }

    let got = describe_token(self.peek());
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected an identifier, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }
}

#[cfg(test)]
mod tests;
