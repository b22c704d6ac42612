//! Statement layer: blocks, declarations and structured control flow.

use crate::ast::{Expr, Stmt};
use crate::env::ScopeId;
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Keyword, Punct};

use super::Parser;

impl Parser<'_> {
  /// Block items up to and including the closing brace, parsed in the
  /// current scope.
  pub(super) fn block_items(&mut self) -> CompileResult<Vec<Stmt>> {
    let mut body = Vec::new();
    while !self.stream.equal(Punct::CloseBrace) {
      if self.stream.is_eof() {
        return Err(self.stream.unexpected("}"));
      }
      body.push(self.block_item()?);
    }
    Ok(body)
  }

  fn block_item(&mut self) -> CompileResult<Stmt> {
    if self.at_type_specifier() {
      return self.declaration();
    }
    self.statement()
  }

  /// `type name ;` or `type name = expr ;`
  ///
  /// The name is registered before the initializer is parsed, so the
  /// initializer can mention it; whether it may actually be read there is
  /// decided when the declaration is lowered.
  fn declaration(&mut self) -> CompileResult<Stmt> {
    let ty_loc = self.stream.loc();
    let ty = self.type_specifier()?;
    let (name, name_loc) = self.stream.get_ident()?;
    if !ty.is_scalar() {
      return Err(self.semantic_error(ty_loc, format!("variable '{name}' declared void")));
    }
    self
      .scopes
      .register(self.scope, &name, ty)
      .map_err(|_| self.semantic_error(name_loc, format!("redeclaration of '{name}'")))?;

    let init = if self.stream.equal(Punct::Assign) {
      let init_loc = self.stream.loc();
      let outer = self.pending.replace((self.scope, name.clone()));
      let init = self.expr();
      self.pending = outer;
      let init = init?;
      if init.ty() != ty {
        return Err(self.semantic_error(
          init_loc,
          format!("cannot initialize '{name}' of type '{ty}' with a value of type '{}'", init.ty()),
        ));
      }
      Some(init)
    } else {
      None
    };
    self.stream.skip(Punct::Semicolon)?;
    Ok(Stmt::Declare { name, ty, init })
  }

  fn statement(&mut self) -> CompileResult<Stmt> {
    let loc = self.stream.loc();

    if self.stream.equal_keyword(Keyword::Return) {
      return self.return_statement(loc);
    }

    if self.stream.equal(Punct::OpenBrace) {
      let (scope, body) = self.nested(|parser| parser.block_items())?;
      return Ok(Stmt::Block { scope, body });
    }

    if self.stream.equal_keyword(Keyword::If) {
      let cond = self.condition()?;
      let then_branch = Box::new(self.statement()?);
      let else_branch = if self.stream.equal_keyword(Keyword::Else) {
        Some(Box::new(self.statement()?))
      } else {
        None
      };
      return Ok(Stmt::If {
        cond,
        then_branch,
        else_branch,
      });
    }

    if self.stream.equal_keyword(Keyword::While) {
      let cond = self.condition()?;
      let body = Box::new(self.loop_body()?);
      return Ok(Stmt::While { cond, body });
    }

    if self.stream.equal_keyword(Keyword::Do) {
      let body = Box::new(self.loop_body()?);
      self.stream.skip_keyword(Keyword::While)?;
      let cond = self.condition()?;
      self.stream.skip(Punct::Semicolon)?;
      return Ok(Stmt::DoWhile { body, cond });
    }

    if self.stream.equal_keyword(Keyword::For) {
      return self.for_statement();
    }

    if self.stream.equal_keyword(Keyword::Break) {
      self.require_loop(loc, "break")?;
      self.stream.skip(Punct::Semicolon)?;
      return Ok(Stmt::Break);
    }

    if self.stream.equal_keyword(Keyword::Continue) {
      self.require_loop(loc, "continue")?;
      self.stream.skip(Punct::Semicolon)?;
      return Ok(Stmt::Continue);
    }

    if self.stream.equal(Punct::Semicolon) {
      return Ok(Stmt::Empty);
    }

    let expr = self.expr()?;
    self.stream.skip(Punct::Semicolon)?;
    Ok(Stmt::Expression(expr))
  }

  fn return_statement(&mut self, loc: usize) -> CompileResult<Stmt> {
    if self.stream.equal(Punct::Semicolon) {
      if !self.return_type.is_void() {
        return Err(self.semantic_error(
          loc,
          format!("non-void function must return a value of type '{}'", self.return_type),
        ));
      }
      return Ok(Stmt::Return(None));
    }

    let value_loc = self.stream.loc();
    let value = self.expr()?;
    if self.return_type.is_void() {
      return Err(self.semantic_error(value_loc, "void function cannot return a value"));
    }
    if value.ty() != self.return_type {
      return Err(self.semantic_error(
        value_loc,
        format!(
          "returning '{}' from a function returning '{}'",
          value.ty(),
          self.return_type
        ),
      ));
    }
    self.stream.skip(Punct::Semicolon)?;
    Ok(Stmt::Return(Some(value)))
  }

  /// `for ( init ; cond ; post ) body`; the whole loop gets its own scope.
  fn for_statement(&mut self) -> CompileResult<Stmt> {
    self.stream.skip(Punct::OpenParen)?;
    let (scope, (init, cond, post, body)) = self.nested(|parser| {
      let init = if parser.stream.equal(Punct::Semicolon) {
        None
      } else if parser.at_type_specifier() {
        Some(Box::new(parser.declaration()?))
      } else {
        let expr = parser.expr()?;
        parser.stream.skip(Punct::Semicolon)?;
        Some(Box::new(Stmt::Expression(expr)))
      };

      let cond = if parser.stream.equal(Punct::Semicolon) {
        None
      } else {
        let loc = parser.stream.loc();
        let cond = parser.expr()?;
        parser.require_value(loc, &cond)?;
        parser.stream.skip(Punct::Semicolon)?;
        Some(cond)
      };

      let post = if parser.stream.equal(Punct::CloseParen) {
        None
      } else {
        let post = parser.expr()?;
        parser.stream.skip(Punct::CloseParen)?;
        Some(post)
      };

      let body = Box::new(parser.loop_body()?);
      Ok((init, cond, post, body))
    })?;

    Ok(Stmt::For {
      scope,
      init,
      cond,
      post,
      body,
    })
  }

  /// Run `parse` inside a fresh child of the current scope.
  fn nested<T>(
    &mut self,
    parse: impl FnOnce(&mut Self) -> CompileResult<T>,
  ) -> CompileResult<(ScopeId, T)> {
    let outer = self.scope;
    let inner = self.scopes.push_child(outer);
    self.scope = inner;
    let result = parse(self);
    self.scope = outer;
    Ok((inner, result?))
  }

  fn loop_body(&mut self) -> CompileResult<Stmt> {
    self.loop_depth += 1;
    let body = self.statement();
    self.loop_depth -= 1;
    body
  }

  /// Parenthesised controlling expression of `if`/`while`/`do`.
  fn condition(&mut self) -> CompileResult<Expr> {
    self.stream.skip(Punct::OpenParen)?;
    let loc = self.stream.loc();
    let cond = self.expr()?;
    self.require_value(loc, &cond)?;
    self.stream.skip(Punct::CloseParen)?;
    Ok(cond)
  }

  fn require_value(&self, loc: usize, expr: &Expr) -> CompileResult<()> {
    if expr.ty().is_void() {
      return Err(self.semantic_error(loc, "condition has type void"));
    }
    Ok(())
  }

  fn require_loop(&self, loc: usize, keyword: &str) -> CompileResult<()> {
    if self.loop_depth == 0 {
      return Err(CompileError::syntax(
        self.stream.source,
        loc,
        format!("'{keyword}' outside of a loop"),
      ));
    }
    Ok(())
  }
}
