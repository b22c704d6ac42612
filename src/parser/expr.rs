//! Expression grammar, lowest precedence first:
//!
//! ```text
//! assign     = ternary (("=" | "+=" | "-=") assign)?
//! ternary    = logical_or ("?" expr ":" ternary)?
//! logical_or = logical_and ("||" logical_and)*
//! logical_and= equality ("&&" equality)*
//! equality   = relational (("==" | "!=") relational)*
//! relational = add (("<" | "<=" | ">" | ">=") add)*
//! add        = mul (("+" | "-") mul)*
//! mul        = unary (("*" | "/" | "%") unary)*
//! unary      = ("+" | "-" | "~" | "!" | "++" | "--") unary | postfix
//! postfix    = primary ("++" | "--")*
//! primary    = "(" expr ")" | num | char | ident ("(" args ")")?
//! ```
//!
//! Compound assignment and prefix increment are rewritten here into plain
//! assignments (`x += y` becomes `x = x + y`).

use crate::ast::{BinaryOp, Expr, PostfixOp, TypeError, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{LITERAL_LIMIT, Punct, TokenKind, describe_token};

use super::Parser;

type Level<'a> = fn(&mut Parser<'a>) -> CompileResult<Expr>;

impl<'a> Parser<'a> {
  pub(super) fn expr(&mut self) -> CompileResult<Expr> {
    self.assign()
  }

  fn assign(&mut self) -> CompileResult<Expr> {
    let node = self.ternary()?;

    let loc = self.stream.loc();
    if self.stream.equal(Punct::Assign) {
      let value = self.assign()?;
      return Expr::assign(node, value).map_err(|err| self.type_error(loc, err));
    }

    for (punct, op) in [
      (Punct::PlusAssign, BinaryOp::Add),
      (Punct::MinusAssign, BinaryOp::Sub),
    ] {
      if self.stream.equal(punct) {
        let value = self.assign()?;
        return self.read_modify_write(loc, punct.as_str(), node, op, value);
      }
    }

    Ok(node)
  }

  /// Build `target = target op value`.
  fn read_modify_write(
    &self,
    loc: usize,
    symbol: &'static str,
    target: Expr,
    op: BinaryOp,
    value: Expr,
  ) -> CompileResult<Expr> {
    if target.as_variable().is_none() {
      return Err(self.type_error(loc, TypeError::NotAnLvalue { op: symbol }));
    }
    let combined = Expr::binary(op, target.clone(), value).map_err(|err| self.type_error(loc, err))?;
    Expr::assign(target, combined).map_err(|err| self.type_error(loc, err))
  }

  fn ternary(&mut self) -> CompileResult<Expr> {
    let cond = self.logical_or()?;

    let loc = self.stream.loc();
    if !self.stream.equal(Punct::Question) {
      return Ok(cond);
    }
    let then_expr = self.expr()?;
    self.stream.skip(Punct::Colon)?;
    let else_expr = self.ternary()?;
    Expr::ternary(cond, then_expr, else_expr).map_err(|err| self.type_error(loc, err))
  }

  /// One left-associative precedence level.
  fn binary_level(&mut self, ops: &[(Punct, BinaryOp)], next: Level<'a>) -> CompileResult<Expr> {
    let mut node = next(self)?;

    loop {
      let loc = self.stream.loc();
      let Some(op) = ops
        .iter()
        .find(|(punct, _)| self.stream.equal(*punct))
        .map(|(_, op)| *op)
      else {
        break;
      };

      let rhs = next(self)?;
      node = Expr::binary(op, node, rhs).map_err(|err| self.type_error(loc, err))?;
    }

    Ok(node)
  }

  fn logical_or(&mut self) -> CompileResult<Expr> {
    self.binary_level(&[(Punct::OrOr, BinaryOp::LogicalOr)], Self::logical_and)
  }

  fn logical_and(&mut self) -> CompileResult<Expr> {
    self.binary_level(&[(Punct::AndAnd, BinaryOp::LogicalAnd)], Self::equality)
  }

  fn equality(&mut self) -> CompileResult<Expr> {
    self.binary_level(
      &[(Punct::Eq, BinaryOp::Eq), (Punct::Ne, BinaryOp::Ne)],
      Self::relational,
    )
  }

  fn relational(&mut self) -> CompileResult<Expr> {
    self.binary_level(
      &[
        (Punct::Lt, BinaryOp::Lt),
        (Punct::Le, BinaryOp::Le),
        (Punct::Gt, BinaryOp::Gt),
        (Punct::Ge, BinaryOp::Ge),
      ],
      Self::add,
    )
  }

  fn add(&mut self) -> CompileResult<Expr> {
    self.binary_level(
      &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
      Self::mul,
    )
  }

  fn mul(&mut self) -> CompileResult<Expr> {
    self.binary_level(
      &[
        (Punct::Star, BinaryOp::Mul),
        (Punct::Slash, BinaryOp::Div),
        (Punct::Percent, BinaryOp::Mod),
      ],
      Self::unary,
    )
  }

  fn unary(&mut self) -> CompileResult<Expr> {
    let loc = self.stream.loc();

    if self.stream.equal(Punct::Plus) {
      return self.unary();
    }

    // The one literal that only fits once negated.
    if self.stream.peek().is_some_and(|token| token.is_punct(Punct::Minus))
      && self
        .stream
        .peek_at(1)
        .is_some_and(|token| token.kind == TokenKind::Num(LITERAL_LIMIT))
    {
      self.stream.advance();
      self.stream.advance();
      return Ok(Expr::int(-LITERAL_LIMIT));
    }

    for (punct, op) in [
      (Punct::Minus, UnaryOp::Neg),
      (Punct::Tilde, UnaryOp::BitNot),
      (Punct::Bang, UnaryOp::Not),
    ] {
      if self.stream.equal(punct) {
        let operand = self.unary()?;
        return Expr::unary(op, operand).map_err(|err| self.type_error(loc, err));
      }
    }

    for (punct, op) in [
      (Punct::Increment, BinaryOp::Add),
      (Punct::Decrement, BinaryOp::Sub),
    ] {
      if self.stream.equal(punct) {
        let operand = self.unary()?;
        let one = Expr::one(operand.ty());
        return self.read_modify_write(loc, punct.as_str(), operand, op, one);
      }
    }

    self.postfix()
  }

  fn postfix(&mut self) -> CompileResult<Expr> {
    let mut node = self.primary()?;

    loop {
      let loc = self.stream.loc();
      let op = if self.stream.equal(Punct::Increment) {
        PostfixOp::Increment
      } else if self.stream.equal(Punct::Decrement) {
        PostfixOp::Decrement
      } else {
        break;
      };
      node = Expr::postfix(op, node).map_err(|err| self.type_error(loc, err))?;
    }

    Ok(node)
  }

  fn primary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal(Punct::OpenParen) {
      let inner = self.expr()?;
      self.stream.skip(Punct::CloseParen)?;
      return Ok(Expr::parenthesized(inner));
    }

    let loc = self.stream.loc();
    match self.stream.peek().map(|token| token.kind.clone()) {
      Some(TokenKind::Num(value)) => {
        if value >= LITERAL_LIMIT {
          return Err(CompileError::lexical(
            self.stream.source,
            loc,
            format!("integer literal {value} is out of range for 'int'"),
          ));
        }
        self.stream.advance();
        Ok(Expr::int(value))
      }
      Some(TokenKind::Char(value)) => {
        self.stream.advance();
        Ok(Expr::char(value))
      }
      Some(TokenKind::Ident(name)) => {
        self.stream.advance();
        if self.stream.equal(Punct::OpenParen) {
          self.call(name, loc)
        } else {
          self.variable(name, loc)
        }
      }
      _ => {
        let got = describe_token(self.stream.peek());
        Err(CompileError::syntax(
          self.stream.source,
          loc,
          format!("expected an expression, but got \"{got}\""),
        ))
      }
    }
  }

  /// Resolve `name` against the bindings visible from the current scope.
  /// Inside an initializer the variable being declared is only a last
  /// resort, so `{ char x = x; }` reads an outer `x` when there is one.
  fn variable(&self, name: String, loc: usize) -> CompileResult<Expr> {
    let outer = match &self.pending {
      Some((owner, pending)) if *pending == name => {
        self.scopes.lookup_excluding(self.scope, &name, *owner)
      }
      _ => None,
    };
    if let Some(binding) = outer.or_else(|| self.scopes.lookup(self.scope, &name)) {
      return Ok(Expr::variable(name, binding.ty));
    }
    if self.program.get(&name).is_some() {
      return Err(self.semantic_error(loc, format!("function '{name}' used as a value")));
    }
    Err(self.semantic_error(loc, format!("use of undeclared identifier '{name}'")))
  }

  /// Arguments after the opening parenthesis. Bindings shadow functions, so
  /// a visible variable of the same name makes the call ill-formed.
  fn call(&mut self, name: String, loc: usize) -> CompileResult<Expr> {
    if self.scopes.lookup(self.scope, &name).is_some() {
      return Err(self.semantic_error(loc, format!("called object '{name}' is not a function")));
    }
    let Some(signature) = self.program.get(&name).map(|record| record.signature.clone()) else {
      return Err(self.semantic_error(loc, format!("call to undeclared function '{name}'")));
    };

    let mut args = Vec::new();
    if !self.stream.equal(Punct::CloseParen) {
      loop {
        args.push(self.assign()?);
        if self.stream.equal(Punct::Comma) {
          continue;
        }
        self.stream.skip(Punct::CloseParen)?;
        break;
      }
    }

    Expr::call(&signature, args).map_err(|err| self.type_error(loc, err))
  }
}
