//! Type-resolved syntax tree.
//!
//! Expressions are built only through the checked constructors on [`Expr`],
//! which fix the result type once and refuse mismatched operands. Variables
//! and callees are referenced by name; the scope tree and the program map
//! resolve them, which keeps the tree free of cross-links.

use std::fmt;

use indexmap::IndexMap;
use log::debug;
use snafu::Snafu;

use crate::env::{ScopeId, ScopeTree};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  BitNot,
  Not,
}

impl UnaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      UnaryOp::Neg => "-",
      UnaryOp::BitNot => "~",
      UnaryOp::Not => "!",
    }
  }
}

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  LogicalAnd,
  LogicalOr,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Mod => "%",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::LogicalAnd => "&&",
      BinaryOp::LogicalOr => "||",
    }
  }

  /// Operators whose result is a 0/1 truth value of type `int`.
  pub fn yields_truth_value(self) -> bool {
    !matches!(
      self,
      BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
  Increment,
  Decrement,
}

impl PostfixOp {
  pub fn symbol(self) -> &'static str {
    match self {
      PostfixOp::Increment => "++",
      PostfixOp::Decrement => "--",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum TypeError {
  #[snafu(display("operand of '{op}' has type void"))]
  VoidOperand { op: &'static str },

  #[snafu(display("operands of '{op}' have mismatched types '{lhs}' and '{rhs}'"))]
  Mismatch {
    op: &'static str,
    lhs: Type,
    rhs: Type,
  },

  #[snafu(display("'{op}' requires a variable as its target"))]
  NotAnLvalue { op: &'static str },

  #[snafu(display("'{callee}' expects {expected} argument(s) but {found} were given"))]
  Arity {
    callee: String,
    expected: usize,
    found: usize,
  },

  #[snafu(display("argument {position} of '{callee}' has type '{found}', expected '{expected}'"))]
  Argument {
    callee: String,
    position: usize,
    expected: Type,
    found: Type,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
  IntLiteral(i64),
  CharLiteral(u8),
  Variable(String),
  Parenthesized(Box<Expr>),
  Unary {
    op: UnaryOp,
    operand: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Ternary {
    cond: Box<Expr>,
    then_expr: Box<Expr>,
    else_expr: Box<Expr>,
  },
  Assign {
    target: String,
    value: Box<Expr>,
  },
  /// `x++` / `x--`: yields the old value and updates the slot in place.
  Postfix {
    op: PostfixOp,
    target: String,
  },
  Call {
    callee: String,
    args: Vec<Expr>,
  },
}

/// Expression node with its result type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  kind: ExprKind,
  ty: Type,
}

fn require_value(op: &'static str, expr: &Expr) -> Result<(), TypeError> {
  if expr.ty.is_void() {
    return VoidOperandSnafu { op }.fail();
  }
  Ok(())
}

fn require_same(op: &'static str, lhs: Type, rhs: Type) -> Result<(), TypeError> {
  if lhs != rhs {
    return MismatchSnafu { op, lhs, rhs }.fail();
  }
  Ok(())
}

impl Expr {
  pub fn kind(&self) -> &ExprKind {
    &self.kind
  }

  pub fn ty(&self) -> Type {
    self.ty
  }

  pub fn int(value: i64) -> Self {
    Self {
      kind: ExprKind::IntLiteral(value),
      ty: Type::Int,
    }
  }

  pub fn char(value: u8) -> Self {
    Self {
      kind: ExprKind::CharLiteral(value),
      ty: Type::Char,
    }
  }

  /// The literal `1` of the given scalar type, used when desugaring `++`/`--`.
  pub fn one(ty: Type) -> Self {
    match ty {
      Type::Char => Self::char(1),
      _ => Self::int(1),
    }
  }

  /// Reference to a variable whose binding has type `ty`.
  pub fn variable(name: impl Into<String>, ty: Type) -> Self {
    Self {
      kind: ExprKind::Variable(name.into()),
      ty,
    }
  }

  pub fn parenthesized(inner: Expr) -> Self {
    let ty = inner.ty;
    Self {
      kind: ExprKind::Parenthesized(Box::new(inner)),
      ty,
    }
  }

  pub fn unary(op: UnaryOp, operand: Expr) -> Result<Self, TypeError> {
    require_value(op.symbol(), &operand)?;
    let ty = match op {
      UnaryOp::Not => Type::Int,
      UnaryOp::Neg | UnaryOp::BitNot => operand.ty,
    };
    Ok(Self {
      kind: ExprKind::Unary {
        op,
        operand: Box::new(operand),
      },
      ty,
    })
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Result<Self, TypeError> {
    require_value(op.symbol(), &lhs)?;
    require_value(op.symbol(), &rhs)?;
    require_same(op.symbol(), lhs.ty, rhs.ty)?;
    let ty = if op.yields_truth_value() {
      Type::Int
    } else {
      lhs.ty
    };
    Ok(Self {
      kind: ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      ty,
    })
  }

  pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Result<Self, TypeError> {
    require_value("?:", &cond)?;
    require_same("?:", then_expr.ty, else_expr.ty)?;
    let ty = then_expr.ty;
    Ok(Self {
      kind: ExprKind::Ternary {
        cond: Box::new(cond),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
      },
      ty,
    })
  }

  /// `target = value`, where `target` must reduce to a bare variable.
  pub fn assign(target: Expr, value: Expr) -> Result<Self, TypeError> {
    let Some(name) = target.as_variable() else {
      return NotAnLvalueSnafu { op: "=" }.fail();
    };
    require_value("=", &value)?;
    require_same("=", target.ty, value.ty)?;
    Ok(Self {
      kind: ExprKind::Assign {
        target: name.to_string(),
        value: Box::new(value),
      },
      ty: target.ty,
    })
  }

  pub fn postfix(op: PostfixOp, target: Expr) -> Result<Self, TypeError> {
    let Some(name) = target.as_variable() else {
      return NotAnLvalueSnafu { op: op.symbol() }.fail();
    };
    Ok(Self {
      kind: ExprKind::Postfix {
        op,
        target: name.to_string(),
      },
      ty: target.ty,
    })
  }

  /// Call checked against the callee's signature.
  pub fn call(signature: &FunctionSignature, args: Vec<Expr>) -> Result<Self, TypeError> {
    if args.len() != signature.params.len() {
      return AritySnafu {
        callee: signature.name.clone(),
        expected: signature.params.len(),
        found: args.len(),
      }
      .fail();
    }
    for (position, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
      if arg.ty != param.ty {
        return ArgumentSnafu {
          callee: signature.name.clone(),
          position: position + 1,
          expected: param.ty,
          found: arg.ty,
        }
        .fail();
      }
    }
    Ok(Self {
      kind: ExprKind::Call {
        callee: signature.name.clone(),
        args,
      },
      ty: signature.return_type,
    })
  }

  /// Name of the variable this expression denotes, looking through
  /// parentheses.
  pub fn as_variable(&self) -> Option<&str> {
    match &self.kind {
      ExprKind::Variable(name) => Some(name),
      ExprKind::Parenthesized(inner) => inner.as_variable(),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Return(Option<Expr>),
  /// Declaration of a variable registered in the enclosing scope.
  Declare {
    name: String,
    ty: Type,
    init: Option<Expr>,
  },
  Expression(Expr),
  Block {
    scope: ScopeId,
    body: Vec<Stmt>,
  },
  If {
    cond: Expr,
    then_branch: Box<Stmt>,
    else_branch: Option<Box<Stmt>>,
  },
  /// `for` owns a scope so that an init declaration stays inside the loop.
  For {
    scope: ScopeId,
    init: Option<Box<Stmt>>,
    cond: Option<Expr>,
    post: Option<Expr>,
    body: Box<Stmt>,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
  },
  DoWhile {
    body: Box<Stmt>,
    cond: Expr,
  },
  Break,
  Continue,
  Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
  pub ty: Type,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
  pub name: String,
  pub return_type: Type,
  pub params: Vec<Param>,
}

impl FunctionSignature {
  /// Two declarations agree when the return type and the parameter types
  /// line up; parameter names are free to differ.
  pub fn matches(&self, other: &FunctionSignature) -> bool {
    self.name == other.name
      && self.return_type == other.return_type
      && self.params.len() == other.params.len()
      && self
        .params
        .iter()
        .zip(&other.params)
        .all(|(a, b)| a.ty == b.ty)
  }
}

impl fmt::Display for FunctionSignature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}(", self.return_type, self.name)?;
    if self.params.is_empty() {
      f.write_str("void")?;
    }
    for (idx, param) in self.params.iter().enumerate() {
      if idx > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{} {}", param.ty, param.name)?;
    }
    f.write_str(")")
  }
}

#[derive(Debug, Clone)]
pub struct FunctionRecord {
  pub signature: FunctionSignature,
  /// Parameters live in the root scope; the body's top-level declarations
  /// share it.
  pub scopes: ScopeTree,
  /// `None` for a forward declaration.
  pub body: Option<Vec<Stmt>>,
  /// Bytes of local storage, filled in by [`Program::allocate_frames`].
  pub frame_size: i64,
}

impl FunctionRecord {
  pub fn is_defined(&self) -> bool {
    self.body.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum DeclarationError {
  #[snafu(display("conflicting declaration of '{name}': previously declared as '{previous}'"))]
  Conflicting { name: String, previous: String },

  #[snafu(display("redefinition of function '{name}'"))]
  Redefinition { name: String },

  #[snafu(display("function '{name}' is defined without being declared"))]
  Undeclared { name: String },
}

/// All functions of a translation unit, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Program {
  functions: IndexMap<String, FunctionRecord>,
}

impl Program {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&FunctionRecord> {
    self.functions.get(name)
  }

  pub fn functions(&self) -> impl Iterator<Item = &FunctionRecord> {
    self.functions.values()
  }

  pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FunctionRecord> {
    self.functions.values_mut()
  }

  pub fn len(&self) -> usize {
    self.functions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.functions.is_empty()
  }

  /// Record a declaration. The first declaration of a name fixes its
  /// signature; later ones must match it.
  pub fn declare(
    &mut self,
    signature: FunctionSignature,
    scopes: ScopeTree,
  ) -> Result<(), DeclarationError> {
    if let Some(existing) = self.functions.get(&signature.name) {
      if !existing.signature.matches(&signature) {
        return ConflictingSnafu {
          name: signature.name,
          previous: existing.signature.to_string(),
        }
        .fail();
      }
      return Ok(());
    }
    let record = FunctionRecord {
      signature,
      scopes,
      body: None,
      frame_size: 0,
    };
    self.functions.insert(record.signature.name.clone(), record);
    Ok(())
  }

  /// Attach a body to a previously declared function. A function can be
  /// defined at most once. The defining signature replaces the declared one
  /// so parameter names match the bindings in `scopes`.
  pub fn define(
    &mut self,
    signature: FunctionSignature,
    scopes: ScopeTree,
    body: Vec<Stmt>,
  ) -> Result<(), DeclarationError> {
    let name = signature.name.as_str();
    let Some(record) = self.functions.get_mut(name) else {
      return UndeclaredSnafu { name }.fail();
    };
    if record.is_defined() {
      return RedefinitionSnafu { name }.fail();
    }
    record.signature = signature;
    record.scopes = scopes;
    record.body = Some(body);
    Ok(())
  }

  /// Assign stack slots for every function and record its frame size.
  pub fn allocate_frames(&mut self) {
    for record in self.functions.values_mut() {
      record.frame_size = record.scopes.allocate();
      debug_assert!(record.scopes.is_fully_allocated());
      debug!(
        "frame for '{}': {} bytes across {} scope(s)",
        record.signature.name,
        record.frame_size,
        record.scopes.len()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sig(name: &str, ret: Type, params: &[(Type, &str)]) -> FunctionSignature {
    FunctionSignature {
      name: name.to_string(),
      return_type: ret,
      params: params
        .iter()
        .map(|(ty, name)| Param {
          ty: *ty,
          name: name.to_string(),
        })
        .collect(),
    }
  }

  #[test]
  fn result_types_are_fixed_at_construction() {
    let cmp = Expr::binary(BinaryOp::Lt, Expr::char(b'a'), Expr::char(b'b')).unwrap();
    assert_eq!(cmp.ty(), Type::Int);
    let sum = Expr::binary(BinaryOp::Add, Expr::char(b'a'), Expr::char(1)).unwrap();
    assert_eq!(sum.ty(), Type::Char);
    let not = Expr::unary(UnaryOp::Not, Expr::char(0)).unwrap();
    assert_eq!(not.ty(), Type::Int);
  }

  #[test]
  fn mismatched_operands_are_rejected() {
    let err = Expr::binary(BinaryOp::Add, Expr::int(1), Expr::char(b'a')).unwrap_err();
    assert_eq!(
      err.to_string(),
      "operands of '+' have mismatched types 'int' and 'char'"
    );
  }

  #[test]
  fn void_operands_are_rejected() {
    let void_call = Expr::call(&sig("f", Type::Void, &[]), vec![]).unwrap();
    assert_eq!(
      Expr::unary(UnaryOp::Neg, void_call.clone()),
      Err(TypeError::VoidOperand { op: "-" })
    );
    assert!(Expr::binary(BinaryOp::Eq, void_call.clone(), Expr::int(0)).is_err());
    assert!(Expr::ternary(void_call, Expr::int(1), Expr::int(2)).is_err());
  }

  #[test]
  fn assignment_targets_must_be_variables() {
    let paren = Expr::parenthesized(Expr::variable("x", Type::Int));
    let assign = Expr::assign(paren, Expr::int(3)).unwrap();
    assert!(matches!(assign.kind(), ExprKind::Assign { target, .. } if target == "x"));

    let err = Expr::assign(Expr::int(1), Expr::int(3)).unwrap_err();
    assert_eq!(err, TypeError::NotAnLvalue { op: "=" });
    let err = Expr::postfix(PostfixOp::Increment, Expr::int(1)).unwrap_err();
    assert_eq!(err, TypeError::NotAnLvalue { op: "++" });
  }

  #[test]
  fn calls_are_checked_against_the_signature() {
    let add = sig("add", Type::Int, &[(Type::Int, "a"), (Type::Char, "b")]);
    let ok = Expr::call(&add, vec![Expr::int(1), Expr::char(b'c')]).unwrap();
    assert_eq!(ok.ty(), Type::Int);

    let arity = Expr::call(&add, vec![Expr::int(1)]).unwrap_err();
    assert_eq!(
      arity.to_string(),
      "'add' expects 2 argument(s) but 1 were given"
    );
    let wrong = Expr::call(&add, vec![Expr::int(1), Expr::int(2)]).unwrap_err();
    assert!(matches!(wrong, TypeError::Argument { position: 2, .. }));
  }

  #[test]
  fn forward_declarations_must_agree() {
    let mut program = Program::new();
    let first = sig("f", Type::Int, &[(Type::Int, "a")]);
    program.declare(first, ScopeTree::new()).unwrap();

    let renamed = sig("f", Type::Int, &[(Type::Int, "b")]);
    assert!(program.declare(renamed, ScopeTree::new()).is_ok());

    let conflicting = sig("f", Type::Char, &[(Type::Int, "a")]);
    let err = program.declare(conflicting, ScopeTree::new()).unwrap_err();
    assert_eq!(
      err.to_string(),
      "conflicting declaration of 'f': previously declared as 'int f(int a)'"
    );
  }

  #[test]
  fn functions_are_defined_at_most_once() {
    let mut program = Program::new();
    program
      .declare(sig("main", Type::Int, &[]), ScopeTree::new())
      .unwrap();
    assert!(!program.get("main").unwrap().is_defined());
    program
      .define(sig("main", Type::Int, &[]), ScopeTree::new(), vec![])
      .unwrap();
    assert!(program.get("main").unwrap().is_defined());
    assert_eq!(
      program.define(sig("main", Type::Int, &[]), ScopeTree::new(), vec![]),
      Err(DeclarationError::Redefinition {
        name: "main".into()
      })
    );
  }
}
