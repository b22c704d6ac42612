//! Code generation: lower the parsed program into x86-64 output records.
//!
//! The emitter is an accumulator machine: every expression leaves its value
//! in `%rax`. A binary operator pushes its left operand while the right one
//! is evaluated, then pops it into `%rbx`. Locals live in `%rbp`-relative
//! slots assigned by the allocator in [`crate::env`].
//!
//! Variables are resolved by name through the scope chain, but only bindings
//! whose declaration has already been lowered are eligible. That is what
//! rejects `int x = x;` and makes an initializer see the outer `x` when an
//! inner one shadows it.

use std::collections::HashSet;

use log::debug;

use crate::asm::{Instruction, Label, Linkage, MemoryLocation, Opcode, Operand, OutputRecord, Register};
use crate::ast::{BinaryOp, Expr, ExprKind, FunctionRecord, FunctionSignature, PostfixOp, Program, Stmt, UnaryOp};
use crate::env::{ScopeId, ScopeTree};
use crate::error::{CompileError, CompileResult};
use crate::ty::Type;

const ACCUMULATOR: Register = Register::Rax;
const SCRATCH: Register = Register::Rbx;

/// `%rsp` must be a multiple of this at every `call`.
const STACK_ALIGNMENT: i64 = 16;
const WORD: i64 = 8;

/// Saved around every call site: the argument registers plus the two
/// caller-saved scratch registers.
const CALL_CLOBBERED: [Register; 8] = [
  Register::Rdi,
  Register::Rsi,
  Register::Rdx,
  Register::Rcx,
  Register::R8,
  Register::R9,
  Register::R10,
  Register::R11,
];

/// Mints unique local labels from a single counter.
#[derive(Debug, Default)]
pub struct LabelAllocator {
  next: usize,
}

impl LabelAllocator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn mint(&mut self, tag: &str) -> String {
    let label = format!(".L{tag}{}", self.next);
    self.next += 1;
    label
  }
}

/// Output records of one defined function.
#[derive(Debug, Clone)]
pub struct FunctionCode {
  pub name: String,
  pub records: Vec<OutputRecord>,
}

/// Lower every defined function. Frames must already be allocated.
pub fn generate(program: &mut Program) -> CompileResult<Vec<FunctionCode>> {
  let mut labels = LabelAllocator::new();
  let mut functions = Vec::new();
  let externals: HashSet<String> = program
    .functions()
    .filter(|record| !record.is_defined())
    .map(|record| record.signature.name.clone())
    .collect();

  for record in program.functions_mut() {
    let FunctionRecord {
      signature,
      scopes,
      body,
      frame_size,
    } = record;
    let Some(body) = body.as_deref() else {
      continue;
    };
    functions.push(lower_function(
      signature,
      scopes,
      body,
      *frame_size,
      &externals,
      &mut labels,
    )?);
  }

  Ok(functions)
}

fn lower_function(
  signature: &FunctionSignature,
  scopes: &mut ScopeTree,
  body: &[Stmt],
  frame_size: i64,
  externals: &HashSet<String>,
  labels: &mut LabelAllocator,
) -> CompileResult<FunctionCode> {
  let root = scopes.root();
  let return_label = labels.mint("return");
  let mut lowering = Lowering {
    function: &signature.name,
    scopes,
    externals,
    labels,
    out: Vec::new(),
    return_label: return_label.clone(),
    loops: Vec::new(),
    depth: 0,
  };

  // Incoming arguments go straight to their slots.
  for (param, reg) in signature.params.iter().zip(Register::PARAMETERS) {
    let slot = lowering.declare(root, &param.name)?;
    lowering.op2(Opcode::Mov, reg, slot);
  }
  for stmt in body {
    lowering.stmt(stmt, root)?;
  }
  let body_records = lowering.out;

  let saved = callee_saved_in(&body_records);
  let mut frame = align_to(frame_size, STACK_ALIGNMENT);
  if saved.len() % 2 == 1 {
    frame += WORD;
  }

  let instr = |instr: Instruction| OutputRecord::Instruction(instr);
  let mut records = Vec::with_capacity(body_records.len() + 2 * saved.len() + 9);
  records.push(OutputRecord::Label(Label {
    name: signature.name.clone(),
    linkage: Linkage::Global,
  }));
  records.push(instr(Instruction::unary(Opcode::Push, Register::Rbp)));
  records.push(instr(Instruction::binary(Opcode::Mov, Register::Rsp, Register::Rbp)));
  if frame > 0 {
    records.push(instr(Instruction::binary(Opcode::Sub, frame, Register::Rsp)));
  }
  for reg in &saved {
    records.push(instr(Instruction::unary(Opcode::Push, *reg)));
  }

  records.extend(body_records);

  records.push(OutputRecord::Label(Label {
    name: return_label,
    linkage: Linkage::Static,
  }));
  for reg in saved.iter().rev() {
    records.push(instr(Instruction::unary(Opcode::Pop, *reg)));
  }
  records.push(instr(Instruction::binary(Opcode::Mov, Register::Rbp, Register::Rsp)));
  records.push(instr(Instruction::unary(Opcode::Pop, Register::Rbp)));
  records.push(instr(Instruction::nullary(Opcode::Ret)));

  debug!(
    "lowered '{}': {} record(s), {frame}-byte frame, saving {saved:?}",
    signature.name,
    records.len()
  );

  Ok(FunctionCode {
    name: signature.name.clone(),
    records,
  })
}

/// Callee-saved registers the body touches, in a fixed order.
fn callee_saved_in(records: &[OutputRecord]) -> Vec<Register> {
  let used: HashSet<Register> = records
    .iter()
    .filter_map(OutputRecord::instruction)
    .flat_map(|instr| instr.operands())
    .filter_map(Operand::register)
    .filter(|reg| reg.is_callee_saved())
    .collect();
  Register::CALLEE_SAVED
    .into_iter()
    .filter(|reg| used.contains(reg))
    .collect()
}

fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

struct LoopLabels {
  continue_label: String,
  break_label: String,
}

/// Per-function lowering state.
struct Lowering<'a> {
  function: &'a str,
  scopes: &'a mut ScopeTree,
  /// Functions with no body here; they follow the C ABI for return values.
  externals: &'a HashSet<String>,
  labels: &'a mut LabelAllocator,
  out: Vec<OutputRecord>,
  /// The single epilogue every `return` jumps to.
  return_label: String,
  /// Innermost loop last.
  loops: Vec<LoopLabels>,
  /// Words pushed by expression evaluation, for call-site alignment.
  depth: usize,
}

impl Lowering<'_> {
  fn op0(&mut self, opcode: Opcode) {
    self.out.push(OutputRecord::Instruction(Instruction::nullary(opcode)));
  }

  fn op1(&mut self, opcode: Opcode, operand: impl Into<Operand>) {
    self
      .out
      .push(OutputRecord::Instruction(Instruction::unary(opcode, operand)));
  }

  fn op2(&mut self, opcode: Opcode, src: impl Into<Operand>, dst: impl Into<Operand>) {
    self
      .out
      .push(OutputRecord::Instruction(Instruction::binary(opcode, src, dst)));
  }

  fn jump(&mut self, opcode: Opcode, label: &str) {
    self.op1(opcode, Operand::Label(label.to_string()));
  }

  fn label(&mut self, name: &str) {
    self.out.push(OutputRecord::Label(Label {
      name: name.to_string(),
      linkage: Linkage::Static,
    }));
  }

  fn push(&mut self, reg: Register) {
    self.op1(Opcode::Push, reg);
    self.depth += 1;
  }

  fn pop(&mut self, reg: Register) {
    self.op1(Opcode::Pop, reg);
    self.depth -= 1;
  }

  /// Branch to `label` when the accumulator is zero.
  fn jump_if_zero(&mut self, label: &str) {
    self.op2(Opcode::Cmp, 0_i64, ACCUMULATOR);
    self.jump(Opcode::Je, label);
  }

  /// Replace the accumulator with 0/1 according to the last comparison.
  fn set_from_flags(&mut self, set: Opcode) {
    self.op2(Opcode::Mov, 0_i64, ACCUMULATOR);
    self.op1(set, Register::Al);
  }

  /// Promote the binding `name` owned by `scope` and return its slot.
  fn declare(&mut self, scope: ScopeId, name: &str) -> CompileResult<MemoryLocation> {
    let binding = self
      .scopes
      .mark_declared(scope, name)
      .ok_or_else(|| CompileError::internal(format!("no binding for '{name}' in its declaring scope")))?;
    binding
      .location
      .ok_or_else(|| CompileError::internal(format!("'{name}' has no stack slot")))
  }

  /// Slot of the innermost declared binding of `name` visible from `scope`.
  fn resolve(&self, scope: ScopeId, name: &str) -> CompileResult<MemoryLocation> {
    let Some(binding) = self.scopes.lookup_declared(scope, name) else {
      return Err(CompileError::UseBeforeDeclaration {
        function: self.function.to_string(),
        name: name.to_string(),
      });
    };
    binding
      .location
      .ok_or_else(|| CompileError::internal(format!("'{name}' has no stack slot")))
  }

  fn stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> CompileResult<()> {
    match stmt {
      Stmt::Return(value) => {
        if let Some(value) = value {
          self.expr(value, scope)?;
        }
        let target = self.return_label.clone();
        self.jump(Opcode::Jmp, &target);
      }
      Stmt::Declare { name, init, .. } => {
        // The initializer is evaluated before the binding becomes readable.
        if let Some(init) = init {
          self.expr(init, scope)?;
          let slot = self.declare(scope, name)?;
          self.op2(Opcode::Mov, ACCUMULATOR, slot);
        } else {
          self.declare(scope, name)?;
        }
      }
      Stmt::Expression(expr) => self.expr(expr, scope)?,
      Stmt::Block { scope: inner, body } => {
        for stmt in body {
          self.stmt(stmt, *inner)?;
        }
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let else_label = self.labels.mint("else");
        let end_label = self.labels.mint("end");
        self.expr(cond, scope)?;
        self.jump_if_zero(&else_label);
        self.stmt(then_branch, scope)?;
        self.jump(Opcode::Jmp, &end_label);
        self.label(&else_label);
        if let Some(else_branch) = else_branch {
          self.stmt(else_branch, scope)?;
        }
        self.label(&end_label);
      }
      Stmt::While { cond, body } => {
        let begin_label = self.labels.mint("while");
        let end_label = self.labels.mint("break");
        self.label(&begin_label);
        self.expr(cond, scope)?;
        self.jump_if_zero(&end_label);
        self.loop_body(body, scope, &begin_label, &end_label)?;
        self.jump(Opcode::Jmp, &begin_label);
        self.label(&end_label);
      }
      Stmt::DoWhile { body, cond } => {
        let begin_label = self.labels.mint("do");
        let continue_label = self.labels.mint("continue");
        let end_label = self.labels.mint("break");
        self.label(&begin_label);
        self.loop_body(body, scope, &continue_label, &end_label)?;
        self.label(&continue_label);
        self.expr(cond, scope)?;
        self.op2(Opcode::Cmp, 0_i64, ACCUMULATOR);
        self.jump(Opcode::Jne, &begin_label);
        self.label(&end_label);
      }
      Stmt::For {
        scope: inner,
        init,
        cond,
        post,
        body,
      } => {
        if let Some(init) = init {
          self.stmt(init, *inner)?;
        }
        let begin_label = self.labels.mint("for");
        let continue_label = self.labels.mint("continue");
        let end_label = self.labels.mint("break");
        self.label(&begin_label);
        if let Some(cond) = cond {
          self.expr(cond, *inner)?;
          self.jump_if_zero(&end_label);
        }
        self.loop_body(body, *inner, &continue_label, &end_label)?;
        self.label(&continue_label);
        if let Some(post) = post {
          self.expr(post, *inner)?;
        }
        self.jump(Opcode::Jmp, &begin_label);
        self.label(&end_label);
      }
      Stmt::Break => {
        let target = self.innermost_loop()?.break_label.clone();
        self.jump(Opcode::Jmp, &target);
      }
      Stmt::Continue => {
        let target = self.innermost_loop()?.continue_label.clone();
        self.jump(Opcode::Jmp, &target);
      }
      Stmt::Empty => {}
    }
    Ok(())
  }

  fn loop_body(
    &mut self,
    body: &Stmt,
    scope: ScopeId,
    continue_label: &str,
    break_label: &str,
  ) -> CompileResult<()> {
    self.loops.push(LoopLabels {
      continue_label: continue_label.to_string(),
      break_label: break_label.to_string(),
    });
    let result = self.stmt(body, scope);
    self.loops.pop();
    result
  }

  fn innermost_loop(&self) -> CompileResult<&LoopLabels> {
    self
      .loops
      .last()
      .ok_or_else(|| CompileError::internal("loop control statement outside of a loop"))
  }

  fn expr(&mut self, expr: &Expr, scope: ScopeId) -> CompileResult<()> {
    match expr.kind() {
      ExprKind::IntLiteral(value) => self.op2(Opcode::Mov, *value, ACCUMULATOR),
      ExprKind::CharLiteral(value) => self.op2(Opcode::Mov, i64::from(*value), ACCUMULATOR),
      ExprKind::Variable(name) => {
        let slot = self.resolve(scope, name)?;
        self.op2(Opcode::Mov, slot, ACCUMULATOR);
      }
      ExprKind::Parenthesized(inner) => self.expr(inner, scope)?,
      ExprKind::Unary { op, operand } => {
        self.expr(operand, scope)?;
        match op {
          UnaryOp::Neg => self.op1(Opcode::Neg, ACCUMULATOR),
          UnaryOp::BitNot => self.op1(Opcode::Not, ACCUMULATOR),
          UnaryOp::Not => {
            self.op2(Opcode::Cmp, 0_i64, ACCUMULATOR);
            self.set_from_flags(Opcode::Sete);
          }
        }
      }
      ExprKind::Binary {
        op: BinaryOp::LogicalAnd,
        lhs,
        rhs,
      } => self.short_circuit(Opcode::Je, "and", lhs, rhs, scope)?,
      ExprKind::Binary {
        op: BinaryOp::LogicalOr,
        lhs,
        rhs,
      } => self.short_circuit(Opcode::Jne, "or", lhs, rhs, scope)?,
      ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, scope)?,
      ExprKind::Ternary {
        cond,
        then_expr,
        else_expr,
      } => {
        let else_label = self.labels.mint("else");
        let end_label = self.labels.mint("end");
        self.expr(cond, scope)?;
        self.jump_if_zero(&else_label);
        self.expr(then_expr, scope)?;
        self.jump(Opcode::Jmp, &end_label);
        self.label(&else_label);
        self.expr(else_expr, scope)?;
        self.label(&end_label);
      }
      ExprKind::Assign { target, value } => {
        self.expr(value, scope)?;
        let slot = self.resolve(scope, target)?;
        self.op2(Opcode::Mov, ACCUMULATOR, slot);
      }
      ExprKind::Postfix { op, target } => {
        let slot = self.resolve(scope, target)?;
        self.op2(Opcode::Mov, slot, ACCUMULATOR);
        let update = match op {
          PostfixOp::Increment => Opcode::Add,
          PostfixOp::Decrement => Opcode::Sub,
        };
        self.op2(update, 1_i64, slot);
      }
      ExprKind::Call { callee, args } => {
        self.call(callee, args, scope)?;
        if self.externals.contains(callee.as_str()) {
          self.widen_result(expr.ty());
        }
      }
    }
    Ok(())
  }

  /// `&&` skips the right side when the left is zero, `||` when it is not.
  /// Either way the accumulator ends up normalised to 0/1.
  fn short_circuit(
    &mut self,
    skip_on: Opcode,
    tag: &str,
    lhs: &Expr,
    rhs: &Expr,
    scope: ScopeId,
  ) -> CompileResult<()> {
    let end_label = self.labels.mint(&format!("{tag}_end"));
    self.expr(lhs, scope)?;
    self.op2(Opcode::Cmp, 0_i64, ACCUMULATOR);
    self.jump(skip_on, &end_label);
    self.expr(rhs, scope)?;
    self.label(&end_label);
    self.op2(Opcode::Cmp, 0_i64, ACCUMULATOR);
    self.set_from_flags(Opcode::Setne);
    Ok(())
  }

  fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> CompileResult<()> {
    self.expr(lhs, scope)?;
    self.push(ACCUMULATOR);
    self.expr(rhs, scope)?;
    self.pop(SCRATCH);
    // Left operand in %rbx, right operand in %rax.

    match op {
      BinaryOp::Add => self.op2(Opcode::Add, SCRATCH, ACCUMULATOR),
      BinaryOp::Mul => self.op2(Opcode::Imul, SCRATCH, ACCUMULATOR),
      BinaryOp::Sub => {
        self.op2(Opcode::Sub, ACCUMULATOR, SCRATCH);
        self.op2(Opcode::Mov, SCRATCH, ACCUMULATOR);
      }
      BinaryOp::Div | BinaryOp::Mod => {
        self.op2(Opcode::Xchg, SCRATCH, ACCUMULATOR);
        // %rdx may already hold an outgoing argument.
        self.push(Register::Rdx);
        self.op0(Opcode::Cqo);
        self.op1(Opcode::Idiv, SCRATCH);
        if op == BinaryOp::Mod {
          self.op2(Opcode::Mov, Register::Rdx, ACCUMULATOR);
        }
        self.pop(Register::Rdx);
      }
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
        let set = match op {
          BinaryOp::Eq => Opcode::Sete,
          BinaryOp::Ne => Opcode::Setne,
          BinaryOp::Lt => Opcode::Setl,
          BinaryOp::Le => Opcode::Setle,
          BinaryOp::Gt => Opcode::Setg,
          _ => Opcode::Setge,
        };
        self.op2(Opcode::Cmp, ACCUMULATOR, SCRATCH);
        self.set_from_flags(set);
      }
      BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
        return Err(CompileError::internal(format!(
          "'{}' must be lowered with short-circuit evaluation",
          op.symbol()
        )));
      }
    }
    Ok(())
  }

  /// A C callee only defines the low bits of `%rax` for narrow results.
  fn widen_result(&mut self, ty: Type) {
    match ty {
      Type::Int => self.op2(Opcode::Movslq, Register::Eax, ACCUMULATOR),
      Type::Char => self.op2(Opcode::Movsbq, Register::Al, ACCUMULATOR),
      Type::Void => {}
    }
  }

  fn call(&mut self, callee: &str, args: &[Expr], scope: ScopeId) -> CompileResult<()> {
    if args.len() > Register::PARAMETERS.len() {
      return Err(CompileError::internal(format!(
        "call to '{callee}' passes {} arguments",
        args.len()
      )));
    }

    for reg in CALL_CLOBBERED {
      self.push(reg);
    }
    let padded = self.depth % 2 == 1;
    if padded {
      self.op2(Opcode::Sub, WORD, Register::Rsp);
      self.depth += 1;
    }

    for (arg, reg) in args.iter().zip(Register::PARAMETERS) {
      self.expr(arg, scope)?;
      self.op2(Opcode::Mov, ACCUMULATOR, reg);
    }
    self.op1(Opcode::Call, Operand::Label(callee.to_string()));

    if padded {
      self.op2(Opcode::Add, WORD, Register::Rsp);
      self.depth -= 1;
    }
    for reg in CALL_CLOBBERED.into_iter().rev() {
      self.pop(reg);
    }
    Ok(())
  }
}
