//! Instruction records produced by code generation, and the printer that
//! renders them as AT&T x86-64 assembly.
//!
//! The printer performs no validation: every record it receives is already
//! fully resolved (registers, immediates, frame slots and label names).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
  Rax,
  Rbx,
  Rcx,
  Rdx,
  Rsi,
  Rdi,
  Rbp,
  Rsp,
  R8,
  R9,
  R10,
  R11,
  R12,
  R13,
  R14,
  R15,
  /// Low 32 bits of `%rax`, where a C callee leaves an `int`.
  Eax,
  /// Low byte of `%rax`, target of the `set*` family.
  Al,
}

impl Register {
  /// Integer argument registers in System V order.
  pub const PARAMETERS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
  ];

  /// Registers a callee must preserve (besides `%rbp`/`%rsp`).
  pub const CALLEE_SAVED: [Register; 5] = [
    Register::Rbx,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Register::Rax => "%rax",
      Register::Rbx => "%rbx",
      Register::Rcx => "%rcx",
      Register::Rdx => "%rdx",
      Register::Rsi => "%rsi",
      Register::Rdi => "%rdi",
      Register::Rbp => "%rbp",
      Register::Rsp => "%rsp",
      Register::R8 => "%r8",
      Register::R9 => "%r9",
      Register::R10 => "%r10",
      Register::R11 => "%r11",
      Register::R12 => "%r12",
      Register::R13 => "%r13",
      Register::R14 => "%r14",
      Register::R15 => "%r15",
      Register::Eax => "%eax",
      Register::Al => "%al",
    }
  }

  pub fn is_callee_saved(self) -> bool {
    Self::CALLEE_SAVED.contains(&self)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  Mov,
  Movslq,
  Movsbq,
  Add,
  Sub,
  Imul,
  Idiv,
  Cqo,
  Xchg,
  Neg,
  Not,
  Cmp,
  Sete,
  Setne,
  Setl,
  Setle,
  Setg,
  Setge,
  Push,
  Pop,
  Jmp,
  Je,
  Jne,
  Call,
  Ret,
}

impl Opcode {
  pub fn mnemonic(self) -> &'static str {
    match self {
      Opcode::Mov => "movq",
      Opcode::Movslq => "movslq",
      Opcode::Movsbq => "movsbq",
      Opcode::Add => "addq",
      Opcode::Sub => "subq",
      Opcode::Imul => "imulq",
      Opcode::Idiv => "idivq",
      Opcode::Cqo => "cqo",
      Opcode::Xchg => "xchgq",
      Opcode::Neg => "negq",
      Opcode::Not => "notq",
      Opcode::Cmp => "cmpq",
      Opcode::Sete => "sete",
      Opcode::Setne => "setne",
      Opcode::Setl => "setl",
      Opcode::Setle => "setle",
      Opcode::Setg => "setg",
      Opcode::Setge => "setge",
      Opcode::Push => "pushq",
      Opcode::Pop => "popq",
      Opcode::Jmp => "jmp",
      Opcode::Je => "je",
      Opcode::Jne => "jne",
      Opcode::Call => "call",
      Opcode::Ret => "ret",
    }
  }
}

/// A memory operand addressed relative to a base register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
  pub base: Register,
  pub offset: i64,
}

impl MemoryLocation {
  /// A slot in the current stack frame.
  pub fn frame(offset: i64) -> Self {
    Self {
      base: Register::Rbp,
      offset,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
  Register(Register),
  Immediate(i64),
  Memory(MemoryLocation),
  Label(String),
}

impl Operand {
  pub fn register(&self) -> Option<Register> {
    match self {
      Operand::Register(reg) => Some(*reg),
      _ => None,
    }
  }
}

impl From<Register> for Operand {
  fn from(reg: Register) -> Self {
    Operand::Register(reg)
  }
}

impl From<MemoryLocation> for Operand {
  fn from(mem: MemoryLocation) -> Self {
    Operand::Memory(mem)
  }
}

impl From<i64> for Operand {
  fn from(value: i64) -> Self {
    Operand::Immediate(value)
  }
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Register(reg) => f.write_str(reg.name()),
      Operand::Immediate(value) => write!(f, "${value}"),
      Operand::Memory(mem) => write!(f, "{}({})", mem.offset, mem.base.name()),
      Operand::Label(name) => f.write_str(name),
    }
  }
}

/// An opcode with zero, one or two operands. A destination is only ever
/// present together with a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
  opcode: Opcode,
  src: Option<Operand>,
  dst: Option<Operand>,
}

impl Instruction {
  pub fn nullary(opcode: Opcode) -> Self {
    Self {
      opcode,
      src: None,
      dst: None,
    }
  }

  pub fn unary(opcode: Opcode, operand: impl Into<Operand>) -> Self {
    Self {
      opcode,
      src: Some(operand.into()),
      dst: None,
    }
  }

  pub fn binary(opcode: Opcode, src: impl Into<Operand>, dst: impl Into<Operand>) -> Self {
    Self {
      opcode,
      src: Some(src.into()),
      dst: Some(dst.into()),
    }
  }

  pub fn opcode(&self) -> Opcode {
    self.opcode
  }

  /// Iterate over the operands in `src, dst` order.
  pub fn operands(&self) -> impl Iterator<Item = &Operand> {
    self.src.iter().chain(self.dst.iter())
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\t{}", self.opcode.mnemonic())?;
    match (&self.src, &self.dst) {
      (Some(src), Some(dst)) => write!(f, " {src}, {dst}"),
      (Some(src), None) => write!(f, " {src}"),
      _ => Ok(()),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
  /// Visible only inside the compiled unit.
  Static,
  /// Exported with a `.globl` directive.
  Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
  pub name: String,
  pub linkage: Linkage,
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.linkage == Linkage::Global {
      writeln!(f, ".globl {}", self.name)?;
    }
    write!(f, "{}:", self.name)
  }
}

/// One line of generated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRecord {
  Instruction(Instruction),
  Label(Label),
}

impl OutputRecord {
  pub fn instruction(&self) -> Option<&Instruction> {
    match self {
      OutputRecord::Instruction(instr) => Some(instr),
      OutputRecord::Label(_) => None,
    }
  }

  pub fn label(&self) -> Option<&Label> {
    match self {
      OutputRecord::Label(label) => Some(label),
      OutputRecord::Instruction(_) => None,
    }
  }
}

impl fmt::Display for OutputRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutputRecord::Instruction(instr) => instr.fmt(f),
      OutputRecord::Label(label) => label.fmt(f),
    }
  }
}

/// Render a record sequence, one record per line.
pub fn render(records: &[OutputRecord]) -> String {
  let mut asm = String::new();
  for record in records {
    asm.push_str(&record.to_string());
    asm.push('\n');
  }
  asm
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operands_render_per_kind() {
    assert_eq!(Operand::from(Register::R10).to_string(), "%r10");
    assert_eq!(Operand::from(-3_i64).to_string(), "$-3");
    assert_eq!(Operand::from(MemoryLocation::frame(-16)).to_string(), "-16(%rbp)");
    assert_eq!(Operand::Label(".Lend4".into()).to_string(), ".Lend4");
  }

  #[test]
  fn sign_extensions_read_the_narrow_register() {
    let widen = Instruction::binary(Opcode::Movslq, Register::Eax, Register::Rax);
    assert_eq!(widen.to_string(), "\tmovslq %eax, %rax");
    let widen = Instruction::binary(Opcode::Movsbq, Register::Al, Register::Rax);
    assert_eq!(widen.to_string(), "\tmovsbq %al, %rax");
  }

  #[test]
  fn instructions_render_in_source_destination_order() {
    let records = vec![
      OutputRecord::Label(Label {
        name: "main".into(),
        linkage: Linkage::Global,
      }),
      OutputRecord::Instruction(Instruction::binary(Opcode::Mov, 7_i64, Register::Rax)),
      OutputRecord::Instruction(Instruction::unary(Opcode::Push, Register::Rbx)),
      OutputRecord::Label(Label {
        name: ".Lreturn0".into(),
        linkage: Linkage::Static,
      }),
      OutputRecord::Instruction(Instruction::nullary(Opcode::Ret)),
    ];
    insta::assert_snapshot!(render(&records), @r"
    .globl main
    main:
    	movq $7, %rax
    	pushq %rbx
    .Lreturn0:
    	ret
    ");
  }

  #[test]
  fn operand_iteration_follows_source_then_destination() {
    let instr = Instruction::binary(Opcode::Cmp, Register::Rax, Register::Rbx);
    let regs: Vec<_> = instr.operands().filter_map(Operand::register).collect();
    assert_eq!(regs, vec![Register::Rax, Register::Rbx]);
  }
}
