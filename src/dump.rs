//! Human-readable views of the front-end output, used by `--dump-tokens`
//! and `--dump-ast`.

use crate::ast::{Expr, ExprKind, FunctionRecord, Program, Stmt};
use crate::error::Position;
use crate::tokenizer::{Token, TokenKind, token_text};

const INDENT: &str = "  ";

/// One token per line: position, token class and source text.
pub fn dump_tokens(tokens: &[Token], source: &str) -> String {
  let mut out = String::new();
  for token in tokens {
    let class = match token.kind {
      TokenKind::Num(_) => "number",
      TokenKind::Char(_) => "char",
      TokenKind::Ident(_) => "ident",
      TokenKind::Keyword(_) => "keyword",
      TokenKind::Punct(_) => "punct",
    };
    let pos = Position::locate(source, token.loc);
    out.push_str(&format!("{pos}\t{class}\t{}\n", token_text(token, source)));
  }
  out
}

/// Indented tree of every function, statement and typed expression.
pub fn dump_program(program: &Program) -> String {
  let mut printer = Printer::default();
  for record in program.functions() {
    printer.function(record);
  }
  printer.out
}

#[derive(Default)]
struct Printer {
  out: String,
}

impl Printer {
  fn line(&mut self, depth: usize, text: &str) {
    for _ in 0..depth {
      self.out.push_str(INDENT);
    }
    self.out.push_str(text);
    self.out.push('\n');
  }

  fn function(&mut self, record: &FunctionRecord) {
    let signature = &record.signature;
    let params = if signature.params.is_empty() {
      "void".to_string()
    } else {
      signature
        .params
        .iter()
        .map(|param| format!("{} {}", param.ty, param.name))
        .collect::<Vec<_>>()
        .join(", ")
    };
    let mut header = format!(
      "function {}({params}) -> {}",
      signature.name, signature.return_type
    );

    match &record.body {
      Some(body) => {
        self.line(0, &header);
        for stmt in body {
          self.stmt(stmt, 1);
        }
      }
      None => {
        header.push_str(" [declaration]");
        self.line(0, &header);
      }
    }
  }

  fn stmt(&mut self, stmt: &Stmt, depth: usize) {
    match stmt {
      Stmt::Return(value) => {
        self.line(depth, "return");
        if let Some(value) = value {
          self.expr(value, depth + 1);
        }
      }
      Stmt::Declare { name, ty, init } => {
        self.line(depth, &format!("declare {ty} {name}"));
        if let Some(init) = init {
          self.expr(init, depth + 1);
        }
      }
      Stmt::Expression(expr) => {
        self.line(depth, "expr");
        self.expr(expr, depth + 1);
      }
      Stmt::Block { body, .. } => {
        self.line(depth, "block");
        for stmt in body {
          self.stmt(stmt, depth + 1);
        }
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        self.line(depth, "if");
        self.expr(cond, depth + 1);
        self.stmt(then_branch, depth + 1);
        if let Some(else_branch) = else_branch {
          self.line(depth + 1, "else");
          self.stmt(else_branch, depth + 2);
        }
      }
      Stmt::For {
        init,
        cond,
        post,
        body,
        ..
      } => {
        self.line(depth, "for");
        if let Some(init) = init {
          self.line(depth + 1, "init");
          self.stmt(init, depth + 2);
        }
        if let Some(cond) = cond {
          self.line(depth + 1, "cond");
          self.expr(cond, depth + 2);
        }
        if let Some(post) = post {
          self.line(depth + 1, "post");
          self.expr(post, depth + 2);
        }
        self.line(depth + 1, "body");
        self.stmt(body, depth + 2);
      }
      Stmt::While { cond, body } => {
        self.line(depth, "while");
        self.expr(cond, depth + 1);
        self.stmt(body, depth + 1);
      }
      Stmt::DoWhile { body, cond } => {
        self.line(depth, "do-while");
        self.stmt(body, depth + 1);
        self.expr(cond, depth + 1);
      }
      Stmt::Break => self.line(depth, "break"),
      Stmt::Continue => self.line(depth, "continue"),
      Stmt::Empty => self.line(depth, "empty"),
    }
  }

  fn expr(&mut self, expr: &Expr, depth: usize) {
    let ty = expr.ty();
    match expr.kind() {
      ExprKind::IntLiteral(value) => self.line(depth, &format!("int {value} : {ty}")),
      ExprKind::CharLiteral(value) => {
        self.line(depth, &format!("char '{}' : {ty}", value.escape_ascii()));
      }
      ExprKind::Variable(name) => self.line(depth, &format!("variable {name} : {ty}")),
      ExprKind::Parenthesized(inner) => {
        self.line(depth, &format!("paren : {ty}"));
        self.expr(inner, depth + 1);
      }
      ExprKind::Unary { op, operand } => {
        self.line(depth, &format!("unary {} : {ty}", op.symbol()));
        self.expr(operand, depth + 1);
      }
      ExprKind::Binary { op, lhs, rhs } => {
        self.line(depth, &format!("binary {} : {ty}", op.symbol()));
        self.expr(lhs, depth + 1);
        self.expr(rhs, depth + 1);
      }
      ExprKind::Ternary {
        cond,
        then_expr,
        else_expr,
      } => {
        self.line(depth, &format!("ternary : {ty}"));
        self.expr(cond, depth + 1);
        self.expr(then_expr, depth + 1);
        self.expr(else_expr, depth + 1);
      }
      ExprKind::Assign { target, value } => {
        self.line(depth, &format!("assign {target} : {ty}"));
        self.expr(value, depth + 1);
      }
      ExprKind::Postfix { op, target } => {
        self.line(depth, &format!("postfix {target}{} : {ty}", op.symbol()));
      }
      ExprKind::Call { callee, args } => {
        self.line(depth, &format!("call {callee} : {ty}"));
        for arg in args {
          self.expr(arg, depth + 1);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn program(source: &str) -> Program {
    parse(tokenize(source).unwrap(), source).unwrap()
  }

  #[test]
  fn dumps_typed_tree() {
    let source = "int putchar(int c);
      char pick(char a, int n) { return n > 0 ? a : 'z'; }
      int main(void) {
        int total = 0;
        for (int i = 0; i < 3; i++) { total += (i); }
        if (total == 3) putchar(10); else { ; }
        do total--; while (!total);
        return -total;
      }";
    insta::assert_snapshot!(dump_program(&program(source)), @r"
    function putchar(int c) -> int [declaration]
    function pick(char a, int n) -> char
      return
        ternary : char
          binary > : int
            variable n : int
            int 0 : int
          variable a : char
          char 'z' : char
    function main(void) -> int
      declare int total
        int 0 : int
      for
        init
          declare int i
            int 0 : int
        cond
          binary < : int
            variable i : int
            int 3 : int
        post
          postfix i++ : int
        body
          block
            expr
              assign total : int
                binary + : int
                  variable total : int
                  paren : int
                    variable i : int
      if
        binary == : int
          variable total : int
          int 3 : int
        expr
          call putchar : int
            int 10 : int
        else
          block
            empty
      do-while
        expr
          postfix total-- : int
        unary ! : int
          variable total : int
      return
        unary - : int
          variable total : int
    ");
  }

  #[test]
  fn dumps_tokens_with_positions() {
    let source = "int x;\nx += 'a';";
    let tokens = tokenize(source).unwrap();
    insta::assert_snapshot!(dump_tokens(&tokens, source), @r"
    1:1	keyword	int
    1:5	ident	x
    1:6	punct	;
    2:1	ident	x
    2:3	punct	+=
    2:6	char	'a'
    2:9	punct	;
    ");
  }
}
