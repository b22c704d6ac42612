use crate::ast::{BinaryOp, Expr, ExprKind, PostfixOp, Program, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::tokenize;
use crate::ty::Type;

use super::parse;

fn parse_source(source: &str) -> CompileResult<Program> {
  let _ = env_logger::builder().is_test(true).try_init();
  parse(tokenize(source)?, source)
}

fn body<'p>(program: &'p Program, name: &str) -> &'p [Stmt] {
  program
    .get(name)
    .and_then(|record| record.body.as_deref())
    .unwrap()
}

fn semantic_message(source: &str) -> String {
  match parse_source(source) {
    Err(CompileError::Semantic { message, .. }) => message,
    other => panic!("expected a semantic error, got {other:?}"),
  }
}

fn int_var(name: &str) -> Expr {
  Expr::variable(name, Type::Int)
}

#[test]
fn parses_declaration_and_return() {
  let program = parse_source("int main(void) { int x = 2 + 2; return x; }").unwrap();
  assert_eq!(program.len(), 1);

  let sum = Expr::binary(BinaryOp::Add, Expr::int(2), Expr::int(2)).unwrap();
  assert_eq!(
    body(&program, "main"),
    &[
      Stmt::Declare {
        name: "x".into(),
        ty: Type::Int,
        init: Some(sum),
      },
      Stmt::Return(Some(int_var("x"))),
    ]
  );
}

#[test]
fn multiplication_binds_tighter_than_addition() {
  let program = parse_source("int main(void) { return 1 + 2 * 3 - 4; }").unwrap();
  let product = Expr::binary(BinaryOp::Mul, Expr::int(2), Expr::int(3)).unwrap();
  let sum = Expr::binary(BinaryOp::Add, Expr::int(1), product).unwrap();
  let expected = Expr::binary(BinaryOp::Sub, sum, Expr::int(4)).unwrap();
  assert_eq!(body(&program, "main"), &[Stmt::Return(Some(expected))]);
}

#[test]
fn ternary_and_assignment_are_right_associative() {
  let program = parse_source(
    "int main(void) { int a = 0; int b = 0; a = b = 1; return a ? 1 : b ? 2 : 3; }",
  )
  .unwrap();
  let stmts = body(&program, "main");

  let inner = Expr::assign(int_var("b"), Expr::int(1)).unwrap();
  let chained = Expr::assign(int_var("a"), inner).unwrap();
  assert_eq!(stmts[2], Stmt::Expression(chained));

  let nested = Expr::ternary(int_var("b"), Expr::int(2), Expr::int(3)).unwrap();
  let outer = Expr::ternary(int_var("a"), Expr::int(1), nested).unwrap();
  assert_eq!(stmts[3], Stmt::Return(Some(outer)));
}

#[test]
fn logical_or_binds_looser_than_logical_and() {
  let program = parse_source("int main(void) { return 1 || 0 && 0; }").unwrap();
  let and = Expr::binary(BinaryOp::LogicalAnd, Expr::int(0), Expr::int(0)).unwrap();
  let or = Expr::binary(BinaryOp::LogicalOr, Expr::int(1), and).unwrap();
  assert_eq!(body(&program, "main"), &[Stmt::Return(Some(or))]);
}

#[test]
fn compound_assignment_and_prefix_increment_desugar() {
  let program =
    parse_source("int main(void) { int x = 1; x += 2; --x; x++; return x; }").unwrap();
  let stmts = body(&program, "main");

  let plus = Expr::binary(BinaryOp::Add, int_var("x"), Expr::int(2)).unwrap();
  assert_eq!(
    stmts[1],
    Stmt::Expression(Expr::assign(int_var("x"), plus).unwrap())
  );

  let minus = Expr::binary(BinaryOp::Sub, int_var("x"), Expr::int(1)).unwrap();
  assert_eq!(
    stmts[2],
    Stmt::Expression(Expr::assign(int_var("x"), minus).unwrap())
  );

  let Stmt::Expression(post) = &stmts[3] else {
    panic!("expected an expression statement");
  };
  assert!(matches!(
    post.kind(),
    ExprKind::Postfix { op: PostfixOp::Increment, target } if target == "x"
  ));
}

#[test]
fn char_increment_uses_a_char_literal() {
  let program = parse_source("char next(char c) { return ++c; }").unwrap();
  let one = Expr::binary(BinaryOp::Add, Expr::variable("c", Type::Char), Expr::char(1)).unwrap();
  let expected = Expr::assign(Expr::variable("c", Type::Char), one).unwrap();
  assert_eq!(body(&program, "next"), &[Stmt::Return(Some(expected))]);
}

#[test]
fn redeclaration_in_same_scope_fails() {
  let message = semantic_message("int main(void) { int x = 1; int x = 2; return x; }");
  assert_eq!(message, "redeclaration of 'x'");
}

#[test]
fn parameter_and_body_share_a_scope() {
  let message = semantic_message("int f(int a) { int a = 1; return a; }");
  assert_eq!(message, "redeclaration of 'a'");
}

#[test]
fn shadowing_in_nested_scope_is_local_to_it() {
  // The inner `char x` would make `return x` a type error if it leaked.
  let program =
    parse_source("int main(void) { int x = 1; { char x = 'a'; x = 'b'; } return x; }").unwrap();
  let record = program.get("main").unwrap();
  let Stmt::Block { scope, .. } = &body(&program, "main")[1] else {
    panic!("expected a block");
  };
  assert_eq!(record.scopes.local(*scope, "x").unwrap().ty, Type::Char);
  assert_eq!(
    record.scopes.local(record.scopes.root(), "x").unwrap().ty,
    Type::Int
  );
}

#[test]
fn for_loop_variable_lives_in_its_own_scope() {
  let program = parse_source("int main(void) { for (int i = 0; i < 3; i++) { } return 0; }").unwrap();
  let record = program.get("main").unwrap();
  let root = record.scopes.root();
  let Stmt::For { scope, .. } = &body(&program, "main")[0] else {
    panic!("expected a for loop");
  };

  assert_ne!(*scope, root);
  assert_eq!(record.scopes.scope(*scope).parent(), Some(root));
  assert!(record.scopes.local(*scope, "i").is_some());
  assert!(record.scopes.local(root, "i").is_none());
}

#[test]
fn for_loop_variable_is_unreachable_after_the_loop() {
  let message = semantic_message("int main(void) { for (int i = 0; i < 3; i++) { } return i; }");
  assert_eq!(message, "use of undeclared identifier 'i'");
}

#[test]
fn most_negative_int_literal() {
  let program = parse_source("int main(void) { return -2147483648; }").unwrap();
  assert_eq!(
    body(&program, "main"),
    &[Stmt::Return(Some(Expr::int(-2147483648)))]
  );

  let err = parse_source("int main(void) { return 2147483648; }").unwrap_err();
  assert_eq!(
    err.to_string(),
    "1:25: lexical error: integer literal 2147483648 is out of range for 'int'"
  );
  assert!(parse_source("int main(void) { return - -2147483648; }").is_ok());
  assert!(parse_source("int main(void) { return 1 - 2147483648; }").is_err());
}

#[test]
fn self_referencing_initializer_parses() {
  // Rejected later, when the declaration is lowered.
  assert!(parse_source("int main(void) { int x = x; return x; }").is_ok());
}

#[test]
fn shadowing_initializer_is_typed_by_the_outer_binding() {
  let message = semantic_message("int main(void) { int x = 1; { char x = x; } return 0; }");
  assert_eq!(
    message,
    "cannot initialize 'x' of type 'char' with a value of type 'int'"
  );

  assert!(parse_source("int main(void) { char x = 'a'; { char x = x; } return 0; }").is_ok());
}

#[test]
fn forward_declaration_then_matching_definition() {
  let program = parse_source(
    "int add(int a, int b); int main(void) { return add(1, 2); } int add(int x, int y) { return x + y; } int add(int p, int q);",
  )
  .unwrap();
  let names: Vec<_> = program
    .functions()
    .map(|record| record.signature.name.as_str())
    .collect();
  assert_eq!(names, vec!["add", "main"]);
  assert!(program.get("add").unwrap().is_defined());
}

#[test]
fn mismatched_definition_fails() {
  let message = semantic_message("int f(int a); char f(int a) { return 'a'; }");
  assert_eq!(
    message,
    "conflicting declaration of 'f': previously declared as 'int f(int a)'"
  );
  let message = semantic_message("int f(int a); int f(char a);");
  assert!(message.starts_with("conflicting declaration of 'f'"));
}

#[test]
fn second_definition_fails() {
  let message = semantic_message("int f(void) { return 1; } int f(void) { return 2; }");
  assert_eq!(message, "redefinition of function 'f'");
}

#[test]
fn call_to_undeclared_function_fails() {
  let message = semantic_message("int main(void) { return foo(1, 2); }");
  assert_eq!(message, "call to undeclared function 'foo'");
}

#[test]
fn call_arguments_are_checked() {
  let message = semantic_message("int f(int a) { return a; } int main(void) { return f(); }");
  assert_eq!(message, "'f' expects 1 argument(s) but 0 were given");
  let message = semantic_message("int f(int a) { return a; } int main(void) { return f('x'); }");
  assert_eq!(message, "argument 1 of 'f' has type 'char', expected 'int'");
}

#[test]
fn variables_shadow_functions_at_call_sites() {
  let message = semantic_message("int f(void) { return 1; } int main(void) { int f = 2; return f(); }");
  assert_eq!(message, "called object 'f' is not a function");
}

#[test]
fn recursion_sees_its_own_declaration() {
  let source = "int fact(int n) { return n <= 1 ? 1 : n * fact(n - 1); }";
  assert!(parse_source(source).is_ok());
}

#[test]
fn bad_assignment_target_fails() {
  let message = semantic_message("int main(void) { 1 = 2; return 0; }");
  assert_eq!(message, "'=' requires a variable as its target");
  let message = semantic_message("int main(void) { int x = 0; (x + 1) += 2; return 0; }");
  assert_eq!(message, "'+=' requires a variable as its target");
}

#[test]
fn type_mismatches_fail() {
  let message = semantic_message("int main(void) { int x = 'a'; return x; }");
  assert_eq!(
    message,
    "cannot initialize 'x' of type 'int' with a value of type 'char'"
  );
  let message = semantic_message("int main(void) { char c = 'a'; return c; }");
  assert_eq!(message, "returning 'char' from a function returning 'int'");
  let message = semantic_message("void f(void) { return 1; }");
  assert_eq!(message, "void function cannot return a value");
  let message = semantic_message("int f(void) { return; }");
  assert_eq!(message, "non-void function must return a value of type 'int'");
}

#[test]
fn void_values_cannot_be_used() {
  let message = semantic_message("void g(void) { } int main(void) { return g() + 1; }");
  assert_eq!(message, "operand of '+' has type void");
  let message = semantic_message("void g(void) { } int main(void) { if (g()) return 1; return 0; }");
  assert_eq!(message, "condition has type void");
  let message = semantic_message("int main(void) { void v; return 0; }");
  assert_eq!(message, "variable 'v' declared void");
}

#[test]
fn break_and_continue_require_a_loop() {
  let err = parse_source("int main(void) { break; return 0; }").unwrap_err();
  assert!(matches!(err, CompileError::Syntax { .. }));
  assert!(err.to_string().ends_with("'break' outside of a loop"));

  let source = "int main(void) { while (1) { if (1) break; else continue; } do continue; while (0); return 0; }";
  assert!(parse_source(source).is_ok());
}

#[test]
fn too_many_parameters_fail() {
  let message = semantic_message("int f(int a, int b, int c, int d, int e, int g, int h) { return a; }");
  assert_eq!(message, "functions take at most 6 parameters");
}

#[test]
fn syntax_errors_report_the_unexpected_token() {
  let err = parse_source("int main(void) { return 1 }").unwrap_err();
  assert_eq!(
    err.to_string(),
    "1:27: syntax error: expected \";\", but got \"}\""
  );
  let err = parse_source("int main(void) { return 1;").unwrap_err();
  assert!(err.to_string().ends_with("expected \"}\", but got \"EOF\""));
}

#[test]
fn empty_program_fails() {
  let err = parse_source("  // nothing here\n").unwrap_err();
  assert_eq!(err.to_string(), "1:1: syntax error: program is empty");
}

#[test]
fn declarations_are_not_statements() {
  let err = parse_source("int main(void) { if (1) int x = 1; return 0; }").unwrap_err();
  assert!(matches!(err, CompileError::Syntax { .. }));
}
