//! tests/integration.rs — batteries d'intégration pour loutre-vm
//!
//! Chaque scénario compile et exécute un programme complet avec un hôte de
//! capture, puis compare la sortie ligne à ligne. Les messages d'erreur
//! runtime font partie du contrat du langage : ils sont vérifiés au
//! caractère près.

use loutre_vm::{CaptureHost, InterpretError, Vm, VmOptions};

// -----------------------------------------------------------------------------
// Helpers de test
// -----------------------------------------------------------------------------

fn run(source: &str) -> (Result<(), InterpretError>, String, String) {
    run_with(VmOptions::default(), source)
}

fn run_with(options: VmOptions, source: &str) -> (Result<(), InterpretError>, String, String) {
    let host = CaptureHost::default();
    let out = host.out.clone();
    let err = host.err.clone();
    let mut vm = Vm::with_options(options).with_host(Box::new(host));
    let result = vm.interpret(source);
    let stdout = out.borrow().clone();
    let stderr = err.borrow().clone();
    (result, stdout, stderr)
}

fn expect_output(source: &str, expected: &str) {
    let (result, stdout, stderr) = run(source);
    assert_eq!(result, Ok(()), "stderr: {stderr}");
    assert_eq!(stdout, expected);
}

fn expect_runtime_error(source: &str, message: &str) -> String {
    let (result, _stdout, stderr) = run(source);
    assert_eq!(result, Err(InterpretError::Runtime));
    assert!(
        stderr.contains(message),
        "attendu {message:?} dans :\n{stderr}"
    );
    stderr
}

// -----------------------------------------------------------------------------
// Scénarios bout en bout
// -----------------------------------------------------------------------------

#[test]
fn arithmetic_precedence() {
    expect_output("print (1 + 2) * 3 - -4;", "13\n");
}

#[test]
fn closure_captures_a_local_past_its_frame() {
    expect_output(
        "fun outer() { var x = \"a\"; fun inner() { print x; } return inner; } outer()();",
        "a\n",
    );
}

#[test]
fn shared_upvalue_accumulates() {
    expect_output(
        "fun make() { var x = 0; fun inc() { x = x + 1; return x; } return inc; } \
         var f = make(); print f(); print f(); print f();",
        "1\n2\n3\n",
    );
}

#[test]
fn class_constructor_and_method() {
    expect_output(
        "class A { init(n) { this.n = n; } greet() { print this.n; } } A(7).greet();",
        "7\n",
    );
}

#[test]
fn method_inheritance_and_super() {
    expect_output(
        "class A { f() { print \"A\"; } } \
         class B < A { f() { super.f(); print \"B\"; } } \
         B().f();",
        "A\nB\n",
    );
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let stderr = expect_runtime_error("fun f(a, b) {} f(1);", "Expected 2 arguments but got 1.");
    assert!(stderr.contains("[line 1] in script"));
}

// -----------------------------------------------------------------------------
// Variables, propriétés, champs
// -----------------------------------------------------------------------------

#[test]
fn assignment_never_creates_a_global() {
    expect_runtime_error("x = 1;", "Undefined variable 'x'.");
}

#[test]
fn reading_an_undefined_global() {
    expect_runtime_error("print absente;", "Undefined variable 'absente'.");
}

#[test]
fn set_then_get_field_roundtrip() {
    expect_output(
        "class Boite {} var b = Boite(); b.v = 41; b.v = b.v + 1; print b.v;",
        "42\n",
    );
}

#[test]
fn property_assignment_leaves_the_value_on_the_stack() {
    expect_output("class A {} var a = A(); print a.x = 5;", "5\n");
}

#[test]
fn callable_field_shadows_the_method() {
    expect_output(
        "class A { m() { return \"méthode\"; } } \
         fun champ() { return \"champ\"; } \
         var a = A(); \
         print a.m(); \
         a.m = champ; \
         print a.m();",
        "méthode\nchamp\n",
    );
}

#[test]
fn bound_method_remembers_its_receiver() {
    expect_output(
        "class A { init(n) { this.n = n; } get() { return this.n; } } \
         var m = A(3).get; \
         print m();",
        "3\n",
    );
}

#[test]
fn properties_on_non_instances() {
    expect_runtime_error("var x = 1; x.y;", "Only instances have properties.");
    expect_runtime_error("var x = 1; x.y = 2;", "Only instances have fields.");
}

#[test]
fn undefined_property_names_the_property() {
    expect_runtime_error(
        "class A {} var a = A(); a.missing;",
        "Undefined property 'missing'.",
    );
}

// -----------------------------------------------------------------------------
// Appels & erreurs d'appel
// -----------------------------------------------------------------------------

#[test]
fn only_functions_and_classes_are_callable() {
    expect_runtime_error("var x = 1; x();", "Can only call functions and classes.");
}

#[test]
fn class_without_init_rejects_arguments() {
    expect_runtime_error("class A {} A(1);", "Expected 0 arguments but got 1.");
}

#[test]
fn superclass_must_be_a_class() {
    expect_runtime_error("var Pas = 1; class B < Pas {}", "Superclass must be a class.");
}

#[test]
fn deep_recursion_overflows_the_frame_stack() {
    expect_runtime_error("fun f() { f(); } f();", "Stack overflow.");
}

#[test]
fn stack_trace_lists_frames_innermost_first() {
    let stderr = expect_runtime_error(
        "fun a() { b(); }\nfun b() { 1 + \"\"; }\na();",
        "Operands must be two numbers or two strings.",
    );
    let lines: Vec<&str> = stderr.lines().collect();
    assert_eq!(lines[0], "Operands must be two numbers or two strings.");
    assert_eq!(lines[1], "[line 2] in b()");
    assert_eq!(lines[2], "[line 1] in a()");
    assert_eq!(lines[3], "[line 3] in script");
}

// -----------------------------------------------------------------------------
// Opérateurs & vérité
// -----------------------------------------------------------------------------

#[test]
fn add_is_overloaded_on_strings() {
    // l'internement rend l'égalité de contenu observable par ==
    expect_output("print \"foo\" + \"bar\" == \"foobar\";", "true\n");
}

#[test]
fn mixed_add_operands_are_rejected() {
    expect_runtime_error("print 1 + \"un\";", "Operands must be two numbers or two strings.");
    expect_runtime_error("print -\"un\";", "Operand must be a number.");
    expect_runtime_error("print true < false;", "Operands must be numbers.");
}

#[test]
fn only_nil_and_false_are_falsey() {
    expect_output(
        "if (0) print \"zéro vrai\"; \
         if (\"\") print \"vide vraie\"; \
         if (nil) print \"?\"; else print \"nil faux\"; \
         if (false) print \"?\"; else print \"false faux\";",
        "zéro vrai\nvide vraie\nnil faux\nfalse faux\n",
    );
}

#[test]
fn comparison_and_equality() {
    expect_output(
        "print 1 < 2; print 2 <= 2; print 3 > 4; print 1 == 1; print 1 != 2; print nil == false;",
        "true\ntrue\nfalse\ntrue\ntrue\nfalse\n",
    );
}

#[test]
fn and_or_short_circuit() {
    expect_output(
        "print nil and oups; print \"gauche\" or oups; print false or \"droite\";",
        "nil\ngauche\ndroite\n",
    );
}

// -----------------------------------------------------------------------------
// Boucles & contrôle
// -----------------------------------------------------------------------------

#[test]
fn while_loop_counts() {
    expect_output(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        "0\n1\n2\n",
    );
}

#[test]
fn for_loop_with_all_clauses() {
    expect_output("for (var i = 0; i < 3; i = i + 1) print i;", "0\n1\n2\n");
}

#[test]
fn fibonacci_end_to_end() {
    expect_output(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
        "55\n",
    );
}

#[test]
fn block_local_capture_closes_on_scope_exit() {
    expect_output(
        "var get; { var enfermee = \"vivante\"; fun lit() { return enfermee; } get = lit; } \
         print get();",
        "vivante\n",
    );
}

// -----------------------------------------------------------------------------
// Formes d'affichage
// -----------------------------------------------------------------------------

#[test]
fn printed_forms_of_every_kind() {
    expect_output(
        "fun f() {} \
         class C { m() {} } \
         var c = C(); \
         print nil; print true; print 2.5; print 13.0; \
         print f; print clock; print C; print c; print c.m;",
        "nil\ntrue\n2.5\n13\n<fn f>\n<native fn>\nC\nC instance\n<fn m>\n",
    );
}

#[test]
fn clock_returns_a_non_negative_number() {
    expect_output("print clock() >= 0;", "true\n");
}

// -----------------------------------------------------------------------------
// Sessions (REPL) & remise à zéro
// -----------------------------------------------------------------------------

#[test]
fn globals_persist_across_interprets() {
    let host = CaptureHost::default();
    let out = host.out.clone();
    let mut vm = Vm::new().with_host(Box::new(host));
    vm.interpret("var x = 10;").expect("déclaration ok");
    vm.interpret("print x;").expect("lecture ok");
    assert_eq!(*out.borrow(), "10\n");
}

#[test]
fn the_vm_recovers_after_a_runtime_error() {
    let host = CaptureHost::default();
    let out = host.out.clone();
    let mut vm = Vm::new().with_host(Box::new(host));
    assert_eq!(vm.interpret("print absente;"), Err(InterpretError::Runtime));
    vm.interpret("print \"toujours là\";").expect("la VM repart propre");
    assert_eq!(*out.borrow(), "toujours là\n");
}

#[test]
fn compile_errors_do_not_reach_execution() {
    let (result, stdout, stderr) = run("print \"avant\"; print ;");
    assert_eq!(result, Err(InterpretError::Compile));
    assert_eq!(stdout, "", "rien ne doit s'exécuter");
    assert!(stderr.contains("Expect expression."));
}

// -----------------------------------------------------------------------------
// GC sous pression
// -----------------------------------------------------------------------------

#[test]
fn stress_gc_full_program() {
    // collecte à chaque allocation : le moindre oubli d'enracinement casse
    let options = VmOptions::default().with_stress_gc(true);
    let (result, stdout, stderr) = run_with(
        options,
        "class Noeud { init(v, suivant) { this.v = v; this.suivant = suivant; } } \
         var tete = nil; \
         for (var i = 0; i < 10; i = i + 1) { tete = Noeud(i, tete); } \
         var somme = 0; \
         var n = tete; \
         while (n != nil) { somme = somme + n.v; n = n.suivant; } \
         print somme; \
         print \"a\" + \"b\" + \"c\";",
    );
    assert_eq!(result, Ok(()), "stderr: {stderr}");
    assert_eq!(stdout, "45\nabc\n");
}
