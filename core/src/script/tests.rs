//! End-to-end tests for the script front end

use std::thread;

use super::*;
use crate::checker::check_program;
use crate::repair::RepairTable;

/* ===================== Helpers ===================== */

struct Run {
    env: Environment<Value>,
    output: OutputBuffers,
    fault: Option<EvalFault>,
}

impl Run {
    fn var(&self, name: &str) -> String {
        self.env
            .get(name)
            .unwrap_or_else(|| panic!("'{}' should be bound", name))
            .to_string()
    }
}

/// Parse, prepare and evaluate statement by statement, stopping at a fault
fn run_with(frontend: &ScriptFrontEnd, text: &str) -> Run {
    let units = frontend.parse(text, "<test>").expect("Parse should succeed");
    let mut env = Environment::new();
    frontend.install_prelude(&mut env, "<test>");
    let mut output = OutputBuffers::default();

    for unit in &units {
        let result = frontend
            .prepare(unit, "<test>")
            .and_then(|compiled| frontend.evaluate(&compiled, &mut env, &mut output));
        if let Err(fault) = result {
            return Run {
                env,
                output,
                fault: Some(fault),
            };
        }
    }
    Run {
        env,
        output,
        fault: None,
    }
}

fn run(text: &str) -> Run {
    run_with(&ScriptFrontEnd::default(), text)
}

fn parse_error(text: &str) -> SyntaxError {
    ScriptFrontEnd::default()
        .parse(text, "<test>")
        .expect_err("Parse should fail")
}

/* ===================== Parsing ===================== */

#[test]
fn test_top_level_statements_are_units() {
    let frontend = ScriptFrontEnd::default();
    let units = frontend
        .parse("x = 1\ndef f(a):\n    return a\n\nprint(f(x))\n", "<test>")
        .unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[1].line, 2);
    assert_eq!(units[2].line, 5);
}

#[test]
fn test_equality_ignores_layout_and_comments() {
    let frontend = ScriptFrontEnd::default();
    let a = frontend.parse("x=1+2\nif x:\n  y = [1,2]\n", "<test>").unwrap();
    let b = frontend
        .parse("# header\n\nx = 1 + 2   # sum\nif x :\n        y = [1, 2]\n", "<test>")
        .unwrap();
    assert_eq!(a, b);

    let c = frontend.parse("x = 1 + 3\n", "<test>").unwrap();
    assert_ne!(a[0], c[0]);
}

#[test]
fn test_missing_colon_is_reported_on_its_line() {
    let err = parse_error("x = 1\nwhile x > 0\n    x -= 1\n");
    assert_eq!(err.line, 2);
    assert_eq!(err.message, "expected ':'");
}

#[test]
fn test_block_structure_errors() {
    let err = parse_error("if True:\nx = 1\n");
    assert_eq!(err.line, 2);
    assert!(err.message.starts_with("expected an indented block"), "{}", err.message);

    let err = parse_error("x = 1\n    y = 2\n");
    assert_eq!(err.line, 2);
    assert_eq!(err.message, "unexpected indent");

    let err = parse_error("if True:\n    x = 1\n  y = 2\n");
    assert_eq!(err.line, 3);
    assert_eq!(err.message, "unindent does not match any outer indentation level");

    let err = parse_error("x = 1\nelse:\n    y = 2\n");
    assert_eq!(err.line, 2);
}

#[test]
fn test_assignment_target_must_be_assignable() {
    let err = parse_error("f() = 3\n");
    assert_eq!(err.line, 1);
    assert_eq!(err.message, "cannot assign to expression");
}

/* ===================== Checking with repair ===================== */

#[test]
fn test_broken_header_is_repaired_into_guard() {
    let frontend = ScriptFrontEnd::default();
    let outcome = check_program(
        &frontend,
        "if x\n  y = 1\n",
        "<test>",
        &RepairTable::default(),
        || false,
    );
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].line, 1);
    assert!(outcome.units.is_some());
    assert_eq!(outcome.repaired, "if True:\n  y = 1\n");

    let repaired = run(&outcome.repaired);
    assert!(repaired.fault.is_none());
    assert_eq!(repaired.var("y"), "1");
}

#[test]
fn test_every_broken_line_is_reported() {
    let frontend = ScriptFrontEnd::default();
    let outcome = check_program(
        &frontend,
        "a = (\nb = 2\nfor i in\n    print(i)\nc = )\n",
        "<test>",
        &RepairTable::default(),
        || false,
    );
    let lines: Vec<usize> = outcome.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 3, 5]);
    assert!(outcome.runnable().is_none());
}

/* ===================== Evaluation ===================== */

#[test]
fn test_prelude_binds_source_id() {
    let result = run("name = __source__\n");
    assert_eq!(result.var("name"), "<test>");
}

#[test]
fn test_arithmetic_and_control_flow() {
    let result = run(
        "total = 0\n\
         for i in range(10):\n\
         \x20   if i % 2 == 0:\n\
         \x20       continue\n\
         \x20   elif i > 7:\n\
         \x20       break\n\
         \x20   total += i\n\
         n = 0\n\
         while n < 5:\n\
         \x20   n = n + 2\n\
         q = 7 // 2\n\
         r = -7 % 3\n\
         f = 7 / 2\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("total"), "16");
    assert_eq!(result.var("n"), "6");
    assert_eq!(result.var("q"), "3");
    assert_eq!(result.var("r"), "2");
    assert_eq!(result.var("f"), "3.5");
}

#[test]
fn test_print_writes_to_stdout() {
    let result = run("print('a', 1, [2, 'b'], None)\nprint()\n");
    assert_eq!(result.output.stdout, "a 1 [2, 'b'] None\n\n");
    assert!(result.output.stderr.is_empty());
}

#[test]
fn test_functions_and_globals() {
    let result = run(
        "count = 0\n\
         def bump(by):\n\
         \x20   global count\n\
         \x20   count += by\n\
         \x20   local = 1\n\
         \x20   return count\n\
         last = bump(2)\n\
         bump(3)\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("count"), "5");
    assert_eq!(result.var("last"), "2");
    assert!(result.env.get("local").is_none());
}

#[test]
fn test_lists_are_shared_by_reference() {
    let result = run(
        "a = [1, 2]\n\
         b = a\n\
         b.append(3)\n\
         a[0] = 10\n\
         last = a.pop()\n\
         n = len(b)\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("b"), "[10, 2]");
    assert_eq!(result.var("last"), "3");
    assert_eq!(result.var("n"), "2");
}

/// Run on a helper thread so a lock taken twice fails the test instead of hanging it
fn run_bounded(text: &'static str) -> Run {
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(run(text));
    });
    rx.recv_timeout(std::time::Duration::from_secs(5))
        .unwrap_or_else(|_| panic!("evaluation did not finish: {:?}", text))
}

#[test]
fn test_list_compared_with_itself() {
    let result = run_bounded(
        "x = [1, 2]
         lt = x < x
         le = x <= x
         same = x == x
",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("lt"), "False");
    assert_eq!(result.var("le"), "True");
    assert_eq!(result.var("same"), "True");
}

#[test]
fn test_self_containing_list_membership() {
    let result = run_bounded(
        "x = [1]
         x.append(x)
         found = x in x
         missing = 2 in x
         nested = [x] < [x]
",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("found"), "True");
    assert_eq!(result.var("missing"), "False");
    assert_eq!(result.var("nested"), "False");
}

#[test]
fn test_classes_methods_and_inheritance() {
    let result = run(
        "class Counter:\n\
         \x20   start = 10\n\
         \x20   def __init__(self, step):\n\
         \x20       self.value = self.start\n\
         \x20       self.step = step\n\
         \x20   def tick(self):\n\
         \x20       self.value += self.step\n\
         \x20       return self.value\n\
         class Double(Counter):\n\
         \x20   def tick(self):\n\
         \x20       self.value += self.step * 2\n\
         \x20       return self.value\n\
         c = Counter(1)\n\
         c.tick()\n\
         d = Double(5)\n\
         d.tick()\n\
         values = [c.value, d.value]\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("values"), "[11, 20]");
}

#[test]
fn test_try_except_finally() {
    let result = run(
        "log = []\n\
         try:\n\
         \x20   log.append('try')\n\
         \x20   x = 1 / 0\n\
         except ValueError:\n\
         \x20   log.append('value')\n\
         except ZeroDivisionError as e:\n\
         \x20   log.append(e.message)\n\
         finally:\n\
         \x20   log.append('finally')\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("log"), "['try', 'division by zero', 'finally']");
}

#[test]
fn test_raise_and_reraise() {
    let result = run(
        "caught = None\n\
         try:\n\
         \x20   raise ValueError('bad value')\n\
         except Exception as e:\n\
         \x20   caught = e\n\
         try:\n\
         \x20   missing\n\
         except NameError:\n\
         \x20   raise\n",
    );
    assert_eq!(result.var("caught"), "bad value");
    let fault = result.fault.expect("re-raised error should escape");
    assert_eq!(fault.kind, "NameError");
    assert_eq!(fault.line, Some(7));
}

#[test]
fn test_fault_carries_line_and_kind() {
    let result = run("a = 1\nb = [1, 2]\n\nc = b[5]\nd = 4\n");
    let fault = result.fault.expect("index error should fault");
    assert_eq!(fault.kind, "IndexError");
    assert_eq!(fault.line, Some(4));
    assert!(result.env.get("d").is_none());
    assert_eq!(
        fault.render("prog.py"),
        "error: IndexError: list index out of range\n  --> prog.py:4\n"
    );
}

#[test]
fn test_type_errors() {
    assert_eq!(run("x = 1 + 'a'\n").fault.unwrap().kind, "TypeError");
    assert_eq!(run("x = 3\nx()\n").fault.unwrap().kind, "TypeError");
    assert_eq!(run("def f(a):\n    pass\nf()\n").fault.unwrap().kind, "TypeError");
    assert_eq!(run("x = None\nx.y = 1\n").fault.unwrap().kind, "AttributeError");
}

#[test]
fn test_misplaced_control_flow_fails_on_prepare() {
    let frontend = ScriptFrontEnd::default();
    let units = frontend.parse("x = 1\nreturn x\n", "<test>").unwrap();
    assert!(frontend.prepare(&units[0], "<test>").is_ok());
    let fault = frontend.prepare(&units[1], "<test>").unwrap_err();
    assert_eq!(fault.kind, "SyntaxError");
    assert_eq!(fault.line, Some(2));

    let units = frontend.parse("while True:\n    def f():\n        break\n", "<test>").unwrap();
    let fault = frontend.prepare(&units[0], "<test>").unwrap_err();
    assert_eq!(fault.line, Some(3));
}

#[test]
fn test_step_limit_stops_runaway_loops() {
    let frontend = ScriptFrontEnd::with_max_steps(1_000);
    let result = run_with(
        &frontend,
        "n = 0\ntry:\n    while True:\n        n += 1\nexcept Exception:\n    n = -1\n",
    );
    let fault = result.fault.clone().expect("infinite loop should be aborted");
    assert_eq!(fault.kind, "StepLimitExceeded");
    assert!(result.var("n").parse::<i64>().unwrap() > 0);
}

#[test]
fn test_step_budget_is_per_statement() {
    let frontend = ScriptFrontEnd::with_max_steps(100);
    let result = run_with(
        &frontend,
        "a = 0\nfor i in range(30):\n    a += 1\nfor i in range(30):\n    a += 1\n",
    );
    assert!(result.fault.is_none(), "{:?}", result.fault);
    assert_eq!(result.var("a"), "60");
}

#[test]
fn test_deep_recursion_is_an_error() {
    // Evaluation recurses on the native stack; give it the worker's headroom
    let handle = thread::Builder::new()
        .stack_size(32 * 1024 * 1024)
        .spawn(|| run("def down(n):\n    return down(n + 1)\ndown(0)\n").fault)
        .unwrap();
    let fault = handle.join().unwrap().expect("recursion should fault");
    assert_eq!(fault.kind, "RecursionError");
    assert_eq!(fault.line, Some(2));
}
