//! End-to-end behavior of the optimizer on small programs: source in, optimized source out.

use pretty_assertions::assert_eq;
use pyprune::{
    OptimizeOptions, Optimizer, PurityTable, hoist_invariants, optimize, optimize_source, parse, remove_useless, render,
};

fn optimized(code: &str) -> String {
    optimize_source(code).unwrap()
}

#[test]
fn dead_loop_and_stores_collapse_to_the_return() {
    let code = "def func():\n    x = 10\n    for i in range(10):\n        x += .5\n        a = x + 7 / .55\n    return 42\n";
    assert_eq!(optimized(code), "def func():\n    return 42\n");
}

#[test]
fn invariant_sum_is_hoisted_into_a_temporary() {
    let code = "def fill_sum(a, x, y):\n    for i in range(len(a)): a[i] = x + y\n";
    assert_eq!(
        optimized(code),
        "def fill_sum(a, x, y):\n    __o_tmp_2 = x + y\n    for i in range(len(a)):\n        a[i] = __o_tmp_2\n"
    );
}

#[test]
fn unread_assignment_is_removed_and_read_ones_kept() {
    let code = "def func():\n    x = 10\n    y = 2\n    a = x + 7 / .55\n    return x + y\n";
    assert_eq!(optimized(code), "def func():\n    x = 10\n    y = 2\n    return x + y\n");
}

#[test]
fn accumulator_read_after_the_loop_survives() {
    let code = "def total(n):\n    t = 0\n    for i in range(n):\n        t = t + i\n    return t\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn value_read_by_the_next_iteration_survives() {
    let code = "def f(n):\n    prev = 0\n    for i in range(n):\n        print(prev)\n        prev = i\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn single_iteration_loop_has_no_back_edge() {
    let code = "def f():\n    prev = 0\n    for i in range(1):\n        print(prev)\n        prev = i\n";
    assert_eq!(
        optimized(code),
        "def f():\n    prev = 0\n    for i in range(1):\n        print(prev)\n"
    );
}

#[test]
fn global_redirect_keeps_the_store() {
    let code = "counter = 0\ndef bump():\n    global counter\n    counter = 5\n";
    assert_eq!(optimized(code), code);
    // without the declaration the store only touches a local
    assert_eq!(
        optimized("counter = 0\ndef bump():\n    counter = 5\n"),
        "counter = 0\ndef bump():\n    pass\n"
    );
}

#[test]
fn nonlocal_redirect_keeps_the_store() {
    let code = "def outer():\n    n = 0\n    def inc():\n        nonlocal n\n        n = n + 1\n    inc()\n    return n\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn captured_locals_are_kept() {
    let code = "def outer():\n    n = 1\n    def get():\n        return n\n    return get\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn impure_expressions_are_never_hoisted() {
    let code = "def f(n, out, x):\n    for i in range(n):\n        out.append(g(x))\n        out[i] = x / 0\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn impure_iterables_block_hoisting() {
    let code = "def f(p, out, x, y):\n    for line in open(p):\n        out[line] = x * y\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn temporaries_are_named_after_the_expression_line() {
    let code = "def f(a, x, y):\n    n = len(a)\n    i = 0\n    while i < n:\n        a[i] = x * y\n        i += 1\n";
    assert_eq!(
        optimized(code),
        "def f(a, x, y):\n    n = len(a)\n    i = 0\n    __o_tmp_5 = x * y\n    while i < n:\n        a[i] = __o_tmp_5\n        i += 1\n"
    );
}

#[test]
fn optimize_is_idempotent() {
    let sources = [
        "def func():\n    x = 10\n    for i in range(10):\n        x += .5\n        a = x + 7 / .55\n    return 42\n",
        "def fill_sum(a, x, y):\n    for i in range(len(a)): a[i] = x + y\n",
        "def f(m, a, b):\n    for row in m:\n        for j in row:\n            row[j] = a * b\n    unused = 3\n",
        "x = 1\ny = x * 2\nfor i in range(3):\n    print(x + y)\n",
    ];
    for source in sources {
        let once = optimize(parse(source).unwrap()).unwrap();
        let twice = optimize(once.clone()).unwrap();
        assert_eq!(twice, once, "not idempotent for {source:?}");
    }
}

#[test]
fn single_pass_entry_points() {
    let code = "def f(a, x, y):\n    unused = 1\n    for i in a: a[i] = x + y\n";
    let module = remove_useless(parse(code).unwrap()).unwrap();
    assert_eq!(render(&module), "def f(a, x, y):\n    for i in a:\n        a[i] = x + y\n");
    let module = hoist_invariants(module).unwrap();
    assert_eq!(
        render(&module),
        "def f(a, x, y):\n    __o_tmp_3 = x + y\n    for i in a:\n        a[i] = __o_tmp_3\n"
    );
}

#[test]
fn removing_a_binding_never_exposes_an_outer_name() {
    let code = "x = 1\ndef f(flag):\n    if flag:\n        x = 2\n    x = 3\n    return x\n";
    assert_eq!(optimized(code), "x = 1\ndef f(flag):\n    x = 3\n    return x\n");
    // `x` has to stay local so the read still raises UnboundLocalError
    let code = "x = 1\ndef f():\n    print(x)\n    x = 2\n";
    assert_eq!(optimized(code), code);
}

#[test]
fn docstrings_and_effects_survive() {
    let code = "def f():\n    'doc'\n    print('hi')\n    'not a docstring'\n    return None\n";
    assert_eq!(optimized(code), "def f():\n    'doc'\n    print('hi')\n    return None\n");
}

#[test]
fn dead_loop_over_an_impure_but_safe_iterable_keeps_the_evaluation() {
    let code = "def f(xs):\n    for x in [g(v) for v in xs]:\n        pass\n    return 0\n";
    assert_eq!(optimized(code), "def f(xs):\n    [g(v) for v in xs]\n    return 0\n");
}

#[test]
fn vouched_globals_count_as_pure() {
    let code = "def helper(v):\n    return v\ndef f(n):\n    t = helper(n)\n    return n\n";
    assert_eq!(optimized(code), code);
    let options = OptimizeOptions::new().with_purity(PurityTable::default().with_pure_global("helper"));
    let mut optimizer = Optimizer::new(options);
    assert_eq!(
        optimizer.optimize_source(code).unwrap(),
        "def helper(v):\n    return v\ndef f(n):\n    return n\n"
    );
}

#[test]
fn replaced_dead_loop_keeps_a_target_read_before_it() {
    // dropping the loop would make `print(i)` see the module `i` instead of raising
    let code = "i = 1\ndef f(xs):\n    print(i)\n    for i in [g(v) for v in xs]:\n        pass\n";
    assert_eq!(optimized(code), code);
    assert_eq!(
        optimized("i = 1\ndef f(xs):\n    for i in [g(v) for v in xs]:\n        pass\n"),
        "i = 1\ndef f(xs):\n    [g(v) for v in xs]\n"
    );
}

#[test]
fn comprehension_iterable_reads_the_enclosing_name() {
    let code = "def f():\n    x = [1, 2]\n    return [x for x in x]\n";
    assert_eq!(optimized(code), code);
    assert_eq!(
        optimized("def f(xs):\n    y = 3\n    return [y for y in xs]\n"),
        "def f(xs):\n    return [y for y in xs]\n"
    );
}

#[test]
fn iterator_arguments_are_never_consumed_away() {
    let code = "def f(it):\n    t = tuple(it)\n    return next(it)\n";
    assert_eq!(optimized(code), code);
    let code = "def f(it, t):\n    for i in range(3):\n        t = t + sum(it)\n    return t\n";
    assert_eq!(optimized(code), code);
    assert_eq!(
        optimized("def f():\n    t = tuple([1, 2])\n    return 0\n"),
        "def f():\n    return 0\n"
    );
}

#[test]
fn nonlocal_through_an_intermediate_function_keeps_the_store() {
    let code = "def a():\n    x = 1\n    def b():\n        def c():\n            nonlocal x\n            x = 2\n        return c\n    return b\n";
    assert_eq!(optimized(code), code);
}
