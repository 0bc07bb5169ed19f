//! Parsed and optimized trees can be cached as postcard bytes.

use pyprune::{optimize, parse, render, tree::Module};

#[test]
fn optimized_tree_survives_dump_and_load() {
    let source = "def fill_sum(a, x, y):\n    for i in range(len(a)): a[i] = x + y\n";
    let module = optimize(parse(source).unwrap()).unwrap();
    let bytes = module.dump().unwrap();
    let loaded = Module::load(&bytes).unwrap();
    assert_eq!(loaded, module);
    assert_eq!(render(&loaded), render(&module));
}

#[test]
fn loaded_tree_optimizes_like_the_parsed_one() {
    let source = "def func():\n    x = 10\n    y = 2\n    a = x + 7 / .55\n    return x + y\n";
    let parsed = parse(source).unwrap();
    let loaded = Module::load(&parsed.dump().unwrap()).unwrap();
    assert_eq!(optimize(loaded).unwrap(), optimize(parsed).unwrap());
}

#[test]
fn truncated_bytes_are_rejected() {
    let bytes = parse("x = [1, 2, 3]\n").unwrap().dump().unwrap();
    assert!(Module::load(&bytes[..bytes.len() / 2]).is_err());
}
