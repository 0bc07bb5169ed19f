//! Name resolution: which scope each name in a module or function body refers to.
//!
//! A [`ScopeTable`] is built per module, function and class body in two passes: the first collects
//! every name the body binds plus its `global`/`nonlocal` declarations, the second classifies every
//! remaining referenced name as [`Binding::External`]. Declarations apply to the whole body,
//! wherever they appear, and nested function bodies are not scanned except to see which names they
//! capture.
//!
//! [`ScopeEnv`] chains tables from the module inward and resolves a name the way Python does,
//! skipping class bodies when looking up from a nested function.

use std::fmt;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::tree::{
    CodeRange, Expr, ExprLoc, FunctionDef, Identifier, Module, Node, Parameters, deep_names, expr_reads, header_reads,
    walk_expr,
};

/// Kind of body a scope table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Module,
    Function,
    Class,
}

/// Where a redirect declaration sends a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectTarget {
    /// `global name`
    Global,
    /// `nonlocal name`: the nearest enclosing function scope that binds it.
    Enclosing,
}

/// Classification of a name within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Bound somewhere in this body (or a parameter) and not redirected.
    Local,
    Redirected(RedirectTarget),
    /// Only read here; looked up in enclosing scopes at run time.
    External,
}

/// Result of resolving a name through the whole scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// A local of the innermost scope.
    Local,
    /// A local of an enclosing function scope.
    Enclosing,
    /// A module-level name.
    Module,
    /// Not bound anywhere visible and named like a builtin.
    Builtin,
    /// Not bound anywhere visible; it can only come from the dynamic module namespace.
    Unknown,
}

/// Calls that read or write the calling frame's namespace.
const DYNAMIC_SCOPE_CALLS: [&str; 4] = ["locals", "vars", "eval", "exec"];

/// Names of Python's builtin functions, types and constants.
const BUILTIN_NAMES: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable",
    "chr", "classmethod", "compile", "complex", "copyright", "credits", "delattr", "dict", "dir", "divmod",
    "enumerate", "eval", "exec", "exit", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len", "license", "list",
    "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum",
    "super", "tuple", "type", "vars", "zip", "__import__", "__build_class__", "__debug__", "__name__", "__doc__",
    "NotImplemented", "Ellipsis", "BaseException", "Exception", "ArithmeticError", "AssertionError",
    "AttributeError", "EOFError", "ImportError", "IndexError", "KeyError", "LookupError", "MemoryError",
    "NameError", "NotImplementedError", "OSError", "OverflowError", "RecursionError", "RuntimeError",
    "StopIteration", "StopAsyncIteration", "SyntaxError", "SystemExit", "TypeError", "UnboundLocalError",
    "ValueError", "ZeroDivisionError", "KeyboardInterrupt", "GeneratorExit", "Warning", "UserWarning",
    "DeprecationWarning", "RuntimeWarning",
];

/// Returns true if `name` is one of Python's builtins.
#[must_use]
pub fn is_builtin_name(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Name classification for one module, function or class body.
#[derive(Debug, Clone)]
pub struct ScopeTable {
    kind: ScopeKind,
    /// Every name bound, declared or read in the body, in first-seen order.
    bindings: IndexMap<String, Binding>,
    params: AHashSet<String>,
    /// Names referenced from nested functions, lambdas, class bodies or generator expressions.
    captured: AHashSet<String>,
    /// Names declared both `global` and `nonlocal`, which Python rejects.
    conflicting: AHashSet<String>,
    /// The body can read or write its own namespace by name (`locals()`, `exec`, star import...).
    dynamic: bool,
}

impl ScopeTable {
    /// Builds the table for a module body.
    #[must_use]
    pub fn for_module(module: &Module) -> Self {
        Self::build(ScopeKind::Module, &Parameters::default(), &module.body)
    }

    /// Builds the table for a body of the given kind. `params` is empty for modules and classes.
    #[must_use]
    pub fn build(kind: ScopeKind, params: &Parameters, body: &[Node]) -> Self {
        let mut bound = Vec::new();
        let mut globals = AHashSet::new();
        let mut nonlocals = AHashSet::new();
        let mut referenced = Vec::new();
        let mut captured = AHashSet::new();
        let mut dynamic = false;
        collect(
            body,
            &mut Collector {
                bound: &mut bound,
                globals: &mut globals,
                nonlocals: &mut nonlocals,
                referenced: &mut referenced,
                captured: &mut captured,
                dynamic: &mut dynamic,
            },
        );

        let mut bindings = IndexMap::new();
        let param_names: AHashSet<String> = params.names().map(str::to_owned).collect();
        // Pass 1: parameters and bound names are local unless redirected
        for name in params.names().chain(bound.iter().map(String::as_str)) {
            bindings.entry(name.to_owned()).or_insert(Binding::Local);
        }
        if kind != ScopeKind::Module {
            for name in &globals {
                bindings.insert(name.clone(), Binding::Redirected(RedirectTarget::Global));
            }
            for name in &nonlocals {
                bindings.insert(name.clone(), Binding::Redirected(RedirectTarget::Enclosing));
            }
        }
        // Pass 2: everything else is external
        for name in referenced {
            bindings.entry(name).or_insert(Binding::External);
        }
        let conflicting = globals.intersection(&nonlocals).cloned().collect();
        Self {
            kind,
            bindings,
            params: param_names,
            captured,
            conflicting,
            dynamic,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Binding of `name` here; names the body never mentions are external.
    #[must_use]
    pub fn binding(&self, name: &str) -> Binding {
        self.bindings.get(name).copied().unwrap_or(Binding::External)
    }

    #[must_use]
    pub fn is_local(&self, name: &str) -> bool {
        self.binding(name) == Binding::Local
    }

    #[must_use]
    pub fn is_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    #[must_use]
    pub fn is_redirected(&self, name: &str) -> bool {
        matches!(self.binding(name), Binding::Redirected(_))
    }

    #[must_use]
    pub fn is_captured(&self, name: &str) -> bool {
        self.captured.contains(name)
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Does the body mention `name` at all?
    #[must_use]
    pub fn mentions(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Every classified name with its binding.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Binding)> {
        self.bindings.iter().map(|(name, binding)| (name.as_str(), *binding))
    }

    /// Names declared `global` or `nonlocal`.
    pub fn redirected(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, binding)| matches!(binding, Binding::Redirected(_)))
            .map(|(name, _)| name)
    }

    /// Names referenced from nested scopes.
    pub fn captured(&self) -> impl Iterator<Item = &str> {
        self.captured.iter().map(String::as_str)
    }

    /// Names local to this scope.
    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, binding)| *binding == Binding::Local)
            .map(|(name, _)| name)
    }

    /// Can a store to `name` be observed outside the normal flow of this body?
    ///
    /// True for module and class scopes, redirected and captured names, and every name in a
    /// dynamic scope.
    #[must_use]
    pub fn store_is_observable(&self, name: &str) -> bool {
        self.kind != ScopeKind::Function || self.dynamic || !self.is_local(name) || self.is_captured(name)
    }
}

struct Collector<'c> {
    bound: &'c mut Vec<String>,
    globals: &'c mut AHashSet<String>,
    nonlocals: &'c mut AHashSet<String>,
    referenced: &'c mut Vec<String>,
    captured: &'c mut AHashSet<String>,
    dynamic: &'c mut bool,
}

fn collect(body: &[Node], c: &mut Collector<'_>) {
    for node in body {
        c.bound.extend(node.header_bindings().into_iter().map(str::to_owned));
        c.referenced.extend(header_reads(node).into_iter().map(str::to_owned));
        for expr in node.header_exprs() {
            scan_expr(expr, c);
        }
        match node {
            Node::Global { names, .. } => {
                c.globals.extend(names.iter().map(|n| n.name.clone()));
                c.referenced.extend(names.iter().map(|n| n.name.clone()));
            }
            Node::Nonlocal { names, .. } => {
                c.nonlocals.extend(names.iter().map(|n| n.name.clone()));
                c.referenced.extend(names.iter().map(|n| n.name.clone()));
            }
            Node::ImportFrom { names, .. } if names.iter().any(|alias| alias.name == "*") => *c.dynamic = true,
            Node::FunctionDef(f) => c.captured.extend(free_names(f).into_iter().map(str::to_owned)),
            Node::ClassDef(cls) => {
                let mut names = Vec::new();
                deep_names(&cls.body, &mut names);
                c.captured.extend(names.into_iter().map(str::to_owned));
            }
            _ => {}
        }
        for block in node.blocks() {
            collect(block, c);
        }
    }
}

/// Names a nested function reads, writes or declares `nonlocal` from its enclosing scopes.
///
/// Includes names used only by functions nested deeper still.
pub fn free_names(function: &FunctionDef) -> Vec<&str> {
    let inner = ScopeTable::build(ScopeKind::Function, &function.params, &function.body);
    let mut names = Vec::new();
    deep_names(&function.body, &mut names);
    names.retain(|name| !matches!(inner.binding(name), Binding::Local | Binding::Redirected(RedirectTarget::Global)));
    names
}

/// Records captures by lambdas and generator expressions, and calls that make the scope dynamic.
fn scan_expr(expr: &ExprLoc, c: &mut Collector<'_>) {
    walk_expr(expr, &mut |e| match &e.expr {
        Expr::Lambda { .. } | Expr::GeneratorExp { .. } => {
            let mut reads = Vec::new();
            expr_reads(e, &mut reads);
            c.captured.extend(reads.into_iter().map(str::to_owned));
        }
        Expr::Call { func, args, keywords } => {
            if let Some(name) = func.as_name()
                && (DYNAMIC_SCOPE_CALLS.contains(&name) || (name == "dir" && args.is_empty() && keywords.is_empty()))
            {
                *c.dynamic = true;
            }
        }
        _ => {}
    });
}

/// A chain of scope tables from the module (first) to the current scope (last).
#[derive(Debug, Clone)]
pub struct ScopeEnv<'a> {
    chain: Vec<&'a ScopeTable>,
}

impl<'a> ScopeEnv<'a> {
    /// Starts a chain at the module scope.
    #[must_use]
    pub fn new(module: &'a ScopeTable) -> Self {
        Self { chain: vec![module] }
    }

    /// Returns a chain extended with a nested scope.
    #[must_use]
    pub fn push<'b>(&self, table: &'b ScopeTable) -> ScopeEnv<'b>
    where
        'a: 'b,
    {
        let mut chain: Vec<&'b ScopeTable> = self.chain.clone();
        chain.push(table);
        ScopeEnv { chain }
    }

    /// The innermost scope.
    #[must_use]
    pub fn current(&self) -> &'a ScopeTable {
        self.chain[self.chain.len() - 1]
    }

    /// Resolves `name` as read from the innermost scope.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Resolution {
        let last = self.chain.len() - 1;
        let current = self.chain[last];
        if current.kind == ScopeKind::Module {
            return self.resolve_module(name);
        }
        match current.binding(name) {
            Binding::Local => Resolution::Local,
            Binding::Redirected(RedirectTarget::Global) => self.resolve_module(name),
            Binding::Redirected(RedirectTarget::Enclosing) => self.resolve_enclosing(name, last, true),
            Binding::External => self.resolve_enclosing(name, last, false),
        }
    }

    /// Walks outward from `from`, skipping class bodies, until a function binds `name` or the module
    /// is reached. `nonlocal` names never fall through to the module.
    fn resolve_enclosing(&self, name: &str, from: usize, nonlocal: bool) -> Resolution {
        for table in self.chain[1..from].iter().rev() {
            if table.kind != ScopeKind::Function {
                continue;
            }
            match table.binding(name) {
                Binding::Local => return Resolution::Enclosing,
                Binding::Redirected(RedirectTarget::Global) if !nonlocal => return self.resolve_module(name),
                Binding::Redirected(RedirectTarget::Global) => return Resolution::Unknown,
                Binding::Redirected(RedirectTarget::Enclosing) | Binding::External => {}
            }
        }
        if nonlocal {
            Resolution::Unknown
        } else {
            self.resolve_module(name)
        }
    }

    fn resolve_module(&self, name: &str) -> Resolution {
        let module = self.chain[0];
        if module.is_local(name) {
            Resolution::Module
        } else if module.dynamic {
            Resolution::Unknown
        } else if is_builtin_name(name) {
            Resolution::Builtin
        } else {
            Resolution::Unknown
        }
    }
}

/// A tree that breaks Python's scoping rules.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NonlocalAtModuleLevel { name: String, position: CodeRange },
    NonlocalWithoutBinding { name: String, position: CodeRange },
    GlobalAndNonlocal { name: String, position: CodeRange },
    ParameterRedirected { name: String, position: CodeRange },
    ReturnOutsideFunction { position: CodeRange },
}

impl ValidationError {
    #[must_use]
    pub fn position(&self) -> CodeRange {
        match self {
            Self::NonlocalAtModuleLevel { position, .. }
            | Self::NonlocalWithoutBinding { position, .. }
            | Self::GlobalAndNonlocal { position, .. }
            | Self::ParameterRedirected { position, .. }
            | Self::ReturnOutsideFunction { position } => *position,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: ", self.position().start.line, self.position().start.column)?;
        match self {
            Self::NonlocalAtModuleLevel { name, .. } => {
                write!(f, "nonlocal declaration of '{name}' not allowed at module level")
            }
            Self::NonlocalWithoutBinding { name, .. } => write!(f, "no binding for nonlocal '{name}' found"),
            Self::GlobalAndNonlocal { name, .. } => write!(f, "name '{name}' is nonlocal and global"),
            Self::ParameterRedirected { name, .. } => write!(f, "name '{name}' is parameter and global or nonlocal"),
            Self::ReturnOutsideFunction { .. } => write!(f, "'return' outside function"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Checks the scoping rules Python enforces at compile time.
pub fn validate(module: &Module) -> Result<(), ValidationError> {
    let table = ScopeTable::for_module(module);
    let env = ScopeEnv::new(&table);
    validate_body(&module.body, &env, &Parameters::default())
}

fn validate_body(body: &[Node], env: &ScopeEnv<'_>, params: &Parameters) -> Result<(), ValidationError> {
    let table = env.current();
    for node in body {
        match node {
            Node::Nonlocal { names, .. } => {
                for ident in names {
                    validate_nonlocal(ident, env)?;
                }
            }
            Node::Global { names, .. } => {
                for ident in names {
                    if table.kind == ScopeKind::Function && params.names().any(|p| p == ident.name) {
                        return Err(ValidationError::ParameterRedirected {
                            name: ident.name.clone(),
                            position: ident.position,
                        });
                    }
                }
            }
            Node::Return { position, .. } if table.kind != ScopeKind::Function => {
                return Err(ValidationError::ReturnOutsideFunction { position: *position });
            }
            Node::FunctionDef(f) => {
                let inner = ScopeTable::build(ScopeKind::Function, &f.params, &f.body);
                validate_body(&f.body, &env.push(&inner), &f.params)?;
            }
            Node::ClassDef(c) => {
                let inner = ScopeTable::build(ScopeKind::Class, &Parameters::default(), &c.body);
                validate_body(&c.body, &env.push(&inner), &Parameters::default())?;
            }
            _ => {}
        }
        for block in node.blocks() {
            validate_body(block, env, params)?;
        }
    }
    Ok(())
}

fn validate_nonlocal(ident: &Identifier, env: &ScopeEnv<'_>) -> Result<(), ValidationError> {
    let table = env.current();
    let name = ident.name.clone();
    let position = ident.position;
    if env.chain.len() == 1 || (table.kind == ScopeKind::Class && env.chain.len() == 2) {
        return Err(ValidationError::NonlocalAtModuleLevel { name, position });
    }
    if table.kind == ScopeKind::Function && table.is_param(&ident.name) {
        return Err(ValidationError::ParameterRedirected { name, position });
    }
    if table.conflicting.contains(&ident.name) {
        return Err(ValidationError::GlobalAndNonlocal { name, position });
    }
    let from = env.chain.len() - 1;
    if env.resolve_enclosing(&ident.name, from, true) != Resolution::Enclosing {
        return Err(ValidationError::NonlocalWithoutBinding { name, position });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn function_table(code: &str) -> ScopeTable {
        let module = parse(code).unwrap();
        match &module.body[0] {
            Node::FunctionDef(f) => ScopeTable::build(ScopeKind::Function, &f.params, &f.body),
            other => panic!("expected a function, got {}", other.kind()),
        }
    }

    #[test]
    fn declarations_apply_to_the_whole_body() {
        let table = function_table("def f(a):\n    x = a\n    if a:\n        global x\n    y = z\n");
        assert_eq!(table.binding("a"), Binding::Local);
        assert!(table.is_param("a"));
        assert_eq!(table.binding("x"), Binding::Redirected(RedirectTarget::Global));
        assert_eq!(table.binding("y"), Binding::Local);
        assert_eq!(table.binding("z"), Binding::External);
        assert!(!table.mentions("w"));
    }

    #[test]
    fn nested_functions_capture_free_names() {
        let table = function_table(
            "def f():\n    x = 1\n    y = 2\n    z = 3\n    def g():\n        y = 5\n        return x + y\n    h = lambda: z\n    return g\n",
        );
        assert!(table.is_captured("x"));
        assert!(!table.is_captured("y"));
        assert!(table.is_captured("z"));
        assert!(table.store_is_observable("x"));
        assert!(!table.store_is_observable("y"));
    }

    #[test]
    fn nonlocal_names_in_nested_functions_are_captured() {
        let table = function_table("def f():\n    n = 0\n    def inc():\n        nonlocal n\n        n = n + 1\n    return inc\n");
        assert!(table.is_captured("n"));
    }

    #[test]
    fn namespace_access_makes_the_scope_dynamic() {
        assert!(function_table("def f():\n    x = 1\n    return locals()\n").is_dynamic());
        assert!(function_table("def f():\n    return dir()\n").is_dynamic());
        assert!(!function_table("def f(o):\n    return dir(o)\n").is_dynamic());
        let module = parse("from os import *\n").unwrap();
        assert!(ScopeTable::for_module(&module).is_dynamic());
    }

    #[test]
    fn resolution_skips_class_bodies() {
        let module = parse("x = 1\nclass C:\n    y = 2\n    def m(self):\n        return y\n").unwrap();
        let module_table = ScopeTable::for_module(&module);
        let Node::ClassDef(class) = &module.body[1] else { panic!("expected a class") };
        let class_table = ScopeTable::build(ScopeKind::Class, &Parameters::default(), &class.body);
        let Node::FunctionDef(method) = &class.body[1] else { panic!("expected a method") };
        let method_table = ScopeTable::build(ScopeKind::Function, &method.params, &method.body);

        let env = ScopeEnv::new(&module_table);
        let class_env = env.push(&class_table);
        let method_env = class_env.push(&method_table);
        assert_eq!(method_env.resolve("self"), Resolution::Local);
        assert_eq!(method_env.resolve("x"), Resolution::Module);
        assert_eq!(method_env.resolve("y"), Resolution::Unknown);
        assert_eq!(method_env.resolve("len"), Resolution::Builtin);
        assert_eq!(class_env.resolve("y"), Resolution::Local);
    }

    #[test]
    fn enclosing_function_locals_resolve_as_enclosing() {
        let module = parse("def f():\n    a = 1\n    def g():\n        return a\n").unwrap();
        let module_table = ScopeTable::for_module(&module);
        let Node::FunctionDef(outer) = &module.body[0] else { panic!("expected a function") };
        let outer_table = ScopeTable::build(ScopeKind::Function, &outer.params, &outer.body);
        let Node::FunctionDef(inner) = &outer.body[1] else { panic!("expected a function") };
        let inner_table = ScopeTable::build(ScopeKind::Function, &inner.params, &inner.body);
        let env = ScopeEnv::new(&module_table);
        let outer_env = env.push(&outer_table);
        let inner_env = outer_env.push(&inner_table);
        assert_eq!(inner_env.resolve("a"), Resolution::Enclosing);
        assert_eq!(inner_env.resolve("f"), Resolution::Module);
    }

    #[test]
    fn shadowed_builtins_resolve_to_the_module() {
        let module = parse("def len(x):\n    return 0\n").unwrap();
        let table = ScopeTable::for_module(&module);
        let env = ScopeEnv::new(&table);
        assert_eq!(env.resolve("len"), Resolution::Module);
        assert_eq!(env.resolve("abs"), Resolution::Builtin);
        assert_eq!(env.resolve("undefined_thing"), Resolution::Unknown);
    }

    #[test]
    fn validation_rejects_bad_declarations() {
        let cases = [
            ("nonlocal x\n", "1:9: nonlocal declaration of 'x' not allowed at module level"),
            ("def f():\n    nonlocal x\n", "2:13: no binding for nonlocal 'x' found"),
            ("def f(a):\n    global a\n", "2:11: name 'a' is parameter and global or nonlocal"),
            ("return 1\n", "1:0: 'return' outside function"),
        ];
        for (code, expected) in cases {
            let module = parse(code).unwrap();
            let err = validate(&module).unwrap_err();
            assert_eq!(err.to_string(), expected, "for {code:?}");
        }
    }

    #[test]
    fn global_and_nonlocal_conflict() {
        let module = parse("def f():\n    x = 1\n    def g():\n        global x\n        nonlocal x\n").unwrap();
        assert!(matches!(
            validate(&module),
            Err(ValidationError::GlobalAndNonlocal { name, .. }) if name == "x"
        ));
    }

    #[test]
    fn nonlocal_skips_functions_without_a_binding() {
        let code = "def a():\n    x = 1\n    def b():\n        def c():\n            nonlocal x\n            x = 2\n        return c\n    return b\n";
        let module = parse(code).unwrap();
        assert_eq!(validate(&module), Ok(()));
        let module_table = ScopeTable::for_module(&module);
        let Node::FunctionDef(a) = &module.body[0] else { panic!("expected a function") };
        let a_table = ScopeTable::build(ScopeKind::Function, &a.params, &a.body);
        let Node::FunctionDef(b) = &a.body[1] else { panic!("expected a function") };
        let b_table = ScopeTable::build(ScopeKind::Function, &b.params, &b.body);
        let Node::FunctionDef(c) = &b.body[0] else { panic!("expected a function") };
        let c_table = ScopeTable::build(ScopeKind::Function, &c.params, &c.body);
        let env = ScopeEnv::new(&module_table);
        let a_env = env.push(&a_table);
        let b_env = a_env.push(&b_table);
        let c_env = b_env.push(&c_table);
        assert_eq!(c_table.binding("x"), Binding::Redirected(RedirectTarget::Enclosing));
        assert_eq!(c_env.resolve("x"), Resolution::Enclosing);
        assert!(a_table.is_captured("x"));
    }

    #[test]
    fn valid_nonlocal_passes() {
        let code = "def f():\n    n = 0\n    def g():\n        nonlocal n\n        n += 1\n    return g\n";
        let module = parse(code).unwrap();
        assert_eq!(validate(&module), Ok(()));
    }
}
