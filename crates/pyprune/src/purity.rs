//! Side-effect classification of expressions.
//!
//! An expression is *pure* when evaluating it has no observable effect besides producing its
//! value. Operators over pure operands are pure; calls are pure only when the callee is a name the
//! [`PurityTable`] vouches for and that name actually resolves to the builtin (or module function) it
//! was listed for. Everything else, including every call through an attribute, is impure.

use ahash::AHashSet;
use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator};

use crate::{
    scope::{Resolution, ScopeEnv},
    tree::{Comprehension, Expr, ExprLoc, Keyword, Literal, Operator, expr_children, walk_expr},
};

/// Builtin functions and types that have no side effects when called with pure arguments.
///
/// The ones that iterate an argument, like `sum`, also need that argument to be safely iterable.
///
/// Uses strum derives for `Display`, `FromStr` and iteration; variants serialize to lowercase
/// (e.g. `IsInstance` -> "isinstance").
#[derive(Debug, Clone, Copy, Display, EnumString, EnumIter, IntoStaticStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum PureBuiltin {
    Abs,
    Bin,
    Bool,
    Callable,
    Chr,
    Complex,
    Divmod,
    Float,
    Frozenset,
    Hex,
    Int,
    IsInstance,
    IsSubclass,
    Len,
    Max,
    Min,
    Oct,
    Ord,
    Pow,
    Range,
    Repr,
    Round,
    Str,
    Sum,
    Tuple,
    Type,
}

/// Builtins whose call returns a fresh mutable object.
const MUTABLE_CONSTRUCTORS: [&str; 4] = ["list", "dict", "set", "bytearray"];

/// Builtins that iterate their first positional argument, consuming it when it is an iterator.
const CONSUMING_BUILTINS: [&str; 5] = ["frozenset", "max", "min", "sum", "tuple"];

/// The known-pure callables the oracle may rely on.
///
/// This is plain configuration owned by the caller: tests and embedders can build alternative tables
/// without affecting anyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurityTable {
    builtins: AHashSet<String>,
    globals: AHashSet<String>,
}

impl Default for PurityTable {
    fn default() -> Self {
        Self {
            builtins: PureBuiltin::iter().map(|b| b.to_string()).collect(),
            globals: AHashSet::new(),
        }
    }
}

impl PurityTable {
    /// A table with no pure callables at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            builtins: AHashSet::new(),
            globals: AHashSet::new(),
        }
    }

    /// Adds a builtin name that is pure when called with pure arguments.
    #[must_use]
    pub fn with_builtin(mut self, name: impl Into<String>) -> Self {
        self.builtins.insert(name.into());
        self
    }

    /// Adds a module-level function the caller vouches for.
    ///
    /// The entry applies whether the name resolves to a module binding or a builtin, never when a
    /// local or enclosing binding shadows it.
    #[must_use]
    pub fn with_pure_global(mut self, name: impl Into<String>) -> Self {
        self.globals.insert(name.into());
        self
    }

    #[must_use]
    pub fn is_pure_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    #[must_use]
    pub fn is_pure_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }
}

/// Purity queries for expressions in one scope.
#[derive(Debug, Clone, Copy)]
pub struct PurityOracle<'a> {
    table: &'a PurityTable,
    env: &'a ScopeEnv<'a>,
}

impl<'a> PurityOracle<'a> {
    #[must_use]
    pub fn new(table: &'a PurityTable, env: &'a ScopeEnv<'a>) -> Self {
        Self { table, env }
    }

    /// Can evaluating `expr` have an observable effect?
    #[must_use]
    pub fn is_pure(&self, expr: &ExprLoc) -> bool {
        self.pure_in(expr, &mut Vec::new())
    }

    /// Is iterating over the value of `expr` free of user code?
    ///
    /// This says nothing about evaluating `expr` itself; callers check [`Self::is_pure`] separately.
    #[must_use]
    pub fn is_pure_iterable(&self, expr: &ExprLoc) -> bool {
        self.pure_iterable_in(expr, &[])
    }

    fn pure_iterable_in(&self, expr: &ExprLoc, shadowed: &[&str]) -> bool {
        match &expr.expr {
            Expr::Literal(Literal::Str(_) | Literal::Bytes(_)) => true,
            Expr::List(_)
            | Expr::Tuple(_)
            | Expr::Set(_)
            | Expr::Dict(_)
            | Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::DictComp { .. } => true,
            Expr::Call { func, args, keywords } => {
                keywords.is_empty()
                    && func.as_name() == Some("range")
                    && self.callee_is_pure("range", shadowed)
                    && args.iter().all(|arg| !matches!(arg.expr, Expr::Starred(_)))
            }
            _ => false,
        }
    }

    /// Is `expr` pure, and safe to evaluate once instead of once per loop iteration?
    ///
    /// Expressions that build a fresh mutable object are excluded: hoisting them would share one
    /// object between iterations.
    #[must_use]
    pub fn is_hoistable(&self, expr: &ExprLoc) -> bool {
        if !self.is_pure(expr) {
            return false;
        }
        let mut fresh = false;
        walk_expr(expr, &mut |e| match &e.expr {
            Expr::List(_)
            | Expr::Dict(_)
            | Expr::Set(_)
            | Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::DictComp { .. }
            | Expr::GeneratorExp { .. }
            | Expr::Lambda { .. } => fresh = true,
            Expr::Call { func, .. } => {
                if func.as_name().is_some_and(|name| MUTABLE_CONSTRUCTORS.contains(&name)) {
                    fresh = true;
                }
            }
            _ => {}
        });
        !fresh
    }

    /// Number of iterations a `for` loop over `expr` is certain to make, when it is known statically.
    #[must_use]
    pub fn trip_count(&self, expr: &ExprLoc) -> Option<u64> {
        match &expr.expr {
            Expr::List(items) | Expr::Tuple(items) => {
                if items.iter().any(|item| matches!(item.expr, Expr::Starred(_))) {
                    None
                } else {
                    u64::try_from(items.len()).ok()
                }
            }
            Expr::Literal(Literal::Str(s)) => u64::try_from(s.chars().count()).ok(),
            Expr::Literal(Literal::Bytes(b)) => u64::try_from(b.len()).ok(),
            Expr::Call { args, .. } if self.is_pure_iterable(expr) => {
                let bounds: Option<Vec<i64>> = args.iter().map(int_literal).collect();
                match bounds?.as_slice() {
                    [stop] => Some(range_len(0, *stop, 1)),
                    [start, stop] => Some(range_len(*start, *stop, 1)),
                    [start, stop, step] if *step != 0 => Some(range_len(*start, *stop, *step)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Is `expr` a constant: a literal or a display built only from literals?
    #[must_use]
    pub fn is_constant(expr: &ExprLoc) -> bool {
        match &expr.expr {
            Expr::Literal(_) => true,
            Expr::UnaryMinus(inner) | Expr::UnaryPlus(inner) => matches!(inner.expr, Expr::Literal(_)),
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => items.iter().all(Self::is_constant),
            Expr::Dict(items) => items
                .iter()
                .all(|(key, value)| key.as_ref().is_some_and(Self::is_constant) && Self::is_constant(value)),
            _ => false,
        }
    }

    /// Does `name`, called from the current scope, refer to a callable the table vouches for?
    ///
    /// `shadowed` holds names bound by enclosing lambdas and comprehensions, which hide every outer
    /// binding.
    fn callee_is_pure(&self, name: &str, shadowed: &[&str]) -> bool {
        if shadowed.contains(&name) {
            return false;
        }
        match self.env.resolve(name) {
            Resolution::Builtin => self.table.is_pure_builtin(name) || self.table.is_pure_global(name),
            Resolution::Module => self.table.is_pure_global(name),
            Resolution::Local | Resolution::Enclosing | Resolution::Unknown => false,
        }
    }

    fn pure_in<'e>(&self, expr: &'e ExprLoc, shadowed: &mut Vec<&'e str>) -> bool {
        match &expr.expr {
            Expr::Literal(_) | Expr::Name(_) => true,
            Expr::Named { .. } | Expr::Await(_) | Expr::Yield(_) | Expr::YieldFrom(_) => false,
            Expr::Starred(inner) => Self::is_constant(inner),
            Expr::Call { func, args, keywords } => {
                func.as_name().is_some_and(|name| {
                    self.callee_is_pure(name, shadowed) && self.consumes_nothing(name, args, keywords, shadowed)
                }) && args.iter().all(|arg| self.pure_in(arg, shadowed))
                    && keywords.iter().all(|kw| self.pure_keyword(kw, shadowed))
            }
            Expr::Attribute { object, .. } => Self::is_constant(object),
            Expr::Subscript { object, index } => Self::is_constant(object) && self.pure_in(index, shadowed),
            Expr::Op { left, op, right } => {
                let divides = matches!(op, Operator::Div | Operator::FloorDiv | Operator::Mod);
                !(divides && is_literal_zero(right)) && self.pure_in(left, shadowed) && self.pure_in(right, shadowed)
            }
            Expr::Dict(items) => items.iter().all(|(key, value)| match key {
                Some(key) => self.pure_in(key, shadowed) && self.pure_in(value, shadowed),
                // `**mapping`
                None => Self::is_constant(value),
            }),
            Expr::Lambda { params, .. } => params.defaults().all(|default| self.pure_in(default, shadowed)),
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.pure_comprehension(generators, &[&**elt], shadowed)
            }
            Expr::DictComp { key, value, generators } => {
                self.pure_comprehension(generators, &[&**key, &**value], shadowed)
            }
            Expr::Slice { .. }
            | Expr::BoolOp { .. }
            | Expr::CmpOp { .. }
            | Expr::ChainCmp { .. }
            | Expr::Not(_)
            | Expr::UnaryMinus(_)
            | Expr::UnaryPlus(_)
            | Expr::UnaryInvert(_)
            | Expr::List(_)
            | Expr::Tuple(_)
            | Expr::Set(_)
            | Expr::IfElse { .. }
            | Expr::FString(_) => expr_children(expr)
                .into_iter()
                .all(|child| self.pure_in(child, shadowed)),
        }
    }

    /// Would calling the builtin `name` leave its arguments untouched?
    ///
    /// `sum(it)` and friends exhaust an iterator argument, and `key=` runs arbitrary code, so the
    /// iterated argument has to be one that iterating cannot change.
    fn consumes_nothing(&self, name: &str, args: &[ExprLoc], keywords: &[Keyword], shadowed: &[&str]) -> bool {
        if !CONSUMING_BUILTINS.contains(&name) {
            return true;
        }
        if keywords.iter().any(|kw| kw.key.as_ref().is_none_or(|key| key.name == "key")) {
            return false;
        }
        // `max(a, b)` compares its arguments instead of iterating them
        if matches!(name, "max" | "min") && args.len() > 1 {
            return true;
        }
        args.first().is_none_or(|first| {
            // starred arguments are constants and a fresh generator is only reachable from here
            matches!(first.expr, Expr::Starred(_) | Expr::GeneratorExp { .. }) || self.pure_iterable_in(first, shadowed)
        })
    }

    fn pure_keyword<'e>(&self, keyword: &'e Keyword, shadowed: &mut Vec<&'e str>) -> bool {
        match keyword.key {
            Some(_) => self.pure_in(&keyword.value, shadowed),
            None => Self::is_constant(&keyword.value),
        }
    }

    fn pure_comprehension<'e>(
        &self,
        generators: &'e [Comprehension],
        results: &[&'e ExprLoc],
        shadowed: &mut Vec<&'e str>,
    ) -> bool {
        let depth = shadowed.len();
        let mut pure = true;
        for generator in generators {
            if !(self.pure_in(&generator.iter, shadowed)
                && self.pure_iterable_in(&generator.iter, shadowed)
                && !generator.target.stores_into_object())
            {
                pure = false;
                break;
            }
            generator.target.bound_names(shadowed);
            if !generator.ifs.iter().all(|cond| self.pure_in(cond, shadowed)) {
                pure = false;
                break;
            }
        }
        pure = pure && results.iter().all(|result| self.pure_in(result, shadowed));
        shadowed.truncate(depth);
        pure
    }
}

/// Literal zero (possibly signed) of any numeric type.
fn is_literal_zero(expr: &ExprLoc) -> bool {
    match &expr.expr {
        Expr::Literal(Literal::Int(0) | Literal::Bool(false)) => true,
        Expr::Literal(Literal::Float(f) | Literal::Imaginary(f)) => *f == 0.0,
        Expr::UnaryMinus(inner) | Expr::UnaryPlus(inner) => is_literal_zero(inner),
        _ => false,
    }
}

fn int_literal(expr: &ExprLoc) -> Option<i64> {
    match &expr.expr {
        Expr::Literal(Literal::Int(i)) => Some(*i),
        Expr::UnaryMinus(inner) => int_literal(inner).and_then(i64::checked_neg),
        _ => None,
    }
}

fn range_len(start: i64, stop: i64, step: i64) -> u64 {
    let (lo, hi, step) = if step > 0 {
        (i128::from(start), i128::from(stop), i128::from(step))
    } else {
        (i128::from(stop), i128::from(start), -i128::from(step))
    };
    if hi <= lo {
        0
    } else {
        u64::try_from((hi - lo + step - 1) / step).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::{
        parse::parse,
        scope::ScopeTable,
        tree::{Module, Node},
    };

    /// Parses `code` and returns the value of its last statement, which must be an assignment.
    fn last_value(module: &Module) -> &ExprLoc {
        match module.body.last() {
            Some(Node::Assign { value, .. }) => value,
            _ => panic!("expected an assignment"),
        }
    }

    fn check(code: &str, table: &PurityTable) -> (bool, bool, bool) {
        let module = parse(code).unwrap();
        let scope = ScopeTable::for_module(&module);
        let env = ScopeEnv::new(&scope);
        let oracle = PurityOracle::new(table, &env);
        let value = last_value(&module);
        (oracle.is_pure(value), oracle.is_pure_iterable(value), oracle.is_hoistable(value))
    }

    fn is_pure(code: &str) -> bool {
        check(code, &PurityTable::default()).0
    }

    #[test]
    fn builtin_names_round_trip_through_strum() {
        assert_eq!(PureBuiltin::from_str("isinstance"), Ok(PureBuiltin::IsInstance));
        assert_eq!(PureBuiltin::Len.to_string(), "len");
        assert_eq!(PureBuiltin::iter().count(), 26);
        assert!(PurityTable::default().is_pure_builtin("range"));
        assert!(!PurityTable::default().is_pure_builtin("print"));
    }

    #[test]
    fn operators_over_pure_operands_are_pure() {
        assert!(is_pure("a = x + 7 / .55"));
        assert!(is_pure("a = not (x < y <= z) or -w"));
        assert!(is_pure("a = (x, [y], {z: 1}, f'{x!r:>{y}}')"));
        assert!(is_pure("a = x if y else z"));
    }

    #[test]
    fn division_by_literal_zero_is_impure() {
        assert!(!is_pure("a = x / 0"));
        assert!(!is_pure("a = x // -0.0"));
        assert!(!is_pure("a = x % False"));
        assert!(is_pure("a = x / y"));
    }

    #[test]
    fn calls_depend_on_the_table_and_resolution() {
        assert!(is_pure("a = len(range(3))"));
        assert!(!is_pure("a = print(1)"));
        assert!(!is_pure("a = obj.method()"));
        // shadowed by a module-level definition
        assert!(!is_pure("def len(x):\n    return 0\na = len(x)"));
        assert!(!is_pure("a = len(*xs)"));
        assert!(is_pure("a = max(*(1, 2))"));
        assert!(!is_pure("a = max(**kw)"));

        let table = PurityTable::default().with_pure_global("helper");
        assert!(check("def helper(x):\n    return x\na = helper(1)", &table).0);
        assert!(!check("a = len('x')", &PurityTable::empty()).0);
        assert!(!check("a = frob(1)", &PurityTable::empty().with_builtin("frob")).0);
        assert!(check("a = divmod(1, 2)", &PurityTable::empty().with_builtin("divmod")).0);
    }

    #[test]
    fn iterating_builtins_must_not_exhaust_their_argument() {
        assert!(!is_pure("a = tuple(it)"));
        assert!(!is_pure("a = sum(it)"));
        assert!(!is_pure("a = frozenset(it)"));
        assert!(!is_pure("a = max(xs)"));
        assert!(is_pure("a = max(x, y)"));
        assert!(!is_pure("a = min(x, y, key=f)"));
        assert!(is_pure("a = sum([1, 2], 3)"));
        assert!(is_pure("a = sum(range(n))"));
        assert!(is_pure("a = sum(x * 2 for x in range(3))"));
        assert!(!is_pure("a = sum(x for x in it)"));
        assert!(is_pure("a = len(it)"));
    }

    #[test]
    fn comprehension_targets_shadow_range() {
        assert!(is_pure("a = [x for r in range(3) for x in range(r)]"));
        assert!(!is_pure("a = [x for range in range(3) for x in range(2)]"));
    }

    #[test]
    fn attribute_and_subscript_reads_need_constant_receivers() {
        assert!(!is_pure("a = obj.attr"));
        assert!(!is_pure("a = xs[0]"));
        assert!(is_pure("a = (1, 2, 3)[i]"));
        assert!(is_pure("a = 'abc'.upper"));
    }

    #[test]
    fn effects_in_expressions() {
        assert!(!is_pure("a = (b := 1)"));
        assert!(!is_pure("a = [print(x) for x in range(3)]"));
        assert!(!is_pure("a = [x for x in items]"));
        assert!(is_pure("a = [x * 2 for x in range(3) if x]"));
        assert!(!is_pure("a = [len(x) for len in range(3)]"));
        assert!(is_pure("a = lambda x=1: print(x)"));
        assert!(!is_pure("a = lambda x=print(): x"));
    }

    #[test]
    fn iterability_and_hoistability() {
        let table = PurityTable::default();
        assert_eq!(check("a = range(n)", &table), (true, true, true));
        assert_eq!(check("a = [1, 2]", &table), (true, true, false));
        assert_eq!(check("a = x + y", &table), (true, false, true));
        assert_eq!(check("a = items", &table), (true, false, true));
        assert_eq!(check("a = tuple(x for x in range(3))", &table), (true, false, false));
        assert_eq!(check("a = 'text'", &table), (true, true, true));
    }

    #[test]
    fn trip_counts() {
        let cases = [
            ("a = range(1)", Some(1)),
            ("a = range(0)", Some(0)),
            ("a = range(2, 10, 3)", Some(3)),
            ("a = range(10, 0, -4)", Some(3)),
            ("a = (1,)", Some(1)),
            ("a = 'ab'", Some(2)),
            ("a = range(n)", None),
            ("a = [*xs]", None),
            ("a = items", None),
        ];
        for (code, expected) in cases {
            let module = parse(code).unwrap();
            let scope = ScopeTable::for_module(&module);
            let env = ScopeEnv::new(&scope);
            let table = PurityTable::default();
            let oracle = PurityOracle::new(&table, &env);
            assert_eq!(oracle.trip_count(last_value(&module)), expected, "for {code:?}");
        }
    }
}
