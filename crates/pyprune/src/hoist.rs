//! Loop-invariant code motion.
//!
//! For each `for` and `while` loop, innermost first, statements and sub-expressions whose value
//! cannot change between iterations are moved above the loop:
//!
//! - a whole assignment `name = expr` moves when `name` is a plain local bound only by that
//!   statement and used nowhere outside the loop body;
//! - otherwise a maximal invariant sub-expression of a top-level statement is assigned to a new
//!   temporary `__o_tmp_<line>` above the loop and replaced by a read of it.
//!
//! Only pure expressions move, and only out of loops whose header is pure, so a loop that runs zero
//! times still has no observable effect.

use ahash::{AHashMap, AHashSet};

use crate::{
    purity::{PurityOracle, PurityTable},
    render::render_expr,
    scope::{ScopeEnv, ScopeKind, ScopeTable},
    tracer::{HoistKind, OptimizeTracer},
    tree::{
        Expr, ExprLoc, FStringPart, Identifier, Module, Node, Parameters, Target, deep_names, expr_reads,
    },
};

/// Prefix of the temporaries introduced by partial hoists.
pub const TEMP_PREFIX: &str = "__o_tmp_";

/// Moves loop-invariant computations above their loops in every scope of `module`.
pub(crate) fn hoist_loop_invariants(module: &mut Module, purity: &PurityTable, tracer: &mut impl OptimizeTracer) {
    let table = ScopeTable::for_module(module);
    let env = ScopeEnv::new(&table);
    nested_scopes(&mut module.body, &env, purity, tracer);
    hoist_scope(&mut module.body, &Parameters::default(), &env, purity, tracer);
}

fn nested_scopes(body: &mut [Node], env: &ScopeEnv<'_>, purity: &PurityTable, tracer: &mut impl OptimizeTracer) {
    for node in body {
        match node {
            Node::FunctionDef(function) => {
                let function = &mut **function;
                let table = ScopeTable::build(ScopeKind::Function, &function.params, &function.body);
                let env = env.push(&table);
                nested_scopes(&mut function.body, &env, purity, tracer);
                hoist_scope(&mut function.body, &function.params, &env, purity, tracer);
            }
            Node::ClassDef(class) => {
                // temporaries would become class attributes, so only methods are visited
                let table = ScopeTable::build(ScopeKind::Class, &Parameters::default(), &class.body);
                nested_scopes(&mut class.body, &env.push(&table), purity, tracer);
            }
            _ => {
                for block in node.blocks_mut() {
                    nested_scopes(block, env, purity, tracer);
                }
            }
        }
    }
}

/// Hoists out of every loop in the innermost scope of `env`, whose statements are `body`.
fn hoist_scope(
    body: &mut Vec<Node>,
    params: &Parameters,
    env: &ScopeEnv<'_>,
    purity: &PurityTable,
    tracer: &mut impl OptimizeTracer,
) {
    let table = env.current();
    if table.is_dynamic() {
        // a new local would show up in `locals()`
        return;
    }
    let mut counts = AHashMap::new();
    let mut names = Vec::new();
    deep_names(body, &mut names);
    for name in params.names().chain(names) {
        *counts.entry(name.to_owned()).or_insert(0) += 1;
    }
    let mut hoister = Hoister {
        oracle: PurityOracle::new(purity, env),
        table,
        counts,
        created: AHashSet::new(),
        tracer,
    };
    hoister.block(body);
}

struct Hoister<'a, 'r, Tr> {
    oracle: PurityOracle<'a>,
    table: &'a ScopeTable,
    /// Occurrences of every name in the scope, nested scopes included, kept current as
    /// temporaries are added.
    counts: AHashMap<String, usize>,
    /// Temporaries introduced in this scope; the table predates them.
    created: AHashSet<String>,
    tracer: &'r mut Tr,
}

/// Working state for the loop being hoisted out of.
struct LoopState {
    loop_line: u32,
    /// How many times each name is bound inside the loop, header target included.
    binders: AHashMap<String, usize>,
    /// Occurrences of each name inside the loop body.
    inside: AHashMap<String, usize>,
    /// The loop, header included, has no effect that could rebind a non-local name.
    effect_free: bool,
    /// Names whose assignment has already moved above the loop.
    invariant: AHashSet<String>,
    /// Statements to insert above the loop, in order.
    hoisted: Vec<Node>,
    /// Rendered expression and the temporary holding it.
    temps: Vec<(String, String)>,
}

impl<Tr: OptimizeTracer> Hoister<'_, '_, Tr> {
    fn block(&mut self, block: &mut Vec<Node>) {
        let mut index = 0;
        while index < block.len() {
            let node = &mut block[index];
            if matches!(node, Node::FunctionDef(_) | Node::ClassDef(_)) {
                index += 1;
                continue;
            }
            for sub_block in node.blocks_mut() {
                self.block(sub_block);
            }
            let hoisted = self.hoist_loop(node);
            let count = hoisted.len();
            block.splice(index..index, hoisted);
            index += count + 1;
        }
    }

    /// Hoists out of `node` if it is a loop, returning the statements to insert above it.
    fn hoist_loop(&mut self, node: &mut Node) -> Vec<Node> {
        let (pure_header, effect_free) = match &*node {
            Node::For { target, iter, body, .. } => (
                self.oracle.is_pure(iter),
                self.oracle.is_pure_iterable(iter) && !target.stores_into_object() && self.block_effect_free(body),
            ),
            Node::While { test, body, .. } => (self.oracle.is_pure(test), self.block_effect_free(body)),
            _ => return Vec::new(),
        };
        if !pure_header {
            return Vec::new();
        }
        let loop_line = node.line();
        let mut binders = AHashMap::new();
        if let Node::For { target, .. } = &*node {
            let mut names = Vec::new();
            target.bound_names(&mut names);
            count_into(&mut binders, names);
        }
        let (test, body) = match node {
            Node::For { body, .. } => (None, body),
            Node::While { test, body, .. } => (Some(test), body),
            _ => return Vec::new(),
        };
        collect_binders(body, &mut binders);
        let mut inside = AHashMap::new();
        let mut names = Vec::new();
        deep_names(body, &mut names);
        count_into(&mut inside, names);

        let mut state = LoopState {
            loop_line,
            binders,
            inside,
            effect_free,
            invariant: AHashSet::new(),
            hoisted: Vec::new(),
            temps: Vec::new(),
        };
        if let Some(test) = test {
            self.hoist_expr(test, &mut state);
        }
        let mut seen = AHashSet::new();
        let mut index = 0;
        while index < body.len() {
            if let Some(name) = self.whole_hoist_target(&body[index], &state, &seen) {
                let statement = body.remove(index);
                if let Node::Assign { value, .. } = &statement {
                    self.tracer.on_hoisted(&name, HoistKind::Whole, value.line(), loop_line);
                }
                state.invariant.insert(name);
                state.hoisted.push(statement);
                continue;
            }
            for expr in evaluated_exprs_mut(&mut body[index]) {
                self.hoist_expr(expr, &mut state);
            }
            let mut names = Vec::new();
            deep_names(std::slice::from_ref(&body[index]), &mut names);
            seen.extend(names.into_iter().map(str::to_owned));
            index += 1;
        }
        state.hoisted
    }

    /// The target name if `node` is an assignment that can move above the loop unchanged.
    fn whole_hoist_target(&self, node: &Node, state: &LoopState, seen: &AHashSet<String>) -> Option<String> {
        let Node::Assign { targets, value } = node else {
            return None;
        };
        let [Target::Name(ident)] = targets.as_slice() else {
            return None;
        };
        let name = ident.name.as_str();
        let total = self.counts.get(name).copied().unwrap_or(0);
        let inside = state.inside.get(name).copied().unwrap_or(0);
        let movable = self.is_plain_local(name)
            && state.binders.get(name) == Some(&1)
            && total.saturating_sub(inside) == 0
            && !seen.contains(name)
            && self.oracle.is_hoistable(value)
            && self.is_invariant(value, state);
        movable.then(|| name.to_owned())
    }

    /// Replaces the maximal invariant sub-expressions of `expr` with temporaries.
    fn hoist_expr(&mut self, expr: &mut ExprLoc, state: &mut LoopState) {
        if self.qualifies(expr, state) {
            let key = render_expr(expr);
            let position = expr.position;
            if let Some((_, temp)) = state.temps.iter().find(|(rendered, _)| *rendered == key) {
                let temp = temp.clone();
                *self.counts.entry(temp.clone()).or_insert(0) += 1;
                *expr = ExprLoc::name(temp, position);
                return;
            }
            let temp = self.fresh_temp(expr.line());
            let value = std::mem::replace(expr, ExprLoc::name(temp.clone(), position));
            self.tracer
                .on_hoisted(&temp, HoistKind::Partial, value.line(), state.loop_line);
            state.hoisted.push(Node::Assign {
                targets: vec![Target::Name(Identifier::new(temp.clone(), position))],
                value,
            });
            state.temps.push((key, temp));
            return;
        }
        for child in evaluated_children_mut(expr) {
            self.hoist_expr(child, state);
        }
    }

    fn qualifies(&self, expr: &ExprLoc, state: &LoopState) -> bool {
        !expr.is_trivial()
            && !matches!(expr.expr, Expr::Slice { .. } | Expr::Starred(_))
            && self.oracle.is_hoistable(expr)
            && self.is_invariant(expr, state)
    }

    fn is_invariant(&self, expr: &ExprLoc, state: &LoopState) -> bool {
        let mut reads = Vec::new();
        expr_reads(expr, &mut reads);
        reads.into_iter().all(|name| {
            if state.invariant.contains(name) {
                true
            } else if state.binders.contains_key(name) {
                false
            } else {
                // anything but a plain local could be rebound by an effect in the loop
                self.is_plain_local(name) || state.effect_free
            }
        })
    }

    /// A function local that only this body's own statements can rebind.
    fn is_plain_local(&self, name: &str) -> bool {
        if self.table.kind() != ScopeKind::Function {
            return false;
        }
        self.created.contains(name) || (self.table.is_local(name) && !self.table.store_is_observable(name))
    }

    /// Picks `__o_tmp_<line>`, or `__o_tmp_<line>_<n>` when that name is taken.
    fn fresh_temp(&mut self, line: u32) -> String {
        let base = format!("{TEMP_PREFIX}{line}");
        let mut name = base.clone();
        let mut suffix = 1;
        while self.counts.contains_key(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        // the assignment above the loop and the read that replaced the expression
        self.counts.insert(name.clone(), 2);
        self.created.insert(name.clone());
        name
    }

    fn block_effect_free(&self, body: &[Node]) -> bool {
        body.iter().all(|node| self.statement_effect_free(node))
    }

    /// Can running `node` rebind a name other than through its own binding targets?
    fn statement_effect_free(&self, node: &Node) -> bool {
        let kind_allowed = match node {
            Node::Assign { targets, .. } => !targets.iter().any(Target::stores_into_object),
            Node::AugAssign { target, .. } | Node::AnnAssign { target, .. } => !target.stores_into_object(),
            Node::For { target, iter, .. } => !target.stores_into_object() && self.oracle.is_pure_iterable(iter),
            Node::FunctionDef(function) => function.decorators.is_empty(),
            Node::Expr(_)
            | Node::If { .. }
            | Node::While { .. }
            | Node::Pass { .. }
            | Node::Break { .. }
            | Node::Continue { .. }
            | Node::Return { .. } => true,
            _ => false,
        };
        kind_allowed
            && node.header_exprs().into_iter().all(|expr| self.oracle.is_pure(expr))
            && node.blocks().into_iter().all(|block| self.block_effect_free(block))
    }
}

fn count_into<'n>(counts: &mut AHashMap<String, usize>, names: impl IntoIterator<Item = &'n str>) {
    for name in names {
        *counts.entry(name.to_owned()).or_insert(0) += 1;
    }
}

/// Counts binding occurrences in `body`, descending into blocks but not into nested scopes.
fn collect_binders(body: &[Node], binders: &mut AHashMap<String, usize>) {
    for node in body {
        count_into(binders, node.header_bindings());
        for block in node.blocks() {
            collect_binders(block, binders);
        }
    }
}

/// Expressions a statement evaluates every time it runs.
fn evaluated_exprs_mut(node: &mut Node) -> Vec<&mut ExprLoc> {
    match node {
        Node::Expr(expr)
        | Node::Assign { value: expr, .. }
        | Node::AugAssign { value: expr, .. }
        | Node::AnnAssign { value: Some(expr), .. }
        | Node::Return { value: Some(expr), .. }
        | Node::If { test: expr, .. }
        | Node::While { test: expr, .. }
        | Node::For { iter: expr, .. } => vec![expr],
        _ => Vec::new(),
    }
}

/// Sub-expressions evaluated whenever `expr` is: operands after a short-circuit, conditional
/// branches, and lambda or comprehension bodies are left out.
fn evaluated_children_mut(expr: &mut ExprLoc) -> Vec<&mut ExprLoc> {
    let mut out: Vec<&mut ExprLoc> = Vec::new();
    match &mut expr.expr {
        Expr::Call { func, args, keywords } => {
            out.push(func);
            out.extend(args.iter_mut());
            out.extend(keywords.iter_mut().map(|keyword| &mut keyword.value));
        }
        Expr::Attribute { object, .. } => out.push(object),
        Expr::Subscript { object, index } => {
            out.push(object);
            out.push(index);
        }
        Expr::Slice { lower, upper, step } => {
            out.extend(lower.as_deref_mut());
            out.extend(upper.as_deref_mut());
            out.extend(step.as_deref_mut());
        }
        Expr::Op { left, right, .. } | Expr::CmpOp { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        Expr::ChainCmp { left, comparisons } => {
            out.push(left);
            out.extend(comparisons.first_mut().map(|(_, operand)| operand));
        }
        Expr::BoolOp { values, .. } => out.extend(values.first_mut()),
        Expr::IfElse { test, .. } => out.push(test),
        Expr::Not(inner)
        | Expr::UnaryMinus(inner)
        | Expr::UnaryPlus(inner)
        | Expr::UnaryInvert(inner)
        | Expr::Await(inner)
        | Expr::YieldFrom(inner)
        | Expr::Starred(inner) => out.push(inner),
        Expr::Yield(value) => out.extend(value.as_deref_mut()),
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => out.extend(items.iter_mut()),
        Expr::Dict(items) => {
            for (key, value) in items {
                out.extend(key.as_mut());
                out.push(value);
            }
        }
        Expr::Named { value, .. } => out.push(value),
        Expr::FString(parts) => fstring_exprs_mut(parts, &mut out),
        Expr::Literal(_)
        | Expr::Name(_)
        | Expr::Lambda { .. }
        | Expr::ListComp { .. }
        | Expr::SetComp { .. }
        | Expr::DictComp { .. }
        | Expr::GeneratorExp { .. } => {}
    }
    out
}

fn fstring_exprs_mut<'e>(parts: &'e mut [FStringPart], out: &mut Vec<&'e mut ExprLoc>) {
    for part in parts {
        if let FStringPart::Interpolation { expr, format_spec, .. } = part {
            out.push(expr);
            if let Some(spec) = format_spec {
                fstring_exprs_mut(spec, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{parse::parse, render::render, tracer::RecordingTracer};

    fn hoisted(code: &str) -> String {
        let mut module = parse(code).unwrap();
        hoist_loop_invariants(&mut module, &PurityTable::default(), &mut crate::tracer::NoopTracer);
        render(&module)
    }

    #[test]
    fn invariant_operand_moves_to_a_temporary() {
        assert_eq!(
            hoisted("def fill_sum(a, x, y):\n    for i in range(len(a)): a[i] = x + y\n"),
            "def fill_sum(a, x, y):\n    __o_tmp_2 = x + y\n    for i in range(len(a)):\n        a[i] = __o_tmp_2\n"
        );
    }

    #[test]
    fn whole_assignment_moves_when_only_the_loop_uses_it() {
        let code = "def f(xs, k):\n    out = []\n    for x in xs:\n        scale = k * 2\n        out.append(x * scale)\n    return out\n";
        assert_eq!(
            hoisted(code),
            "def f(xs, k):\n    out = []\n    scale = k * 2\n    for x in xs:\n        out.append(x * scale)\n    return out\n"
        );
    }

    #[test]
    fn accumulator_keeps_its_variant_part() {
        let code = "def f(n):\n    total = 0\n    for i in range(n):\n        total = total + n * 2\n    return total\n";
        assert_eq!(
            hoisted(code),
            "def f(n):\n    total = 0\n    __o_tmp_4 = n * 2\n    for i in range(n):\n        total = total + __o_tmp_4\n    return total\n"
        );
    }

    #[test]
    fn impure_headers_block_hoisting() {
        let code = "def f(a, b):\n    for x in read():\n        print(a + b)\n";
        assert_eq!(hoisted(code), code);
    }

    #[test]
    fn temporaries_avoid_existing_names_and_are_shared() {
        assert_eq!(
            hoisted("def f(a, x, y, __o_tmp_2):\n    for i in a: a[i] = x + y; a[-i] = x + y\n"),
            "def f(a, x, y, __o_tmp_2):\n    __o_tmp_2_1 = x + y\n    for i in a:\n        a[i] = __o_tmp_2_1\n        a[-i] = __o_tmp_2_1\n"
        );
    }

    #[test]
    fn while_tests_are_hoisted_from() {
        let code = "def f(n):\n    i = 0\n    while i < n * 2:\n        i += 1\n    return i\n";
        assert_eq!(
            hoisted(code),
            "def f(n):\n    i = 0\n    __o_tmp_3 = n * 2\n    while i < __o_tmp_3:\n        i += 1\n    return i\n"
        );
    }

    #[test]
    fn inner_temporaries_move_through_outer_loops() {
        let code = "def f(m, a, b):\n    for row in m:\n        for j in row:\n            row[j] = a * b\n";
        let mut module = parse(code).unwrap();
        let mut tracer = RecordingTracer::new();
        hoist_loop_invariants(&mut module, &PurityTable::default(), &mut tracer);
        assert_eq!(
            render(&module),
            "def f(m, a, b):\n    __o_tmp_4 = a * b\n    for row in m:\n        for j in row:\n            row[j] = __o_tmp_4\n"
        );
        let kinds: Vec<_> = tracer
            .events()
            .iter()
            .map(|event| match event {
                crate::tracer::OptimizeEvent::Hoisted { kind, loop_line, .. } => (*kind, *loop_line),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec![(HoistKind::Partial, 3), (HoistKind::Whole, 2)]);
    }

    #[test]
    fn module_names_need_an_effect_free_loop() {
        assert_eq!(
            hoisted("for i in range(3):\n    z = x + y\n"),
            "__o_tmp_2 = x + y\nfor i in range(3):\n    z = __o_tmp_2\n"
        );
        let code = "for i in range(3):\n    a[i] = x + y\n";
        assert_eq!(hoisted(code), code);
    }

    #[test]
    fn class_bodies_and_short_circuits_are_left_alone() {
        let code = "class C:\n    for i in range(3):\n        z = x + y\n";
        assert_eq!(hoisted(code), code);
        let code = "def f(a, x, y):\n    for i in a:\n        a[i] = i and x + y\n";
        assert_eq!(hoisted(code), code);
    }
}
