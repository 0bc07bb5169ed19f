//! Dead-store and dead-code elimination.
//!
//! Each scope body is analyzed backwards: the analysis walks statements last to first, carrying the
//! set of names whose current value may still be read. Loops are iterated to a fixpoint so values
//! used by a later iteration count as live. Statements that neither have an effect nor define a
//! live name are swept from the tree afterwards.
//!
//! The analysis never mutates the tree: it records the paths of live statements, and the sweep
//! rebuilds each block from those marks. Nested function and class bodies are optimized first, so
//! the enclosing scope only has to decide about the `def` or `class` statement itself.

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    purity::{PurityOracle, PurityTable},
    scope::{Binding, ScopeEnv, ScopeKind, ScopeTable, free_names},
    tracer::OptimizeTracer,
    tree::{
        Alias, Expr, ExprLoc, Module, Node, Parameters, Target, deep_names, expr_reads, header_reads, target_reads,
        walrus_targets,
    },
};

/// Names whose current value may still be read.
type Live<'t> = AHashSet<&'t str>;

/// Position of a statement within a scope body: statement index, then for each enclosing compound
/// statement the block index and statement index within that block (see [`Node::blocks`]).
type StmtPath = SmallVec<[usize; 8]>;

/// Live sets at the targets of non-sequential control flow.
#[derive(Debug, Clone, Default)]
struct Flow<'t> {
    /// `break`: the statement after the innermost loop.
    brk: Live<'t>,
    /// `continue`: the innermost loop header.
    cont: Live<'t>,
    /// `return`: the scope exit, through any enclosing `finally`.
    ret: Live<'t>,
    /// An exception at any statement boundary: handlers, `finally` blocks, or the scope exit.
    exc: Live<'t>,
}

/// What the analysis decided, by statement path.
#[derive(Debug, Default)]
struct Marks {
    live: AHashSet<StmtPath>,
    /// Dead `for` loops whose iterable must still be evaluated.
    replaced: AHashSet<StmtPath>,
}

/// Control-flow edges of one loop.
struct LoopEdges<'t> {
    /// Live after the whole statement (`break` target).
    after: Live<'t>,
    /// Live on entry to the `else` block, where the loop goes when it finishes normally.
    or_else: Live<'t>,
    /// Names read at the header on every iteration.
    header_reads: Live<'t>,
    /// Names bound at the header on every iteration.
    kill: Vec<&'t str>,
    /// False when the body is known to run at most once.
    back_edge: bool,
}

/// Removes dead statements from every scope of `module`.
pub(crate) fn eliminate_dead_stores(module: &mut Module, purity: &PurityTable, tracer: &mut impl OptimizeTracer) {
    let table = ScopeTable::for_module(module);
    nested_scopes(&mut module.body, &ScopeEnv::new(&table), purity, tracer);
    // nested bodies may have lost reads of captured names
    let table = ScopeTable::for_module(module);
    prune_scope(&mut module.body, &ScopeEnv::new(&table), purity, tracer);
}

fn nested_scopes(body: &mut [Node], env: &ScopeEnv<'_>, purity: &PurityTable, tracer: &mut impl OptimizeTracer) {
    for node in body {
        match node {
            Node::FunctionDef(function) => {
                let function = &mut **function;
                scope_body(ScopeKind::Function, &function.params, &mut function.body, env, purity, tracer);
            }
            Node::ClassDef(class) => {
                scope_body(ScopeKind::Class, &Parameters::default(), &mut class.body, env, purity, tracer);
            }
            _ => {
                for block in node.blocks_mut() {
                    nested_scopes(block, env, purity, tracer);
                }
            }
        }
    }
}

fn scope_body(
    kind: ScopeKind,
    params: &Parameters,
    body: &mut Vec<Node>,
    env: &ScopeEnv<'_>,
    purity: &PurityTable,
    tracer: &mut impl OptimizeTracer,
) {
    let table = ScopeTable::build(kind, params, body);
    nested_scopes(body, &env.push(&table), purity, tracer);
    let table = ScopeTable::build(kind, params, body);
    prune_scope(body, &env.push(&table), purity, tracer);
}

/// Analyzes the innermost scope of `env`, whose statements are `body`, and sweeps its dead statements.
fn prune_scope(body: &mut Vec<Node>, env: &ScopeEnv<'_>, purity: &PurityTable, tracer: &mut impl OptimizeTracer) {
    let table = env.current();
    let oracle = PurityOracle::new(purity, env);
    let mut pinned = AHashSet::new();
    let marks = loop {
        let marks = analyze(body, oracle, table, &pinned);
        if table.kind() != ScopeKind::Function || !pin_unbound_reads(body, table, &marks, &mut pinned, tracer) {
            break marks;
        }
    };
    sweep(body, &mut StmtPath::new(), &marks, tracer);
}

fn analyze(body: &[Node], oracle: PurityOracle<'_>, table: &ScopeTable, pinned: &AHashSet<StmtPath>) -> Marks {
    // values visible to the caller once the body finishes, by any route
    let exit: Live<'_> = match table.kind() {
        ScopeKind::Function => table.redirected().chain(table.captured()).collect(),
        ScopeKind::Module | ScopeKind::Class => table
            .iter()
            .filter(|(_, binding)| *binding != Binding::External)
            .map(|(name, _)| name)
            .collect(),
    };
    let flow = Flow {
        ret: exit.clone(),
        exc: exit.clone(),
        ..Flow::default()
    };
    let mut liveness = Liveness {
        oracle,
        table,
        pinned,
        marks: Marks::default(),
    };
    liveness.block(body, &mut StmtPath::new(), exit, &flow);
    liveness.marks
}

struct Liveness<'a> {
    oracle: PurityOracle<'a>,
    table: &'a ScopeTable,
    /// Statements that must be kept whatever the analysis finds.
    pinned: &'a AHashSet<StmtPath>,
    marks: Marks,
}

impl Liveness<'_> {
    /// Returns the live set on entry to `body`, and whether any statement in it is live.
    fn block<'t>(&mut self, body: &'t [Node], path: &mut StmtPath, out: Live<'t>, flow: &Flow<'t>) -> (Live<'t>, bool) {
        let mut live = out;
        let mut any_live = false;
        for (index, node) in body.iter().enumerate().rev() {
            path.push(index);
            let (before, is_live) = self.statement(node, path, live, flow);
            path.pop();
            live = before;
            live.extend(flow.exc.iter().copied());
            any_live |= is_live;
        }
        (live, any_live)
    }

    fn sub_block<'t>(
        &mut self,
        body: &'t [Node],
        path: &mut StmtPath,
        block_index: usize,
        out: Live<'t>,
        flow: &Flow<'t>,
    ) -> (Live<'t>, bool) {
        path.push(block_index);
        let result = self.block(body, path, out, flow);
        path.pop();
        result
    }

    /// Returns the live set before `node` and whether `node` must be kept (or, for a dead `for` loop,
    /// replaced by its iterable).
    fn statement<'t>(
        &mut self,
        node: &'t Node,
        path: &mut StmtPath,
        after: Live<'t>,
        flow: &Flow<'t>,
    ) -> (Live<'t>, bool) {
        let pinned = self.pinned.contains(path.as_slice());
        match node {
            Node::Expr(expr) => {
                let docstring = path.len() == 1 && path[0] == 0 && node.is_string_expr();
                let live = pinned || docstring || !self.oracle.is_pure(expr);
                self.simple(node, path, after, live)
            }
            Node::Assign { targets, value } => {
                let live = pinned
                    || !self.oracle.is_pure(value)
                    || targets
                        .iter()
                        .any(|target| target.stores_into_object() || !unpack_is_safe(target, value))
                    || self.binds_observed(node, &after);
                self.simple(node, path, after, live)
            }
            Node::AugAssign { target, value, .. } => {
                let live = pinned
                    || target.as_name().is_none()
                    || !self.oracle.is_pure(value)
                    || self.binds_observed(node, &after);
                self.simple(node, path, after, live)
            }
            Node::AnnAssign { target, value, .. } => {
                // a bare annotation in a function body only declares the name local
                let live = pinned
                    || self.table.kind() != ScopeKind::Function
                    || target.as_name().is_none()
                    || value
                        .as_ref()
                        .is_some_and(|value| !self.oracle.is_pure(value) || self.binds_observed(node, &after));
                self.simple(node, path, after, live)
            }
            Node::Return { value, .. } => self.jump(path, &flow.ret, value.as_ref()),
            Node::Raise { .. } => {
                let (mut before, live) = self.jump(path, &flow.exc, None);
                before.extend(header_reads(node));
                (before, live)
            }
            Node::Break { .. } => self.jump(path, &flow.brk, None),
            Node::Continue { .. } => self.jump(path, &flow.cont, None),
            Node::Pass { .. } => (after, pinned),
            Node::Delete { .. }
            | Node::Import { .. }
            | Node::ImportFrom { .. }
            | Node::Global { .. }
            | Node::Nonlocal { .. }
            | Node::Assert { .. } => self.simple(node, path, after, true),
            Node::FunctionDef(function) => {
                let live = pinned
                    || !function.decorators.is_empty()
                    || node.header_exprs().into_iter().any(|expr| !self.oracle.is_pure(expr))
                    || self.binds_observed(node, &after);
                self.simple(node, path, after, live)
            }
            Node::ClassDef(class) => {
                let (mut before, live) = self.simple(node, path, after, true);
                let mut names = Vec::new();
                deep_names(&class.body, &mut names);
                before.extend(names);
                (before, live)
            }
            Node::If { test, body, or_else } => {
                let (body_in, body_live) = self.sub_block(body, path, 0, after.clone(), flow);
                let (else_in, else_live) = self.sub_block(or_else, path, 1, after.clone(), flow);
                if !(pinned || body_live || else_live || !self.oracle.is_pure(test)) {
                    return (after, false);
                }
                self.mark(path);
                let mut before = body_in;
                before.extend(else_in);
                let mut reads = Vec::new();
                expr_reads(test, &mut reads);
                before.extend(reads);
                (before, true)
            }
            Node::For {
                target,
                iter,
                body,
                or_else,
                ..
            } => {
                let (else_in, else_live) = self.sub_block(or_else, path, 1, after.clone(), flow);
                let mut header_reads = Vec::new();
                target_reads(target, &mut header_reads);
                let mut kill = Vec::new();
                target.bound_names(&mut kill);
                let edges = LoopEdges {
                    after: after.clone(),
                    or_else: else_in.clone(),
                    header_reads: header_reads.into_iter().collect(),
                    kill,
                    back_edge: !self.oracle.trip_count(iter).is_some_and(|trips| trips <= 1),
                };
                let (header, body_in, body_live) = self.loop_header(body, path, &edges, flow);

                let target_dead = target.as_name().is_some_and(|ident| {
                    let name = ident.name.as_str();
                    !body_in.contains(name)
                        && !else_in.contains(name)
                        && !after.contains(name)
                        && !self.table.store_is_observable(name)
                });
                let mut iter_reads = Vec::new();
                expr_reads(iter, &mut iter_reads);
                if !pinned && !body_live && !else_live && target_dead && self.oracle.is_pure_iterable(iter) {
                    if self.oracle.is_pure(iter) {
                        return (after, false);
                    }
                    // iterating runs no user code but building the iterable does
                    self.marks.replaced.insert(path.clone());
                    let mut before = after;
                    before.extend(iter_reads);
                    return (before, true);
                }
                self.mark(path);
                let mut before = header;
                before.extend(iter_reads);
                (before, true)
            }
            Node::While { test, body, or_else } => {
                // never removed: the loop may not terminate
                let (else_in, _) = self.sub_block(or_else, path, 1, after.clone(), flow);
                let mut test_reads = Vec::new();
                expr_reads(test, &mut test_reads);
                let edges = LoopEdges {
                    after,
                    or_else: else_in,
                    header_reads: test_reads.into_iter().collect(),
                    kill: Vec::new(),
                    back_edge: true,
                };
                let (header, _, _) = self.loop_header(body, path, &edges, flow);
                self.mark(path);
                (header, true)
            }
            Node::With { body, .. } => {
                // a context manager can suppress an exception and resume after the statement
                let mut body_flow = flow.clone();
                body_flow.exc.extend(after.iter().copied());
                let (body_in, _) = self.sub_block(body, path, 0, after, &body_flow);
                self.simple(node, path, body_in, true)
            }
            Node::Try {
                body,
                handlers,
                or_else,
                finally,
                ..
            } => {
                let count = handlers.len();
                let (outer, after_try) = if finally.is_empty() {
                    (flow.clone(), after)
                } else {
                    // every way out of the statement passes through `finally`
                    let mut finally_out = after;
                    for set in [&flow.brk, &flow.cont, &flow.ret, &flow.exc] {
                        finally_out.extend(set.iter().copied());
                    }
                    let (finally_in, _) = self.sub_block(finally, path, count + 2, finally_out, flow);
                    let through_finally = |set: &Live<'t>| -> Live<'t> { set.union(&finally_in).copied().collect() };
                    let outer = Flow {
                        brk: through_finally(&flow.brk),
                        cont: through_finally(&flow.cont),
                        ret: through_finally(&flow.ret),
                        exc: through_finally(&flow.exc),
                    };
                    (outer, finally_in)
                };
                let (else_in, _) = self.sub_block(or_else, path, count + 1, after_try.clone(), &outer);
                let mut caught = outer.exc.clone();
                for (index, handler) in handlers.iter().enumerate() {
                    let (mut handler_in, _) = self.sub_block(&handler.body, path, index + 1, after_try.clone(), &outer);
                    if let Some(name) = &handler.name {
                        handler_in.remove(name.name.as_str());
                    }
                    if let Some(exc_type) = &handler.exc_type {
                        let mut reads = Vec::new();
                        expr_reads(exc_type, &mut reads);
                        handler_in.extend(reads);
                    }
                    caught.extend(handler_in);
                }
                let body_flow = Flow {
                    exc: caught.clone(),
                    ..outer
                };
                let (mut before, _) = self.sub_block(body, path, 0, else_in, &body_flow);
                before.extend(caught);
                self.mark(path);
                (before, true)
            }
        }
    }

    /// Transfer for a statement without nested blocks: kills what it definitely binds, then adds
    /// what it reads.
    fn simple<'t>(&mut self, node: &'t Node, path: &StmtPath, after: Live<'t>, live: bool) -> (Live<'t>, bool) {
        if !live {
            return (after, false);
        }
        self.mark(path);
        let mut before = after;
        for name in definite_kills(node) {
            before.remove(name);
        }
        before.extend(header_reads(node));
        (before, true)
    }

    /// Transfer for `return`, `raise`, `break` and `continue`: control continues at `target`.
    fn jump<'t>(&mut self, path: &StmtPath, target: &Live<'t>, value: Option<&'t ExprLoc>) -> (Live<'t>, bool) {
        self.mark(path);
        let mut before = target.clone();
        if let Some(value) = value {
            let mut reads = Vec::new();
            expr_reads(value, &mut reads);
            before.extend(reads);
        }
        (before, true)
    }

    /// Iterates a loop body until the live set at the loop header stops growing.
    ///
    /// Returns the header live set, the body's live-in set from the last iteration, and whether any
    /// body statement is live.
    fn loop_header<'t>(
        &mut self,
        body: &'t [Node],
        path: &mut StmtPath,
        edges: &LoopEdges<'t>,
        flow: &Flow<'t>,
    ) -> (Live<'t>, Live<'t>, bool) {
        let mut header: Live<'t> = edges.or_else.union(&edges.header_reads).copied().collect();
        loop {
            let next_iteration = if edges.back_edge {
                header.clone()
            } else {
                edges.or_else.clone()
            };
            let body_flow = Flow {
                brk: edges.after.clone(),
                cont: next_iteration.clone(),
                ret: flow.ret.clone(),
                exc: flow.exc.clone(),
            };
            let (body_in, body_live) = self.sub_block(body, path, 0, next_iteration, &body_flow);
            let mut next = header.clone();
            next.extend(body_in.iter().copied().filter(|name| !edges.kill.contains(name)));
            // live sets only grow, so an unchanged size means an unchanged set
            if !edges.back_edge || next.len() == header.len() {
                return (next, body_in, body_live);
            }
            header = next;
        }
    }

    /// Does `node` bind a name that is read later, or whose store is visible outside the body?
    fn binds_observed(&self, node: &Node, after: &Live<'_>) -> bool {
        node.header_bindings()
            .into_iter()
            .any(|name| after.contains(name) || self.table.store_is_observable(name))
    }

    fn mark(&mut self, path: &StmtPath) {
        self.marks.live.insert(path.clone());
    }
}

/// Names a statement always rebinds when it completes normally.
///
/// Walrus targets are left out: they may sit in a branch that does not run.
fn definite_kills(node: &Node) -> Vec<&str> {
    let mut out = Vec::new();
    match node {
        Node::Assign { targets, .. } => {
            for target in targets {
                target.bound_names(&mut out);
            }
        }
        Node::AnnAssign {
            target, value: Some(_), ..
        } => target.bound_names(&mut out),
        Node::FunctionDef(function) => out.push(function.name.name.as_str()),
        Node::ClassDef(class) => out.push(class.name.name.as_str()),
        Node::Import { names, .. } | Node::ImportFrom { names, .. } => {
            out.extend(names.iter().filter_map(Alias::binding));
        }
        Node::With { items, .. } => {
            for item in items {
                if let Some(vars) = &item.optional_vars {
                    vars.bound_names(&mut out);
                }
            }
        }
        _ => {}
    }
    out
}

/// Can storing `value` into `target` not fail? Unpacking fails unless the value is a display with
/// exactly as many elements as the target.
fn unpack_is_safe(target: &Target, value: &ExprLoc) -> bool {
    match target {
        Target::Name(_) | Target::Attribute { .. } | Target::Subscript { .. } => true,
        Target::Tuple { targets, .. } | Target::List { targets, .. } => match &value.expr {
            Expr::Tuple(items) | Expr::List(items) => {
                items.len() == targets.len()
                    && !items.iter().any(|item| matches!(item.expr, Expr::Starred(_)))
                    && targets
                        .iter()
                        .zip(items)
                        .all(|(target, item)| unpack_is_safe(target, item))
            }
            _ => false,
        },
        Target::Starred(_) => false,
    }
}

/// Surviving and removed bindings, gathered to check that sweeping keeps every read's scope intact.
#[derive(Default)]
struct Survey<'t> {
    reads: Vec<&'t str>,
    binds: AHashSet<&'t str>,
    /// Dead statements binding a name, in source order, with the statement line.
    dead_binders: Vec<(StmtPath, &'t str, u32)>,
}

/// Pins dead bindings whose removal would leave a surviving read of a local name with no binding at
/// all, turning an unbound-local error into a read of an outer name. Returns true if anything new
/// was pinned and the analysis must run again.
fn pin_unbound_reads(
    body: &[Node],
    table: &ScopeTable,
    marks: &Marks,
    pinned: &mut AHashSet<StmtPath>,
    tracer: &mut impl OptimizeTracer,
) -> bool {
    let mut survey = Survey::default();
    collect_survey(body, &mut StmtPath::new(), true, marks, &mut survey);
    let mut seen = AHashSet::new();
    let mut changed = false;
    for name in survey.reads {
        if !seen.insert(name) || !table.is_local(name) || table.is_param(name) || survey.binds.contains(name) {
            continue;
        }
        let Some((path, _, line)) = survey.dead_binders.iter().find(|(_, bound, _)| *bound == name) else {
            continue;
        };
        // pin the binder and every compound statement around it
        for len in (1..=path.len()).step_by(2) {
            pinned.insert(StmtPath::from_slice(&path[..len]));
        }
        tracer.on_binding_pinned(name, *line);
        changed = true;
    }
    changed
}

fn collect_survey<'t>(body: &'t [Node], path: &mut StmtPath, alive: bool, marks: &Marks, survey: &mut Survey<'t>) {
    for (index, node) in body.iter().enumerate() {
        path.push(index);
        let live = alive && marks.live.contains(path.as_slice());
        if live {
            survey.reads.extend(header_reads(node));
            survey.binds.extend(node.header_bindings());
            match node {
                Node::FunctionDef(function) => survey.reads.extend(free_names(function)),
                Node::ClassDef(class) => deep_names(&class.body, &mut survey.reads),
                _ => {}
            }
        } else if alive
            && marks.replaced.contains(path.as_slice())
            && let Node::For { target, iter, .. } = node
        {
            expr_reads(iter, &mut survey.reads);
            let mut walrus = Vec::new();
            walrus_targets(iter, &mut walrus);
            survey.binds.extend(walrus);
            // the evaluation stays but the target binding goes
            let mut bound = Vec::new();
            target.bound_names(&mut bound);
            survey
                .dead_binders
                .extend(bound.into_iter().map(|name| (path.clone(), name, node.line())));
        } else {
            for name in node.header_bindings() {
                survey.dead_binders.push((path.clone(), name, node.line()));
            }
        }
        for (block_index, block) in node.blocks().into_iter().enumerate() {
            path.push(block_index);
            collect_survey(block, path, live, marks, survey);
            path.pop();
        }
        path.pop();
    }
}

/// Rebuilds every block from the analysis marks, dropping dead statements.
fn sweep(body: &mut Vec<Node>, path: &mut StmtPath, marks: &Marks, tracer: &mut impl OptimizeTracer) {
    let old = std::mem::take(body);
    for (index, mut node) in old.into_iter().enumerate() {
        path.push(index);
        if marks.live.contains(path.as_slice()) {
            for (block_index, block) in node.blocks_mut().into_iter().enumerate() {
                path.push(block_index);
                sweep(block, path, marks, tracer);
                path.pop();
            }
            body.push(node);
        } else if marks.replaced.contains(path.as_slice())
            && let Node::For { iter, .. } = node
        {
            tracer.on_loop_replaced(iter.line());
            body.push(Node::Expr(iter));
        } else {
            tracer.on_statement_removed(node.kind(), node.line());
        }
        path.pop();
    }
}
