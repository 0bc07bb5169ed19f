//! Writes a [`Module`] back out as Python source.
//!
//! Output uses four-space indentation and only the parentheses operator precedence requires, with
//! tuples always parenthesized. Empty blocks are written as `pass`.

use std::fmt::Write;

use crate::tree::{
    Alias, BoolOperator, CmpOperator, Comprehension, ConversionFlag, ExceptHandler, Expr, ExprLoc, FStringPart,
    Keyword, Literal, Module, Node, Operator, Param, Parameters, Target,
};

const INDENT: &str = "    ";

/// Renders a module as Python source, one statement per line.
#[must_use]
pub fn render(module: &Module) -> String {
    let mut renderer = Renderer::default();
    renderer.block(&module.body, true);
    renderer.out
}

/// Renders a single expression, e.g. for trace output.
#[must_use]
pub fn render_expr(expr: &ExprLoc) -> String {
    let mut renderer = Renderer::default();
    renderer.expr(expr, prec::LAMBDA);
    renderer.out
}

/// Binding strength of each expression form; a child binding looser than its slot requires is
/// parenthesized.
mod prec {
    pub const LAMBDA: u8 = 1;
    pub const IF_ELSE: u8 = 2;
    pub const OR: u8 = 3;
    pub const AND: u8 = 4;
    pub const NOT: u8 = 5;
    pub const CMP: u8 = 6;
    pub const BIT_OR: u8 = 7;
    pub const BIT_XOR: u8 = 8;
    pub const BIT_AND: u8 = 9;
    pub const SHIFT: u8 = 10;
    pub const ARITH: u8 = 11;
    pub const TERM: u8 = 12;
    pub const UNARY: u8 = 13;
    pub const POWER: u8 = 14;
    pub const AWAIT: u8 = 15;
    pub const PRIMARY: u8 = 16;
    pub const ATOM: u8 = 17;
}

#[derive(Default)]
struct Renderer {
    out: String,
    depth: usize,
}

impl Renderer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Writes a block; a non-root empty block becomes `pass`.
    fn block(&mut self, body: &[Node], root: bool) {
        if body.is_empty() && !root {
            self.line("pass");
            return;
        }
        for node in body {
            self.statement(node);
        }
    }

    fn indented(&mut self, body: &[Node]) {
        self.depth += 1;
        self.block(body, false);
        self.depth -= 1;
    }

    fn statement(&mut self, node: &Node) {
        match node {
            Node::Expr(e) => {
                let text = self.sub(|r| r.top_expr(e));
                self.line(&text);
            }
            Node::Assign { targets, value } => {
                let text = self.sub(|r| {
                    for target in targets {
                        r.target(target);
                        r.out.push_str(" = ");
                    }
                    r.top_expr(value);
                });
                self.line(&text);
            }
            Node::AugAssign { target, op, value } => {
                let text = self.sub(|r| {
                    r.target(target);
                    let _ = write!(r.out, " {}= ", op_str(*op));
                    r.top_expr(value);
                });
                self.line(&text);
            }
            Node::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let text = self.sub(|r| {
                    r.target(target);
                    r.out.push_str(": ");
                    r.expr(annotation, prec::LAMBDA);
                    if let Some(value) = value {
                        r.out.push_str(" = ");
                        r.top_expr(value);
                    }
                });
                self.line(&text);
            }
            Node::Return { value, .. } => {
                let text = self.sub(|r| {
                    r.out.push_str("return");
                    if let Some(value) = value {
                        r.out.push(' ');
                        r.expr(value, prec::LAMBDA);
                    }
                });
                self.line(&text);
            }
            Node::Delete { targets, .. } => {
                let text = self.sub(|r| {
                    r.out.push_str("del ");
                    r.comma_separated(targets, Self::target);
                });
                self.line(&text);
            }
            Node::Pass { .. } => self.line("pass"),
            Node::Break { .. } => self.line("break"),
            Node::Continue { .. } => self.line("continue"),
            Node::If { test, body, or_else } => {
                let text = self.sub(|r| {
                    r.out.push_str("if ");
                    r.expr(test, prec::LAMBDA);
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(body);
                self.or_else_chain(or_else);
            }
            Node::For {
                target,
                iter,
                body,
                or_else,
                is_async,
            } => {
                let text = self.sub(|r| {
                    if *is_async {
                        r.out.push_str("async ");
                    }
                    r.out.push_str("for ");
                    r.target(target);
                    r.out.push_str(" in ");
                    r.expr(iter, prec::LAMBDA);
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(body);
                self.else_block(or_else);
            }
            Node::While { test, body, or_else } => {
                let text = self.sub(|r| {
                    r.out.push_str("while ");
                    r.expr(test, prec::LAMBDA);
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(body);
                self.else_block(or_else);
            }
            Node::FunctionDef(f) => {
                self.decorators(&f.decorators);
                let text = self.sub(|r| {
                    if f.is_async {
                        r.out.push_str("async ");
                    }
                    let _ = write!(r.out, "def {}(", f.name.name);
                    r.parameters(&f.params, true);
                    r.out.push(')');
                    if let Some(returns) = &f.returns {
                        r.out.push_str(" -> ");
                        r.expr(returns, prec::LAMBDA);
                    }
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(&f.body);
            }
            Node::ClassDef(c) => {
                self.decorators(&c.decorators);
                let text = self.sub(|r| {
                    let _ = write!(r.out, "class {}", c.name.name);
                    if !c.bases.is_empty() || !c.keywords.is_empty() {
                        r.out.push('(');
                        r.call_arguments(&c.bases, &c.keywords);
                        r.out.push(')');
                    }
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(&c.body);
            }
            Node::With { items, body, is_async } => {
                let text = self.sub(|r| {
                    if *is_async {
                        r.out.push_str("async ");
                    }
                    r.out.push_str("with ");
                    r.comma_separated(items, |r, item| {
                        r.expr(&item.context_expr, prec::LAMBDA);
                        if let Some(vars) = &item.optional_vars {
                            r.out.push_str(" as ");
                            r.target(vars);
                        }
                    });
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(body);
            }
            Node::Try {
                body,
                handlers,
                or_else,
                finally,
                is_star,
            } => {
                self.line("try:");
                self.indented(body);
                for handler in handlers {
                    self.except_handler(handler, *is_star);
                }
                if !or_else.is_empty() {
                    self.line("else:");
                    self.indented(or_else);
                }
                // `try` needs at least one handler or a `finally`
                if !finally.is_empty() || handlers.is_empty() {
                    self.line("finally:");
                    self.indented(finally);
                }
            }
            Node::Raise { exc, cause, .. } => {
                let text = self.sub(|r| {
                    r.out.push_str("raise");
                    if let Some(exc) = exc {
                        r.out.push(' ');
                        r.expr(exc, prec::LAMBDA);
                    }
                    if let Some(cause) = cause {
                        r.out.push_str(" from ");
                        r.expr(cause, prec::LAMBDA);
                    }
                });
                self.line(&text);
            }
            Node::Assert { test, msg } => {
                let text = self.sub(|r| {
                    r.out.push_str("assert ");
                    r.expr(test, prec::LAMBDA);
                    if let Some(msg) = msg {
                        r.out.push_str(", ");
                        r.expr(msg, prec::LAMBDA);
                    }
                });
                self.line(&text);
            }
            Node::Import { names, .. } => {
                let text = self.sub(|r| {
                    r.out.push_str("import ");
                    r.comma_separated(names, Self::alias);
                });
                self.line(&text);
            }
            Node::ImportFrom {
                module, names, level, ..
            } => {
                let text = self.sub(|r| {
                    r.out.push_str("from ");
                    for _ in 0..*level {
                        r.out.push('.');
                    }
                    if let Some(module) = module {
                        r.out.push_str(module);
                    }
                    r.out.push_str(" import ");
                    r.comma_separated(names, Self::alias);
                });
                self.line(&text);
            }
            Node::Global { names, .. } => {
                let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
                self.line(&format!("global {}", names.join(", ")));
            }
            Node::Nonlocal { names, .. } => {
                let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
                self.line(&format!("nonlocal {}", names.join(", ")));
            }
        }
    }

    /// Renders a fragment into a fresh buffer, so statement headers can be emitted as one line.
    fn sub(&self, f: impl FnOnce(&mut Self)) -> String {
        let mut r = Self::default();
        f(&mut r);
        r.out
    }

    fn or_else_chain(&mut self, or_else: &[Node]) {
        match or_else {
            [] => {}
            [Node::If { test, body, or_else }] => {
                let text = self.sub(|r| {
                    r.out.push_str("elif ");
                    r.expr(test, prec::LAMBDA);
                    r.out.push(':');
                });
                self.line(&text);
                self.indented(body);
                self.or_else_chain(or_else);
            }
            _ => {
                self.line("else:");
                self.indented(or_else);
            }
        }
    }

    fn else_block(&mut self, or_else: &[Node]) {
        if !or_else.is_empty() {
            self.line("else:");
            self.indented(or_else);
        }
    }

    fn decorators(&mut self, decorators: &[ExprLoc]) {
        for decorator in decorators {
            let text = self.sub(|r| {
                r.out.push('@');
                r.expr(decorator, prec::LAMBDA);
            });
            self.line(&text);
        }
    }

    fn except_handler(&mut self, handler: &ExceptHandler, is_star: bool) {
        let text = self.sub(|r| {
            r.out.push_str(if is_star { "except*" } else { "except" });
            if let Some(exc_type) = &handler.exc_type {
                r.out.push(' ');
                r.expr(exc_type, prec::LAMBDA);
            }
            if let Some(name) = &handler.name {
                let _ = write!(r.out, " as {}", name.name);
            }
            r.out.push(':');
        });
        self.line(&text);
        self.indented(&handler.body);
    }

    fn alias(&mut self, alias: &Alias) {
        self.out.push_str(&alias.name);
        if let Some(asname) = &alias.asname {
            let _ = write!(self.out, " as {}", asname.name);
        }
    }

    fn comma_separated<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            f(self, item);
        }
    }

    fn target(&mut self, target: &Target) {
        match target {
            Target::Name(ident) => self.out.push_str(&ident.name),
            Target::Attribute { object, attr, .. } => {
                self.receiver(object);
                let _ = write!(self.out, ".{attr}");
            }
            Target::Subscript { object, index, .. } => {
                self.receiver(object);
                self.subscript_index(index);
            }
            Target::Tuple { targets, .. } => {
                self.out.push('(');
                self.comma_separated(targets, Self::target);
                if targets.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            Target::List { targets, .. } => {
                self.out.push('[');
                self.comma_separated(targets, Self::target);
                self.out.push(']');
            }
            Target::Starred(inner) => {
                self.out.push('*');
                self.target(inner);
            }
        }
    }

    fn parameters(&mut self, params: &Parameters, annotations: bool) {
        let mut parts: Vec<String> = Vec::new();
        let param = |p: &Param, prefix: &str| {
            let mut r = Self::default();
            let _ = write!(r.out, "{prefix}{}", p.name.name);
            let annotated = annotations && p.annotation.is_some();
            if annotations && let Some(annotation) = &p.annotation {
                r.out.push_str(": ");
                r.expr(annotation, prec::LAMBDA);
            }
            if let Some(default) = &p.default {
                r.out.push_str(if annotated { " = " } else { "=" });
                r.expr(default, prec::LAMBDA);
            }
            r.out
        };
        for p in &params.pos_only {
            parts.push(param(p, ""));
        }
        if !params.pos_only.is_empty() {
            parts.push("/".to_owned());
        }
        for p in &params.args {
            parts.push(param(p, ""));
        }
        if let Some(p) = &params.var_args {
            parts.push(param(p, "*"));
        } else if !params.kw_only.is_empty() {
            parts.push("*".to_owned());
        }
        for p in &params.kw_only {
            parts.push(param(p, ""));
        }
        if let Some(p) = &params.var_kwargs {
            parts.push(param(p, "**"));
        }
        self.out.push_str(&parts.join(", "));
    }

    /// Top-level expression of a statement: a bare `yield` needs no parentheses here.
    fn top_expr(&mut self, e: &ExprLoc) {
        match &e.expr {
            Expr::Yield(_) | Expr::YieldFrom(_) => self.yield_expr(e),
            _ => self.expr(e, prec::LAMBDA),
        }
    }

    fn yield_expr(&mut self, e: &ExprLoc) {
        match &e.expr {
            Expr::Yield(None) => self.out.push_str("yield"),
            Expr::Yield(Some(value)) => {
                self.out.push_str("yield ");
                self.expr(value, prec::LAMBDA);
            }
            Expr::YieldFrom(value) => {
                self.out.push_str("yield from ");
                self.expr(value, prec::LAMBDA);
            }
            _ => self.expr(e, prec::LAMBDA),
        }
    }

    fn expr(&mut self, e: &ExprLoc, min: u8) {
        let own = precedence(&e.expr);
        if own < min {
            self.out.push('(');
            self.expr_inner(e);
            self.out.push(')');
        } else {
            self.expr_inner(e);
        }
    }

    /// Object of an attribute access, call or subscript. Integer literals need parentheses
    /// so the `.` is not read as a decimal point.
    fn receiver(&mut self, object: &ExprLoc) {
        if matches!(object.expr, Expr::Literal(Literal::Int(_) | Literal::LongInt(_))) {
            self.out.push('(');
            self.expr_inner(object);
            self.out.push(')');
        } else {
            self.expr(object, prec::PRIMARY);
        }
    }

    fn subscript_index(&mut self, index: &ExprLoc) {
        self.out.push('[');
        match &index.expr {
            // `a[1:2, 3]` cannot be written with tuple parentheses around a slice
            Expr::Tuple(items) if !items.is_empty() => {
                self.comma_separated(items, |r, item| r.expr(item, prec::LAMBDA));
                if items.len() == 1 {
                    self.out.push(',');
                }
            }
            _ => self.expr(index, prec::LAMBDA),
        }
        self.out.push(']');
    }

    fn call_arguments(&mut self, args: &[ExprLoc], keywords: &[Keyword]) {
        self.comma_separated(args, |r, arg| r.expr(arg, prec::LAMBDA));
        if !args.is_empty() && !keywords.is_empty() {
            self.out.push_str(", ");
        }
        self.comma_separated(keywords, |r, keyword| match &keyword.key {
            Some(key) => {
                let _ = write!(r.out, "{}=", key.name);
                r.expr(&keyword.value, prec::LAMBDA);
            }
            None => {
                r.out.push_str("**");
                r.expr(&keyword.value, prec::BIT_OR);
            }
        });
    }

    fn generators(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.out.push_str(if generator.is_async { " async for " } else { " for " });
            self.target(&generator.target);
            self.out.push_str(" in ");
            self.expr(&generator.iter, prec::OR);
            for cond in &generator.ifs {
                self.out.push_str(" if ");
                self.expr(cond, prec::OR);
            }
        }
    }

    fn expr_inner(&mut self, e: &ExprLoc) {
        match &e.expr {
            Expr::Literal(literal) => self.literal(literal),
            Expr::Name(ident) => self.out.push_str(&ident.name),
            Expr::Call { func, args, keywords } => {
                self.receiver(func);
                self.out.push('(');
                self.call_arguments(args, keywords);
                self.out.push(')');
            }
            Expr::Attribute { object, attr } => {
                self.receiver(object);
                let _ = write!(self.out, ".{attr}");
            }
            Expr::Subscript { object, index } => {
                self.receiver(object);
                self.subscript_index(index);
            }
            Expr::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    self.expr(lower, prec::LAMBDA);
                }
                self.out.push(':');
                if let Some(upper) = upper {
                    self.expr(upper, prec::LAMBDA);
                }
                if let Some(step) = step {
                    self.out.push(':');
                    self.expr(step, prec::LAMBDA);
                }
            }
            Expr::Op { left, op, right } => {
                let own = op_precedence(*op);
                if *op == Operator::Pow {
                    self.expr(left, prec::AWAIT);
                    self.out.push_str(" ** ");
                    self.expr(right, prec::UNARY);
                } else {
                    self.expr(left, own);
                    let _ = write!(self.out, " {} ", op_str(*op));
                    self.expr(right, own + 1);
                }
            }
            Expr::BoolOp { op, values } => {
                let (text, child) = match op {
                    BoolOperator::And => (" and ", prec::NOT),
                    BoolOperator::Or => (" or ", prec::AND),
                };
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(text);
                    }
                    self.expr(value, child);
                }
            }
            Expr::CmpOp { left, op, right } => {
                self.expr(left, prec::BIT_OR);
                let _ = write!(self.out, " {} ", cmp_str(*op));
                self.expr(right, prec::BIT_OR);
            }
            Expr::ChainCmp { left, comparisons } => {
                self.expr(left, prec::BIT_OR);
                for (op, right) in comparisons {
                    let _ = write!(self.out, " {} ", cmp_str(*op));
                    self.expr(right, prec::BIT_OR);
                }
            }
            Expr::Not(operand) => {
                self.out.push_str("not ");
                self.expr(operand, prec::NOT);
            }
            Expr::UnaryMinus(operand) => self.unary('-', operand),
            Expr::UnaryPlus(operand) => self.unary('+', operand),
            Expr::UnaryInvert(operand) => self.unary('~', operand),
            Expr::List(items) => {
                self.out.push('[');
                self.comma_separated(items, |r, item| r.expr(item, prec::LAMBDA));
                self.out.push(']');
            }
            Expr::Tuple(items) => {
                self.out.push('(');
                self.comma_separated(items, |r, item| r.expr(item, prec::LAMBDA));
                if items.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            Expr::Set(items) => {
                if items.is_empty() {
                    // the only display form of an empty set
                    self.out.push_str("{*()}");
                } else {
                    self.out.push('{');
                    self.comma_separated(items, |r, item| r.expr(item, prec::LAMBDA));
                    self.out.push('}');
                }
            }
            Expr::Dict(items) => {
                self.out.push('{');
                self.comma_separated(items, |r, (key, value)| match key {
                    Some(key) => {
                        r.expr(key, prec::LAMBDA);
                        r.out.push_str(": ");
                        r.expr(value, prec::LAMBDA);
                    }
                    None => {
                        r.out.push_str("**");
                        r.expr(value, prec::BIT_OR);
                    }
                });
                self.out.push('}');
            }
            Expr::IfElse { test, body, orelse } => {
                self.expr(body, prec::OR);
                self.out.push_str(" if ");
                self.expr(test, prec::OR);
                self.out.push_str(" else ");
                self.expr(orelse, prec::IF_ELSE);
            }
            Expr::Lambda { params, body } => {
                self.out.push_str("lambda");
                if params.iter().next().is_some() {
                    self.out.push(' ');
                    self.parameters(params, false);
                }
                self.out.push_str(": ");
                self.expr(body, prec::LAMBDA);
            }
            Expr::ListComp { elt, generators } => {
                self.out.push('[');
                self.expr(elt, prec::LAMBDA);
                self.generators(generators);
                self.out.push(']');
            }
            Expr::SetComp { elt, generators } => {
                self.out.push('{');
                self.expr(elt, prec::LAMBDA);
                self.generators(generators);
                self.out.push('}');
            }
            Expr::DictComp { key, value, generators } => {
                self.out.push('{');
                self.expr(key, prec::LAMBDA);
                self.out.push_str(": ");
                self.expr(value, prec::LAMBDA);
                self.generators(generators);
                self.out.push('}');
            }
            Expr::GeneratorExp { elt, generators } => {
                self.out.push('(');
                self.expr(elt, prec::LAMBDA);
                self.generators(generators);
                self.out.push(')');
            }
            Expr::Named { target, value } => {
                let _ = write!(self.out, "({} := ", target.name);
                self.expr(value, prec::LAMBDA);
                self.out.push(')');
            }
            Expr::Await(value) => {
                self.out.push_str("await ");
                self.expr(value, prec::PRIMARY);
            }
            Expr::Yield(_) | Expr::YieldFrom(_) => {
                self.out.push('(');
                self.yield_expr(e);
                self.out.push(')');
            }
            Expr::FString(parts) => {
                self.out.push_str("f'");
                self.fstring_parts(parts);
                self.out.push('\'');
            }
            Expr::Starred(value) => {
                self.out.push('*');
                self.expr(value, prec::BIT_OR);
            }
        }
    }

    fn unary(&mut self, op: char, operand: &ExprLoc) {
        self.out.push(op);
        self.expr(operand, prec::UNARY);
    }

    fn fstring_parts(&mut self, parts: &[FStringPart]) {
        for part in parts {
            match part {
                FStringPart::Literal(text) => {
                    let escaped = escape_str(text).replace('{', "{{").replace('}', "}}");
                    self.out.push_str(&escaped);
                }
                FStringPart::Interpolation {
                    expr,
                    conversion,
                    format_spec,
                    debug_text,
                } => {
                    self.out.push('{');
                    if let Some(debug_text) = debug_text {
                        self.out.push_str(debug_text);
                    } else {
                        let text = self.sub(|r| r.expr(expr, prec::LAMBDA));
                        // `{{` would read as an escaped brace
                        if text.starts_with('{') {
                            self.out.push(' ');
                        }
                        self.out.push_str(&text);
                    }
                    match conversion {
                        ConversionFlag::None => {}
                        ConversionFlag::Str => self.out.push_str("!s"),
                        ConversionFlag::Repr => self.out.push_str("!r"),
                        ConversionFlag::Ascii => self.out.push_str("!a"),
                    }
                    if let Some(spec) = format_spec {
                        self.out.push(':');
                        self.fstring_parts(spec);
                    }
                    self.out.push('}');
                }
            }
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Ellipsis => self.out.push_str("..."),
            Literal::None => self.out.push_str("None"),
            Literal::Bool(true) => self.out.push_str("True"),
            Literal::Bool(false) => self.out.push_str("False"),
            Literal::Int(i) => {
                let _ = write!(self.out, "{i}");
            }
            Literal::LongInt(i) => {
                let _ = write!(self.out, "{i}");
            }
            Literal::Float(f) => self.out.push_str(&float_repr(*f)),
            Literal::Imaginary(f) => {
                if f.fract() == 0.0 && f.abs() < 1e16 {
                    let _ = write!(self.out, "{f:.0}j");
                } else {
                    let _ = write!(self.out, "{}j", float_repr(*f));
                }
            }
            Literal::Str(s) => {
                self.out.push('\'');
                self.out.push_str(&escape_str(s));
                self.out.push('\'');
            }
            Literal::Bytes(bytes) => {
                self.out.push_str("b'");
                for &b in bytes {
                    match b {
                        b'\\' => self.out.push_str("\\\\"),
                        b'\'' => self.out.push_str("\\'"),
                        b'\n' => self.out.push_str("\\n"),
                        b'\r' => self.out.push_str("\\r"),
                        b'\t' => self.out.push_str("\\t"),
                        0x20..=0x7e => self.out.push(char::from(b)),
                        _ => {
                            let _ = write!(self.out, "\\x{b:02x}");
                        }
                    }
                }
                self.out.push('\'');
            }
        }
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Lambda { .. } => prec::LAMBDA,
        Expr::IfElse { .. } => prec::IF_ELSE,
        Expr::BoolOp {
            op: BoolOperator::Or, ..
        } => prec::OR,
        Expr::BoolOp {
            op: BoolOperator::And, ..
        } => prec::AND,
        Expr::Not(_) => prec::NOT,
        Expr::CmpOp { .. } | Expr::ChainCmp { .. } => prec::CMP,
        Expr::Op { op, .. } => op_precedence(*op),
        Expr::UnaryMinus(_) | Expr::UnaryPlus(_) | Expr::UnaryInvert(_) => prec::UNARY,
        Expr::Await(_) => prec::AWAIT,
        Expr::Call { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => prec::PRIMARY,
        // slices only appear as subscript indexes; starred only in displays and calls
        Expr::Slice { .. } | Expr::Starred(_) => prec::LAMBDA,
        Expr::Literal(_)
        | Expr::Name(_)
        | Expr::List(_)
        | Expr::Tuple(_)
        | Expr::Set(_)
        | Expr::Dict(_)
        | Expr::ListComp { .. }
        | Expr::SetComp { .. }
        | Expr::DictComp { .. }
        | Expr::GeneratorExp { .. }
        | Expr::Named { .. }
        | Expr::Yield(_)
        | Expr::YieldFrom(_)
        | Expr::FString(_) => prec::ATOM,
    }
}

fn op_precedence(op: Operator) -> u8 {
    match op {
        Operator::BitOr => prec::BIT_OR,
        Operator::BitXor => prec::BIT_XOR,
        Operator::BitAnd => prec::BIT_AND,
        Operator::LShift | Operator::RShift => prec::SHIFT,
        Operator::Add | Operator::Sub => prec::ARITH,
        Operator::Mult | Operator::MatMult | Operator::Div | Operator::Mod | Operator::FloorDiv => prec::TERM,
        Operator::Pow => prec::POWER,
    }
}

fn op_str(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn cmp_str(op: CmpOperator) -> &'static str {
    match op {
        CmpOperator::Eq => "==",
        CmpOperator::NotEq => "!=",
        CmpOperator::Lt => "<",
        CmpOperator::LtE => "<=",
        CmpOperator::Gt => ">",
        CmpOperator::GtE => ">=",
        CmpOperator::Is => "is",
        CmpOperator::IsNot => "is not",
        CmpOperator::In => "in",
        CmpOperator::NotIn => "not in",
    }
}

/// Escapes a string for a single-quoted literal.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Formats a float the way Python's `repr` does: shortest round-trip digits, positional notation
/// for decimal exponents in `-4..16`, scientific notation with a signed two-digit exponent otherwise.
fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "float('nan')".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "1e309".to_owned() } else { "-1e309".to_owned() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0".to_owned() } else { "0.0".to_owned() };
    }
    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(f.abs());
    let (mantissa, exp) = match shortest.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (shortest, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    // all significant digits, and the decimal exponent of the first one
    let mut digits = format!("{int_part}{frac_part}");
    let leading_zeros = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading_zeros);
    let trimmed_len = digits.trim_end_matches('0').len();
    digits.truncate(trimmed_len.max(1));
    let int_len = i32::try_from(int_part.len()).unwrap_or(0);
    let zeros = i32::try_from(leading_zeros).unwrap_or(0);
    let exponent = int_len - 1 - zeros + exp;

    let mut out = String::new();
    if f.is_sign_negative() {
        out.push('-');
    }
    if (-4..16).contains(&exponent) {
        if exponent < 0 {
            out.push_str("0.");
            for _ in 0..(-exponent - 1) {
                out.push('0');
            }
            out.push_str(&digits);
        } else {
            let point = usize::try_from(exponent + 1).unwrap_or(0);
            if digits.len() <= point {
                out.push_str(&digits);
                for _ in digits.len()..point {
                    out.push('0');
                }
                out.push_str(".0");
            } else {
                out.push_str(&digits[..point]);
                out.push('.');
                out.push_str(&digits[point..]);
            }
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let _ = write!(out, "e{exponent:+03}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn roundtrip(code: &str) -> String {
        render(&parse(code).unwrap())
    }

    #[test]
    fn floats_match_python_repr() {
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(0.55), "0.55");
        assert_eq!(float_repr(7.0), "7.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(123_456.789), "123456.789");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.000_01), "1e-05");
        assert_eq!(float_repr(1.5e300), "1.5e+300");
        assert_eq!(float_repr(f64::INFINITY), "1e309");
    }

    #[test]
    fn precedence_keeps_needed_parens_only() {
        assert_eq!(roundtrip("x = (a + b) * c\n"), "x = (a + b) * c\n");
        assert_eq!(roundtrip("x = a + (b * c)\n"), "x = a + b * c\n");
        assert_eq!(roundtrip("x = a - (b - c)\n"), "x = a - (b - c)\n");
        assert_eq!(roundtrip("x = (-2) ** 2\n"), "x = (-2) ** 2\n");
        assert_eq!(roundtrip("x = 2 ** -1\n"), "x = 2 ** -1\n");
        assert_eq!(roundtrip("x = not (a and b)\n"), "x = not (a and b)\n");
        assert_eq!(roundtrip("x = (a if b else c) + 1\n"), "x = (a if b else c) + 1\n");
    }

    #[test]
    fn tuples_are_parenthesized() {
        assert_eq!(roundtrip("a, b = 1, 2\n"), "(a, b) = (1, 2)\n");
        assert_eq!(roundtrip("x = 1,\n"), "x = (1,)\n");
        assert_eq!(roundtrip("y = a[1:2, ::3]\n"), "y = a[1:2, ::3]\n");
    }

    #[test]
    fn elif_chains_and_empty_blocks() {
        let code = "if a:\n    x = 1\nelif b:\n    pass\nelse:\n    y = 2\n";
        assert_eq!(roundtrip(code), code);
    }

    #[test]
    fn functions_and_classes() {
        let code = "@dec\nasync def f(a, /, b: int = 1, *args, c, **kw) -> str:\n    return await g(a, *args, k=b, **kw)\nclass C(Base, metaclass=M):\n    x: int = 0\n";
        assert_eq!(roundtrip(code), code);
    }

    #[test]
    fn strings_and_fstrings() {
        assert_eq!(roundtrip("s = \"it's\"\n"), "s = 'it\\'s'\n");
        assert_eq!(roundtrip("s = f\"{x!r:>{w}} {{lit}}\"\n"), "s = f'{x!r:>{w}} {{lit}}'\n");
        assert_eq!(roundtrip("s = f'{x = }'\n"), "s = f'{x = }'\n");
        assert_eq!(roundtrip("b = b'\\x00a'\n"), "b = b'\\x00a'\n");
    }

    #[test]
    fn try_and_imports() {
        let code = "import os.path as p, sys\nfrom ..pkg import a as b\ntry:\n    pass\nexcept ValueError as e:\n    raise KeyError() from e\nelse:\n    pass\nfinally:\n    del x, y[0]\n";
        assert_eq!(roundtrip(code), code);
    }

    #[test]
    fn comprehensions_and_lambdas() {
        let code = "x = [i * 2 for i in range(3) if i]\ny = {k: v for (k, v) in d.items()}\nf = lambda a, b=1: a + b\ng = sum((i for i in z))\n";
        assert_eq!(roundtrip(code), code);
    }

    #[test]
    fn yield_is_parenthesized_inside_expressions() {
        let code = "def g():\n    x = yield 1\n    y = (yield) + 1\n    yield from z\n";
        assert_eq!(roundtrip(code), code);
    }
}
