//! The syntax tree the optimizer reads and rewrites.
//!
//! Statements are [`Node`]s and expressions are [`ExprLoc`]s (an [`Expr`] plus its source range).
//! Every tree is single-rooted: no node is shared between two parents, and passes that need a second
//! copy of a subtree clone it.
//!
//! Positions are carried for diagnostics and for naming hoisted temporaries only. Structural equality
//! (the derived `PartialEq`) compares positions too, which is what the fixpoint driver wants: a pass
//! that changes nothing leaves every position untouched.

use std::fmt;

use num_bigint::BigInt;
use strum::IntoStaticStr;

/// A line/column pair. Lines are 1-based, columns are 0-based byte offsets into the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range of a node.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

/// Custom Debug implementation to keep tree dumps readable.
impl fmt::Debug for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

impl CodeRange {
    #[must_use]
    pub const fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    /// A zero-width range on the given line, used by tree builders in tests.
    #[must_use]
    pub const fn line(line: u32) -> Self {
        Self {
            start: CodeLoc::new(line, 0),
            end: CodeLoc::new(line, 0),
        }
    }
}

/// A name occurrence (variable, function, parameter, declared global...).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Identifier {
    pub name: String,
    pub position: CodeRange,
}

impl Identifier {
    pub fn new(name: impl Into<String>, position: CodeRange) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Constant values that appear directly in source.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Ellipsis,
    None,
    Bool(bool),
    Int(i64),
    /// Integer literal outside the i64 range.
    LongInt(BigInt),
    Float(f64),
    /// Imaginary literal such as `2j`; the payload is the imaginary part.
    Imaginary(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Literal {
    /// Python truthiness for literals that have a statically known one.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Ellipsis => true,
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::LongInt(_) => true,
            Self::Float(f) | Self::Imaginary(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
        }
    }
}

/// Binary operators for arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    // `+`
    Add,
    // `-`
    Sub,
    // `*`
    Mult,
    // `@`
    MatMult,
    // `/`
    Div,
    // `%`
    Mod,
    // `**`
    Pow,
    // `<<`
    LShift,
    // `>>`
    RShift,
    // `|`
    BitOr,
    // `^`
    BitXor,
    // `&`
    BitAnd,
    // `//`
    FloorDiv,
}

/// Short-circuiting boolean operators; only the first operand is certain to be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BoolOperator {
    And,
    Or,
}

/// Defined separately since these operators always return a bool
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

/// A keyword argument in a call: `key=value`, or `**value` when `key` is `None`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyword {
    pub key: Option<Identifier>,
    pub value: ExprLoc,
}

/// A single function or lambda parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: Identifier,
    pub annotation: Option<ExprLoc>,
    pub default: Option<ExprLoc>,
}

/// A full parameter list, split into Python's five parameter groups.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Parameters {
    /// Positional-only parameters (before `/`).
    pub pos_only: Vec<Param>,
    pub args: Vec<Param>,
    /// `*args`
    pub var_args: Option<Box<Param>>,
    /// Keyword-only parameters (after `*` or `*args`).
    pub kw_only: Vec<Param>,
    /// `**kwargs`
    pub var_kwargs: Option<Box<Param>>,
}

impl Parameters {
    /// Returns every parameter in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.pos_only
            .iter()
            .chain(self.args.iter())
            .chain(self.var_args.as_deref())
            .chain(self.kw_only.iter())
            .chain(self.var_kwargs.as_deref())
    }

    /// Returns every parameter name in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|p| p.name.name.as_str())
    }

    /// Default expressions, evaluated when the enclosing `def` or `lambda` runs.
    pub fn defaults(&self) -> impl Iterator<Item = &ExprLoc> {
        self.iter().filter_map(|p| p.default.as_ref())
    }

    /// Annotation expressions, evaluated when the enclosing `def` runs.
    pub fn annotations(&self) -> impl Iterator<Item = &ExprLoc> {
        self.iter().filter_map(|p| p.annotation.as_ref())
    }
}

/// A generator clause in a comprehension: `for target in iter [if cond1] [if cond2]...`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Comprehension {
    pub target: Target,
    pub iter: ExprLoc,
    pub ifs: Vec<ExprLoc>,
    pub is_async: bool,
}

/// Conversion flag of an f-string interpolation (`!s`, `!r`, `!a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConversionFlag {
    None,
    Str,
    Repr,
    Ascii,
}

/// One piece of an f-string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FStringPart {
    Literal(String),
    Interpolation {
        expr: Box<ExprLoc>,
        conversion: ConversionFlag,
        /// `Some` when the interpolation has a `:spec`; the spec can itself hold interpolations.
        format_spec: Option<Vec<FStringPart>>,
        /// Text of a self-documenting `{expr=}` interpolation, including the `=`.
        debug_text: Option<String>,
    },
}

/// An expression in the tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Literal),
    Name(Identifier),
    Call {
        func: Box<ExprLoc>,
        args: Vec<ExprLoc>,
        keywords: Vec<Keyword>,
    },
    Attribute {
        object: Box<ExprLoc>,
        attr: String,
    },
    Subscript {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Slice literal from `x[start:stop:step]` syntax.
    Slice {
        lower: Option<Box<ExprLoc>>,
        upper: Option<Box<ExprLoc>>,
        step: Option<Box<ExprLoc>>,
    },
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<ExprLoc>,
    },
    CmpOp {
        left: Box<ExprLoc>,
        op: CmpOperator,
        right: Box<ExprLoc>,
    },
    /// Chain comparison expression: `a < b < c < d`
    ChainCmp {
        left: Box<ExprLoc>,
        comparisons: Vec<(CmpOperator, ExprLoc)>,
    },
    Not(Box<ExprLoc>),
    UnaryMinus(Box<ExprLoc>),
    UnaryPlus(Box<ExprLoc>),
    UnaryInvert(Box<ExprLoc>),
    List(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Set(Vec<ExprLoc>),
    /// Dict display; a `None` key is a `**mapping` unpack entry.
    Dict(Vec<(Option<ExprLoc>, ExprLoc)>),
    /// Conditional expression: `body if test else orelse`
    IfElse {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
    Lambda {
        params: Box<Parameters>,
        body: Box<ExprLoc>,
    },
    ListComp {
        elt: Box<ExprLoc>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<ExprLoc>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<ExprLoc>,
        value: Box<ExprLoc>,
        generators: Vec<Comprehension>,
    },
    /// Lazily evaluated: only the first iterable runs at creation time.
    GeneratorExp {
        elt: Box<ExprLoc>,
        generators: Vec<Comprehension>,
    },
    /// Named expression (walrus operator): `(target := value)`
    Named {
        target: Identifier,
        value: Box<ExprLoc>,
    },
    Await(Box<ExprLoc>),
    Yield(Option<Box<ExprLoc>>),
    YieldFrom(Box<ExprLoc>),
    FString(Vec<FStringPart>),
    /// `*value` inside a call or a display.
    Starred(Box<ExprLoc>),
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExprLoc {
    pub position: CodeRange,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(position: CodeRange, expr: Expr) -> Self {
        Self { position, expr }
    }

    /// Builds a name read.
    pub fn name(name: impl Into<String>, position: CodeRange) -> Self {
        Self::new(position, Expr::Name(Identifier::new(name, position)))
    }

    /// Source line the expression starts on.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.position.start.line
    }

    /// Bare names and literals: hoisting these into a temporary gains nothing.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        matches!(self.expr, Expr::Name(_) | Expr::Literal(_))
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match &self.expr {
            Expr::Name(ident) => Some(&ident.name),
            _ => None,
        }
    }
}

/// Target of an assignment, `for` loop, `with ... as`, or `del`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Target {
    Name(Identifier),
    Attribute {
        object: Box<ExprLoc>,
        attr: String,
        position: CodeRange,
    },
    Subscript {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
        position: CodeRange,
    },
    Tuple {
        targets: Vec<Self>,
        position: CodeRange,
    },
    List {
        targets: Vec<Self>,
        position: CodeRange,
    },
    Starred(Box<Self>),
}

impl Target {
    /// Names this target binds. Attribute and subscript targets bind none.
    pub fn bound_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Name(ident) => out.push(&ident.name),
            Self::Attribute { .. } | Self::Subscript { .. } => {}
            Self::Tuple { targets, .. } | Self::List { targets, .. } => {
                for target in targets {
                    target.bound_names(out);
                }
            }
            Self::Starred(inner) => inner.bound_names(out),
        }
    }

    /// True when storing into this target mutates an object rather than (only) rebinding names.
    #[must_use]
    pub fn stores_into_object(&self) -> bool {
        match self {
            Self::Name(_) => false,
            Self::Attribute { .. } | Self::Subscript { .. } => true,
            Self::Tuple { targets, .. } | Self::List { targets, .. } => targets.iter().any(Self::stores_into_object),
            Self::Starred(inner) => inner.stores_into_object(),
        }
    }

    /// Expressions evaluated while storing (receivers and indexes of attribute/subscript targets).
    pub fn operand_exprs<'a>(&'a self, out: &mut Vec<&'a ExprLoc>) {
        match self {
            Self::Name(_) => {}
            Self::Attribute { object, .. } => out.push(object),
            Self::Subscript { object, index, .. } => {
                out.push(object);
                out.push(index);
            }
            Self::Tuple { targets, .. } | Self::List { targets, .. } => {
                for target in targets {
                    target.operand_exprs(out);
                }
            }
            Self::Starred(inner) => inner.operand_exprs(out),
        }
    }

    pub fn as_name(&self) -> Option<&Identifier> {
        match self {
            Self::Name(ident) => Some(ident),
            _ => None,
        }
    }
}

/// An imported name: `name` or `name as asname`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Alias {
    pub name: String,
    pub asname: Option<Identifier>,
    pub position: CodeRange,
}

impl Alias {
    /// The name this alias binds in the importing scope, `None` for `*`.
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        if let Some(asname) = &self.asname {
            return Some(&asname.name);
        }
        if self.name == "*" {
            return None;
        }
        // `import a.b.c` binds `a`
        self.name.split('.').next()
    }
}

/// A `with` item: `context_expr [as optional_vars]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WithItem {
    pub context_expr: ExprLoc,
    pub optional_vars: Option<Target>,
}

/// One `except` clause.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExceptHandler {
    /// Exception type(s) to catch. None = bare except (catches all).
    pub exc_type: Option<ExprLoc>,
    pub name: Option<Identifier>,
    pub body: Vec<Node>,
    pub position: CodeRange,
}

/// A function definition. Its body is a scope of its own.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDef {
    pub name: Identifier,
    pub params: Parameters,
    pub body: Vec<Node>,
    pub decorators: Vec<ExprLoc>,
    pub returns: Option<ExprLoc>,
    pub is_async: bool,
}

/// A class definition. Its body runs once, at definition time, in a scope of its own.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassDef {
    pub name: Identifier,
    pub bases: Vec<ExprLoc>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Node>,
    pub decorators: Vec<ExprLoc>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Node {
    Expr(ExprLoc),
    /// `a = b = value`; targets are stored left to right.
    Assign {
        targets: Vec<Target>,
        value: ExprLoc,
    },
    /// Augmented assignment: `target op= value`. Reads and writes the target.
    AugAssign {
        target: Target,
        op: Operator,
        value: ExprLoc,
    },
    /// Annotated assignment; without a value it only declares the name.
    AnnAssign {
        target: Target,
        annotation: ExprLoc,
        value: Option<ExprLoc>,
    },
    Return {
        value: Option<ExprLoc>,
        position: CodeRange,
    },
    Delete {
        targets: Vec<Target>,
        position: CodeRange,
    },
    Pass {
        position: CodeRange,
    },
    Break {
        position: CodeRange,
    },
    Continue {
        position: CodeRange,
    },
    If {
        test: ExprLoc,
        body: Vec<Self>,
        or_else: Vec<Self>,
    },
    For {
        target: Target,
        iter: ExprLoc,
        body: Vec<Self>,
        or_else: Vec<Self>,
        is_async: bool,
    },
    While {
        test: ExprLoc,
        body: Vec<Self>,
        or_else: Vec<Self>,
    },
    FunctionDef(Box<FunctionDef>),
    ClassDef(Box<ClassDef>),
    With {
        items: Vec<WithItem>,
        body: Vec<Self>,
        is_async: bool,
    },
    Try {
        body: Vec<Self>,
        handlers: Vec<ExceptHandler>,
        or_else: Vec<Self>,
        finally: Vec<Self>,
        is_star: bool,
    },
    Raise {
        exc: Option<ExprLoc>,
        cause: Option<ExprLoc>,
        position: CodeRange,
    },
    Assert {
        test: ExprLoc,
        msg: Option<ExprLoc>,
    },
    Import {
        names: Vec<Alias>,
        position: CodeRange,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: u32,
        position: CodeRange,
    },
    /// `global` redirect declaration.
    Global {
        names: Vec<Identifier>,
        position: CodeRange,
    },
    /// `nonlocal` redirect declaration.
    Nonlocal {
        names: Vec<Identifier>,
        position: CodeRange,
    },
}

impl Node {
    /// Short snake_case name of the statement kind, for diagnostics and trace events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Best-effort source line of the statement.
    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            Self::Expr(e) => e.line(),
            Self::Assign { targets, value } => targets.first().map_or_else(|| value.line(), target_line),
            Self::AugAssign { target, .. } | Self::AnnAssign { target, .. } => target_line(target),
            Self::Return { position, .. }
            | Self::Delete { position, .. }
            | Self::Pass { position }
            | Self::Break { position }
            | Self::Continue { position }
            | Self::Raise { position, .. }
            | Self::Import { position, .. }
            | Self::ImportFrom { position, .. }
            | Self::Global { position, .. }
            | Self::Nonlocal { position, .. } => position.start.line,
            Self::If { test, .. } | Self::While { test, .. } | Self::Assert { test, .. } => test.line(),
            Self::For { target, .. } => target_line(target),
            Self::FunctionDef(f) => f.name.position.start.line,
            Self::ClassDef(c) => c.name.position.start.line,
            Self::With { items, body, .. } => items
                .first()
                .map(|item| item.context_expr.line())
                .or_else(|| body.first().map(Self::line))
                .unwrap_or_default(),
            Self::Try { body, .. } => body.first().map(Self::line).unwrap_or_default(),
        }
    }

    /// Is this a loop statement (`for`/`while`)?
    #[must_use]
    pub fn is_loop(&self) -> bool {
        matches!(self, Self::For { .. } | Self::While { .. })
    }

    /// Is this a string-literal expression statement (a docstring when first in a body)?
    #[must_use]
    pub fn is_string_expr(&self) -> bool {
        matches!(
            self,
            Self::Expr(ExprLoc {
                expr: Expr::Literal(Literal::Str(_)),
                ..
            })
        )
    }

    /// Statement blocks nested directly in this statement, excluding nested scopes.
    pub fn blocks(&self) -> Vec<&Vec<Self>> {
        match self {
            Self::If { body, or_else, .. } | Self::For { body, or_else, .. } | Self::While { body, or_else, .. } => {
                vec![body, or_else]
            }
            Self::With { body, .. } => vec![body],
            Self::Try {
                body,
                handlers,
                or_else,
                finally,
                ..
            } => {
                let mut blocks = Vec::with_capacity(handlers.len() + 3);
                blocks.push(body);
                blocks.extend(handlers.iter().map(|h| &h.body));
                blocks.push(or_else);
                blocks.push(finally);
                blocks
            }
            _ => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Node::blocks`].
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Self>> {
        match self {
            Self::If { body, or_else, .. } | Self::For { body, or_else, .. } | Self::While { body, or_else, .. } => {
                vec![body, or_else]
            }
            Self::With { body, .. } => vec![body],
            Self::Try {
                body,
                handlers,
                or_else,
                finally,
                ..
            } => {
                let mut blocks = Vec::with_capacity(handlers.len() + 3);
                blocks.push(body);
                blocks.extend(handlers.iter_mut().map(|h| &mut h.body));
                blocks.push(or_else);
                blocks.push(finally);
                blocks
            }
            _ => Vec::new(),
        }
    }

    /// Expressions this statement evaluates itself, not counting nested blocks or nested scope bodies.
    ///
    /// For `def` and `class` these are the decorators, defaults, annotations and bases, which run at
    /// definition time.
    pub fn header_exprs(&self) -> Vec<&ExprLoc> {
        let mut out = Vec::new();
        match self {
            Self::Expr(e) => out.push(e),
            Self::Assign { targets, value } => {
                out.push(value);
                for target in targets {
                    target.operand_exprs(&mut out);
                }
            }
            Self::AugAssign { target, value, .. } => {
                target.operand_exprs(&mut out);
                out.push(value);
            }
            Self::AnnAssign {
                target,
                annotation,
                value,
            } => {
                out.extend(value.as_ref());
                target.operand_exprs(&mut out);
                out.push(annotation);
            }
            Self::Return { value, .. } => out.extend(value.as_ref()),
            Self::Delete { targets, .. } => {
                for target in targets {
                    target.operand_exprs(&mut out);
                }
            }
            Self::If { test, .. } | Self::While { test, .. } => out.push(test),
            Self::For { target, iter, .. } => {
                out.push(iter);
                target.operand_exprs(&mut out);
            }
            Self::FunctionDef(f) => {
                out.extend(f.decorators.iter());
                out.extend(f.params.defaults());
                out.extend(f.params.annotations());
                out.extend(f.returns.as_ref());
            }
            Self::ClassDef(c) => {
                out.extend(c.decorators.iter());
                out.extend(c.bases.iter());
                out.extend(c.keywords.iter().map(|k| &k.value));
            }
            Self::With { items, .. } => {
                for item in items {
                    out.push(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        vars.operand_exprs(&mut out);
                    }
                }
            }
            Self::Try { handlers, .. } => out.extend(handlers.iter().filter_map(|h| h.exc_type.as_ref())),
            Self::Raise { exc, cause, .. } => {
                out.extend(exc.as_ref());
                out.extend(cause.as_ref());
            }
            Self::Assert { test, msg } => {
                out.push(test);
                out.extend(msg.as_ref());
            }
            Self::Pass { .. }
            | Self::Break { .. }
            | Self::Continue { .. }
            | Self::Import { .. }
            | Self::ImportFrom { .. }
            | Self::Global { .. }
            | Self::Nonlocal { .. } => {}
        }
        out
    }

    /// Names this statement itself binds, not counting nested blocks or nested scope bodies.
    ///
    /// Walrus targets inside header expressions are included.
    pub fn header_bindings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match self {
            Self::Assign { targets, .. } => {
                for target in targets {
                    target.bound_names(&mut out);
                }
            }
            Self::AugAssign { target, .. } | Self::AnnAssign { target, .. } | Self::For { target, .. } => {
                target.bound_names(&mut out);
            }
            Self::Delete { targets, .. } => {
                for target in targets {
                    target.bound_names(&mut out);
                }
            }
            Self::FunctionDef(f) => out.push(f.name.name.as_str()),
            Self::ClassDef(c) => out.push(c.name.name.as_str()),
            Self::With { items, .. } => {
                for item in items {
                    if let Some(vars) = &item.optional_vars {
                        vars.bound_names(&mut out);
                    }
                }
            }
            Self::Try { handlers, .. } => {
                out.extend(handlers.iter().filter_map(|h| h.name.as_ref().map(|n| n.name.as_str())));
            }
            Self::Import { names, .. } | Self::ImportFrom { names, .. } => {
                out.extend(names.iter().filter_map(Alias::binding));
            }
            _ => {}
        }
        for expr in self.header_exprs() {
            walrus_targets(expr, &mut out);
        }
        out
    }
}

fn target_line(target: &Target) -> u32 {
    match target {
        Target::Name(ident) => ident.position.start.line,
        Target::Attribute { position, .. }
        | Target::Subscript { position, .. }
        | Target::Tuple { position, .. }
        | Target::List { position, .. } => position.start.line,
        Target::Starred(inner) => target_line(inner),
    }
}

/// A parsed module: the root of the tree and the outermost scope.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub body: Vec<Node>,
}

impl Module {
    #[must_use]
    pub fn new(body: Vec<Node>) -> Self {
        Self { body }
    }

    /// Serializes the tree to a compact binary form, e.g. to cache parsed input.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a tree serialized with [`Module::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Calls `f` with every sub-expression of `expr` (pre-order, `expr` included), descending into
/// lambda bodies and comprehensions.
pub fn walk_expr<'a>(expr: &'a ExprLoc, f: &mut impl FnMut(&'a ExprLoc)) {
    f(expr);
    for child in expr_children(expr) {
        walk_expr(child, f);
    }
}

/// Direct sub-expressions of an expression, in evaluation order.
pub fn expr_children(expr: &ExprLoc) -> Vec<&ExprLoc> {
    let mut out = Vec::new();
    match &expr.expr {
        Expr::Literal(_) | Expr::Name(_) => {}
        Expr::Call { func, args, keywords } => {
            out.push(&**func);
            out.extend(args.iter());
            out.extend(keywords.iter().map(|k| &k.value));
        }
        Expr::Attribute { object, .. } => out.push(&**object),
        Expr::Subscript { object, index } => {
            out.push(&**object);
            out.push(&**index);
        }
        Expr::Slice { lower, upper, step } => {
            out.extend(lower.as_deref());
            out.extend(upper.as_deref());
            out.extend(step.as_deref());
        }
        Expr::Op { left, right, .. } | Expr::CmpOp { left, right, .. } => {
            out.push(&**left);
            out.push(&**right);
        }
        Expr::BoolOp { values, .. } => out.extend(values.iter()),
        Expr::ChainCmp { left, comparisons } => {
            out.push(&**left);
            out.extend(comparisons.iter().map(|(_, e)| e));
        }
        Expr::Not(e)
        | Expr::UnaryMinus(e)
        | Expr::UnaryPlus(e)
        | Expr::UnaryInvert(e)
        | Expr::Await(e)
        | Expr::YieldFrom(e)
        | Expr::Starred(e) => out.push(&**e),
        Expr::Yield(value) => out.extend(value.as_deref()),
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => out.extend(items.iter()),
        Expr::Dict(items) => {
            for (key, value) in items {
                out.extend(key.as_ref());
                out.push(value);
            }
        }
        Expr::IfElse { test, body, orelse } => {
            out.push(&**test);
            out.push(&**body);
            out.push(&**orelse);
        }
        Expr::Lambda { params, body } => {
            out.extend(params.defaults());
            out.push(&**body);
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            push_generators(generators, &mut out);
            out.push(&**elt);
        }
        Expr::DictComp { key, value, generators } => {
            push_generators(generators, &mut out);
            out.push(&**key);
            out.push(&**value);
        }
        Expr::Named { value, .. } => out.push(&**value),
        Expr::FString(parts) => push_fstring_parts(parts, &mut out),
    }
    out
}

fn push_generators<'a>(generators: &'a [Comprehension], out: &mut Vec<&'a ExprLoc>) {
    for generator in generators {
        out.push(&generator.iter);
        generator.target.operand_exprs(out);
        out.extend(generator.ifs.iter());
    }
}

fn push_fstring_parts<'a>(parts: &'a [FStringPart], out: &mut Vec<&'a ExprLoc>) {
    for part in parts {
        if let FStringPart::Interpolation { expr, format_spec, .. } = part {
            out.push(expr);
            if let Some(spec) = format_spec {
                push_fstring_parts(spec, out);
            }
        }
    }
}

/// Names an expression reads, in the enclosing scope's terms.
///
/// Lambda parameters and comprehension targets are local to their own scopes and are excluded;
/// everything else a lambda or comprehension body mentions is counted as a read. Over-reporting
/// reads only makes the analyses more conservative.
pub fn expr_reads<'a>(expr: &'a ExprLoc, out: &mut Vec<&'a str>) {
    match &expr.expr {
        Expr::Name(ident) => out.push(&ident.name),
        Expr::Lambda { params, body } => {
            for default in params.defaults() {
                expr_reads(default, out);
            }
            let mut inner = Vec::new();
            expr_reads(body, &mut inner);
            let local: Vec<&str> = params.names().collect();
            out.extend(inner.into_iter().filter(|n| !local.contains(n)));
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => comprehension_reads(expr, generators, &[&**elt], out),
        Expr::DictComp { key, value, generators } => {
            comprehension_reads(expr, generators, &[&**key, &**value], out);
        }
        _ => {
            for child in expr_children(expr) {
                expr_reads(child, out);
            }
        }
    }
}

/// Reads of a comprehension, each part filtered by the targets bound before it is evaluated.
///
/// The first iterable runs in the enclosing scope, so `[x for x in x]` reads the outer `x`.
fn comprehension_reads<'a>(
    expr: &'a ExprLoc,
    generators: &'a [Comprehension],
    results: &[&'a ExprLoc],
    out: &mut Vec<&'a str>,
) {
    // walrus targets inside a comprehension bind in the enclosing scope
    let mut walrus = Vec::new();
    walrus_targets(expr, &mut walrus);
    let mut local = Vec::new();
    for generator in generators {
        reads_outside(&generator.iter, &local, &walrus, out);
        generator.target.bound_names(&mut local);
        let mut operands = Vec::new();
        generator.target.operand_exprs(&mut operands);
        for part in operands.into_iter().chain(&generator.ifs) {
            reads_outside(part, &local, &walrus, out);
        }
    }
    for result in results {
        reads_outside(result, &local, &walrus, out);
    }
}

fn reads_outside<'a>(expr: &'a ExprLoc, local: &[&str], walrus: &[&str], out: &mut Vec<&'a str>) {
    let mut inner = Vec::new();
    expr_reads(expr, &mut inner);
    out.extend(inner.into_iter().filter(|n| !local.contains(n) || walrus.contains(n)));
}

/// Walrus targets bound by an expression in the enclosing scope (not descending into lambdas).
pub fn walrus_targets<'a>(expr: &'a ExprLoc, out: &mut Vec<&'a str>) {
    match &expr.expr {
        Expr::Named { target, value } => {
            out.push(&target.name);
            walrus_targets(value, out);
        }
        Expr::Lambda { params, .. } => {
            for default in params.defaults() {
                walrus_targets(default, out);
            }
        }
        _ => {
            for child in expr_children(expr) {
                walrus_targets(child, out);
            }
        }
    }
}

/// Names a target reads while storing (receivers and indexes of attribute/subscript targets).
pub fn target_reads<'a>(target: &'a Target, out: &mut Vec<&'a str>) {
    let mut operands = Vec::new();
    target.operand_exprs(&mut operands);
    for expr in operands {
        expr_reads(expr, out);
    }
}

/// Names a statement reads in its own header (see [`Node::header_exprs`]), plus the target of an
/// augmented assignment and the names removed by `del`.
pub fn header_reads(node: &Node) -> Vec<&str> {
    let mut out = Vec::new();
    for expr in node.header_exprs() {
        expr_reads(expr, &mut out);
    }
    match node {
        Node::AugAssign { target, .. } => target.bound_names(&mut out),
        Node::Delete { targets, .. } => {
            for target in targets {
                target.bound_names(&mut out);
            }
        }
        _ => {}
    }
    out
}

/// Collects every name referenced (read or bound) anywhere in a block, descending into nested
/// blocks and nested scope bodies alike.
pub fn deep_names<'a>(body: &'a [Node], out: &mut Vec<&'a str>) {
    for node in body {
        node_deep_names(node, out);
    }
}

fn node_deep_names<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    for expr in node.header_exprs() {
        walk_expr(expr, &mut |e| match &e.expr {
            Expr::Name(ident) => out.push(&ident.name),
            Expr::Named { target, .. } => out.push(&target.name),
            _ => {}
        });
    }
    out.extend(node.header_bindings());
    match node {
        Node::FunctionDef(f) => {
            out.extend(f.params.names());
            deep_names(&f.body, out);
        }
        Node::ClassDef(c) => deep_names(&c.body, out),
        Node::Global { names, .. } | Node::Nonlocal { names, .. } => out.extend(names.iter().map(|n| n.name.as_str())),
        _ => {}
    }
    for block in node.blocks() {
        deep_names(block, out);
    }
}
