//! Lowers the ruff Python AST into the tree in [`crate::tree`].

use std::{borrow::Cow, fmt};

use num_bigint::BigInt;
use ruff_python_ast::{
    self as ast, BoolOp, CmpOp, ConversionFlag as RuffConversionFlag, ElifElseClause, Expr as AstExpr,
    InterpolatedStringElement, Number, Operator as AstOperator, ParameterWithDefault, Stmt, UnaryOp,
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::tree::{
    Alias, BoolOperator, ClassDef, CmpOperator, CodeLoc, CodeRange, Comprehension, ConversionFlag, ExceptHandler,
    Expr, ExprLoc, FStringPart, FunctionDef, Identifier, Keyword, Literal, Module, Node, Operator, Param, Parameters,
    Target, WithItem,
};

/// Maximum nesting depth for AST structures during parsing.
/// Matches CPython's limit of ~200 for nested parentheses.
#[cfg(not(debug_assertions))]
pub const MAX_NESTING_DEPTH: u16 = 200;
/// Debug builds have much larger stack frames, so the limit is lower.
#[cfg(debug_assertions)]
pub const MAX_NESTING_DEPTH: u16 = 35;

/// Parses Python source into a [`Module`].
pub fn parse(code: &str) -> Result<Module, ParseError> {
    let mut parser = Parser::new(code);
    let parsed = parse_module(code).map_err(|e| parser.syntax_error(e.to_string(), e.range()))?;
    let module = parsed.into_syntax();
    let body = parser.parse_statements(module.body)?;
    Ok(Module::new(body))
}

/// Converts ruff AST nodes into tree nodes, tracking line offsets and nesting depth.
struct Parser<'a> {
    /// Byte offset of each `\n` in the source, to convert offsets to line/column pairs.
    line_ends: Vec<usize>,
    code: &'a str,
    /// Remaining nesting depth budget for recursive structures.
    /// When it reaches zero, we return a "too many nested parentheses" error.
    depth_remaining: u16,
}

impl<'a> Parser<'a> {
    fn new(code: &'a str) -> Self {
        let line_ends = code
            .char_indices()
            .filter_map(|(i, c)| (c == '\n').then_some(i))
            .collect();
        Self {
            line_ends,
            code,
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    fn parse_statements(&mut self, statements: Vec<Stmt>) -> Result<Vec<Node>, ParseError> {
        statements.into_iter().map(|s| self.parse_statement(s)).collect()
    }

    fn parse_elif_else_clauses(&mut self, clauses: Vec<ElifElseClause>) -> Result<Vec<Node>, ParseError> {
        let mut tail: Vec<Node> = Vec::new();
        for clause in clauses.into_iter().rev() {
            match clause.test {
                Some(test) => {
                    let test = self.parse_expression(test)?;
                    let body = self.parse_statements(clause.body)?;
                    tail = vec![Node::If {
                        test,
                        body,
                        or_else: tail,
                    }];
                }
                None => {
                    tail = self.parse_statements(clause.body)?;
                }
            }
        }
        Ok(tail)
    }

    fn parse_except_handler(&mut self, handler: ast::ExceptHandler) -> Result<ExceptHandler, ParseError> {
        let ast::ExceptHandler::ExceptHandler(h) = handler;
        let exc_type = h.type_.map(|expr| self.parse_expression(*expr)).transpose()?;
        let name = h.name.map(|n| self.identifier(n.as_str(), n.range));
        let body = self.parse_statements(h.body)?;
        Ok(ExceptHandler {
            exc_type,
            name,
            body,
            position: self.convert_range(h.range),
        })
    }

    fn parse_statement(&mut self, statement: Stmt) -> Result<Node, ParseError> {
        self.decr_depth_remaining(|| statement.range())?;
        let result = self.parse_statement_impl(statement);
        self.depth_remaining += 1;
        result
    }

    fn parse_statement_impl(&mut self, statement: Stmt) -> Result<Node, ParseError> {
        match statement {
            Stmt::FunctionDef(function) => {
                if let Some(type_params) = &function.type_params {
                    return Err(self.not_implemented("generic function type parameters", type_params.range));
                }
                let params = self.parse_parameters(&function.parameters)?;
                let name = self.identifier(function.name.as_str(), function.name.range);
                let returns = function.returns.map(|expr| self.parse_expression(*expr)).transpose()?;
                let body = self.parse_statements(function.body)?;
                let decorators = function
                    .decorator_list
                    .into_iter()
                    .map(|d| self.parse_expression(d.expression))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::FunctionDef(Box::new(FunctionDef {
                    name,
                    params,
                    body,
                    decorators,
                    returns,
                    is_async: function.is_async,
                })))
            }
            Stmt::ClassDef(c) => {
                if let Some(type_params) = &c.type_params {
                    return Err(self.not_implemented("generic class type parameters", type_params.range));
                }
                let name = self.identifier(c.name.as_str(), c.name.range);
                let (bases, keywords) = match c.arguments {
                    Some(arguments) => {
                        let ast::Arguments { args, keywords, .. } = *arguments;
                        let bases = args
                            .into_vec()
                            .into_iter()
                            .map(|arg| self.parse_expression(arg))
                            .collect::<Result<Vec<_>, _>>()?;
                        (bases, self.parse_keywords(keywords.into_vec())?)
                    }
                    None => (Vec::new(), Vec::new()),
                };
                let decorators = c
                    .decorator_list
                    .into_iter()
                    .map(|d| self.parse_expression(d.expression))
                    .collect::<Result<Vec<_>, _>>()?;
                let body = self.parse_statements(c.body)?;
                Ok(Node::ClassDef(Box::new(ClassDef {
                    name,
                    bases,
                    keywords,
                    body,
                    decorators,
                })))
            }
            Stmt::Return(ast::StmtReturn { value, range, .. }) => Ok(Node::Return {
                value: value.map(|v| self.parse_expression(*v)).transpose()?,
                position: self.convert_range(range),
            }),
            Stmt::Delete(ast::StmtDelete { targets, range, .. }) => Ok(Node::Delete {
                targets: targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<Vec<_>, _>>()?,
                position: self.convert_range(range),
            }),
            Stmt::TypeAlias(t) => Err(self.not_implemented("type alias statements", t.range)),
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.parse_expression(*value)?;
                Ok(Node::Assign { targets, value })
            }
            Stmt::AugAssign(ast::StmtAugAssign {
                target, op, value, range, ..
            }) => {
                let target = self.parse_target(*target)?;
                if matches!(target, Target::Tuple { .. } | Target::List { .. } | Target::Starred(_)) {
                    return Err(self.syntax_error("illegal expression for augmented assignment", range));
                }
                Ok(Node::AugAssign {
                    target,
                    op: convert_op(op),
                    value: self.parse_expression(*value)?,
                })
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => Ok(Node::AnnAssign {
                target: self.parse_target(*target)?,
                annotation: self.parse_expression(*annotation)?,
                value: value.map(|v| self.parse_expression(*v)).transpose()?,
            }),
            Stmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                ..
            }) => Ok(Node::For {
                target: self.parse_target(*target)?,
                iter: self.parse_expression(*iter)?,
                body: self.parse_statements(body)?,
                or_else: self.parse_statements(orelse)?,
                is_async,
            }),
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => Ok(Node::While {
                test: self.parse_expression(*test)?,
                body: self.parse_statements(body)?,
                or_else: self.parse_statements(orelse)?,
            }),
            Stmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => {
                let test = self.parse_expression(*test)?;
                let body = self.parse_statements(body)?;
                let or_else = self.parse_elif_else_clauses(elif_else_clauses)?;
                Ok(Node::If { test, body, or_else })
            }
            Stmt::With(ast::StmtWith {
                is_async, items, body, ..
            }) => {
                let items = items
                    .into_iter()
                    .map(|item| {
                        Ok(WithItem {
                            context_expr: self.parse_expression(item.context_expr)?,
                            optional_vars: item.optional_vars.map(|v| self.parse_target(*v)).transpose()?,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                Ok(Node::With {
                    items,
                    body: self.parse_statements(body)?,
                    is_async,
                })
            }
            Stmt::Match(m) => Err(self.not_implemented("match statements", m.range)),
            Stmt::Raise(ast::StmtRaise { exc, cause, range, .. }) => Ok(Node::Raise {
                exc: exc.map(|e| self.parse_expression(*e)).transpose()?,
                cause: cause.map(|e| self.parse_expression(*e)).transpose()?,
                position: self.convert_range(range),
            }),
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                is_star,
                ..
            }) => {
                let body = self.parse_statements(body)?;
                let handlers = handlers
                    .into_iter()
                    .map(|h| self.parse_except_handler(h))
                    .collect::<Result<Vec<_>, _>>()?;
                let or_else = self.parse_statements(orelse)?;
                let finally = self.parse_statements(finalbody)?;
                Ok(Node::Try {
                    body,
                    handlers,
                    or_else,
                    finally,
                    is_star,
                })
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => Ok(Node::Assert {
                test: self.parse_expression(*test)?,
                msg: msg.map(|m| self.parse_expression(*m)).transpose()?,
            }),
            Stmt::Import(ast::StmtImport { names, range, .. }) => Ok(Node::Import {
                names: names.iter().map(|alias| self.alias(alias)).collect(),
                position: self.convert_range(range),
            }),
            Stmt::ImportFrom(ast::StmtImportFrom {
                module,
                names,
                level,
                range,
                ..
            }) => Ok(Node::ImportFrom {
                module: module.map(|m| m.as_str().to_owned()),
                names: names.iter().map(|alias| self.alias(alias)).collect(),
                level,
                position: self.convert_range(range),
            }),
            Stmt::Global(ast::StmtGlobal { names, range, .. }) => Ok(Node::Global {
                names: names.iter().map(|id| self.identifier(&self.code[id.range], id.range)).collect(),
                position: self.convert_range(range),
            }),
            Stmt::Nonlocal(ast::StmtNonlocal { names, range, .. }) => Ok(Node::Nonlocal {
                names: names.iter().map(|id| self.identifier(&self.code[id.range], id.range)).collect(),
                position: self.convert_range(range),
            }),
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.parse_expression(*value).map(Node::Expr),
            Stmt::Pass(p) => Ok(Node::Pass {
                position: self.convert_range(p.range),
            }),
            Stmt::Break(b) => Ok(Node::Break {
                position: self.convert_range(b.range),
            }),
            Stmt::Continue(c) => Ok(Node::Continue {
                position: self.convert_range(c.range),
            }),
            Stmt::IpyEscapeCommand(i) => Err(self.not_implemented("IPython escape commands", i.range)),
        }
    }

    fn alias(&self, alias: &ast::Alias) -> Alias {
        Alias {
            name: alias.name.as_str().to_owned(),
            asname: alias.asname.as_ref().map(|a| self.identifier(a.as_str(), a.range)),
            position: self.convert_range(alias.range),
        }
    }

    fn parse_expression(&mut self, expression: AstExpr) -> Result<ExprLoc, ParseError> {
        self.decr_depth_remaining(|| expression.range())?;
        let result = self.parse_expression_impl(expression);
        self.depth_remaining += 1;
        result
    }

    fn parse_boxed(&mut self, expression: AstExpr) -> Result<Box<ExprLoc>, ParseError> {
        self.parse_expression(expression).map(Box::new)
    }

    fn parse_expressions(&mut self, expressions: Vec<AstExpr>) -> Result<Vec<ExprLoc>, ParseError> {
        expressions.into_iter().map(|e| self.parse_expression(e)).collect()
    }

    fn parse_expression_impl(&mut self, expression: AstExpr) -> Result<ExprLoc, ParseError> {
        let position = self.convert_range(expression.range());
        let expr = match expression {
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, .. }) => Expr::BoolOp {
                op: convert_bool_op(op),
                values: self.parse_expressions(values)?,
            },
            AstExpr::Named(ast::ExprNamed { target, value, .. }) => Expr::Named {
                target: self.parse_identifier(*target)?,
                value: self.parse_boxed(*value)?,
            },
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) => Expr::Op {
                left: self.parse_boxed(*left)?,
                op: convert_op(op),
                right: self.parse_boxed(*right)?,
            },
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.parse_boxed(*operand)?;
                match op {
                    UnaryOp::Not => Expr::Not(operand),
                    UnaryOp::USub => Expr::UnaryMinus(operand),
                    UnaryOp::UAdd => Expr::UnaryPlus(operand),
                    UnaryOp::Invert => Expr::UnaryInvert(operand),
                }
            }
            AstExpr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                let params = match parameters {
                    Some(params) => self.parse_parameters(&params)?,
                    // No parameters (e.g., `lambda: 42`)
                    None => Parameters::default(),
                };
                Expr::Lambda {
                    params: Box::new(params),
                    body: self.parse_boxed(*body)?,
                }
            }
            AstExpr::If(ast::ExprIf { test, body, orelse, .. }) => Expr::IfElse {
                test: self.parse_boxed(*test)?,
                body: self.parse_boxed(*body)?,
                orelse: self.parse_boxed(*orelse)?,
            },
            AstExpr::Dict(ast::ExprDict { items, .. }) => {
                let mut pairs = Vec::with_capacity(items.len());
                for ast::DictItem { key, value } in items {
                    let key = key.map(|k| self.parse_expression(k)).transpose()?;
                    pairs.push((key, self.parse_expression(value)?));
                }
                Expr::Dict(pairs)
            }
            AstExpr::Set(ast::ExprSet { elts, .. }) => Expr::Set(self.parse_expressions(elts)?),
            AstExpr::ListComp(ast::ExprListComp { elt, generators, .. }) => Expr::ListComp {
                elt: self.parse_boxed(*elt)?,
                generators: self.parse_comprehension_generators(generators)?,
            },
            AstExpr::SetComp(ast::ExprSetComp { elt, generators, .. }) => Expr::SetComp {
                elt: self.parse_boxed(*elt)?,
                generators: self.parse_comprehension_generators(generators)?,
            },
            AstExpr::DictComp(ast::ExprDictComp {
                key, value, generators, ..
            }) => Expr::DictComp {
                key: self.parse_boxed(*key)?,
                value: self.parse_boxed(*value)?,
                generators: self.parse_comprehension_generators(generators)?,
            },
            AstExpr::Generator(ast::ExprGenerator { elt, generators, .. }) => Expr::GeneratorExp {
                elt: self.parse_boxed(*elt)?,
                generators: self.parse_comprehension_generators(generators)?,
            },
            AstExpr::Await(a) => Expr::Await(self.parse_boxed(*a.value)?),
            AstExpr::Yield(y) => Expr::Yield(y.value.map(|v| self.parse_boxed(*v)).transpose()?),
            AstExpr::YieldFrom(y) => Expr::YieldFrom(self.parse_boxed(*y.value)?),
            AstExpr::Compare(ast::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => {
                let left = self.parse_boxed(*left)?;
                let mut comparisons = ops
                    .into_vec()
                    .into_iter()
                    .zip(comparators.into_vec())
                    .map(|(op, cmp)| Ok((convert_compare_op(op), self.parse_expression(cmp)?)))
                    .collect::<Result<Vec<_>, ParseError>>()?;
                // single comparison (most common) gets its own node
                if comparisons.len() == 1
                    && let Some((op, right)) = comparisons.pop()
                {
                    Expr::CmpOp {
                        left,
                        op,
                        right: Box::new(right),
                    }
                } else {
                    Expr::ChainCmp { left, comparisons }
                }
            }
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let ast::Arguments { args, keywords, .. } = arguments;
                Expr::Call {
                    func: self.parse_boxed(*func)?,
                    args: self.parse_expressions(args.into_vec())?,
                    keywords: self.parse_keywords(keywords.into_vec())?,
                }
            }
            AstExpr::FString(ast::ExprFString { value, .. }) => self.parse_fstring(&value)?,
            AstExpr::TString(t) => return Err(self.not_implemented("template strings (t-strings)", t.range)),
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                Expr::Literal(Literal::Str(value.to_string()))
            }
            AstExpr::BytesLiteral(ast::ExprBytesLiteral { value, .. }) => {
                let bytes: Cow<'_, [u8]> = Cow::from(&value);
                Expr::Literal(Literal::Bytes(bytes.into_owned()))
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(i) => {
                    if let Some(i) = i.as_i64() {
                        Expr::Literal(Literal::Int(i))
                    } else {
                        // Integer too large for i64, parse string representation as BigInt
                        let bi = parse_int_literal(&i.to_string()).ok_or_else(|| ParseError::Syntax {
                            msg: format!("invalid integer literal: {i}").into(),
                            position,
                        })?;
                        Expr::Literal(Literal::LongInt(bi))
                    }
                }
                Number::Float(f) => Expr::Literal(Literal::Float(f)),
                // a complex literal token is always purely imaginary; `1+2j` is a BinOp
                Number::Complex { imag, .. } => Expr::Literal(Literal::Imaginary(imag)),
            },
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Expr::Literal(Literal::Bool(value)),
            AstExpr::NoneLiteral(_) => Expr::Literal(Literal::None),
            AstExpr::EllipsisLiteral(_) => Expr::Literal(Literal::Ellipsis),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Expr::Attribute {
                object: self.parse_boxed(*value)?,
                attr: attr.as_str().to_owned(),
            },
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Expr::Subscript {
                object: self.parse_boxed(*value)?,
                index: self.parse_boxed(*slice)?,
            },
            AstExpr::Starred(ast::ExprStarred { value, .. }) => Expr::Starred(self.parse_boxed(*value)?),
            AstExpr::Name(ast::ExprName { id, range, .. }) => Expr::Name(self.identifier(id.as_str(), range)),
            AstExpr::List(ast::ExprList { elts, .. }) => Expr::List(self.parse_expressions(elts)?),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Expr::Tuple(self.parse_expressions(elts)?),
            AstExpr::Slice(ast::ExprSlice { lower, upper, step, .. }) => Expr::Slice {
                lower: lower.map(|e| self.parse_boxed(*e)).transpose()?,
                upper: upper.map(|e| self.parse_boxed(*e)).transpose()?,
                step: step.map(|e| self.parse_boxed(*e)).transpose()?,
            },
            AstExpr::IpyEscapeCommand(i) => return Err(self.not_implemented("IPython escape commands", i.range)),
        };
        Ok(ExprLoc::new(position, expr))
    }

    /// Parses keyword arguments; `**expr` unpacking becomes a keyword with no key.
    fn parse_keywords(&mut self, keywords: Vec<ast::Keyword>) -> Result<Vec<Keyword>, ParseError> {
        keywords
            .into_iter()
            .map(|kwarg| {
                let key = kwarg.arg.map(|key| self.identifier(key.as_str(), key.range));
                Ok(Keyword {
                    key,
                    value: self.parse_expression(kwarg.value)?,
                })
            })
            .collect()
    }

    fn parse_identifier(&self, ast: AstExpr) -> Result<Identifier, ParseError> {
        match ast {
            AstExpr::Name(ast::ExprName { id, range, .. }) => Ok(self.identifier(id.as_str(), range)),
            other => Err(self.syntax_error(format!("expected name, got {other:?}"), other.range())),
        }
    }

    /// Parses an assignment target - a name, attribute, subscript, or nested tuple/list.
    fn parse_target(&mut self, ast: AstExpr) -> Result<Target, ParseError> {
        self.decr_depth_remaining(|| ast.range())?;
        let result = self.parse_target_impl(ast);
        self.depth_remaining += 1;
        result
    }

    fn parse_target_impl(&mut self, ast: AstExpr) -> Result<Target, ParseError> {
        match ast {
            AstExpr::Name(ast::ExprName { id, range, .. }) => Ok(Target::Name(self.identifier(id.as_str(), range))),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, range, .. }) => Ok(Target::Attribute {
                object: self.parse_boxed(*value)?,
                attr: attr.as_str().to_owned(),
                position: self.convert_range(range),
            }),
            AstExpr::Subscript(ast::ExprSubscript {
                value, slice, range, ..
            }) => Ok(Target::Subscript {
                object: self.parse_boxed(*value)?,
                index: self.parse_boxed(*slice)?,
                position: self.convert_range(range),
            }),
            AstExpr::Tuple(ast::ExprTuple { elts, range, .. }) => {
                let targets = self.parse_targets(elts, range)?;
                Ok(Target::Tuple {
                    targets,
                    position: self.convert_range(range),
                })
            }
            AstExpr::List(ast::ExprList { elts, range, .. }) => {
                let targets = self.parse_targets(elts, range)?;
                Ok(Target::List {
                    targets,
                    position: self.convert_range(range),
                })
            }
            AstExpr::Starred(ast::ExprStarred { value, .. }) => {
                Ok(Target::Starred(Box::new(self.parse_target(*value)?)))
            }
            other => Err(self.syntax_error(format!("invalid assignment target: {other:?}"), other.range())),
        }
    }

    fn parse_targets(&mut self, elts: Vec<AstExpr>, range: TextRange) -> Result<Vec<Target>, ParseError> {
        let targets = elts
            .into_iter()
            .map(|e| self.parse_target(e))
            .collect::<Result<Vec<_>, _>>()?;
        let starred_count = targets.iter().filter(|t| matches!(t, Target::Starred(_))).count();
        if starred_count > 1 {
            return Err(self.syntax_error("multiple starred expressions in assignment", range));
        }
        Ok(targets)
    }

    fn parse_parameters(&mut self, params: &ast::Parameters) -> Result<Parameters, ParseError> {
        // Parse positional-only parameters (before /)
        let pos_only = self.parse_params_with_defaults(&params.posonlyargs)?;
        let args = self.parse_params_with_defaults(&params.args)?;
        let var_args = params
            .vararg
            .as_deref()
            .map(|p| self.parse_param(p, None))
            .transpose()?
            .map(Box::new);
        // Parse keyword-only parameters (after * or *args)
        let kw_only = self.parse_params_with_defaults(&params.kwonlyargs)?;
        let var_kwargs = params
            .kwarg
            .as_deref()
            .map(|p| self.parse_param(p, None))
            .transpose()?
            .map(Box::new);
        Ok(Parameters {
            pos_only,
            args,
            var_args,
            kw_only,
            var_kwargs,
        })
    }

    fn parse_params_with_defaults(&mut self, params: &[ParameterWithDefault]) -> Result<Vec<Param>, ParseError> {
        params
            .iter()
            .map(|p| self.parse_param(&p.parameter, p.default.as_deref()))
            .collect()
    }

    fn parse_param(&mut self, param: &ast::Parameter, default: Option<&AstExpr>) -> Result<Param, ParseError> {
        let name = self.identifier(param.name.as_str(), param.name.range);
        let annotation = match &param.annotation {
            Some(expr) => Some(self.parse_expression((**expr).clone())?),
            None => None,
        };
        let default = default.map(|expr| self.parse_expression(expr.clone())).transpose()?;
        Ok(Param {
            name,
            annotation,
            default,
        })
    }

    /// Parses comprehension generators (the `for ... in ... if ...` clauses).
    fn parse_comprehension_generators(
        &mut self,
        generators: Vec<ast::Comprehension>,
    ) -> Result<Vec<Comprehension>, ParseError> {
        generators
            .into_iter()
            .map(|comp| {
                let target = self.parse_target(comp.target)?;
                let iter = self.parse_expression(comp.iter)?;
                let ifs = self.parse_expressions(comp.ifs)?;
                Ok(Comprehension {
                    target,
                    iter,
                    ifs,
                    is_async: comp.is_async,
                })
            })
            .collect()
    }

    /// Parses an f-string value into parts.
    ///
    /// Implicitly concatenated plain strings and f-strings are merged into one part list.
    fn parse_fstring(&mut self, value: &ast::FStringValue) -> Result<Expr, ParseError> {
        let mut parts = Vec::new();
        for fstring_part in value {
            match fstring_part {
                ast::FStringPart::Literal(lit) => push_literal(&mut parts, &lit.value),
                ast::FStringPart::FString(fstring) => {
                    for element in &fstring.elements {
                        self.parse_fstring_element(element, &mut parts)?;
                    }
                }
            }
        }
        Ok(Expr::FString(parts))
    }

    fn parse_fstring_element(
        &mut self,
        element: &InterpolatedStringElement,
        parts: &mut Vec<FStringPart>,
    ) -> Result<(), ParseError> {
        match element {
            InterpolatedStringElement::Literal(lit) => push_literal(parts, &lit.value),
            InterpolatedStringElement::Interpolation(interp) => {
                let expr = Box::new(self.parse_expression((*interp.expression).clone())?);
                let format_spec = match &interp.format_spec {
                    Some(spec) => {
                        let mut spec_parts = Vec::new();
                        for element in &spec.elements {
                            self.parse_fstring_element(element, &mut spec_parts)?;
                        }
                        Some(spec_parts)
                    }
                    None => None,
                };
                // Keep the exact source text of `{expr=}` so rendering reproduces the label
                let debug_text = interp.debug_text.as_ref().map(|dt| {
                    let expr_text = &self.code[interp.expression.range()];
                    format!("{}{}{}", dt.leading, expr_text, dt.trailing)
                });
                parts.push(FStringPart::Interpolation {
                    expr,
                    conversion: convert_conversion_flag(interp.conversion),
                    format_spec,
                    debug_text,
                });
            }
        }
        Ok(())
    }

    fn identifier(&self, name: &str, range: TextRange) -> Identifier {
        Identifier::new(name, self.convert_range(range))
    }

    fn convert_range(&self, range: TextRange) -> CodeRange {
        CodeRange::new(
            self.index_to_position(range.start().into()),
            self.index_to_position(range.end().into()),
        )
    }

    fn index_to_position(&self, index: usize) -> CodeLoc {
        let line = self.line_ends.partition_point(|&end| end < index);
        let line_start = if line == 0 { 0 } else { self.line_ends[line - 1] + 1 };
        CodeLoc::new(
            u32::try_from(line + 1).unwrap_or(u32::MAX),
            u32::try_from(index.saturating_sub(line_start)).unwrap_or(u32::MAX),
        )
    }

    fn syntax_error(&self, msg: impl Into<Cow<'static, str>>, range: TextRange) -> ParseError {
        ParseError::Syntax {
            msg: msg.into(),
            position: self.convert_range(range),
        }
    }

    fn not_implemented(&self, msg: impl Into<Cow<'static, str>>, range: TextRange) -> ParseError {
        ParseError::NotImplemented {
            msg: msg.into(),
            position: self.convert_range(range),
        }
    }

    /// Decrements the depth remaining for nested parentheses.
    /// Returns an error if the depth remaining goes to zero.
    fn decr_depth_remaining(&mut self, get_range: impl FnOnce() -> TextRange) -> Result<(), ParseError> {
        if let Some(depth_remaining) = self.depth_remaining.checked_sub(1) {
            self.depth_remaining = depth_remaining;
            Ok(())
        } else {
            Err(self.syntax_error("too many nested parentheses", get_range()))
        }
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(value);
    } else {
        parts.push(FStringPart::Literal(value.to_owned()));
    }
}

fn convert_op(op: AstOperator) -> Operator {
    match op {
        AstOperator::Add => Operator::Add,
        AstOperator::Sub => Operator::Sub,
        AstOperator::Mult => Operator::Mult,
        AstOperator::MatMult => Operator::MatMult,
        AstOperator::Div => Operator::Div,
        AstOperator::Mod => Operator::Mod,
        AstOperator::Pow => Operator::Pow,
        AstOperator::LShift => Operator::LShift,
        AstOperator::RShift => Operator::RShift,
        AstOperator::BitOr => Operator::BitOr,
        AstOperator::BitXor => Operator::BitXor,
        AstOperator::BitAnd => Operator::BitAnd,
        AstOperator::FloorDiv => Operator::FloorDiv,
    }
}

fn convert_bool_op(op: BoolOp) -> BoolOperator {
    match op {
        BoolOp::And => BoolOperator::And,
        BoolOp::Or => BoolOperator::Or,
    }
}

fn convert_compare_op(op: CmpOp) -> CmpOperator {
    match op {
        CmpOp::Eq => CmpOperator::Eq,
        CmpOp::NotEq => CmpOperator::NotEq,
        CmpOp::Lt => CmpOperator::Lt,
        CmpOp::LtE => CmpOperator::LtE,
        CmpOp::Gt => CmpOperator::Gt,
        CmpOp::GtE => CmpOperator::GtE,
        CmpOp::Is => CmpOperator::Is,
        CmpOp::IsNot => CmpOperator::IsNot,
        CmpOp::In => CmpOperator::In,
        CmpOp::NotIn => CmpOperator::NotIn,
    }
}

fn convert_conversion_flag(flag: RuffConversionFlag) -> ConversionFlag {
    match flag {
        RuffConversionFlag::None => ConversionFlag::None,
        RuffConversionFlag::Str => ConversionFlag::Str,
        RuffConversionFlag::Repr => ConversionFlag::Repr,
        RuffConversionFlag::Ascii => ConversionFlag::Ascii,
    }
}

/// Errors that can occur while lowering source into the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Error in syntax
    Syntax {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
    /// Valid Python the tree has no form for.
    /// Message gets prefixed with "pyprune does not support ".
    NotImplemented {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
}

impl ParseError {
    #[must_use]
    pub fn position(&self) -> CodeRange {
        match self {
            Self::Syntax { position, .. } | Self::NotImplemented { position, .. } => *position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { msg, position } => {
                write!(f, "{}:{}: SyntaxError: {msg}", position.start.line, position.start.column)
            }
            Self::NotImplemented { msg, position } => write!(
                f,
                "{}:{}: pyprune does not support {msg}",
                position.start.line, position.start.column
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses an integer literal string into a `BigInt`, handling radix prefixes and underscores.
///
/// Returns `None` if the string cannot be parsed.
fn parse_int_literal(s: &str) -> Option<BigInt> {
    // Remove underscores (Python allows them as digit separators)
    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    let cleaned = cleaned.as_str();

    if cleaned.len() >= 2 {
        let (prefix, digits) = cleaned.split_at(2);
        match prefix.to_ascii_lowercase().as_str() {
            "0x" => return BigInt::parse_bytes(digits.as_bytes(), 16),
            "0o" => return BigInt::parse_bytes(digits.as_bytes(), 8),
            "0b" => return BigInt::parse_bytes(digits.as_bytes(), 2),
            _ => {}
        }
    }
    cleaned.parse::<BigInt>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based_lines() {
        let module = parse("x = 1\n\ny = 2\n").unwrap();
        assert_eq!(module.body[0].line(), 1);
        assert_eq!(module.body[1].line(), 3);
    }

    #[test]
    fn elif_chain_nests_in_or_else() {
        let module = parse("if a:\n    pass\nelif b:\n    pass\nelse:\n    x = 1\n").unwrap();
        let Node::If { or_else, .. } = &module.body[0] else {
            panic!("expected if");
        };
        assert!(matches!(or_else.as_slice(), [Node::If { .. }]));
    }

    #[test]
    fn big_ints_become_long_literals() {
        let module = parse("x = 0x1_0000_0000_0000_0000\n").unwrap();
        let Node::Assign { value, .. } = &module.body[0] else {
            panic!("expected assign");
        };
        let expected: BigInt = "18446744073709551616".parse().unwrap();
        assert_eq!(value.expr, Expr::Literal(Literal::LongInt(expected)));
    }

    #[test]
    fn match_is_rejected() {
        let err = parse("match x:\n    case 1:\n        pass\n").unwrap_err();
        assert!(matches!(err, ParseError::NotImplemented { .. }), "{err}");
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = parse("x = (\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.position().start.line >= 1);
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let code = format!("x = {}1{}\n", "(".repeat(300), ",)".repeat(300));
        let err = parse(&code).unwrap_err();
        assert!(err.to_string().contains("too many nested parentheses"));
    }
}
