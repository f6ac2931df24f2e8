use crate::{
    graph::{Expr, ExprKind, Graph, Stmt, StmtKind},
    language::{
        builtins::Builtins,
        errors::{CompileError, CompileResult},
        types::{type_check, MetaType, TypeNode},
    },
};

const COMPARISONS: &[&str] = &["==", "!=", "<", ">", "<=", ">=", "&&", "||", "!"];

/// Literal typing: strings, characters, floats, then integers.
pub fn literal_type(text: &str) -> TypeNode {
    if text.starts_with('"') {
        TypeNode::pointer(TypeNode::simple("char"))
    } else if text.starts_with('\'') {
        TypeNode::simple("char")
    } else if text.contains('.') && text.parse::<f64>().is_ok() {
        TypeNode::simple("double")
    } else {
        TypeNode::simple("int")
    }
}

pub struct Typer<'b> {
    builtins: &'b Builtins,
}

impl<'b> Typer<'b> {
    pub fn new(builtins: &'b Builtins) -> Self {
        Self { builtins }
    }

    pub fn check(&self, graph: &Graph) -> CompileResult<()> {
        for chunk in &graph.chunks {
            let context = format!("chunk `{}`", chunk.label());
            for variable in chunk.variables() {
                self.check_known_type(variable.vtype.as_ref(), &context)?;
                if let (Some(expected), Some(initial)) = (&variable.vtype, &variable.initial) {
                    let actual = self.type_of(initial, &context)?;
                    if !type_check(expected, &actual) {
                        return Err(CompileError::mismatch(
                            &context,
                            format!(
                                "`{}` of type `{expected}` cannot start as `{actual}`",
                                variable.name
                            ),
                        ));
                    }
                }
            }
        }
        for block in graph.blocks.iter() {
            let context = format!("block `{}`", block.name);
            for stmt in &block.statements {
                self.check_stmt(stmt, &context)?;
            }
        }
        Ok(())
    }

    /// Simple type names must be C scalars, builtin types or `void`.
    fn check_known_type(&self, ty: Option<&TypeNode>, context: &str) -> CompileResult<()> {
        let Some(ty) = ty else {
            return Ok(());
        };
        match ty {
            TypeNode::Simple(name) => {
                if ty.meta() == MetaType::Complex && !self.builtins.contains(name) {
                    return Err(CompileError::mismatch(
                        context,
                        format!("unknown type `{name}`"),
                    ));
                }
                Ok(())
            }
            TypeNode::Pointer(base) | TypeNode::Array(base, _) => {
                self.check_known_type(Some(base), context)
            }
            TypeNode::Func { ret, args, .. } => {
                self.check_known_type(Some(ret), context)?;
                for arg in args {
                    self.check_known_type(Some(arg), context)?;
                }
                Ok(())
            }
        }
    }

    fn check_stmt(&self, stmt: &Stmt, context: &str) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Assignment { target, value } => {
                let expected = self.type_of(target, context)?;
                let actual = self.type_of(value, context)?;
                if !type_check(&expected, &actual) {
                    return Err(CompileError::mismatch(
                        context,
                        format!("cannot assign `{actual}` to `{target}` of type `{expected}`"),
                    ));
                }
                Ok(())
            }
            StmtKind::Call(_) => Ok(()),
            StmtKind::If(branches) => {
                for branch in branches {
                    if let Some(condition) = &branch.condition {
                        self.check_condition(condition, context)?;
                    }
                    self.check_body(&branch.body, context)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition, context)?;
                self.check_body(body, context)
            }
            StmtKind::Expression(expr) => self.type_of(expr, context).map(|_| ()),
            StmtKind::Group(body) => self.check_body(body, context),
        }
    }

    fn check_body(&self, body: &[Stmt], context: &str) -> CompileResult<()> {
        for stmt in body {
            self.check_stmt(stmt, context)?;
        }
        Ok(())
    }

    fn check_condition(&self, condition: &Expr, context: &str) -> CompileResult<()> {
        let ty = self.type_of(condition, context)?;
        match ty.meta() {
            MetaType::Boolean | MetaType::Integral | MetaType::Pointer | MetaType::Any => Ok(()),
            _ => Err(CompileError::mismatch(
                context,
                format!("condition `{condition}` has type `{ty}`"),
            )),
        }
    }

    pub fn type_of(&self, expr: &Expr, context: &str) -> CompileResult<TypeNode> {
        match &expr.kind {
            ExprKind::Variable(variable) => {
                Ok(variable.vtype.clone().unwrap_or_else(TypeNode::void))
            }
            ExprKind::Ref(target) => Ok(TypeNode::pointer(self.type_of(target, context)?)),
            ExprKind::Deref(target) => {
                let ty = self.type_of(target, context)?;
                ty.pointee().cloned().ok_or_else(|| {
                    CompileError::mismatch(
                        context,
                        format!("cannot dereference `{target}` of type `{ty}`"),
                    )
                })
            }
            ExprKind::Array { target, index } => {
                let index_ty = self.type_of(index, context)?;
                if !matches!(
                    index_ty.meta(),
                    MetaType::Integral | MetaType::Boolean | MetaType::Any
                ) {
                    return Err(CompileError::mismatch(
                        context,
                        format!("index `{index}` has type `{index_ty}`"),
                    ));
                }
                let ty = self.type_of(target, context)?;
                ty.pointee().cloned().ok_or_else(|| {
                    CompileError::mismatch(
                        context,
                        format!("cannot index `{target}` of type `{ty}`"),
                    )
                })
            }
            ExprKind::Function { target, args } => {
                let callee = self.type_of(target, context)?;
                let (ret, params, variadic) = match &callee {
                    TypeNode::Func {
                        ret,
                        args,
                        variadic,
                    } => (ret, args, *variadic),
                    TypeNode::Pointer(base) => match base.as_ref() {
                        TypeNode::Func {
                            ret,
                            args,
                            variadic,
                        } => (ret, args, *variadic),
                        _ => return Err(not_callable(context, target, &callee)),
                    },
                    _ => return Err(not_callable(context, target, &callee)),
                };
                let arity_ok = if variadic {
                    args.len() >= params.len()
                } else {
                    args.len() == params.len()
                };
                if !arity_ok {
                    return Err(CompileError::mismatch(
                        context,
                        format!(
                            "`{target}` expects {} argument(s), got {}",
                            params.len(),
                            args.len()
                        ),
                    ));
                }
                for (idx, arg) in args.iter().enumerate() {
                    let actual = self.type_of(arg, context)?;
                    if let Some(expected) = params.get(idx) {
                        if !type_check(expected, &actual) {
                            return Err(CompileError::mismatch(
                                context,
                                format!(
                                    "argument {} of `{target}` expects `{expected}`, got `{actual}`",
                                    idx + 1
                                ),
                            ));
                        }
                    }
                }
                Ok(ret.as_ref().clone())
            }
            ExprKind::Operation { op, operands } => {
                let mut types = Vec::with_capacity(operands.len());
                for operand in operands {
                    types.push(self.type_of(operand, context)?);
                }
                if COMPARISONS.contains(&op.as_str()) {
                    return Ok(TypeNode::simple("int"));
                }
                if let Some(pointer) = types.iter().find(|ty| ty.meta() == MetaType::Pointer) {
                    return Ok(match pointer {
                        TypeNode::Array(base, _) => TypeNode::pointer(base.as_ref().clone()),
                        other => other.clone(),
                    });
                }
                Ok(types.into_iter().next().unwrap_or_else(TypeNode::void))
            }
            ExprKind::Value(text) => Ok(literal_type(text)),
            ExprKind::Cast { target, ty } => {
                self.type_of(target, context)?;
                Ok(ty.clone())
            }
            ExprKind::SizeOfExpr(target) => {
                self.type_of(target, context)?;
                Ok(TypeNode::simple("size_t"))
            }
            ExprKind::SizeOfType(_) => Ok(TypeNode::simple("size_t")),
        }
    }
}

fn not_callable(context: &str, target: &Expr, ty: &TypeNode) -> CompileError {
    CompileError::mismatch(context, format!("`{target}` of type `{ty}` is not callable"))
}
