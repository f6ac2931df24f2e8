use crate::{
    graph::{
        chunk::VarHandle,
        ids::{BlockId, NodeId},
    },
    language::types::TypeNode,
};
use std::{collections::HashMap, fmt};

#[derive(Clone, Debug)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Variable(VarHandle),
    Ref(Box<Expr>),
    Deref(Box<Expr>),
    Array { target: Box<Expr>, index: Box<Expr> },
    Function { target: Box<Expr>, args: Vec<Expr> },
    Operation { op: String, operands: Vec<Expr> },
    Value(String),
    Cast { target: Box<Expr>, ty: TypeNode },
    SizeOfExpr(Box<Expr>),
    SizeOfType(TypeNode),
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
        }
    }

    pub fn variable(variable: VarHandle) -> Self {
        Self::new(ExprKind::Variable(variable))
    }

    pub fn reference(target: Expr) -> Self {
        Self::new(ExprKind::Ref(Box::new(target)))
    }

    pub fn deref(target: Expr) -> Self {
        Self::new(ExprKind::Deref(Box::new(target)))
    }

    pub fn array(target: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Array {
            target: Box::new(target),
            index: Box::new(index),
        })
    }

    pub fn call(target: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Function {
            target: Box::new(target),
            args,
        })
    }

    pub fn operation(op: impl Into<String>, operands: Vec<Expr>) -> Self {
        Self::new(ExprKind::Operation {
            op: op.into(),
            operands,
        })
    }

    pub fn value(text: impl Into<String>) -> Self {
        Self::new(ExprKind::Value(text.into()))
    }

    pub fn cast(target: Expr, ty: TypeNode) -> Self {
        Self::new(ExprKind::Cast {
            target: Box::new(target),
            ty,
        })
    }

    pub fn as_variable(&self) -> Option<&VarHandle> {
        match &self.kind {
            ExprKind::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Variable(_) | ExprKind::Value(_) | ExprKind::SizeOfType(_) => Vec::new(),
            ExprKind::Ref(target) | ExprKind::Deref(target) | ExprKind::SizeOfExpr(target) => {
                vec![target]
            }
            ExprKind::Cast { target, .. } => vec![target],
            ExprKind::Array { target, index } => vec![target, index],
            ExprKind::Function { target, args } => {
                let mut children = vec![target.as_ref()];
                children.extend(args.iter());
                children
            }
            ExprKind::Operation { operands, .. } => operands.iter().collect(),
        }
    }

    /// Rebuilds this node under the same identity, passing each direct child
    /// through `f`.
    pub fn map_children<F: FnMut(&Expr) -> Expr>(&self, mut f: F) -> Expr {
        let kind = match &self.kind {
            ExprKind::Variable(variable) => ExprKind::Variable(variable.clone()),
            ExprKind::Ref(target) => ExprKind::Ref(Box::new(f(target))),
            ExprKind::Deref(target) => ExprKind::Deref(Box::new(f(target))),
            ExprKind::Array { target, index } => {
                let target = Box::new(f(target));
                ExprKind::Array {
                    target,
                    index: Box::new(f(index)),
                }
            }
            ExprKind::Function { target, args } => {
                let target = Box::new(f(target));
                ExprKind::Function {
                    target,
                    args: args.iter().map(&mut f).collect(),
                }
            }
            ExprKind::Operation { op, operands } => ExprKind::Operation {
                op: op.clone(),
                operands: operands.iter().map(&mut f).collect(),
            },
            ExprKind::Value(text) => ExprKind::Value(text.clone()),
            ExprKind::Cast { target, ty } => ExprKind::Cast {
                target: Box::new(f(target)),
                ty: ty.clone(),
            },
            ExprKind::SizeOfExpr(target) => ExprKind::SizeOfExpr(Box::new(f(target))),
            ExprKind::SizeOfType(ty) => ExprKind::SizeOfType(ty.clone()),
        };
        Expr { id: self.id, kind }
    }

    pub fn walk<'a, F: FnMut(&'a Expr)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Deep copy where every node receives a new identity.
    pub fn refresh(&self) -> Expr {
        let mut copy = self.map_children(|child| child.refresh());
        copy.id = NodeId::fresh();
        copy
    }

    /// Replaces every node whose identity is a key of `replacements`. The
    /// children of a replacement are visited too, so occurrences nested in
    /// an index expression are still rewritten.
    pub fn substitute(&self, replacements: &HashMap<NodeId, Expr>) -> Expr {
        match replacements.get(&self.id) {
            Some(replacement) => {
                replacement.map_children(|child| child.substitute(replacements))
            }
            None => self.map_children(|child| child.substitute(replacements)),
        }
    }

    /// Structural equality that ignores node identities.
    pub fn same_shape(&self, other: &Expr) -> bool {
        match (&self.kind, &other.kind) {
            (ExprKind::Variable(left), ExprKind::Variable(right)) => left.key() == right.key(),
            (ExprKind::Ref(left), ExprKind::Ref(right))
            | (ExprKind::Deref(left), ExprKind::Deref(right))
            | (ExprKind::SizeOfExpr(left), ExprKind::SizeOfExpr(right)) => left.same_shape(right),
            (
                ExprKind::Array {
                    target: left,
                    index: left_index,
                },
                ExprKind::Array {
                    target: right,
                    index: right_index,
                },
            ) => left.same_shape(right) && left_index.same_shape(right_index),
            (
                ExprKind::Function {
                    target: left,
                    args: left_args,
                },
                ExprKind::Function {
                    target: right,
                    args: right_args,
                },
            ) => left.same_shape(right) && all_same_shape(left_args, right_args),
            (
                ExprKind::Operation {
                    op: left_op,
                    operands: left,
                },
                ExprKind::Operation {
                    op: right_op,
                    operands: right,
                },
            ) => left_op == right_op && all_same_shape(left, right),
            (ExprKind::Value(left), ExprKind::Value(right)) => left == right,
            (
                ExprKind::Cast {
                    target: left,
                    ty: left_ty,
                },
                ExprKind::Cast {
                    target: right,
                    ty: right_ty,
                },
            ) => left_ty == right_ty && left.same_shape(right),
            (ExprKind::SizeOfType(left), ExprKind::SizeOfType(right)) => left == right,
            _ => false,
        }
    }
}

fn all_same_shape(left: &[Expr], right: &[Expr]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.same_shape(r))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Variable(variable) => f.write_str(&variable.name),
            ExprKind::Ref(target) => write!(f, "&{target}"),
            ExprKind::Deref(target) => write!(f, "*{target}"),
            ExprKind::Array { target, index } => write!(f, "{target}[{index}]"),
            ExprKind::Function { target, args } => {
                let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
                write!(f, "{target}({})", args.join(", "))
            }
            ExprKind::Operation { op, operands } => match operands.as_slice() {
                [operand] => write!(f, "({op}{operand})"),
                operands => {
                    let rendered: Vec<String> =
                        operands.iter().map(|operand| operand.to_string()).collect();
                    write!(f, "({})", rendered.join(&format!(" {op} ")))
                }
            },
            ExprKind::Value(text) => f.write_str(text),
            ExprKind::Cast { target, ty } => write!(f, "cast<{ty}>({target})"),
            ExprKind::SizeOfExpr(target) => write!(f, "sizeof({target})"),
            ExprKind::SizeOfType(ty) => write!(f, "sizeof<{ty}>"),
        }
    }
}

/// A call edge: the callee's name plus the identity of the block instance
/// the call was resolved against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub name: String,
    pub id: BlockId,
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Assignment { target: Expr, value: Expr },
    Call(BlockRef),
    /// Flat `if` / `else if` / `else` chain; only the last branch may lack
    /// a condition.
    If(Vec<IfBranch>),
    While { condition: Expr, body: Vec<Stmt> },
    Expression(Expr),
    Group(Vec<Stmt>),
}

#[derive(Clone, Debug)]
pub struct IfBranch {
    pub condition: Option<Expr>,
    pub body: Vec<Stmt>,
}

pub enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
        }
    }

    pub fn assignment(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assignment { target, value })
    }

    pub fn call(target: BlockRef) -> Self {
        Self::new(StmtKind::Call(target))
    }

    pub fn expression(expr: Expr) -> Self {
        Self::new(StmtKind::Expression(expr))
    }

    pub fn group(statements: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Group(statements))
    }

    pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::While { condition, body })
    }

    pub fn if_chain(branches: Vec<IfBranch>) -> Self {
        Self::new(StmtKind::If(branches))
    }

    /// Pre-order walk over this statement, nested statements and every
    /// expression node they hold.
    pub fn walk<'a, F: FnMut(Node<'a>)>(&'a self, f: &mut F) {
        f(Node::Stmt(self));
        match &self.kind {
            StmtKind::Assignment { target, value } => {
                walk_expr(target, f);
                walk_expr(value, f);
            }
            StmtKind::Call(_) => {}
            StmtKind::If(branches) => {
                for branch in branches {
                    if let Some(condition) = &branch.condition {
                        walk_expr(condition, f);
                    }
                    for stmt in &branch.body {
                        stmt.walk(f);
                    }
                }
            }
            StmtKind::While { condition, body } => {
                walk_expr(condition, f);
                for stmt in body {
                    stmt.walk(f);
                }
            }
            StmtKind::Expression(expr) => walk_expr(expr, f),
            StmtKind::Group(statements) => {
                for stmt in statements {
                    stmt.walk(f);
                }
            }
        }
    }

    pub fn calls(&self) -> Vec<&BlockRef> {
        let mut calls = Vec::new();
        self.walk(&mut |node| {
            if let Node::Stmt(Stmt {
                kind: StmtKind::Call(target),
                ..
            }) = node
            {
                calls.push(target);
            }
        });
        calls
    }

    /// Rebuilds the statement under the same identity, passing every root
    /// expression through `f`.
    pub fn map_exprs<F: FnMut(&Expr) -> Expr>(&self, f: &mut F) -> Stmt {
        let kind = match &self.kind {
            StmtKind::Assignment { target, value } => {
                let target = f(target);
                StmtKind::Assignment {
                    target,
                    value: f(value),
                }
            }
            StmtKind::Call(target) => StmtKind::Call(target.clone()),
            StmtKind::If(branches) => {
                let mut mapped = Vec::with_capacity(branches.len());
                for branch in branches {
                    let condition = branch.condition.as_ref().map(&mut *f);
                    mapped.push(IfBranch {
                        condition,
                        body: map_body(&branch.body, f),
                    });
                }
                StmtKind::If(mapped)
            }
            StmtKind::While { condition, body } => {
                let condition = f(condition);
                StmtKind::While {
                    condition,
                    body: map_body(body, f),
                }
            }
            StmtKind::Expression(expr) => StmtKind::Expression(f(expr)),
            StmtKind::Group(statements) => StmtKind::Group(map_body(statements, f)),
        };
        Stmt { id: self.id, kind }
    }

    /// Rebuilds the statement under the same identity, letting `f` replace
    /// any call statement (nested ones included) with a list of statements.
    pub fn map_calls<F, E>(&self, f: &mut F) -> Result<Vec<Stmt>, E>
    where
        F: FnMut(&Stmt, &BlockRef) -> Result<Option<Vec<Stmt>>, E>,
    {
        let kind = match &self.kind {
            StmtKind::Call(target) => {
                return match f(self, target)? {
                    Some(replacement) => Ok(replacement),
                    None => Ok(vec![self.clone()]),
                }
            }
            StmtKind::If(branches) => {
                let mut mapped = Vec::with_capacity(branches.len());
                for branch in branches {
                    mapped.push(IfBranch {
                        condition: branch.condition.clone(),
                        body: map_calls_in(&branch.body, f)?,
                    });
                }
                StmtKind::If(mapped)
            }
            StmtKind::While { condition, body } => StmtKind::While {
                condition: condition.clone(),
                body: map_calls_in(body, f)?,
            },
            StmtKind::Group(statements) => StmtKind::Group(map_calls_in(statements, f)?),
            other => other.clone(),
        };
        Ok(vec![Stmt { id: self.id, kind }])
    }

    /// Deep copy where every statement and expression receives a new
    /// identity. Call targets are kept as they are.
    pub fn refresh(&self) -> Stmt {
        let kind = match &self.kind {
            StmtKind::Assignment { target, value } => StmtKind::Assignment {
                target: target.refresh(),
                value: value.refresh(),
            },
            StmtKind::Call(target) => StmtKind::Call(target.clone()),
            StmtKind::If(branches) => StmtKind::If(
                branches
                    .iter()
                    .map(|branch| IfBranch {
                        condition: branch.condition.as_ref().map(Expr::refresh),
                        body: refresh_all(&branch.body),
                    })
                    .collect(),
            ),
            StmtKind::While { condition, body } => StmtKind::While {
                condition: condition.refresh(),
                body: refresh_all(body),
            },
            StmtKind::Expression(expr) => StmtKind::Expression(expr.refresh()),
            StmtKind::Group(statements) => StmtKind::Group(refresh_all(statements)),
        };
        Stmt::new(kind)
    }
}

fn walk_expr<'a, F: FnMut(Node<'a>)>(expr: &'a Expr, f: &mut F) {
    f(Node::Expr(expr));
    for child in expr.children() {
        walk_expr(child, f);
    }
}

fn map_body<F: FnMut(&Expr) -> Expr>(body: &[Stmt], f: &mut F) -> Vec<Stmt> {
    let mut mapped = Vec::with_capacity(body.len());
    for stmt in body {
        mapped.push(stmt.map_exprs(f));
    }
    mapped
}

pub fn map_calls_in<F, E>(body: &[Stmt], f: &mut F) -> Result<Vec<Stmt>, E>
where
    F: FnMut(&Stmt, &BlockRef) -> Result<Option<Vec<Stmt>>, E>,
{
    let mut mapped = Vec::with_capacity(body.len());
    for stmt in body {
        mapped.extend(stmt.map_calls(f)?);
    }
    Ok(mapped)
}

pub fn refresh_all(statements: &[Stmt]) -> Vec<Stmt> {
    statements.iter().map(Stmt::refresh).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::chunk::ChunkVariable;

    fn var(name: &str) -> Expr {
        Expr::variable(ChunkVariable::detached(name, Some(TypeNode::simple("int"))))
    }

    #[test]
    fn refresh_changes_every_identity() {
        let expr = Expr::array(var("a"), Expr::operation("+", vec![var("i"), Expr::value("1")]));
        let copy = expr.refresh();
        let mut before = Vec::new();
        expr.walk(&mut |node| before.push(node.id));
        let mut after = Vec::new();
        copy.walk(&mut |node| after.push(node.id));
        assert_eq!(before.len(), after.len());
        assert!(after.iter().all(|id| !before.contains(id)));
        assert!(expr.same_shape(&copy));
    }

    #[test]
    fn identical_shapes_stay_independently_addressable() {
        let first = var("x");
        let second = var("x");
        assert!(first.same_shape(&second));
        let call = Expr::call(var("f"), vec![first.clone(), second.clone()]);
        let mut replacements = HashMap::new();
        replacements.insert(second.id, Expr::deref(var("x")));
        let rewritten = call.substitute(&replacements);
        assert_eq!(rewritten.to_string(), "f(x, *x)");
        assert_eq!(rewritten.id, call.id);
    }

    #[test]
    fn substitution_reaches_inside_replacements() {
        let index = var("i");
        let access = Expr::array(var("a"), index.clone());
        let mut replacements = HashMap::new();
        replacements.insert(access.id, Expr::array(Expr::deref(var("a")), index.clone()));
        replacements.insert(index.id, Expr::deref(var("i")));
        assert_eq!(access.substitute(&replacements).to_string(), "*a[*i]");
    }

    #[test]
    fn map_calls_splices_nested_calls() {
        let target = BlockRef {
            name: "callee".into(),
            id: BlockId::fresh(),
        };
        let body = vec![Stmt::while_loop(var("x"), vec![Stmt::call(target.clone())])];
        let spliced = map_calls_in::<_, ()>(&body, &mut |_, call| {
            assert_eq!(call.name, "callee");
            Ok(Some(vec![
                Stmt::expression(var("a")),
                Stmt::expression(var("b")),
            ]))
        })
        .expect("splice");
        match &spliced[0].kind {
            StmtKind::While { body, .. } => assert_eq!(body.len(), 2),
            other => panic!("unexpected statement {other:?}"),
        }
        assert_eq!(spliced[0].id, body[0].id);
    }
}
