use crate::{
    error::{SynthError, SynthResult},
    graph::{
        Block, BlockRef, BlockSet, ChunkVariable, Expr, ExprKind, NodeId, Stmt, StmtKind,
        VarHandle, VarKey,
    },
    language::types::TypeNode,
};
use std::{collections::HashMap, fmt};

/// Access shape around one occurrence of a variable.
///
/// `VRef` marks a variable that is itself assigned to. It joins, types and
/// inverts like `Ref` but renders as the bare lvalue.
#[derive(Clone, Debug)]
pub enum Capture {
    Base(Expr),
    Ref(Box<Capture>),
    VRef(Box<Capture>),
    Deref(Box<Capture>),
    Array(Box<Capture>, Expr),
}

impl Capture {
    pub fn base(&self) -> &Expr {
        match self {
            Capture::Base(expr) => expr,
            Capture::Ref(inner)
            | Capture::VRef(inner)
            | Capture::Deref(inner)
            | Capture::Array(inner, _) => inner.base(),
        }
    }

    fn key(&self) -> Option<VarKey> {
        self.base().as_variable().map(|variable| variable.key())
    }

    fn inner(&self) -> Option<&Capture> {
        match self {
            Capture::Base(_) => None,
            Capture::Ref(inner)
            | Capture::VRef(inner)
            | Capture::Deref(inner)
            | Capture::Array(inner, _) => Some(inner),
        }
    }

    /// Same wrapper as `self` around a different inner capture.
    fn rewrap(&self, inner: Capture) -> Capture {
        match self {
            Capture::Base(_) => inner,
            Capture::Ref(_) => Capture::Ref(Box::new(inner)),
            Capture::VRef(_) => Capture::VRef(Box::new(inner)),
            Capture::Deref(_) => Capture::Deref(Box::new(inner)),
            Capture::Array(_, index) => Capture::Array(Box::new(inner), index.clone()),
        }
    }

    pub fn same_shape(&self, other: &Capture) -> bool {
        match (self, other) {
            (Capture::Base(left), Capture::Base(right)) => left.same_shape(right),
            (Capture::Ref(left), Capture::Ref(right))
            | (Capture::VRef(left), Capture::VRef(right))
            | (Capture::Deref(left), Capture::Deref(right)) => left.same_shape(right),
            (Capture::Array(left, left_index), Capture::Array(right, right_index)) => {
                left_index.same_shape(right_index) && left.same_shape(right)
            }
            _ => false,
        }
    }

    /// Join of two captures of the same variable: the most general shape
    /// both occurrences can be expressed through.
    pub fn maximal(&self, other: &Capture) -> SynthResult<Capture> {
        if self.key() != other.key() {
            return Err(self.incompatible(other));
        }
        Ok(self.join(other))
    }

    fn join(&self, other: &Capture) -> Capture {
        match (self, other) {
            (Capture::Ref(left) | Capture::VRef(left), Capture::Ref(right) | Capture::VRef(right)) => {
                let inner = left.join(right);
                if matches!(self, Capture::VRef(_)) || matches!(other, Capture::VRef(_)) {
                    Capture::VRef(Box::new(inner))
                } else {
                    Capture::Ref(Box::new(inner))
                }
            }
            (Capture::Ref(inner) | Capture::VRef(inner), _) => {
                let joined = inner.join(other);
                if joined.same_shape(inner) {
                    self.clone()
                } else {
                    joined
                }
            }
            (_, Capture::Ref(_) | Capture::VRef(_)) => other.join(self),
            (Capture::Base(_), _) => self.clone(),
            (_, Capture::Base(_)) => other.clone(),
            (Capture::Deref(left), Capture::Deref(right)) => {
                Capture::Deref(Box::new(left.join(right)))
            }
            (Capture::Array(left, left_index), Capture::Array(right, right_index)) => {
                if literal_equal(left_index, right_index) {
                    Capture::Array(Box::new(left.join(right)), left_index.clone())
                } else {
                    left.join(right)
                }
            }
            (Capture::Deref(left), Capture::Array(right, _))
            | (Capture::Array(left, _), Capture::Deref(right)) => left.join(right),
        }
    }

    fn incompatible(&self, other: &Capture) -> SynthError {
        SynthError::IncompatibleCapture {
            variable: self.base().to_string(),
            left: self.to_string(),
            right: other.to_string(),
        }
    }

    /// Type of a parameter holding the value this capture denotes.
    pub fn nvar(&self) -> SynthResult<TypeNode> {
        match self {
            Capture::Base(expr) => {
                let variable = expr.as_variable().ok_or_else(|| SynthError::ParameterType {
                    variable: expr.to_string(),
                    message: "capture does not end in a variable".into(),
                })?;
                variable
                    .vtype
                    .clone()
                    .ok_or_else(|| SynthError::ParameterType {
                        variable: variable.name.clone(),
                        message: "variable has no declared type".into(),
                    })
            }
            Capture::Ref(inner) | Capture::VRef(inner) => Ok(TypeNode::pointer(inner.nvar()?)),
            Capture::Deref(inner) | Capture::Array(inner, _) => {
                let ty = inner.nvar()?;
                ty.pointee()
                    .cloned()
                    .ok_or_else(|| SynthError::ParameterType {
                        variable: self.base().to_string(),
                        message: format!("`{ty}` cannot be dereferenced"),
                    })
            }
        }
    }

    /// Template that rebuilds the original variable from `hole`, which
    /// stands for a value of this capture's shape.
    pub fn invert(&self, hole: Expr) -> Capture {
        let mut inverted = Capture::Base(hole);
        let mut current = self;
        while let Some(inner) = current.inner() {
            inverted = match current {
                Capture::Ref(_) | Capture::VRef(_) => Capture::Deref(Box::new(inverted)),
                _ => Capture::Ref(Box::new(inverted)),
            };
            current = inner;
        }
        inverted
    }

    /// Cancels `Ref(Deref(e))` and `Deref(Ref(e))`, bottom-up.
    pub fn simplify(&self) -> Capture {
        match self {
            Capture::Base(expr) => Capture::Base(expr.clone()),
            Capture::Ref(inner) => match inner.simplify() {
                Capture::Deref(target) => *target,
                simplified => Capture::Ref(Box::new(simplified)),
            },
            Capture::Deref(inner) => match inner.simplify() {
                Capture::Ref(target) => *target,
                simplified => Capture::Deref(Box::new(simplified)),
            },
            Capture::VRef(inner) => Capture::VRef(Box::new(inner.simplify())),
            Capture::Array(inner, index) => {
                Capture::Array(Box::new(inner.simplify()), index.clone())
            }
        }
    }

    /// Puts `replacement` where this capture's variable is.
    pub fn replace(&self, replacement: &Capture) -> Capture {
        match self.inner() {
            None => replacement.clone(),
            Some(inner) => self.rewrap(inner.replace(replacement)),
        }
    }

    /// Value form for passing as an argument: assigned variables are passed
    /// by address.
    pub fn to_argument(&self) -> Capture {
        match self {
            Capture::Base(expr) => Capture::Base(expr.clone()),
            Capture::Ref(inner) | Capture::VRef(inner) => {
                Capture::Ref(Box::new(inner.to_argument()))
            }
            Capture::Deref(inner) => Capture::Deref(Box::new(inner.to_argument())),
            Capture::Array(inner, index) => {
                Capture::Array(Box::new(inner.to_argument()), index.refresh())
            }
        }
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            Capture::Base(expr) => expr.clone(),
            Capture::Ref(inner) => Expr::reference(inner.to_expr()),
            Capture::VRef(inner) => inner.to_expr(),
            Capture::Deref(inner) => Expr::deref(inner.to_expr()),
            Capture::Array(inner, index) => Expr::array(inner.to_expr(), index.clone()),
        }
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capture::Base(expr) => write!(f, "{expr}"),
            Capture::Ref(inner) => write!(f, "&{inner}"),
            Capture::VRef(inner) => write!(f, "={inner}"),
            Capture::Deref(inner) => write!(f, "*{inner}"),
            Capture::Array(inner, index) => write!(f, "{inner}[{index}]"),
        }
    }
}

fn literal_equal(left: &Expr, right: &Expr) -> bool {
    match (&left.kind, &right.kind) {
        (ExprKind::Value(left), ExprKind::Value(right)) => left == right,
        _ => false,
    }
}

/// Capture of one syntactic occurrence; `origin` is the outermost node the
/// capture covers.
#[derive(Clone, Debug)]
pub struct UsageCapture {
    pub origin: NodeId,
    pub capture: Capture,
}

#[derive(Clone, Debug)]
pub struct Lifted {
    pub maximal: Capture,
    pub param: VarHandle,
    pub substitutions: HashMap<NodeId, Expr>,
}

pub struct Lifter<'a> {
    blocks: &'a BlockSet,
}

impl<'a> Lifter<'a> {
    pub fn new(blocks: &'a BlockSet) -> Self {
        Self { blocks }
    }

    /// Captures every occurrence of `variable` in `block`, and in the blocks
    /// it calls when `recursive` is set. Blocks named in `exclude` are not
    /// entered.
    pub fn capture_usages(
        &self,
        block: &Block,
        variable: &VarKey,
        recursive: bool,
        exclude: &mut Vec<String>,
    ) -> SynthResult<Vec<UsageCapture>> {
        let mut captures = Vec::new();
        let mut calls = Vec::new();
        for stmt in &block.statements {
            collect_stmt(stmt, variable, &mut captures, &mut calls);
        }
        if recursive {
            for target in calls {
                if exclude.contains(&target.name) {
                    continue;
                }
                let callee = self.blocks.resolve(&target)?;
                exclude.push(callee.name.clone());
                let nested = self.capture_usages(callee, variable, recursive, exclude);
                exclude.pop();
                captures.extend(nested?);
            }
        }
        Ok(captures)
    }

    /// Turns `variable` into a parameter of `block`. The substitutions cover
    /// only occurrences inside `block` itself.
    pub fn lift(&self, block: &Block, variable: &VarHandle) -> SynthResult<Lifted> {
        let key = variable.key();
        let all = self.capture_usages(block, &key, true, &mut vec![block.name.clone()])?;
        let (first, rest) = all.split_first().ok_or_else(|| SynthError::MissingCapture {
            variable: variable.name.clone(),
            block: block.name.clone(),
        })?;
        let mut maximal = first.capture.clone();
        for usage in rest {
            maximal = maximal.maximal(&usage.capture)?;
        }
        let param = ChunkVariable::detached(&variable.name, Some(maximal.nvar()?));
        let inverted = maximal.invert(Expr::variable(param.clone()));
        let substitutions = self
            .capture_usages(block, &key, false, &mut Vec::new())?
            .into_iter()
            .map(|usage| {
                let rewritten = usage.capture.replace(&inverted).simplify();
                (usage.origin, rewritten.to_expr())
            })
            .collect();
        Ok(Lifted {
            maximal,
            param,
            substitutions,
        })
    }

    /// Expresses `usage`, written against the original variable, through
    /// `hole`, a value of shape `ctx`.
    pub fn rewrite(usage: &Capture, ctx: &Capture, hole: Expr) -> Capture {
        let inverted = ctx.simplify().invert(hole);
        usage.simplify().replace(&inverted)
    }
}

fn collect_stmt(
    stmt: &Stmt,
    variable: &VarKey,
    captures: &mut Vec<UsageCapture>,
    calls: &mut Vec<BlockRef>,
) {
    match &stmt.kind {
        StmtKind::Assignment { target, value } => {
            collect_expr(target, variable, true, captures);
            collect_expr(value, variable, false, captures);
        }
        StmtKind::Call(target) => calls.push(target.clone()),
        StmtKind::If(branches) => {
            for branch in branches {
                if let Some(condition) = &branch.condition {
                    collect_expr(condition, variable, false, captures);
                }
                for stmt in &branch.body {
                    collect_stmt(stmt, variable, captures, calls);
                }
            }
        }
        StmtKind::While { condition, body } => {
            collect_expr(condition, variable, false, captures);
            for stmt in body {
                collect_stmt(stmt, variable, captures, calls);
            }
        }
        StmtKind::Expression(expr) => collect_expr(expr, variable, false, captures),
        StmtKind::Group(statements) => {
            for stmt in statements {
                collect_stmt(stmt, variable, captures, calls);
            }
        }
    }
}

fn collect_expr(expr: &Expr, variable: &VarKey, assigned: bool, captures: &mut Vec<UsageCapture>) {
    let Some(capture) = chain(expr, variable) else {
        for child in expr.children() {
            collect_expr(child, variable, false, captures);
        }
        return;
    };
    if !assigned {
        captures.push(UsageCapture {
            origin: expr.id,
            capture,
        });
        for index in chain_indices(expr) {
            collect_expr(index, variable, false, captures);
        }
        return;
    }
    match expr.kind {
        ExprKind::Variable(_) => captures.push(UsageCapture {
            origin: expr.id,
            capture: Capture::VRef(Box::new(capture)),
        }),
        _ => {
            for child in expr.children() {
                collect_expr(child, variable, false, captures);
            }
        }
    }
}

/// Ref/Deref/Array-target chain ending in `variable`, if `expr` is one.
/// Only `[0]` accesses extend a chain; any other index is evaluated where
/// it is written, so the chain stops at the indexed target.
fn chain(expr: &Expr, variable: &VarKey) -> Option<Capture> {
    match &expr.kind {
        ExprKind::Variable(candidate) if candidate.key() == *variable => {
            Some(Capture::Base(expr.clone()))
        }
        ExprKind::Ref(target) => chain(target, variable).map(|inner| Capture::Ref(Box::new(inner))),
        ExprKind::Deref(target) => {
            chain(target, variable).map(|inner| Capture::Deref(Box::new(inner)))
        }
        ExprKind::Array { target, index } if is_zero(index) => chain(target, variable)
            .map(|inner| Capture::Array(Box::new(inner), index.as_ref().clone())),
        _ => None,
    }
}

fn is_zero(index: &Expr) -> bool {
    matches!(&index.kind, ExprKind::Value(text) if text == "0")
}

fn chain_indices(expr: &Expr) -> Vec<&Expr> {
    let mut indices = Vec::new();
    let mut current = expr;
    loop {
        match &current.kind {
            ExprKind::Ref(target) | ExprKind::Deref(target) => current = target,
            ExprKind::Array { target, index } => {
                indices.push(index.as_ref());
                current = target;
            }
            _ => return indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{compile_document, Builtins};

    fn int_var(name: &str) -> Expr {
        Expr::variable(ChunkVariable::detached(name, Some(TypeNode::simple("int"))))
    }

    fn base(expr: &Expr) -> Capture {
        Capture::Base(expr.clone())
    }

    fn lift_in(source: &str, block: &str, variable: &str) -> Lifted {
        let graph = compile_document(source, &Builtins::new()).expect("compile");
        let handle = graph
            .chunks
            .iter()
            .find_map(|chunk| chunk.lookup(variable).cloned())
            .expect("variable");
        let block = graph.blocks.get(block).expect("block");
        Lifter::new(&graph.blocks)
            .lift(block, &handle)
            .expect("lift")
    }

    #[test]
    fn reference_dominates_plain_reads() {
        let x = int_var("x");
        let plain = base(&x);
        let address = Capture::Ref(Box::new(base(&x)));
        let joined = plain.maximal(&address).expect("join");
        assert!(joined.same_shape(&address));
        assert!(address.maximal(&plain).expect("join").same_shape(&address));
    }

    #[test]
    fn bare_variable_dominates_wrapped_reads() {
        let p = int_var("p");
        let plain = base(&p);
        let deref = Capture::Deref(Box::new(base(&p)));
        let indexed = Capture::Array(Box::new(base(&p)), Expr::value("2"));
        assert!(deref.maximal(&plain).expect("join").same_shape(&plain));
        assert!(indexed.maximal(&deref).expect("join").same_shape(&plain));
    }

    #[test]
    fn equal_literal_indices_survive_the_join() {
        let p = int_var("p");
        let left = Capture::Array(Box::new(base(&p)), Expr::value("1"));
        let right = Capture::Array(Box::new(base(&p)), Expr::value("1"));
        let other = Capture::Array(Box::new(base(&p)), Expr::value("2"));
        assert!(left.maximal(&right).expect("join").same_shape(&left));
        assert!(left.maximal(&other).expect("join").same_shape(&base(&p)));
    }

    #[test]
    fn different_variables_do_not_join() {
        let err = base(&int_var("a"))
            .maximal(&base(&int_var("b")))
            .expect_err("incompatible");
        assert!(matches!(err, SynthError::IncompatibleCapture { .. }));
    }

    #[test]
    fn nvar_follows_the_wrappers() {
        let buffer = Expr::variable(ChunkVariable::detached(
            "buffer",
            Some(TypeNode::array(TypeNode::simple("char"), Some(64))),
        ));
        let element = Capture::Array(Box::new(base(&buffer)), Expr::value("0"));
        assert_eq!(element.nvar().expect("type"), TypeNode::simple("char"));
        let address = Capture::Ref(Box::new(element));
        assert_eq!(
            address.nvar().expect("type"),
            TypeNode::pointer(TypeNode::simple("char"))
        );
        let bad = Capture::Deref(Box::new(base(&int_var("n"))));
        assert!(matches!(bad.nvar(), Err(SynthError::ParameterType { .. })));
    }

    #[test]
    fn simplify_leaves_array_and_vref_alone() {
        let x = int_var("x");
        let ref_array = Capture::Ref(Box::new(Capture::Array(
            Box::new(base(&x)),
            Expr::value("0"),
        )));
        assert!(ref_array.simplify().same_shape(&ref_array));
        let array_ref = Capture::Array(Box::new(Capture::Ref(Box::new(base(&x)))), Expr::value("0"));
        assert!(array_ref.simplify().same_shape(&array_ref));
        let vref = Capture::VRef(Box::new(Capture::Deref(Box::new(base(&x)))));
        assert!(vref.simplify().same_shape(&vref));
        let cancel = Capture::Deref(Box::new(Capture::Ref(Box::new(base(&x)))));
        assert!(cancel.simplify().same_shape(&base(&x)));
    }

    #[test]
    fn invert_rebuilds_the_variable() {
        let x = int_var("x");
        let hole = int_var("p");
        let capture = Capture::Ref(Box::new(Capture::Deref(Box::new(base(&x)))));
        let inverted = capture.invert(hole.clone());
        assert_eq!(inverted.to_string(), "&*p");
        assert!(inverted.replace(&capture).simplify().same_shape(&base(&x)));
    }

    #[test]
    fn mixed_reads_become_dereferences_of_a_pointer_parameter() {
        let source = r#"{
            "chunks": [{"local": true, "variables": [{"name": "x", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "work"}]},
                {"name": "work", "func": true, "statements": [
                    {"expr": {"call": {"target": {"var": "printf"}, "args": [{"value": "\"%d\""}, {"var": "x"}]}}},
                    {"expr": {"call": {"target": {"var": "scanf"}, "args": [{"value": "\"%d\""}, {"ref": {"var": "x"}}]}}}
                ]}
            ]
        }"#;
        let lifted = lift_in(source, "work", "x");
        assert!(matches!(lifted.maximal, Capture::Ref(_)));
        assert_eq!(
            lifted.param.vtype,
            Some(TypeNode::pointer(TypeNode::simple("int")))
        );
        let mut rendered: Vec<String> = lifted
            .substitutions
            .values()
            .map(|expr| expr.to_string())
            .collect();
        rendered.sort();
        assert_eq!(rendered, ["*x", "x"]);
    }

    #[test]
    fn assigned_variables_are_passed_by_address() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "n", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "set"}]},
                {"name": "set", "statements": [
                    {"assign": {"target": {"var": "n"}, "value": {"value": "7"}}}
                ]}
            ]
        }"#;
        let lifted = lift_in(source, "set", "n");
        assert!(matches!(lifted.maximal, Capture::VRef(_)));
        let rewritten: Vec<String> = lifted
            .substitutions
            .values()
            .map(|expr| expr.to_string())
            .collect();
        assert_eq!(rewritten, ["*n"]);

        let argument = Lifter::rewrite(
            &lifted.maximal,
            &base(&int_var("n")),
            int_var("n"),
        )
        .to_argument()
        .simplify();
        assert_eq!(argument.to_expr().to_string(), "&n");
    }

    #[test]
    fn assigned_wrappers_stop_the_chain() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "buf", "type": "[8]char"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "clear"}]},
                {"name": "clear", "statements": [
                    {"assign": {"target": {"index": {"target": {"var": "buf"}, "index": {"value": "0"}}}, "value": {"value": "0"}}}
                ]}
            ]
        }"#;
        let lifted = lift_in(source, "clear", "buf");
        assert!(matches!(lifted.maximal, Capture::Base(_)));
        assert_eq!(
            lifted.param.vtype,
            Some(TypeNode::array(TypeNode::simple("char"), Some(8)))
        );
    }

    #[test]
    fn indexed_reads_keep_the_array_parameter() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "a", "type": "[8]int"}, {"name": "i", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "peek"}]},
                {"name": "peek", "statements": [
                    {"expr": {"call": {"target": {"var": "printf"}, "args": [
                        {"value": "\"%d %d\""},
                        {"index": {"target": {"var": "a"}, "index": {"var": "i"}}},
                        {"index": {"target": {"var": "a"}, "index": {"value": "0"}}}
                    ]}}}
                ]}
            ]
        }"#;
        let lifted = lift_in(source, "peek", "a");
        assert!(matches!(lifted.maximal, Capture::Base(_)));
        assert_eq!(
            lifted.param.vtype,
            Some(TypeNode::array(TypeNode::simple("int"), Some(8)))
        );
        let mut rendered: Vec<String> = lifted
            .substitutions
            .values()
            .map(|expr| expr.to_string())
            .collect();
        rendered.sort();
        assert_eq!(rendered, ["a", "a[0]"]);
    }

    #[test]
    fn callee_usage_widens_the_caller_capture() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "v", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "outer"}]},
                {"name": "outer", "statements": [
                    {"expr": {"call": {"target": {"var": "printf"}, "args": [{"value": "\"%d\""}, {"var": "v"}]}}},
                    {"call": "inner"}
                ]},
                {"name": "inner", "statements": [
                    {"assign": {"target": {"var": "v"}, "value": {"value": "1"}}}
                ]}
            ]
        }"#;
        let lifted = lift_in(source, "outer", "v");
        assert!(matches!(lifted.maximal, Capture::VRef(_)));
        assert_eq!(lifted.substitutions.len(), 1);
        let rendered: Vec<String> = lifted
            .substitutions
            .values()
            .map(|expr| expr.to_string())
            .collect();
        assert_eq!(rendered, ["*v"]);
    }
}
