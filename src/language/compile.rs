use crate::{
    graph::{
        merge_chunks, Block, BlockConstraint, BlockRef, BlockSet, Chunk, ChunkConstraint,
        ChunkVariable, Expr, ExprKind, Graph, IfBranch, Stmt, VarHandle,
    },
    language::{
        ast::{BlockDecl, ChunkDecl, Document, ExprNode, StmtNode},
        builtins::{BuiltinKind, Builtins},
        errors::{CompileError, CompileResult},
        parser::parse_type,
        typecheck::Typer,
        types::TypeNode,
    },
};
use std::collections::HashMap;
use tracing::debug;

/// Parses, resolves and type checks a JSON document.
pub fn compile_document(source: &str, builtins: &Builtins) -> CompileResult<Graph> {
    let document: Document = serde_json::from_str(source)?;
    compile(&document, builtins)
}

pub fn compile(document: &Document, builtins: &Builtins) -> CompileResult<Graph> {
    let mut scope = Scope::new(builtins);
    let mut externs = Vec::with_capacity(document.externs.len());
    for decl in &document.externs {
        let context = format!("extern `{}`", decl.name);
        let ty = resolve_type(&decl.ty, &context)?;
        let handle = ChunkVariable::detached(&decl.name, Some(ty));
        scope.declare(handle.clone(), &context)?;
        externs.push(handle);
    }

    let chunks = compile_chunks(&document.chunks, &mut scope)?;
    for chunk in &chunks {
        let context = format!("chunk `{}`", chunk.label());
        for variable in chunk.variables().iter().filter(|variable| !variable.is_hidden()) {
            scope.declare(variable.clone(), &context)?;
        }
    }

    let mut targets: HashMap<&str, BlockRef> = HashMap::new();
    let mut shells = Vec::with_capacity(document.blocks.len());
    for decl in &document.blocks {
        let shell = Block::new(&decl.name, Vec::new(), constraint_of(decl));
        if targets.insert(&decl.name, shell.reference()).is_some() {
            return Err(CompileError::Duplicate {
                name: decl.name.clone(),
                context: "block declarations".into(),
            });
        }
        shells.push(shell);
    }

    let mut blocks = BlockSet::new();
    for (decl, shell) in document.blocks.iter().zip(shells) {
        let context = format!("block `{}`", decl.name);
        let lowering = Lowering {
            scope: &mut scope,
            targets: &targets,
            context: &context,
        };
        let statements = lowering.stmts(&decl.statements)?;
        blocks
            .insert(shell.map(statements))
            .map_err(|source| CompileError::Graph { context, source })?;
    }

    if !blocks.contains(&document.entry) {
        return Err(CompileError::UnknownBlock {
            name: document.entry.clone(),
            context: "document entry".into(),
        });
    }

    let graph = Graph {
        entry: document.entry.clone(),
        chunks,
        externs,
        blocks,
    };
    Typer::new(builtins).check(&graph)?;
    debug!(
        entry = %graph.entry,
        chunks = graph.chunks.len(),
        blocks = graph.blocks.len(),
        "compiled document"
    );
    Ok(graph)
}

fn constraint_of(decl: &BlockDecl) -> BlockConstraint {
    BlockConstraint {
        func: decl.func,
        inline: decl.inline,
        nop: decl.nop,
    }
}

fn resolve_type(text: &str, context: &str) -> CompileResult<TypeNode> {
    parse_type(text).map_err(|message| CompileError::Type {
        text: text.to_string(),
        message,
        context: context.to_string(),
    })
}

/// Builds chunks in declaration order; declarations sharing a name are
/// merged into the first one.
fn compile_chunks(decls: &[ChunkDecl], scope: &mut Scope<'_>) -> CompileResult<Vec<Chunk>> {
    let mut chunks: Vec<Chunk> = Vec::with_capacity(decls.len());
    for decl in decls {
        let context = match &decl.name {
            Some(name) => format!("chunk `{name}`"),
            None => "anonymous chunk".to_string(),
        };
        let constraint = ChunkConstraint::new(decl.local, decl.global, decl.is_static)
            .map_err(|source| CompileError::Graph {
                context: context.clone(),
                source,
            })?;
        let mut variables = Vec::with_capacity(decl.variables.len());
        for variable in &decl.variables {
            let ty = resolve_type(&variable.ty, &context)?;
            let initial = match &variable.initial {
                Some(node) => {
                    let lowering = Lowering {
                        scope: &mut *scope,
                        targets: &HashMap::new(),
                        context: &context,
                    };
                    Some(lowering.expr(node)?)
                }
                None => None,
            };
            variables.push(ChunkVariable::new(&variable.name, Some(ty), initial));
        }
        let chunk = Chunk::new(decl.name.clone(), variables, constraint);

        let existing = decl
            .name
            .as_ref()
            .and_then(|name| chunks.iter().position(|c| c.name.as_ref() == Some(name)));
        match existing {
            Some(idx) => {
                chunks[idx] = merge_chunks(&chunks[idx], &chunk).map_err(|source| {
                    CompileError::Graph {
                        context: context.clone(),
                        source,
                    }
                })?;
            }
            None => chunks.push(chunk),
        }
    }
    for chunk in &chunks {
        let mut seen: Vec<&str> = Vec::new();
        for variable in chunk.variables() {
            if seen.contains(&variable.name.as_str()) {
                return Err(CompileError::Duplicate {
                    name: variable.name.clone(),
                    context: format!("chunk `{}`", chunk.label()),
                });
            }
            seen.push(&variable.name);
        }
    }
    Ok(chunks)
}

/// Names visible to block bodies: chunk variables and externs first, then
/// builtins on demand.
struct Scope<'b> {
    builtins: &'b Builtins,
    names: HashMap<String, VarHandle>,
    builtin_handles: HashMap<String, VarHandle>,
}

impl<'b> Scope<'b> {
    fn new(builtins: &'b Builtins) -> Self {
        Self {
            builtins,
            names: HashMap::new(),
            builtin_handles: HashMap::new(),
        }
    }

    fn declare(&mut self, variable: VarHandle, context: &str) -> CompileResult<()> {
        if self.names.contains_key(&variable.name) {
            return Err(CompileError::Duplicate {
                name: variable.name.clone(),
                context: context.to_string(),
            });
        }
        self.names.insert(variable.name.clone(), variable);
        Ok(())
    }

    fn resolve(&mut self, name: &str, context: &str) -> CompileResult<VarHandle> {
        if let Some(variable) = self.names.get(name) {
            return Ok(variable.clone());
        }
        if let Some(variable) = self.builtin_handles.get(name) {
            return Ok(variable.clone());
        }
        let unknown = || CompileError::UnknownVariable {
            name: name.to_string(),
            context: context.to_string(),
        };
        let symbol = self.builtins.lookup(name).ok_or_else(unknown)?;
        if symbol.kind == BuiltinKind::Type {
            return Err(unknown());
        }
        let ty = match self.builtins.signature(name) {
            Some(Ok(ty)) => ty,
            Some(Err(message)) => {
                return Err(CompileError::Type {
                    text: symbol.signature.to_string(),
                    message,
                    context: format!("builtin `{name}`"),
                })
            }
            None => return Err(unknown()),
        };
        let handle = ChunkVariable::detached(name, Some(ty));
        self.builtin_handles
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

struct Lowering<'s, 'b> {
    scope: &'s mut Scope<'b>,
    targets: &'s HashMap<&'s str, BlockRef>,
    context: &'s str,
}

impl Lowering<'_, '_> {
    fn stmts(mut self, nodes: &[StmtNode]) -> CompileResult<Vec<Stmt>> {
        self.lower_stmts(nodes)
    }

    fn expr(mut self, node: &ExprNode) -> CompileResult<Expr> {
        self.lower_expr(node)
    }

    fn lower_stmts(&mut self, nodes: &[StmtNode]) -> CompileResult<Vec<Stmt>> {
        nodes.iter().map(|node| self.lower_stmt(node)).collect()
    }

    fn lower_stmt(&mut self, node: &StmtNode) -> CompileResult<Stmt> {
        Ok(match node {
            StmtNode::Assign { target, value } => {
                let target = self.lower_expr(target)?;
                Stmt::assignment(target, self.lower_expr(value)?)
            }
            StmtNode::Call(name) => {
                let target = self.targets.get(name.as_str()).ok_or_else(|| {
                    CompileError::UnknownBlock {
                        name: name.clone(),
                        context: self.context.to_string(),
                    }
                })?;
                Stmt::call(target.clone())
            }
            StmtNode::If {
                branches,
                otherwise,
            } => {
                if branches.is_empty() {
                    return Err(CompileError::mismatch(
                        self.context,
                        "`if` needs at least one conditional branch",
                    ));
                }
                let mut lowered = Vec::with_capacity(branches.len() + 1);
                for branch in branches {
                    let condition = self.lower_expr(&branch.condition)?;
                    lowered.push(IfBranch {
                        condition: Some(condition),
                        body: self.lower_stmts(&branch.body)?,
                    });
                }
                if let Some(body) = otherwise {
                    lowered.push(IfBranch {
                        condition: None,
                        body: self.lower_stmts(body)?,
                    });
                }
                Stmt::if_chain(lowered)
            }
            StmtNode::While { condition, body } => {
                let condition = self.lower_expr(condition)?;
                Stmt::while_loop(condition, self.lower_stmts(body)?)
            }
            StmtNode::Expr(expr) => Stmt::expression(self.lower_expr(expr)?),
            StmtNode::Group(body) => Stmt::group(self.lower_stmts(body)?),
        })
    }

    fn lower_expr(&mut self, node: &ExprNode) -> CompileResult<Expr> {
        Ok(match node {
            ExprNode::Var(name) => Expr::variable(self.scope.resolve(name, self.context)?),
            ExprNode::Ref(target) => Expr::reference(self.lower_expr(target)?),
            ExprNode::Deref(target) => Expr::deref(self.lower_expr(target)?),
            ExprNode::Index { target, index } => {
                let target = self.lower_expr(target)?;
                Expr::array(target, self.lower_expr(index)?)
            }
            ExprNode::Call { target, args } => {
                let target = self.lower_expr(target)?;
                let args = args
                    .iter()
                    .map(|arg| self.lower_expr(arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                Expr::call(target, args)
            }
            ExprNode::Op { op, operands } => {
                if operands.is_empty() {
                    return Err(CompileError::mismatch(
                        self.context,
                        format!("operator `{op}` has no operands"),
                    ));
                }
                let operands = operands
                    .iter()
                    .map(|operand| self.lower_expr(operand))
                    .collect::<CompileResult<Vec<_>>>()?;
                Expr::operation(op.clone(), operands)
            }
            ExprNode::Value(text) => Expr::value(text.clone()),
            ExprNode::Cast { expr, ty } => {
                let target = self.lower_expr(expr)?;
                Expr::cast(target, resolve_type(ty, self.context)?)
            }
            ExprNode::SizeofExpr(target) => {
                Expr::new(ExprKind::SizeOfExpr(Box::new(self.lower_expr(target)?)))
            }
            ExprNode::SizeofType(ty) => {
                Expr::new(ExprKind::SizeOfType(resolve_type(ty, self.context)?))
            }
        })
    }
}
