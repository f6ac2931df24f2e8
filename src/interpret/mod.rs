pub mod lift;
pub mod nops;
pub mod tracer;


pub use lift::{Capture, Lifted, Lifter, UsageCapture};
pub use nops::{NopPool, NopTransformer};
pub use tracer::{CallPath, CallSite, Tracer};

use crate::{
    error::{SynthError, SynthResult},
    graph::{
        expr::{map_calls_in, refresh_all},
        Block, BlockRef, BlockSet, ChunkId, ChunkVariable, Declaration, Expr, FunctionDefinition,
        Graph, NodeId, Program, Stmt, StmtKind, VarHandle, VarKey,
    },
    language::types::TypeNode,
};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Outcome of the randomize phase.
#[derive(Clone, Debug, Default)]
pub struct Placement {
    pub funcs: HashSet<String>,
    pub inlines: HashSet<String>,
    pub local_chunks: HashSet<ChunkId>,
}

impl Placement {
    pub fn is_func(&self, block: &str) -> bool {
        self.funcs.contains(block)
    }

    pub fn is_inline(&self, block: &str) -> bool {
        self.inlines.contains(block)
    }

    pub fn is_local(&self, chunk: ChunkId) -> bool {
        self.local_chunks.contains(&chunk)
    }
}

#[derive(Default)]
struct Declarations {
    statics: Vec<VarHandle>,
    locals: Vec<VarHandle>,
}

struct Parameter {
    key: VarKey,
    lifted: Lifted,
}

pub struct Interpreter<'g> {
    graph: &'g Graph,
}

impl<'g> Interpreter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    pub fn interpret<R: Rng + ?Sized>(&self, rng: &mut R) -> SynthResult<Program> {
        let placement = self.randomize(rng)?;
        let expanded = self.inline(&placement)?;
        let blocks = repair_calls(expanded)?;
        self.lower(&blocks, &placement)
    }

    pub fn randomize<R: Rng + ?Sized>(&self, rng: &mut R) -> SynthResult<Placement> {
        let root = self.graph.root()?;
        let mut placement = Placement::default();
        for block in self.graph.blocks.iter() {
            let func = if block.name == root.name || block.constraint.func {
                true
            } else if block.constraint.inline {
                false
            } else if reaches_itself(&self.graph.blocks, block)? {
                true
            } else {
                rng.gen_bool(0.5)
            };
            trace!(block = %block.name, func, "placed block");
            if func {
                placement.funcs.insert(block.name.clone());
            } else {
                placement.inlines.insert(block.name.clone());
            }
        }
        for chunk in &self.graph.chunks {
            let local = if chunk.constraint.islocal() {
                true
            } else if chunk.constraint.isglobal() {
                false
            } else {
                rng.gen_bool(0.5)
            };
            trace!(chunk = %chunk.label(), local, "placed chunk");
            if local {
                placement.local_chunks.insert(chunk.id);
            }
        }
        debug!(
            funcs = placement.funcs.len(),
            inlines = placement.inlines.len(),
            locals = placement.local_chunks.len(),
            "randomized placement"
        );
        Ok(placement)
    }

    /// Splices every inline call into its caller. Only function blocks are
    /// returned.
    pub fn inline(&self, placement: &Placement) -> SynthResult<Vec<Block>> {
        let mut expanded = Vec::new();
        for block in self.graph.blocks.iter() {
            if !placement.is_func(&block.name) {
                continue;
            }
            let statements = self.expand(&block.statements, placement, &mut Vec::new())?;
            expanded.push(block.map(statements));
        }
        debug!(functions = expanded.len(), "expanded inline blocks");
        Ok(expanded)
    }

    fn expand(
        &self,
        body: &[Stmt],
        placement: &Placement,
        stack: &mut Vec<String>,
    ) -> SynthResult<Vec<Stmt>> {
        map_calls_in(body, &mut |_, target| {
            if placement.is_func(&target.name) {
                return Ok(None);
            }
            if !placement.is_inline(&target.name) {
                return Err(SynthError::UninterpretedBlock {
                    name: target.name.clone(),
                });
            }
            if stack.contains(&target.name) {
                return Err(SynthError::RecursiveInline {
                    name: target.name.clone(),
                });
            }
            let callee = self.graph.blocks.resolve(target)?;
            stack.push(callee.name.clone());
            let spliced = self.expand(&refresh_all(&callee.statements), placement, stack);
            stack.pop();
            Ok(Some(spliced?))
        })
    }

    fn lower(&self, blocks: &BlockSet, placement: &Placement) -> SynthResult<Program> {
        let root = blocks
            .get(&self.graph.entry)
            .ok_or_else(|| SynthError::UnknownBlock {
                name: self.graph.entry.clone(),
            })?;
        let tracer = Tracer::new(blocks, root, true)?;
        debug!(
            reachable = tracer.blocks().len(),
            chunks = tracer.chunks().len(),
            "traced call graph"
        );

        let mut declarations: HashMap<String, Declarations> = HashMap::new();
        let mut roots: HashMap<ChunkId, String> = HashMap::new();
        let mut globals = Vec::new();
        for chunk in &self.graph.chunks {
            let is_static = chunk.constraint.is_static();
            if !placement.is_local(chunk.id) {
                globals.extend(chunk.variables().iter().map(|variable| Declaration {
                    variable: variable.clone(),
                    is_static,
                }));
                continue;
            }
            let site = tracer
                .root(chunk.id)
                .unwrap_or(tracer.root_block())
                .to_string();
            trace!(chunk = %chunk.label(), site = %site, "declaring local chunk");
            let entry = declarations.entry(site.clone()).or_default();
            if is_static {
                entry.statics.extend(chunk.variables().iter().cloned());
            } else {
                entry.locals.extend(chunk.variables().iter().cloned());
            }
            roots.insert(chunk.id, site);
        }

        let patches = tracer.patches();
        let lifter = Lifter::new(blocks);
        let mut parameters: HashMap<String, Vec<Parameter>> = HashMap::new();
        let mut substitutions: HashMap<NodeId, Expr> = HashMap::new();
        for name in tracer.blocks() {
            let block = lookup(blocks, name)?;
            let Some(needed) = patches.get(name) else {
                continue;
            };
            let mut lifted_here = Vec::new();
            for variable in needed {
                if !variable.chunk.is_some_and(|chunk| placement.is_local(chunk)) {
                    continue;
                }
                let lifted = lifter.lift(block, variable)?;
                trace!(
                    block = %name,
                    variable = %variable.name,
                    capture = %lifted.maximal,
                    "lifted parameter"
                );
                substitutions.extend(
                    lifted
                        .substitutions
                        .iter()
                        .map(|(id, expr)| (*id, expr.clone())),
                );
                lifted_here.push(Parameter {
                    key: variable.key(),
                    lifted,
                });
            }
            parameters.insert(name.clone(), lifted_here);
        }
        debug!(substitutions = substitutions.len(), "lifted parameters");

        let mut functions = Vec::new();
        for name in tracer.blocks() {
            let block = lookup(blocks, name)?;
            let body: Vec<Stmt> = block
                .statements
                .iter()
                .map(|stmt| stmt.map_exprs(&mut |expr| expr.substitute(&substitutions)))
                .collect();
            let body = map_calls_in(&body, &mut |_, target| {
                let call = call_statement(name, target, &parameters, &roots)?;
                Ok::<_, SynthError>(Some(vec![call]))
            })?;
            let decls = declarations.remove(name).unwrap_or_default();
            let params = parameters
                .get(name)
                .map(|params| params.iter().map(|param| param.lifted.param.clone()).collect())
                .unwrap_or_default();
            let ret = if name == "main" {
                TypeNode::simple("int")
            } else {
                TypeNode::void()
            };
            functions.push(FunctionDefinition {
                name: name.clone(),
                ret,
                params,
                statics: decls.statics,
                locals: decls.locals,
                body,
            });
        }

        let mut externs: Vec<VarHandle> = Vec::new();
        for variable in self.graph.externs.iter().chain(tracer.externs()) {
            if !externs.iter().any(|known| known.name == variable.name) {
                externs.push(variable.clone());
            }
        }
        debug!(
            functions = functions.len(),
            globals = globals.len(),
            externs = externs.len(),
            "built program"
        );
        Ok(Program {
            externs,
            globals,
            functions,
        })
    }
}

fn lookup<'b>(blocks: &'b BlockSet, name: &str) -> SynthResult<&'b Block> {
    blocks.get(name).ok_or_else(|| SynthError::UnknownBlock {
        name: name.to_string(),
    })
}

/// Rewrites a call edge into a call of the generated function, passing
/// each lifted parameter from the caller's scope.
fn call_statement(
    caller: &str,
    target: &BlockRef,
    parameters: &HashMap<String, Vec<Parameter>>,
    roots: &HashMap<ChunkId, String>,
) -> SynthResult<Stmt> {
    let callee_params = parameters
        .get(&target.name)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let caller_params = parameters
        .get(caller)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let mut args = Vec::with_capacity(callee_params.len());
    let mut arg_types = Vec::with_capacity(callee_params.len());
    for param in callee_params {
        let context = caller_params.iter().find(|known| known.key == param.key);
        let argument = match context {
            Some(context) => Lifter::rewrite(
                &param.lifted.maximal,
                &context.lifted.maximal,
                Expr::variable(context.lifted.param.clone()),
            ),
            None => {
                let declared_here = param
                    .key
                    .chunk
                    .and_then(|chunk| roots.get(&chunk))
                    .is_some_and(|site| site == caller);
                if !declared_here {
                    return Err(SynthError::UnresolvedArgument {
                        variable: param.key.name.clone(),
                        block: caller.to_string(),
                    });
                }
                param.lifted.maximal.clone()
            }
        };
        args.push(argument.to_argument().simplify().to_expr().refresh());
        arg_types.push(param.lifted.param.vtype.clone().unwrap_or_else(TypeNode::void));
    }
    let function = ChunkVariable::detached(
        &target.name,
        Some(TypeNode::func(TypeNode::void(), arg_types, false)),
    );
    Ok(Stmt::expression(Expr::call(Expr::variable(function), args)))
}

/// Rebuilds every block and points each call at the one canonical instance
/// of its target, keeping identities that already exist.
pub fn repair_calls(blocks: Vec<Block>) -> SynthResult<BlockSet> {
    let mut canonical = BlockSet::new();
    for block in &blocks {
        canonical.insert(Block::with_known_id(
            block.id,
            block.name.clone(),
            Vec::new(),
            block.constraint,
        ))?;
    }
    let mut repaired = BlockSet::new();
    for block in blocks {
        let statements = map_calls_in(&block.statements, &mut |stmt, target| {
            let resolved = canonical
                .get(&target.name)
                .ok_or_else(|| SynthError::UninterpretedBlock {
                    name: target.name.clone(),
                })?;
            Ok::<_, SynthError>(Some(vec![Stmt {
                id: stmt.id,
                kind: StmtKind::Call(resolved.reference()),
            }]))
        })?;
        repaired.insert(block.map(statements))?;
    }
    debug!(blocks = repaired.len(), "repaired call graph");
    Ok(repaired)
}

/// Whether `start` can call itself through any chain of calls.
pub fn reaches_itself(blocks: &BlockSet, start: &Block) -> SynthResult<bool> {
    let mut pending = vec![start];
    let mut seen = HashSet::new();
    while let Some(block) = pending.pop() {
        for stmt in &block.statements {
            for target in stmt.calls() {
                if target.name == start.name {
                    return Ok(true);
                }
                if seen.insert(target.name.clone()) {
                    pending.push(blocks.resolve(target)?);
                }
            }
        }
    }
    Ok(false)
}
