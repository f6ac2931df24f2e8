pub mod block;
pub mod chunk;
pub mod expr;
pub mod ids;
pub mod program;

pub use block::{Block, BlockConstraint, BlockSet};
pub use chunk::{merge_chunks, Chunk, ChunkConstraint, ChunkVariable, VarHandle, VarKey};
pub use expr::{BlockRef, Expr, ExprKind, IfBranch, Node, Stmt, StmtKind};
pub use ids::{BlockId, ChunkId, NameGen, NodeId};
pub use program::{Declaration, FunctionDefinition, Program};

use crate::error::{SynthError, SynthResult};

/// Chunk/block graph handed from the front end to the lowering passes.
#[derive(Clone, Debug)]
pub struct Graph {
    pub entry: String,
    pub chunks: Vec<Chunk>,
    pub externs: Vec<VarHandle>,
    pub blocks: BlockSet,
}

impl Graph {
    pub fn root(&self) -> SynthResult<&Block> {
        self.blocks
            .get(&self.entry)
            .ok_or_else(|| SynthError::UnknownBlock {
                name: self.entry.clone(),
            })
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.id == id)
    }

    /// Every name a synthetic block must avoid.
    pub fn reserve_names(&self, names: &mut NameGen) {
        for name in self.blocks.names() {
            names.reserve(name);
        }
        for chunk in &self.chunks {
            for variable in chunk.variables() {
                names.reserve(variable.name.clone());
            }
        }
        for variable in &self.externs {
            names.reserve(variable.name.clone());
        }
    }
}
