use crate::{
    error::{SynthError, SynthResult},
    graph::{
        expr::{BlockRef, Stmt},
        ids::BlockId,
    },
};
use std::collections::HashMap;

/// Lowering hints. `func` forces a function, `inline` forces splicing, and
/// a block with neither is placed at random. `nop` marks decoy code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockConstraint {
    pub func: bool,
    pub inline: bool,
    pub nop: bool,
}

impl BlockConstraint {
    pub fn is_unconstrained(&self) -> bool {
        !self.func && !self.inline
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub constraint: BlockConstraint,
    pub statements: Vec<Stmt>,
}

impl Block {
    pub fn new(name: impl Into<String>, statements: Vec<Stmt>, constraint: BlockConstraint) -> Self {
        Self::with_known_id(BlockId::fresh(), name, statements, constraint)
    }

    pub fn with_known_id(
        id: BlockId,
        name: impl Into<String>,
        statements: Vec<Stmt>,
        constraint: BlockConstraint,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            constraint,
            statements,
        }
    }

    /// Same block identity with a new body.
    pub fn map(&self, statements: Vec<Stmt>) -> Self {
        Self::with_known_id(self.id, self.name.clone(), statements, self.constraint)
    }

    pub fn reference(&self) -> BlockRef {
        BlockRef {
            name: self.name.clone(),
            id: self.id,
        }
    }
}

/// Blocks keyed by their graph-wide unique name, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct BlockSet {
    blocks: Vec<Block>,
    index: HashMap<String, usize>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: Block) -> SynthResult<()> {
        if self.index.contains_key(&block.name) {
            return Err(SynthError::DuplicateBlock { name: block.name });
        }
        self.index.insert(block.name.clone(), self.blocks.len());
        self.blocks.push(block);
        Ok(())
    }

    pub fn replace(&mut self, block: Block) -> SynthResult<()> {
        match self.index.get(&block.name) {
            Some(idx) => {
                self.blocks[*idx] = block;
                Ok(())
            }
            None => Err(SynthError::UnknownBlock { name: block.name }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.index.get(name).map(|idx| &self.blocks[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Looks up the canonical instance a call points at.
    pub fn resolve(&self, target: &BlockRef) -> SynthResult<&Block> {
        let block = self.get(&target.name).ok_or_else(|| SynthError::UnknownBlock {
            name: target.name.clone(),
        })?;
        if block.id != target.id {
            return Err(SynthError::DivergentCall {
                name: target.name.clone(),
            });
        }
        Ok(block)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|block| block.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
