use crate::{
    error::{SynthError, SynthResult},
    graph::{expr::Expr, ids::ChunkId},
    language::types::TypeNode,
};
use std::{collections::HashMap, rc::Rc};

pub type VarHandle = Rc<ChunkVariable>;

/// Identity of a variable: its name within its owning chunk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarKey {
    pub chunk: Option<ChunkId>,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ChunkVariable {
    pub name: String,
    pub vtype: Option<TypeNode>,
    pub chunk: Option<ChunkId>,
    pub initial: Option<Expr>,
}

impl ChunkVariable {
    pub fn new(name: impl Into<String>, vtype: Option<TypeNode>, initial: Option<Expr>) -> Self {
        Self {
            name: name.into(),
            vtype,
            chunk: None,
            initial,
        }
    }

    /// A chunk-less handle, used for externs, lifted parameters and
    /// function names.
    pub fn detached(name: impl Into<String>, vtype: Option<TypeNode>) -> VarHandle {
        Rc::new(Self::new(name, vtype, None))
    }

    pub fn key(&self) -> VarKey {
        VarKey {
            chunk: self.chunk,
            name: self.name.clone(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('_')
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkConstraint {
    islocal: bool,
    isglobal: bool,
    is_static: bool,
}

impl ChunkConstraint {
    pub fn new(islocal: bool, isglobal: bool, is_static: bool) -> SynthResult<Self> {
        if islocal && isglobal {
            return Err(SynthError::ConstraintConflict);
        }
        Ok(Self {
            islocal,
            isglobal,
            is_static,
        })
    }

    pub fn merge(&self, other: &ChunkConstraint) -> SynthResult<Self> {
        Self::new(
            self.islocal || other.islocal,
            self.isglobal || other.isglobal,
            self.is_static || other.is_static,
        )
    }

    pub fn islocal(&self) -> bool {
        self.islocal
    }

    pub fn isglobal(&self) -> bool {
        self.isglobal
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

#[derive(Clone, Debug)]
pub struct Chunk {
    pub id: ChunkId,
    pub name: Option<String>,
    pub constraint: ChunkConstraint,
    variables: Vec<VarHandle>,
    lookup: HashMap<String, usize>,
}

impl Chunk {
    pub fn new(
        name: Option<String>,
        variables: Vec<ChunkVariable>,
        constraint: ChunkConstraint,
    ) -> Self {
        Self::with_id(ChunkId::fresh(), name, variables, constraint)
    }

    fn with_id(
        id: ChunkId,
        name: Option<String>,
        variables: Vec<ChunkVariable>,
        constraint: ChunkConstraint,
    ) -> Self {
        let mut chunk = Self {
            id,
            name,
            constraint,
            variables: Vec::with_capacity(variables.len()),
            lookup: HashMap::new(),
        };
        for mut variable in variables {
            variable.chunk = Some(id);
            if !variable.is_hidden() {
                chunk
                    .lookup
                    .insert(variable.name.clone(), chunk.variables.len());
            }
            chunk.variables.push(Rc::new(variable));
        }
        chunk
    }

    pub fn variables(&self) -> &[VarHandle] {
        &self.variables
    }

    pub fn lookup(&self, name: &str) -> Option<&VarHandle> {
        self.lookup.get(name).map(|idx| &self.variables[*idx])
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Concatenates both variable lists under the first chunk's identity. The
/// merged constraint must still be consistent.
pub fn merge_chunks(first: &Chunk, second: &Chunk) -> SynthResult<Chunk> {
    let constraint = first.constraint.merge(&second.constraint)?;
    let variables = first
        .variables
        .iter()
        .chain(second.variables.iter())
        .map(|variable| {
            ChunkVariable::new(
                &variable.name,
                variable.vtype.clone(),
                variable.initial.clone(),
            )
        })
        .collect();
    Ok(Chunk::with_id(
        first.id,
        first.name.clone().or_else(|| second.name.clone()),
        variables,
        constraint,
    ))
}
