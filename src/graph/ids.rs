use rand::Rng;
use std::{
    collections::HashSet,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Process-unique identity of an expression or statement node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(next_raw())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    pub fn fresh() -> Self {
        BlockId(next_raw())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u64);

impl ChunkId {
    pub fn fresh() -> Self {
        ChunkId(next_raw())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// Tracks every name handed out during one synthesis run so synthetic
/// blocks never collide with declared ones.
#[derive(Clone, Debug, Default)]
pub struct NameGen {
    taken: HashSet<String>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: impl Into<String>) -> bool {
        self.taken.insert(name.into())
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub fn fresh<R: Rng + ?Sized>(&mut self, prefix: &str, rng: &mut R) -> String {
        loop {
            let candidate = format!("{prefix}_{:06x}", rng.gen_range(0..0x100_0000u32));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn ids_are_unique() {
        let first = NodeId::fresh();
        let second = NodeId::fresh();
        assert_ne!(first, second);
    }

    #[test]
    fn fresh_names_skip_reserved_ones() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut lookahead = rng.clone();
        let mut names = NameGen::new();
        let collision = format!("nop_{:06x}", lookahead.gen_range(0..0x100_0000u32));
        names.reserve(collision.clone());
        let name = names.fresh("nop", &mut rng);
        assert_ne!(name, collision);
        assert!(names.is_taken(&name));
    }
}
