use crate::{
    error::{SynthError, SynthResult},
    graph::{
        expr::{map_calls_in, refresh_all},
        Block, BlockConstraint, BlockSet, Graph, NameGen, Stmt,
    },
    interpret::tracer::Tracer,
    language::{compile_document, Builtins},
};
use rand::Rng;
use tracing::{debug, trace};

const ASSETS: &[(&str, &str)] = &[
    ("banner", include_str!("../../assets/nops/banner.json")),
    ("checksum", include_str!("../../assets/nops/checksum.json")),
    ("countdown", include_str!("../../assets/nops/countdown.json")),
    ("entropy", include_str!("../../assets/nops/entropy.json")),
    ("scratch", include_str!("../../assets/nops/scratch.json")),
];

/// Decoy graphs available for injection. Every block of every asset is
/// marked `nop`.
#[derive(Clone, Debug, Default)]
pub struct NopPool {
    assets: Vec<Graph>,
}

impl NopPool {
    pub fn new(assets: Vec<Graph>) -> SynthResult<Self> {
        let mut marked = Vec::with_capacity(assets.len());
        for mut asset in assets {
            let mut blocks = BlockSet::new();
            for block in asset.blocks.iter() {
                let constraint = BlockConstraint {
                    nop: true,
                    ..block.constraint
                };
                blocks.insert(Block::with_known_id(
                    block.id,
                    block.name.clone(),
                    block.statements.clone(),
                    constraint,
                ))?;
            }
            asset.blocks = blocks;
            marked.push(asset);
        }
        Ok(Self { assets: marked })
    }

    /// The decoys shipped with the crate.
    pub fn builtin(builtins: &Builtins) -> SynthResult<Self> {
        let mut assets = Vec::with_capacity(ASSETS.len());
        for (name, source) in ASSETS {
            let graph =
                compile_document(source, builtins).map_err(|err| SynthError::DecoyAsset {
                    name: name.to_string(),
                    message: err.to_string(),
                })?;
            assets.push(graph);
        }
        Self::new(assets)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

pub struct NopTransformer<'a> {
    pool: &'a NopPool,
    threshold: f64,
}

impl<'a> NopTransformer<'a> {
    pub fn new(pool: &'a NopPool, threshold: f64) -> Self {
        let threshold = if threshold.is_nan() {
            0.0
        } else {
            threshold.clamp(0.0, 1.0)
        };
        Self { pool, threshold }
    }

    /// Wraps call sites of non-decoy blocks in fresh decoy blocks. Existing
    /// blocks keep their names and identities; only call statements are
    /// redirected.
    pub fn transform<R: Rng + ?Sized>(
        &self,
        graph: &Graph,
        names: &mut NameGen,
        rng: &mut R,
    ) -> SynthResult<Graph> {
        let mut output = graph.clone();
        if self.pool.is_empty() || self.threshold == 0.0 {
            return Ok(output);
        }
        let mut wrappers = Vec::new();
        for block in graph.blocks.iter() {
            if block.constraint.nop {
                continue;
            }
            let statements = map_calls_in(&block.statements, &mut |stmt, target| {
                if !rng.gen_bool(self.threshold) {
                    return Ok(None);
                }
                let asset = &self.pool.assets[rng.gen_range(0..self.pool.len())];
                let decoy = asset.root()?;
                absorb(asset, decoy, &mut output)?;
                let mut statements = refresh_all(&decoy.statements);
                statements.push(stmt.clone());
                let wrapper = Block::new(
                    names.fresh("nop", rng),
                    statements,
                    BlockConstraint {
                        nop: true,
                        ..BlockConstraint::default()
                    },
                );
                trace!(
                    block = %block.name,
                    callee = %target.name,
                    wrapper = %wrapper.name,
                    decoy = %decoy.name,
                    "injected decoy"
                );
                let call = Stmt::call(wrapper.reference());
                wrappers.push(wrapper);
                Ok::<_, SynthError>(Some(vec![call]))
            })?;
            output.blocks.replace(block.map(statements))?;
        }
        debug!(injected = wrappers.len(), "decoy injection finished");
        for wrapper in wrappers {
            output.blocks.insert(wrapper)?;
        }
        Ok(output)
    }
}

/// Adds the blocks, chunks and externs a decoy reaches to `output`.
fn absorb(asset: &Graph, decoy: &Block, output: &mut Graph) -> SynthResult<()> {
    let tracer = Tracer::new(&asset.blocks, decoy, true)?;
    for name in tracer.blocks() {
        let block = asset
            .blocks
            .get(name)
            .ok_or_else(|| SynthError::UnknownBlock { name: name.clone() })?;
        match output.blocks.get(name) {
            Some(existing) if existing.id == block.id => {}
            Some(_) => {
                return Err(SynthError::DecoyAsset {
                    name: decoy.name.clone(),
                    message: format!("block `{name}` collides with an existing block"),
                })
            }
            None => output.blocks.insert(block.clone())?,
        }
    }
    for chunk in tracer.chunks() {
        if output.chunk(*chunk).is_some() {
            continue;
        }
        if let Some(found) = asset.chunk(*chunk) {
            output.chunks.push(found.clone());
        }
    }
    for variable in tracer.externs() {
        if !output
            .externs
            .iter()
            .any(|known| known.name == variable.name)
        {
            output.externs.push(variable.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StmtKind;
    use rand::{rngs::StdRng, SeedableRng};

    const TARGET: &str = r#"{
        "chunks": [{"name": "state", "variables": [{"name": "total", "type": "int"}]}],
        "blocks": [
            {"name": "main", "statements": [{"call": "step"}, {"call": "step"}]},
            {"name": "step", "statements": [
                {"assign": {"target": {"var": "total"}, "value": {"op": {"op": "+", "operands": [{"var": "total"}, {"value": "1"}]}}}}
            ]}
        ]
    }"#;

    fn target_graph() -> Graph {
        compile_document(TARGET, &Builtins::new()).expect("compile")
    }

    #[test]
    fn shipped_assets_compile() {
        let pool = NopPool::builtin(&Builtins::new()).expect("assets");
        assert_eq!(pool.len(), ASSETS.len());
        assert!(pool
            .assets
            .iter()
            .all(|asset| asset.blocks.iter().all(|block| block.constraint.nop)));
    }

    #[test]
    fn injection_is_additive() {
        let graph = target_graph();
        let pool = NopPool::builtin(&Builtins::new()).expect("assets");
        let mut names = NameGen::new();
        graph.reserve_names(&mut names);
        let mut rng = StdRng::seed_from_u64(11);
        let output = NopTransformer::new(&pool, 1.0)
            .transform(&graph, &mut names, &mut rng)
            .expect("transform");
        for block in graph.blocks.iter() {
            let kept = output.blocks.get(&block.name).expect("block kept");
            assert_eq!(kept.id, block.id);
        }
        for chunk in &graph.chunks {
            assert!(output.chunk(chunk.id).is_some());
        }
        assert!(output.blocks.len() > graph.blocks.len());
    }

    #[test]
    fn every_call_is_wrapped_at_full_probability() {
        let graph = target_graph();
        let pool = NopPool::builtin(&Builtins::new()).expect("assets");
        let mut names = NameGen::new();
        graph.reserve_names(&mut names);
        let mut rng = StdRng::seed_from_u64(3);
        let output = NopTransformer::new(&pool, 1.0)
            .transform(&graph, &mut names, &mut rng)
            .expect("transform");
        let main = output.blocks.get("main").expect("main");
        for stmt in &main.statements {
            let StmtKind::Call(target) = &stmt.kind else {
                panic!("expected a call");
            };
            let wrapper = output.blocks.resolve(target).expect("wrapper");
            assert!(wrapper.constraint.nop);
            assert!(wrapper.name.starts_with("nop_"));
            let last = wrapper.statements.last().expect("original call");
            assert!(matches!(&last.kind, StmtKind::Call(inner) if inner.name == "step"));
        }
    }

    #[test]
    fn zero_probability_leaves_the_graph_alone() {
        let graph = target_graph();
        let pool = NopPool::builtin(&Builtins::new()).expect("assets");
        let mut rng = StdRng::seed_from_u64(5);
        let output = NopTransformer::new(&pool, 0.0)
            .transform(&graph, &mut NameGen::new(), &mut rng)
            .expect("transform");
        assert_eq!(output.blocks.len(), graph.blocks.len());
        assert_eq!(output.chunks.len(), graph.chunks.len());
    }
}
