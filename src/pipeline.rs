use crate::{
    codegen::CodeGen,
    error::SynthResult,
    graph::{Graph, NameGen},
    interpret::{Interpreter, NopPool, NopTransformer},
    language::{compile_document, Builtins, CompileResult},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq)]
pub struct SynthOptions {
    pub seed: Option<u64>,
    pub nops: bool,
    pub nop_probability: f64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            seed: None,
            nops: true,
            nop_probability: 0.25,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Variant {
    pub seed: u64,
    pub source: String,
}

/// Builtin table and decoy pool shared by every run.
pub struct Synthesizer {
    builtins: Builtins,
    pool: NopPool,
}

impl Synthesizer {
    pub fn new() -> SynthResult<Self> {
        let builtins = Builtins::new();
        let pool = NopPool::builtin(&builtins)?;
        Ok(Self::with_pool(builtins, pool))
    }

    pub fn with_pool(builtins: Builtins, pool: NopPool) -> Self {
        Self { builtins, pool }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn compile(&self, source: &str) -> CompileResult<Graph> {
        compile_document(source, &self.builtins)
    }

    pub fn synthesize(&self, graph: &Graph, options: &SynthOptions) -> SynthResult<String> {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.synthesize_with(graph, options, &mut rng)
    }

    /// One full run: decoy injection, interpretation, emission.
    pub fn synthesize_with<R: Rng + ?Sized>(
        &self,
        graph: &Graph,
        options: &SynthOptions,
        rng: &mut R,
    ) -> SynthResult<String> {
        let mut names = NameGen::new();
        graph.reserve_names(&mut names);
        let graph = if options.nops {
            NopTransformer::new(&self.pool, options.nop_probability).transform(
                graph,
                &mut names,
                rng,
            )?
        } else {
            graph.clone()
        };
        let program = Interpreter::new(&graph).interpret(rng)?;
        debug!(functions = program.functions.len(), "emitting C source");
        Ok(CodeGen::new(&self.builtins).generate(&program))
    }

    /// `count` variants seeded `seed`, `seed + 1`, and so on. Without a seed
    /// the base is drawn from entropy and logged.
    pub fn variants(
        &self,
        graph: &Graph,
        options: &SynthOptions,
        count: usize,
    ) -> SynthResult<Vec<Variant>> {
        let base = options.seed.unwrap_or_else(rand::random);
        let mut variants = Vec::with_capacity(count);
        for offset in 0..count as u64 {
            let seed = base.wrapping_add(offset);
            info!(seed, "generating variant");
            let options = SynthOptions {
                seed: Some(seed),
                ..options.clone()
            };
            variants.push(Variant {
                seed,
                source: self.synthesize(graph, &options)?,
            });
        }
        Ok(variants)
    }
}
