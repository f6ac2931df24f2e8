use crate::{
    error::SynthResult,
    graph::{Block, BlockSet, ChunkId, ExprKind, Node, NodeId, StmtKind, VarHandle, VarKey},
};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// One call edge on a path from the tracer root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub call: NodeId,
    pub block: String,
}

pub type CallPath = Vec<CallSite>;

/// Depth-first reachability over the call graph below one root block.
///
/// A block already on the current path is not entered again, so recursive
/// call chains are only followed once.
#[derive(Debug)]
pub struct Tracer {
    root: String,
    blocks: Vec<String>,
    chunks: Vec<ChunkId>,
    paths: HashMap<ChunkId, Vec<CallPath>>,
    uses: Vec<(VarHandle, CallPath)>,
    externs: Vec<VarHandle>,
}

impl Tracer {
    pub fn new(blocks: &BlockSet, root: &Block, recursive: bool) -> SynthResult<Self> {
        let mut tracer = Self {
            root: root.name.clone(),
            blocks: vec![root.name.clone()],
            chunks: Vec::new(),
            paths: HashMap::new(),
            uses: Vec::new(),
            externs: Vec::new(),
        };
        let mut seen_uses = HashSet::new();
        let mut excluding = vec![root.name.clone()];
        tracer.visit(
            blocks,
            root,
            &mut Vec::new(),
            &mut excluding,
            &mut seen_uses,
            recursive,
        )?;
        trace!(
            root = %tracer.root,
            blocks = tracer.blocks.len(),
            chunks = tracer.chunks.len(),
            "traced call graph"
        );
        Ok(tracer)
    }

    fn visit(
        &mut self,
        blocks: &BlockSet,
        block: &Block,
        path: &mut CallPath,
        excluding: &mut Vec<String>,
        seen_uses: &mut HashSet<(VarKey, CallPath)>,
        recursive: bool,
    ) -> SynthResult<()> {
        let mut calls = Vec::new();
        for stmt in &block.statements {
            stmt.walk(&mut |node| match node {
                Node::Expr(expr) => {
                    if let ExprKind::Variable(variable) = &expr.kind {
                        self.record(variable, path, seen_uses);
                    }
                }
                Node::Stmt(stmt) => {
                    if let StmtKind::Call(target) = &stmt.kind {
                        calls.push((stmt.id, target.clone()));
                    }
                }
            });
        }
        if !recursive {
            return Ok(());
        }
        for (call, target) in calls {
            if excluding.contains(&target.name) {
                continue;
            }
            let callee = blocks.resolve(&target)?;
            if !self.blocks.contains(&callee.name) {
                self.blocks.push(callee.name.clone());
            }
            path.push(CallSite {
                call,
                block: callee.name.clone(),
            });
            excluding.push(callee.name.clone());
            let result = self.visit(blocks, callee, path, excluding, seen_uses, recursive);
            excluding.pop();
            path.pop();
            result?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        variable: &VarHandle,
        path: &CallPath,
        seen_uses: &mut HashSet<(VarKey, CallPath)>,
    ) {
        let Some(chunk) = variable.chunk else {
            if !self
                .externs
                .iter()
                .any(|known| known.name == variable.name)
            {
                self.externs.push(variable.clone());
            }
            return;
        };
        if !seen_uses.insert((variable.key(), path.clone())) {
            return;
        }
        self.uses.push((variable.clone(), path.clone()));
        let paths = self.paths.entry(chunk).or_insert_with(|| {
            self.chunks.push(chunk);
            Vec::new()
        });
        if !paths.contains(path) {
            paths.push(path.clone());
        }
    }

    pub fn root_block(&self) -> &str {
        &self.root
    }

    /// Reached blocks in discovery order, starting with the root.
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    /// Chunks referenced anywhere below the root, in discovery order.
    pub fn chunks(&self) -> &[ChunkId] {
        &self.chunks
    }

    pub fn externs(&self) -> &[VarHandle] {
        &self.externs
    }

    pub fn paths(&self, chunk: ChunkId) -> Option<&[CallPath]> {
        self.paths.get(&chunk).map(Vec::as_slice)
    }

    /// Longest call prefix shared by every path that reaches `chunk`.
    pub fn prefix(&self, chunk: ChunkId) -> Option<&[CallSite]> {
        let paths = self.paths.get(&chunk)?;
        let (first, rest) = paths.split_first()?;
        let mut len = first.len();
        for path in rest {
            len = len.min(
                first
                    .iter()
                    .zip(path)
                    .take_while(|(left, right)| left == right)
                    .count(),
            );
        }
        Some(&first[..len])
    }

    /// Deepest block every use of `chunk` passes through.
    pub fn root(&self, chunk: ChunkId) -> Option<&str> {
        let prefix = self.prefix(chunk)?;
        Some(match prefix.last() {
            Some(site) => site.block.as_str(),
            None => self.root.as_str(),
        })
    }

    /// For every block, the variables used in it or below it that are
    /// declared strictly above it.
    pub fn patches(&self) -> HashMap<String, Vec<VarHandle>> {
        let mut patches: HashMap<String, Vec<VarHandle>> = HashMap::new();
        for (variable, path) in &self.uses {
            let Some(chunk) = variable.chunk else {
                continue;
            };
            let start = self.prefix(chunk).map_or(0, <[CallSite]>::len);
            for site in &path[start..] {
                let entry = patches.entry(site.block.clone()).or_default();
                if !entry.iter().any(|known| known.key() == variable.key()) {
                    entry.push(variable.clone());
                }
            }
        }
        patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{compile_document, Builtins};

    fn trace(source: &str, root: &str) -> (crate::graph::Graph, Tracer) {
        let graph = compile_document(source, &Builtins::new()).expect("compile");
        let block = graph.blocks.get(root).expect("root block").clone();
        let tracer = Tracer::new(&graph.blocks, &block, true).expect("trace");
        (graph, tracer)
    }

    const NESTED: &str = r#"{
        "chunks": [
            {"name": "outer", "variables": [{"name": "count", "type": "int"}]},
            {"name": "inner", "variables": [{"name": "scratch", "type": "[16]char"}]}
        ],
        "blocks": [
            {"name": "main", "statements": [
                {"assign": {"target": {"var": "count"}, "value": {"value": "0"}}},
                {"call": "worker"}
            ]},
            {"name": "worker", "statements": [
                {"call": "helper"},
                {"expr": {"call": {"target": {"var": "puts"}, "args": [{"var": "scratch"}]}}}
            ]},
            {"name": "helper", "statements": [
                {"expr": {"call": {"target": {"var": "gets"}, "args": [{"var": "scratch"}]}}},
                {"assign": {"target": {"var": "count"}, "value": {"value": "1"}}}
            ]}
        ]
    }"#;

    fn chunk_of(graph: &crate::graph::Graph, variable: &str) -> ChunkId {
        graph
            .chunks
            .iter()
            .find(|chunk| chunk.lookup(variable).is_some())
            .map(|chunk| chunk.id)
            .expect("chunk")
    }

    #[test]
    fn chunk_used_below_a_call_roots_at_the_callee() {
        let (graph, tracer) = trace(NESTED, "main");
        assert_eq!(tracer.root(chunk_of(&graph, "scratch")), Some("worker"));
        assert_eq!(tracer.root(chunk_of(&graph, "count")), Some("main"));
        assert_eq!(tracer.blocks(), ["main", "worker", "helper"]);
    }

    #[test]
    fn patches_stop_at_the_chunk_root() {
        let (_, tracer) = trace(NESTED, "main");
        let patches = tracer.patches();
        let names = |block: &str| -> Vec<String> {
            patches
                .get(block)
                .map(|vars| vars.iter().map(|v| v.name.clone()).collect())
                .unwrap_or_default()
        };
        assert_eq!(names("main"), Vec::<String>::new());
        assert_eq!(names("worker"), ["count"]);
        assert_eq!(names("helper"), ["scratch", "count"]);
    }

    #[test]
    fn chunk_used_only_inside_a_block_roots_there() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "x", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "leaf"}]},
                {"name": "leaf", "statements": [
                    {"assign": {"target": {"var": "x"}, "value": {"value": "3"}}}
                ]}
            ]
        }"#;
        let (graph, tracer) = trace(source, "main");
        assert_eq!(tracer.root(chunk_of(&graph, "x")), Some("leaf"));
        assert!(tracer.patches().get("leaf").is_none());
    }

    #[test]
    fn two_call_sites_keep_the_chunk_in_the_caller() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "x", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "leaf"}, {"call": "leaf"}]},
                {"name": "leaf", "statements": [
                    {"assign": {"target": {"var": "x"}, "value": {"value": "3"}}}
                ]}
            ]
        }"#;
        let (graph, tracer) = trace(source, "main");
        let chunk = chunk_of(&graph, "x");
        assert_eq!(tracer.paths(chunk).map(<[CallPath]>::len), Some(2));
        assert_eq!(tracer.root(chunk), Some("main"));
        assert_eq!(tracer.patches()["leaf"].len(), 1);
    }

    #[test]
    fn recursion_is_followed_once() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "depth", "type": "int"}]}],
            "blocks": [
                {"name": "main", "statements": [{"call": "walk"}]},
                {"name": "walk", "statements": [
                    {"while": {"condition": {"var": "depth"}, "body": [
                        {"assign": {"target": {"var": "depth"}, "value": {"op": {"op": "-", "operands": [{"var": "depth"}, {"value": "1"}]}}}},
                        {"call": "walk"}
                    ]}}
                ]}
            ]
        }"#;
        let (graph, tracer) = trace(source, "main");
        assert_eq!(tracer.root(chunk_of(&graph, "depth")), Some("walk"));
        assert_eq!(tracer.blocks(), ["main", "walk"]);
    }

    #[test]
    fn unused_chunks_have_no_root() {
        let source = r#"{
            "chunks": [{"variables": [{"name": "idle", "type": "int"}]}],
            "blocks": [{"name": "main", "statements": []}]
        }"#;
        let (graph, tracer) = trace(source, "main");
        assert_eq!(tracer.root(chunk_of(&graph, "idle")), None);
        assert!(tracer.chunks().is_empty());
    }

    #[test]
    fn non_recursive_trace_stays_in_the_root() {
        let graph = compile_document(NESTED, &Builtins::new()).expect("compile");
        let worker = graph.blocks.get("worker").expect("worker").clone();
        let tracer = Tracer::new(&graph.blocks, &worker, false).expect("trace");
        assert_eq!(tracer.blocks(), ["worker"]);
        assert_eq!(tracer.chunks(), [chunk_of(&graph, "scratch")]);
        assert_eq!(tracer.externs().len(), 1);
    }
}
