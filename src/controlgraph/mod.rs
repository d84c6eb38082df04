//! Stage 4: per-function control graphs.
//!
//! One split tree per call-graph function, all derived from a single
//! seeded config so a control-graph randomization is reproducible as a
//! unit.

pub mod splittree;

use std::fmt::Write as _;
use std::sync::Arc;

use crate::callgraph::{CallGraph, FuncId};
use crate::config::Config;
use crate::dbgstream;
use crate::errors::GenError;
use crate::varassign::VarAssign;

pub use splittree::{BreakKind, CnKind, CnNode, SplitTree};

pub struct ControlGraph {
    cg: Arc<CallGraph>,
    va: Arc<VarAssign>,
    trees: Vec<SplitTree>,
}

impl ControlGraph {
    /// The only modifying operation; the trees are immutable afterwards.
    pub fn generate(
        config: Config,
        cg: Arc<CallGraph>,
        va: Arc<VarAssign>,
    ) -> Result<Self, GenError> {
        if !config.quiet() {
            dbgstream::debug_line("creating controlgraph");
        }
        let mut trees = Vec::with_capacity(cg.nfuncs());
        let funcs: Vec<FuncId> = cg.ids().collect();
        for f in funcs {
            trees.push(SplitTree::build(&config, f, &cg, &va)?);
        }
        Ok(ControlGraph { cg, va, trees })
    }

    pub fn nfuncs(&self) -> usize {
        self.trees.len()
    }

    pub fn tree(&self, f: FuncId) -> &SplitTree {
        &self.trees[f.index()]
    }

    pub fn trees(&self) -> impl Iterator<Item = &SplitTree> {
        self.trees.iter()
    }

    /// Indented textual dump of every function's split tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Controlgraph consists of {} functions", self.nfuncs());
        for (n, tree) in self.trees.iter().enumerate() {
            let _ = writeln!(out, "<FOO{n}>:");
            tree.dump(&self.va, &mut out);
            out.push_str("---\n\n");
        }
        out
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.cg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{options, Opt, OptionValue};
    use crate::typegraph::TypeGraph;

    fn cfg(seed: u64, overrides: &[(Opt, OptionValue)]) -> Config {
        let mut reg = options::default_registry();
        for (o, v) in overrides {
            reg.insert(*o, v.clone());
        }
        Config::new(seed, true, false, reg).expect("valid test config")
    }

    fn pipeline(seed: u64) -> ControlGraph {
        let tg = Arc::new(TypeGraph::generate(cfg(seed, &[])).unwrap());
        let cg = Arc::new(CallGraph::generate(cfg(seed + 1, &[]), Arc::clone(&tg)).unwrap());
        let va = Arc::new(
            VarAssign::generate(cfg(seed + 2, &[]), Arc::clone(&tg), Arc::clone(&cg)).unwrap(),
        );
        ControlGraph::generate(cfg(seed + 3, &[]), Arc::clone(&cg), va).unwrap()
    }

    #[test]
    fn one_tree_per_function() {
        let cn = pipeline(131);
        assert_eq!(cn.nfuncs(), cn.call_graph().nfuncs());
    }

    #[test]
    fn dump_covers_every_function() {
        let cn = pipeline(137);
        let dump = cn.dump();
        assert!(dump.starts_with("Controlgraph consists of"));
        for n in 0..cn.nfuncs() {
            assert!(dump.contains(&format!("<FOO{n}>:")));
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = pipeline(139).dump();
        let b = pipeline(139).dump();
        assert_eq!(a, b);
    }
}
