//! Split-tree refinement for a single function.
//!
//! The tree starts as the function's seed sequence (a block, then a
//! direct call and a block per callee) and grows by repeatedly picking
//! a splittable block, surrounding it with fresh sibling blocks, and
//! turning one of the new blocks into either a container (loop, if,
//! switch, region) or a special node (break, conditional or indirect
//! call). After splitting, every non-loop node receives its def and use
//! variable references.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::callgraph::{CallGraph, CallKind, FuncId};
use crate::config::{Config, Opt};
use crate::errors::GenError;
use crate::semitree::{NodeId, Tree, ROOT};
use crate::varassign::{VarAssign, VarId};

// cn-contprob buckets
const CONT_IF: i32 = 0;
const CONT_FOR: i32 = 1;
const CONT_SWITCH: i32 = 2;
const CONT_REGION: i32 = 3;

// cn-blockprob buckets
const SPECIAL_CCALL: i32 = 0;
const SPECIAL_ICALL: i32 = 1;
const SPECIAL_BREAK: i32 = 2;

// cn-breaktype buckets
const BREAK_BREAK: i32 = 0;
const BREAK_CONTINUE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Break,
    Continue,
    Return,
}

/// Category and payload of a control-graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CnKind {
    Block,
    Call { kind: CallKind, callee: FuncId },
    Loop { start: i32, stop: i32, step: i32 },
    If,
    Switch,
    Region,
    Branching,
    Access { indexes: Vec<VarId> },
    Break { kind: BreakKind },
}

impl CnKind {
    pub fn name(&self) -> &'static str {
        match self {
            CnKind::Block => "BLOCK",
            CnKind::Call { .. } => "CALL",
            CnKind::Loop { .. } => "LOOP",
            CnKind::If => "IF",
            CnKind::Switch => "SWITCH",
            CnKind::Region => "REGION",
            CnKind::Branching => "BRANCHING",
            CnKind::Access { .. } => "ACCBLOCK",
            CnKind::Break { .. } => "BREAKBLOCK",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, CnKind::Block)
    }

    pub fn is_branching_parent(&self) -> bool {
        matches!(self, CnKind::If | CnKind::Switch | CnKind::Region)
    }

    pub fn allow_defs(&self) -> bool {
        matches!(self, CnKind::Block | CnKind::Call { .. })
    }

    // branching parents themselves carry no uses
    pub fn allow_uses(&self) -> bool {
        !self.is_branching_parent()
    }
}

#[derive(Debug, Clone)]
pub struct CnNode {
    pub kind: CnKind,
    pub defs: Vec<VarId>,
    pub uses: Vec<VarId>,
}

impl CnNode {
    fn new(kind: CnKind) -> Self {
        CnNode {
            kind,
            defs: Vec::new(),
            uses: Vec::new(),
        }
    }
}

pub struct SplitTree {
    nfunc: FuncId,
    tree: Tree<CnNode>,
    /// Current splittable blocks, by node id.
    bbs: BTreeSet<NodeId>,
}

impl SplitTree {
    pub fn build(
        config: &Config,
        nfunc: FuncId,
        cg: &CallGraph,
        va: &VarAssign,
    ) -> Result<Self, GenError> {
        let mut st = SplitTree {
            nfunc,
            tree: Tree::new(),
            bbs: BTreeSet::new(),
        };

        // seed sequence: a block, then (direct call, block) per callee
        st.seed_block(ROOT);
        let callees: Vec<FuncId> = cg.callees(nfunc, crate::callgraph::CallMask::DIRECT).collect();
        for callee in callees {
            let call = st.tree.add_leaf(CnNode::new(CnKind::Call {
                kind: CallKind::Direct,
                callee,
            }));
            st.tree.push_child(ROOT, call);
            st.seed_block(ROOT);
        }

        let nsplits = config.get(Opt::MsSplits)?;
        for _ in 0..nsplits {
            if st.bbs.is_empty() {
                break;
            }
            let n = config.rand_positive() as usize % st.bbs.len();
            let bb = *st.bbs.iter().nth(n).expect("non-empty block set");
            st.split(config, bb, cg)?;
        }

        st.assign_variables(config, va)?;
        Ok(st)
    }

    fn seed_block(&mut self, parent: NodeId) -> NodeId {
        let b = self.tree.add_leaf(CnNode::new(CnKind::Block));
        self.tree.push_child(parent, b);
        self.bbs.insert(b);
        b
    }

    // One refinement: insert sibling blocks after the chosen one,
    // re-pick the block under split among the new ones, then turn it
    // into a container or a special node.
    fn split(&mut self, config: &Config, bb: NodeId, cg: &CallGraph) -> Result<(), GenError> {
        let naddblocks = config.get(Opt::CnAddblocks)?;
        let mut target = bb;
        if naddblocks > 0 {
            let mut added = Vec::with_capacity(naddblocks as usize);
            let mut anchor = bb;
            for _ in 0..naddblocks {
                let nb = self.tree.add_leaf(CnNode::new(CnKind::Block));
                self.tree.insert_after(anchor, nb);
                self.bbs.insert(nb);
                added.push(nb);
                anchor = nb;
            }
            target = added[config.rand_positive() as usize % added.len()];
        }

        if config.get(Opt::CnExpandcont)? == 1 {
            self.turn_container(config, target)
        } else {
            self.turn_special(config, target, cg)
        }
    }

    fn turn_container(&mut self, config: &Config, target: NodeId) -> Result<(), GenError> {
        match config.get(Opt::CnContprob)? {
            CONT_FOR => {
                let start = config.get(Opt::CnForStart)?;
                let stop = start + config.get(Opt::CnForSize)?;
                let step = config.get(Opt::CnForStep)?;
                self.set_kind(target, CnKind::Loop { start, stop, step });
                self.tree.make_branch(target);
                self.seed_block(target);
            }
            cont @ (CONT_IF | CONT_SWITCH | CONT_REGION) => {
                let (kind, branches_opt) = match cont {
                    CONT_IF => (CnKind::If, Opt::CnNbranchesIf),
                    CONT_SWITCH => (CnKind::Switch, Opt::CnNbranchesSwitch),
                    _ => (CnKind::Region, Opt::CnNbranchesRgn),
                };
                let nbranches = config.get(branches_opt)?;
                self.set_kind(target, kind);
                self.tree.make_branch(target);
                for _ in 0..nbranches {
                    let br = self.tree.add_branch(CnNode::new(CnKind::Branching));
                    self.tree.push_child(target, br);
                    self.seed_block(br);
                }
            }
            other => {
                return Err(GenError::GraphBuild(format!(
                    "unknown container bucket {other}"
                )))
            }
        }
        Ok(())
    }

    fn turn_special(
        &mut self,
        config: &Config,
        target: NodeId,
        cg: &CallGraph,
    ) -> Result<(), GenError> {
        match config.get(Opt::CnBlockprob)? {
            SPECIAL_BREAK => {
                // break and continue require an enclosing loop
                let kind = if self.has_loop_ancestor(target) {
                    match config.get(Opt::CnBreaktype)? {
                        BREAK_BREAK => BreakKind::Break,
                        BREAK_CONTINUE => BreakKind::Continue,
                        _ => BreakKind::Return,
                    }
                } else {
                    BreakKind::Return
                };
                self.set_kind(target, CnKind::Break { kind });
            }
            special @ (SPECIAL_CCALL | SPECIAL_ICALL) => {
                let ck = if special == SPECIAL_CCALL {
                    CallKind::Conditional
                } else {
                    CallKind::Indirect
                };
                // no candidate callee leaves the block as it was
                if let Some(callee) = cg.random_callee(self.nfunc, ck) {
                    self.set_kind(target, CnKind::Call { kind: ck, callee });
                }
            }
            other => {
                return Err(GenError::GraphBuild(format!(
                    "unknown special bucket {other}"
                )))
            }
        }
        Ok(())
    }

    fn set_kind(&mut self, id: NodeId, kind: CnKind) {
        if kind.is_block() {
            self.bbs.insert(id);
        } else {
            self.bbs.remove(&id);
        }
        self.tree.payload_mut(id).kind = kind;
    }

    fn has_loop_ancestor(&self, id: NodeId) -> bool {
        self.tree
            .ancestors(id)
            .any(|a| matches!(self.tree.payload(a).kind, CnKind::Loop { .. }))
    }

    fn assign_variables(&mut self, config: &Config, va: &VarAssign) -> Result<(), GenError> {
        let visible = &va.func_vars(self.nfunc).visible;
        for id in 1..self.tree.len() {
            let kind = self.tree.payload(id).kind.clone();
            if matches!(kind, CnKind::Loop { .. }) {
                // loops derive everything from their bounds
                continue;
            }
            if kind.allow_defs() {
                self.add_var_refs(config, id, visible, Opt::CnDefs)?;
            }
            if kind.allow_uses() {
                self.add_var_refs(config, id, visible, Opt::CnUses)?;
            }
        }
        Ok(())
    }

    fn add_var_refs(
        &mut self,
        config: &Config,
        id: NodeId,
        visible: &[VarId],
        which: Opt,
    ) -> Result<(), GenError> {
        if visible.is_empty() {
            return Ok(());
        }
        let n = config.get(which)?;
        for _ in 0..n {
            let v = visible[config.rand_positive() as usize % visible.len()];
            let node = self.tree.payload_mut(id);
            if which == Opt::CnDefs {
                node.defs.push(v);
            } else {
                node.uses.push(v);
            }
        }
        Ok(())
    }

    // ── queries ───────────────────────────────────────────────────────

    pub fn nfunc(&self) -> FuncId {
        self.nfunc
    }

    pub fn tree(&self) -> &Tree<CnNode> {
        &self.tree
    }

    /// Node ids of the current splittable blocks.
    pub fn splittable(&self) -> &BTreeSet<NodeId> {
        &self.bbs
    }

    /// Top-level node sequence.
    pub fn toplevel(&self) -> &[NodeId] {
        self.tree.children(ROOT)
    }

    fn format_node(&self, id: NodeId, va: &VarAssign, out: &mut String) {
        let node = self.tree.payload(id);
        out.push_str(node.kind.name());
        match &node.kind {
            CnKind::Call { kind, callee } => {
                match kind {
                    CallKind::Direct => {}
                    CallKind::Conditional => out.push_str(" COND"),
                    CallKind::Indirect => out.push_str(" IND"),
                }
                let _ = write!(out, " TO FUNC #{}", callee.0);
            }
            CnKind::Loop { start, stop, step } => {
                let _ = write!(out, " from {start} to {stop} step {step}");
            }
            CnKind::Break { kind } => {
                let tag = match kind {
                    BreakKind::Break => "[BREAK]",
                    BreakKind::Continue => "[CONTINUE]",
                    BreakKind::Return => "[RETURN]",
                };
                let _ = write!(out, " {tag}");
            }
            CnKind::Access { indexes } => {
                for idx in indexes {
                    let _ = write!(out, " {}", va.get_name(*idx, self.nfunc));
                }
            }
            _ => {}
        }
        if !node.defs.is_empty() {
            out.push_str(" DEFS:");
            for &d in &node.defs {
                let _ = write!(out, "{} ", va.get_name(d, self.nfunc));
            }
        }
        if !node.uses.is_empty() {
            out.push_str(" USES:");
            for &u in &node.uses {
                let _ = write!(out, "{} ", va.get_name(u, self.nfunc));
            }
        }
    }

    /// Indented textual dump of the whole tree.
    pub fn dump(&self, va: &VarAssign, out: &mut String) {
        let mut stack: Vec<(usize, NodeId)> = Vec::new();
        for &top in self.toplevel().iter().rev() {
            stack.push((0, top));
        }
        while let Some((depth, id)) = stack.pop() {
            for _ in 0..depth {
                out.push_str("  ");
            }
            self.format_node(id, va, out);
            out.push('\n');
            for &child in self.tree.children(id).iter().rev() {
                stack.push((depth + 1, child));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{options, OptionValue};
    use crate::typegraph::TypeGraph;
    use crate::varassign::VarAssign;
    use std::sync::Arc;

    fn cfg(seed: u64, overrides: &[(Opt, OptionValue)]) -> Config {
        let mut reg = options::default_registry();
        for (o, v) in overrides {
            reg.insert(*o, v.clone());
        }
        Config::new(seed, true, false, reg).expect("valid test config")
    }

    fn stages(seed: u64) -> (Arc<CallGraph>, Arc<VarAssign>) {
        let tg = Arc::new(TypeGraph::generate(cfg(seed, &[])).unwrap());
        let cg = Arc::new(CallGraph::generate(cfg(seed + 1, &[]), Arc::clone(&tg)).unwrap());
        let va = Arc::new(
            VarAssign::generate(cfg(seed + 2, &[]), Arc::clone(&tg), Arc::clone(&cg)).unwrap(),
        );
        (cg, va)
    }

    fn build(
        seed: u64,
        overrides: &[(Opt, OptionValue)],
        cg: &CallGraph,
        va: &VarAssign,
        f: FuncId,
    ) -> SplitTree {
        let c = cfg(seed, overrides);
        SplitTree::build(&c, f, cg, va).unwrap()
    }

    #[test]
    fn seeds_interleave_blocks_and_direct_calls() {
        let (cg, va) = stages(71);
        let f = cg.main_root();
        let st = build(
            100,
            &[(Opt::MsSplits, OptionValue::Single(0))],
            &cg,
            &va,
            f,
        );
        let tops = st.toplevel();
        let ncallees = cg
            .callees(f, crate::callgraph::CallMask::DIRECT)
            .count();
        assert_eq!(tops.len(), 2 * ncallees + 1);
        for (i, &id) in tops.iter().enumerate() {
            let kind = &st.tree().payload(id).kind;
            if i % 2 == 0 {
                assert!(kind.is_block());
            } else {
                assert!(matches!(
                    kind,
                    CnKind::Call {
                        kind: CallKind::Direct,
                        ..
                    }
                ));
            }
        }
    }

    #[test]
    fn splittable_set_equals_block_nodes() {
        let (cg, va) = stages(73);
        for f in cg.ids().take(4) {
            let st = build(101, &[], &cg, &va, f);
            let blocks: BTreeSet<NodeId> = (1..st.tree().len())
                .filter(|&id| st.tree().payload(id).kind.is_block())
                .collect();
            assert_eq!(&blocks, st.splittable());
        }
    }

    #[test]
    fn branching_nodes_sit_under_branching_parents() {
        let (cg, va) = stages(79);
        for f in cg.ids().take(6) {
            let st = build(103, &[], &cg, &va, f);
            let tree = st.tree();
            for id in 1..tree.len() {
                if matches!(tree.payload(id).kind, CnKind::Branching) {
                    let parent = tree.parent(id).expect("attached");
                    assert!(tree.payload(parent).kind.is_branching_parent());
                }
                if tree.payload(id).kind.is_branching_parent() {
                    for &c in tree.children(id) {
                        assert!(matches!(tree.payload(c).kind, CnKind::Branching));
                    }
                }
            }
        }
    }

    #[test]
    fn loop_breaks_only_under_loops() {
        let (cg, va) = stages(83);
        // every special refinement is a break
        let overrides = [
            (Opt::CnBlockprob, OptionValue::Probf(vec![0, 0, 100])),
            (Opt::MsSplits, OptionValue::Single(30)),
        ];
        for f in cg.ids().take(6) {
            let st = build(107, &overrides, &cg, &va, f);
            let tree = st.tree();
            for id in 1..tree.len() {
                if let CnKind::Break { kind } = &tree.payload(id).kind {
                    let in_loop = tree
                        .ancestors(id)
                        .any(|a| matches!(tree.payload(a).kind, CnKind::Loop { .. }));
                    match kind {
                        BreakKind::Break | BreakKind::Continue => {
                            assert!(in_loop, "loop break outside a loop")
                        }
                        BreakKind::Return => {}
                    }
                }
            }
        }
    }

    #[test]
    fn defs_and_uses_respect_categories() {
        let (cg, va) = stages(89);
        for f in cg.ids().take(6) {
            let st = build(109, &[], &cg, &va, f);
            let tree = st.tree();
            for id in 1..tree.len() {
                let node = tree.payload(id);
                if !node.kind.allow_defs() {
                    assert!(node.defs.is_empty(), "{} carries defs", node.kind.name());
                }
                if !node.kind.allow_uses() {
                    assert!(node.uses.is_empty(), "{} carries uses", node.kind.name());
                }
                if matches!(node.kind, CnKind::Loop { .. }) {
                    assert!(node.defs.is_empty() && node.uses.is_empty());
                }
                for v in node.defs.iter().chain(node.uses.iter()) {
                    assert!(va.func_vars(f).visible.contains(v));
                }
            }
        }
    }

    #[test]
    fn loops_carry_their_bounds() {
        let (cg, va) = stages(97);
        let overrides = [
            (Opt::CnExpandcont, OptionValue::Pflag { prob: 100, total: 100 }),
            (Opt::CnContprob, OptionValue::Probf(vec![0, 100, 100, 100])),
            (Opt::CnForStart, OptionValue::Range { from: 2, to: 2 }),
            (Opt::CnForSize, OptionValue::Range { from: 5, to: 5 }),
            (Opt::CnForStep, OptionValue::Range { from: 1, to: 1 }),
        ];
        for f in cg.ids().take(4) {
            let st = build(113, &overrides, &cg, &va, f);
            let tree = st.tree();
            let mut nloops = 0;
            for id in 1..tree.len() {
                if let CnKind::Loop { start, stop, step } = tree.payload(id).kind {
                    nloops += 1;
                    assert_eq!(start, 2);
                    assert_eq!(stop, 7);
                    assert_eq!(step, 1);
                    assert_eq!(tree.children(id).len(), 1);
                }
            }
            assert!(nloops > 0, "always-loop refinement produced no loop");
        }
    }

    #[test]
    fn dump_indents_children() {
        let (cg, va) = stages(101);
        let f = cg.main_root();
        let st = build(127, &[], &cg, &va, f);
        let mut out = String::new();
        st.dump(&va, &mut out);
        assert!(!out.is_empty());
        for line in out.lines() {
            assert!(!line.trim_start().is_empty());
        }
    }
}
