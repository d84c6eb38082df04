//! Stage 2: the call graph.
//!
//! Construction sequence:
//! 1. random digraph over the drawn vertex count
//! 2. no-source repair (artificial root when nothing has in-degree 0)
//! 3. leaf partition and additional leaf functions
//! 4. weak-component repair: heads are wired under per-component roots,
//!    component roots under the main root
//! 5. self-loops
//! 6. breadth-first Direct marking (the Direct edges form a spanning
//!    tree rooted at the main function)
//! 7. indirect set selection
//! 8. metastructure assignment
//! 9. signature assignment
//!
//! Type acceptance: a function takes a scalar only if its signedness
//! and floatness agree with the metastructure, structs and arrays only
//! under `use_complex`, pointers only under `use_pointers`; arrays are
//! excluded from signatures altogether.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::{Config, Opt};
use crate::dbgstream;
use crate::errors::{ConfigError, GenError};
use crate::typegraph::{TypeGraph, TypeId, TypeKind};

/// Dense identifier of a call-graph function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Direct,
    Conditional,
    Indirect,
}

/// Bit-set over call kinds for filtered edge iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallMask(u8);

impl CallMask {
    pub const DIRECT: CallMask = CallMask(1);
    pub const CONDITIONAL: CallMask = CallMask(2);
    pub const INDIRECT: CallMask = CallMask(4);
    pub const ANY: CallMask = CallMask(7);

    pub fn union(self, other: CallMask) -> CallMask {
        CallMask(self.0 | other.0)
    }

    pub fn accepts(self, kind: CallKind) -> bool {
        let bit = match kind {
            CallKind::Direct => 1,
            CallKind::Conditional => 2,
            CallKind::Indirect => 4,
        };
        self.0 & bit != 0
    }
}

/// The four switches governing which type categories a function accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metastructure {
    pub use_signed: bool,
    pub use_float: bool,
    pub use_complex: bool,
    pub use_pointers: bool,
}

impl Metastructure {
    pub fn random(config: &Config) -> Result<Self, ConfigError> {
        Ok(Metastructure {
            use_signed: config.get(Opt::MsUsesigned)? == 1,
            use_float: config.get(Opt::MsUsefloat)? == 1,
            use_complex: config.get(Opt::MsUsecomplex)? == 1,
            use_pointers: config.get(Opt::MsUsepointers)? == 1,
        })
    }

    pub fn check_type(&self, tg: &TypeGraph, t: TypeId) -> bool {
        match &tg.vertex_from(t).kind {
            TypeKind::Scalar { desc } => {
                let d = &crate::typegraph::SCALAR_CATALOG[*desc];
                (!d.is_float || self.use_float) && (!d.is_signed || self.use_signed)
            }
            TypeKind::Struct { .. } | TypeKind::Array { .. } => self.use_complex,
            TypeKind::Pointer => self.use_pointers,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncNode {
    pub id: FuncId,
    pub component: i32,
    pub indirect: bool,
    /// `None` renders as `void`.
    pub ret_type: Option<TypeId>,
    pub arg_types: SmallVec<[TypeId; 4]>,
    pub meta: Metastructure,
}

struct CallEdge {
    src: FuncId,
    dst: FuncId,
    kind: CallKind,
}

pub struct CallGraph {
    config: Config,
    tg: Arc<TypeGraph>,
    nodes: Vec<FuncNode>,
    edges: Vec<CallEdge>,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
    comps: Vec<Vec<FuncId>>,
    inds: Vec<FuncId>,
}

// cg-edgeset bucket meaning "add the edge"
const EDGE_ADD: i32 = 1;

impl CallGraph {
    /// The only modifying operation; the graph is immutable afterwards.
    pub fn generate(config: Config, tg: Arc<TypeGraph>) -> Result<Self, GenError> {
        if !config.quiet() {
            dbgstream::debug_line("creating callgraph");
        }
        let mut cg = CallGraph {
            config,
            tg,
            nodes: Vec::new(),
            edges: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
            comps: Vec::new(),
            inds: Vec::new(),
        };

        cg.generate_random_graph()?;
        cg.process_leafs()?;
        cg.connect_components()?;
        // self-loops would break the in-degree analysis above
        cg.add_self_loops()?;

        // graph structure is frozen from here on
        cg.mark_direct_edges();
        cg.create_indcalls()?;
        cg.decide_metastructure()?;
        cg.assign_types()?;
        Ok(cg)
    }

    // ── construction ──────────────────────────────────────────────────

    fn generate_random_graph(&mut self) -> Result<(), GenError> {
        let nvertices = self.config.get(Opt::CgVertices)?;
        for _ in 0..nvertices {
            self.add_vertex();
        }

        for u in 0..self.nodes.len() {
            for v in 0..self.nodes.len() {
                if u != v && self.config.get(Opt::CgEdgeset)? == EDGE_ADD {
                    self.add_edge(FuncId(u as u32), FuncId(v as u32), CallKind::Conditional);
                }
            }
        }

        // highly improbable case: no vertex has zero in-degree
        let nheads = (0..self.nodes.len())
            .filter(|&v| self.preds[v].is_empty())
            .count();
        if nheads == 0 {
            let nconns = self.config.get(Opt::CgArtificialConns)?.max(0) as usize;
            let conns = self.sample_vertices(self.nodes.len(), nconns);
            let root = self.add_vertex();
            for c in conns {
                self.add_edge(root, c, CallKind::Conditional);
            }
        }
        Ok(())
    }

    fn process_leafs(&mut self) -> Result<(), GenError> {
        let mut non_leafs: BTreeSet<FuncId> = BTreeSet::new();
        for n in &self.nodes {
            if !self.succs[n.id.index()].is_empty() {
                non_leafs.insert(n.id);
            }
        }
        if non_leafs.is_empty() {
            return Err(GenError::GraphBuild(
                "call graph has no non-leaf vertex".into(),
            ));
        }

        let naddleafs = self.config.get(Opt::CgAddleafs)?;
        for _ in 0..naddleafs {
            let n = self.config.rand_positive() as usize % non_leafs.len();
            let parent = *non_leafs.iter().nth(n).expect("non-empty set");
            let leaf = self.add_vertex();
            self.add_edge(parent, leaf, CallKind::Conditional);
        }
        Ok(())
    }

    fn connect_components(&mut self) -> Result<(), GenError> {
        let n = self.nodes.len();
        let mut dset = UnionFind::new(n);
        for e in &self.edges {
            dset.union(e.src.index(), e.dst.index());
        }

        // component roots in vertex order, heads per component
        let mut roots: Vec<usize> = Vec::new();
        let mut heads_of: Vec<Vec<FuncId>> = Vec::new();
        let mut slot_of = vec![usize::MAX; n];
        for v in 0..n {
            let root = dset.find(v);
            if slot_of[root] == usize::MAX {
                slot_of[root] = roots.len();
                roots.push(root);
                heads_of.push(Vec::new());
            }
            if self.preds[v].is_empty() {
                heads_of[slot_of[root]].push(FuncId(v as u32));
            }
        }

        // a pure-cycle component has no head; its lowest vertex serves
        for (slot, heads) in heads_of.iter_mut().enumerate() {
            if heads.is_empty() {
                let root = roots[slot];
                let lowest = (0..n)
                    .find(|&v| dset.find(v) == root)
                    .expect("component is non-empty");
                heads.push(FuncId(lowest as u32));
            }
        }

        // order components by head count, largest first
        let mut order: Vec<usize> = (0..roots.len()).collect();
        order.sort_by(|&a, &b| {
            heads_of[b]
                .len()
                .cmp(&heads_of[a].len())
                .then(roots[a].cmp(&roots[b]))
        });

        for (ncomp, &slot) in order.iter().enumerate() {
            let heads = &heads_of[slot];
            let vtop = heads[0];
            for &h in &heads[1..] {
                self.add_edge(vtop, h, CallKind::Conditional);
            }
            let mut members = vec![vtop];
            self.nodes[vtop.index()].component = ncomp as i32;
            for v in 0..n {
                let fid = FuncId(v as u32);
                if fid != vtop && dset.find(v) == roots[slot] {
                    members.push(fid);
                    self.nodes[v].component = ncomp as i32;
                }
            }
            self.comps.push(members);
        }

        // the main function is comps[0][0]; wire other component roots
        let main = self.comps[0][0];
        for i in 1..self.comps.len() {
            let comp_root = self.comps[i][0];
            self.add_edge(main, comp_root, CallKind::Conditional);
        }
        Ok(())
    }

    fn add_self_loops(&mut self) -> Result<(), GenError> {
        for v in 0..self.nodes.len() {
            if self.config.get(Opt::CgSelfloop)? == 1 {
                self.add_edge(FuncId(v as u32), FuncId(v as u32), CallKind::Conditional);
            }
        }
        Ok(())
    }

    // Breadth-first search from the main root; tree edges become
    // Direct. Vertices a Conditional path misses (cycle entries) are
    // adopted under the main root so the Direct edges always form a
    // spanning tree reaching everything.
    fn mark_direct_edges(&mut self) {
        let n = self.nodes.len();
        let main = self.comps[0][0];
        let mut reached = vec![false; n];
        let mut queue = std::collections::VecDeque::new();
        reached[main.index()] = true;
        queue.push_back(main);

        loop {
            while let Some(v) = queue.pop_front() {
                for &e in &self.succs[v.index()] {
                    let dst = self.edges[e].dst;
                    if !reached[dst.index()] {
                        reached[dst.index()] = true;
                        self.edges[e].kind = CallKind::Direct;
                        queue.push_back(dst);
                    }
                }
            }
            match (0..n).find(|&v| !reached[v]) {
                None => break,
                Some(v) => {
                    let orphan = FuncId(v as u32);
                    self.add_edge(main, orphan, CallKind::Direct);
                    reached[v] = true;
                    queue.push_back(orphan);
                }
            }
        }
    }

    fn create_indcalls(&mut self) -> Result<(), GenError> {
        let mut want = self.config.get(Opt::CgIndsetcnt)?.max(0) as usize;
        let mut inds: Vec<FuncId> = Vec::new();

        // prefer non-root members of the non-main components
        'outer: for comp in self.comps.iter().skip(1) {
            for &v in &comp[1..] {
                if want == 0 {
                    break 'outer;
                }
                inds.push(v);
                want -= 1;
            }
        }

        if want > 0 {
            let pool: Vec<FuncId> = self.comps[0][1..].to_vec();
            inds.extend(self.sample_from(&pool, want));
        }

        for &v in &inds {
            self.nodes[v.index()].indirect = true;
        }
        self.inds = inds;
        Ok(())
    }

    fn decide_metastructure(&mut self) -> Result<(), GenError> {
        // one shared metastructure for the whole indirect set
        let ind_meta = Metastructure::random(&self.config)?;
        for v in 0..self.nodes.len() {
            let meta = if self.nodes[v].indirect {
                ind_meta
            } else {
                Metastructure::random(&self.config)?
            };
            self.nodes[v].meta = meta;
        }
        Ok(())
    }

    fn assign_types(&mut self) -> Result<(), GenError> {
        let ind_sig = match self.inds.first() {
            Some(&f) => Some(self.gen_signature(self.nodes[f.index()].meta)?),
            None => None,
        };

        for v in 0..self.nodes.len() {
            if self.nodes[v].indirect {
                let (ret, args) = ind_sig.clone().expect("indirect set is non-empty");
                self.nodes[v].ret_type = ret;
                self.nodes[v].arg_types = args;
            } else {
                let (ret, args) = self.gen_signature(self.nodes[v].meta)?;
                self.nodes[v].ret_type = ret;
                self.nodes[v].arg_types = args;
            }
        }
        Ok(())
    }

    fn gen_signature(
        &self,
        meta: Metastructure,
    ) -> Result<(Option<TypeId>, SmallVec<[TypeId; 4]>), GenError> {
        let ret = self.pick_typeid(meta, true)?;
        let nargs = self.config.get(Opt::CgNargs)?.max(0);
        let mut args = SmallVec::new();
        for _ in 0..nargs {
            let arg = self
                .pick_typeid(meta, false)?
                .expect("non-void pick always yields a type or errors");
            args.push(arg);
        }
        Ok((ret, args))
    }

    // Random attempts first, then an ordered scan of the type storage.
    // A void result is only allowed for return types.
    fn pick_typeid(
        &self,
        meta: Metastructure,
        allow_void: bool,
    ) -> Result<Option<TypeId>, GenError> {
        for _ in 0..self.config.get(Opt::CgTypeattempts)? {
            let t = self.tg.get_random_type().id;
            if self.accept_sig_type(meta, t) {
                return Ok(Some(t));
            }
        }
        for t in self.tg.ids() {
            if self.accept_sig_type(meta, t) {
                return Ok(Some(t));
            }
        }
        if allow_void {
            Ok(None)
        } else {
            Err(GenError::GraphBuild(
                "no type in the storage conforms to the metastructure".into(),
            ))
        }
    }

    fn accept_sig_type(&self, meta: Metastructure, t: TypeId) -> bool {
        !self.tg.vertex_from(t).is_array() && meta.check_type(&self.tg, t)
    }

    fn add_vertex(&mut self) -> FuncId {
        let id = FuncId(self.nodes.len() as u32);
        self.nodes.push(FuncNode {
            id,
            component: -1,
            indirect: false,
            ret_type: None,
            arg_types: SmallVec::new(),
            meta: Metastructure::default(),
        });
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        id
    }

    fn add_edge(&mut self, src: FuncId, dst: FuncId, kind: CallKind) -> usize {
        let e = self.edges.len();
        self.edges.push(CallEdge { src, dst, kind });
        self.succs[src.index()].push(e);
        self.preds[dst.index()].push(e);
        e
    }

    // Distinct uniform sample of k vertex ids out of 0..n.
    fn sample_vertices(&self, n: usize, k: usize) -> Vec<FuncId> {
        let pool: Vec<FuncId> = (0..n).map(|v| FuncId(v as u32)).collect();
        self.sample_from(&pool, k)
    }

    fn sample_from(&self, pool: &[FuncId], k: usize) -> Vec<FuncId> {
        let mut pool = pool.to_vec();
        let k = k.min(pool.len());
        for i in 0..k {
            let j = i + self.config.rand_positive() as usize % (pool.len() - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }

    // ── queries ───────────────────────────────────────────────────────

    pub fn nfuncs(&self) -> usize {
        self.nodes.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn vertex_from(&self, f: FuncId) -> &FuncNode {
        &self.nodes[f.index()]
    }

    /// Callees of `f` whose edge kind is accepted by `mask`, in edge
    /// insertion order.
    pub fn callees(&self, f: FuncId, mask: CallMask) -> impl Iterator<Item = FuncId> + '_ {
        self.succs[f.index()]
            .iter()
            .map(|&e| &self.edges[e])
            .filter(move |e| mask.accepts(e.kind))
            .map(|e| e.dst)
    }

    /// Callers of `f` whose edge kind is accepted by `mask`.
    pub fn callers(&self, f: FuncId, mask: CallMask) -> impl Iterator<Item = FuncId> + '_ {
        self.preds[f.index()]
            .iter()
            .map(|&e| &self.edges[e])
            .filter(move |e| mask.accepts(e.kind))
            .map(|e| e.src)
    }

    /// Whether `f`'s metastructure accepts the given type.
    pub fn accept_type(&self, f: FuncId, t: TypeId) -> bool {
        self.nodes[f.index()].meta.check_type(&self.tg, t)
    }

    /// Uniform random callee for a generated call site. Conditional
    /// sites draw over Conditional-edge callees; indirect sites draw
    /// over the Conditional-edge callees that belong to the indirect
    /// set. `None` when no candidate exists.
    pub fn random_callee(&self, f: FuncId, kind: CallKind) -> Option<FuncId> {
        let cands: Vec<FuncId> = match kind {
            CallKind::Direct => self.callees(f, CallMask::DIRECT).collect(),
            CallKind::Conditional => self.callees(f, CallMask::CONDITIONAL).collect(),
            CallKind::Indirect => self
                .callees(f, CallMask::CONDITIONAL)
                .filter(|c| self.nodes[c.index()].indirect)
                .collect(),
        };
        if cands.is_empty() {
            return None;
        }
        Some(cands[self.config.rand_positive() as usize % cands.len()])
    }

    /// The entry of component 0: the only function nothing calls.
    pub fn main_root(&self) -> FuncId {
        self.comps[0][0]
    }

    pub fn components(&self) -> &[Vec<FuncId>] {
        &self.comps
    }

    pub fn indirect_set(&self) -> &[FuncId] {
        &self.inds
    }

    pub fn type_graph(&self) -> &TypeGraph {
        &self.tg
    }

    fn func_label(&self, f: FuncId) -> String {
        let node = &self.nodes[f.index()];
        let ret = match node.ret_type {
            Some(t) => self.tg.vertex_from(t).short_name(),
            None => "void".to_string(),
        };
        let args: Vec<String> = node
            .arg_types
            .iter()
            .map(|&t| self.tg.vertex_from(t).short_name())
            .collect();
        format!("{ret} foo{}({})", f.0, args.join(", "))
    }

    /// DOT rendering; vertex labels, the blue indirect marker, and the
    /// red Direct edges are the load-bearing parts.
    pub fn dump_dot(&self) -> String {
        let mut out = String::from("digraph calls {\n");
        for node in &self.nodes {
            let color = if node.indirect { "blue" } else { "black" };
            let _ = writeln!(
                out,
                "  f{} [label=\"{}\", color={color}];",
                node.id.0,
                self.func_label(node.id)
            );
        }
        for e in &self.edges {
            let color = if e.kind == CallKind::Direct {
                "red"
            } else {
                "black"
            };
            let _ = writeln!(
                out,
                "  f{} -> f{} [style=solid, color={color}];",
                e.src.0, e.dst.0
            );
        }
        out.push_str("}\n");
        out
    }
}

// Union-find over dense vertex ids, path halving plus union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut v: usize) -> usize {
        while self.parent[v] != v {
            self.parent[v] = self.parent[self.parent[v]];
            v = self.parent[v];
        }
        v
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
