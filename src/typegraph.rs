//! Stage 1: the type graph.
//!
//! Construction sequence:
//! 1. fix the scalar catalog
//! 2. seed isolated scalar and pointer vertices
//! 3. split leaves into arrays and structs under nesting constraints
//! 4. unify duplicate subscalars (tree becomes a DAG)
//! 5. retarget pointers (may close cycles)
//! 6. assign struct bitfields
//! 7. collect index and permutation support sets
//!
//! After construction the graph is read-only; queries may still draw
//! randomness from the stage's own config.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::{Config, Opt};
use crate::dbgstream;
use crate::errors::{ConfigError, GenError};

/// Dense identifier of a type-graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static description of one scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarDesc {
    pub name: &'static str,
    pub bits: u32,
    pub is_float: bool,
    pub is_signed: bool,
}

const fn scalar(name: &'static str, bits: u32, is_float: bool, is_signed: bool) -> ScalarDesc {
    ScalarDesc {
        name,
        bits,
        is_float,
        is_signed,
    }
}

/// The canonical ordered scalar catalog. Its length equals the arity of
/// the `tg-typeprob` distribution.
pub const SCALAR_CATALOG: &[ScalarDesc] = &[
    scalar("unsigned char", 8, false, false),
    scalar("signed char", 8, false, true),
    scalar("unsigned short", 16, false, false),
    scalar("short", 16, false, true),
    scalar("unsigned", 32, false, false),
    scalar("int", 32, false, true),
    scalar("unsigned long long", 64, false, false),
    scalar("long long", 64, false, true),
    scalar("float", 32, true, false),
    scalar("double", 64, true, false),
];

/// Catalog entry used when an index type must be synthesized.
const INDEX_SCALAR: &str = "int";

// tg-scaltype buckets
const SEED_POINTER: i32 = 1;
// tg-conttype buckets
const CONT_ARRAY: i32 = 0;
const CONT_STRUCT: i32 = 1;

const MAX_SPLIT_ATTEMPTS: i32 = 10;

/// Category-specific payload of a vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Index into [`SCALAR_CATALOG`].
    Scalar { desc: usize },
    /// Field types are the ordered out-edges; `bitfields` pairs scalar
    /// children with their bit widths, in field order.
    Struct { bitfields: Vec<(TypeId, i32)> },
    /// The single out-edge is the element type.
    Array { nitems: i32 },
    /// The single out-edge is the pointee, possibly closing a cycle.
    Pointer,
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub id: TypeId,
    pub kind: TypeKind,
}

impl TypeNode {
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer)
    }

    pub fn scalar_desc(&self) -> Option<&'static ScalarDesc> {
        match self.kind {
            TypeKind::Scalar { desc } => Some(&SCALAR_CATALOG[desc]),
            _ => None,
        }
    }

    /// Short name used in call-graph labels and variable dumps.
    pub fn short_name(&self) -> String {
        match &self.kind {
            TypeKind::Scalar { desc } => SCALAR_CATALOG[*desc].name.to_string(),
            TypeKind::Struct { .. } => format!("S{}", self.id.0),
            TypeKind::Array { nitems } => format!("A{}[{}]", self.id.0, nitems),
            TypeKind::Pointer => format!("P{}", self.id.0),
        }
    }

    /// Label used in the DOT dump.
    pub fn label(&self) -> String {
        match &self.kind {
            TypeKind::Scalar { desc } => format!("T{} = {}", self.id.0, SCALAR_CATALOG[*desc].name),
            _ => self.short_name(),
        }
    }
}

type EdgeList = SmallVec<[TypeId; 4]>;

pub struct TypeGraph {
    config: Config,
    nodes: Vec<TypeNode>,
    succs: Vec<EdgeList>,
    preds: Vec<EdgeList>,
    struct_vs: BTreeSet<TypeId>,
    array_vs: BTreeSet<TypeId>,
    pointer_vs: BTreeSet<TypeId>,
    /// Scalar vertices available for splitting.
    leaf_vs: BTreeSet<TypeId>,
    /// Non-float scalar vertices, usable as index types.
    idx_vs: Vec<TypeId>,
    /// `perm_vs[k-1]` holds arrays of length `k` over integral scalars.
    perm_vs: Vec<Vec<TypeId>>,
}

impl TypeGraph {
    /// The only modifying operation; the graph is immutable afterwards.
    pub fn generate(config: Config) -> Result<Self, GenError> {
        if !config.quiet() {
            dbgstream::debug_line("creating typegraph");
        }
        let mut tg = TypeGraph {
            config,
            nodes: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
            struct_vs: BTreeSet::new(),
            array_vs: BTreeSet::new(),
            pointer_vs: BTreeSet::new(),
            leaf_vs: BTreeSet::new(),
            idx_vs: Vec::new(),
            perm_vs: Vec::new(),
        };

        tg.seed_vertices()?;
        tg.do_splits()?;
        tg.unify_subscalars();
        tg.retarget_pointers()?;
        tg.assign_bitfields()?;
        tg.build_index_support()?;
        Ok(tg)
    }

    // ── construction ──────────────────────────────────────────────────

    fn seed_vertices(&mut self) -> Result<(), GenError> {
        let nseeds = self.config.get(Opt::TgSeeds)?;
        for _ in 0..nseeds {
            if self.config.get(Opt::TgScaltype)? == SEED_POINTER {
                let v = self.add_node(TypeKind::Pointer);
                self.pointer_vs.insert(v);
            } else {
                self.create_scalar()?;
            }
        }
        Ok(())
    }

    fn do_splits(&mut self) -> Result<(), GenError> {
        let nsplits = self.config.get(Opt::TgSplits)?;
        for _ in 0..nsplits {
            let mut done = false;
            let mut watchdog = 0;
            while !done {
                watchdog += 1;
                if watchdog > MAX_SPLIT_ATTEMPTS {
                    dbgstream::warn("typegraph", "too many split attempts in vain");
                    break;
                }
                done = self.try_split()?;
            }
        }
        Ok(())
    }

    // One split attempt: pick a leaf, draw a container, check nesting
    // constraints, convert in place. Returns false when the attempt is
    // aborted by the constraints.
    fn try_split(&mut self) -> Result<bool, GenError> {
        let Some(v) = self.pick_from(&self.leaf_vs) else {
            return Ok(false);
        };
        let cont = self.config.get(Opt::TgConttype)?;

        let (narr, nstr) = self.count_container_ancestors(v);
        if narr >= self.config.get(Opt::TgMaxarrpreds)?
            || nstr >= self.config.get(Opt::TgMaxstructpreds)?
            || narr + nstr >= self.config.get(Opt::TgMaxpreds)?
        {
            return Ok(false);
        }

        match cont {
            CONT_ARRAY => {
                let nitems = self.config.get(Opt::TgArrsize)?;
                self.nodes[v.index()].kind = TypeKind::Array { nitems };
                self.create_scalar_at(v)?;
                self.leaf_vs.remove(&v);
                self.array_vs.insert(v);
            }
            CONT_STRUCT => {
                let nfields = self.config.get(Opt::TgNfields)?;
                self.nodes[v.index()].kind = TypeKind::Struct {
                    bitfields: Vec::new(),
                };
                for _ in 0..nfields {
                    self.create_scalar_at(v)?;
                }
                self.leaf_vs.remove(&v);
                self.struct_vs.insert(v);
            }
            other => {
                return Err(GenError::GraphBuild(format!(
                    "unknown container bucket {other}"
                )))
            }
        }

        if self.config.get(Opt::TgMorescalars)? == 1 {
            self.create_scalar()?;
        }
        Ok(true)
    }

    // At split time the graph is a forest, so walking first
    // predecessors reaches the root.
    fn count_container_ancestors(&self, v: TypeId) -> (i32, i32) {
        let mut narr = 0;
        let mut nstr = 0;
        let mut cur = v;
        while let Some(&p) = self.preds[cur.index()].first() {
            match self.nodes[p.index()].kind {
                TypeKind::Array { .. } => narr += 1,
                TypeKind::Struct { .. } => nstr += 1,
                _ => {}
            }
            cur = p;
        }
        (narr, nstr)
    }

    // For each container family, collect scalar children per catalog
    // column and redirect duplicate edges to one representative. The
    // orphaned copies stay in the graph as parentless leaves.
    fn unify_subscalars(&mut self) {
        let structs: Vec<TypeId> = self.struct_vs.iter().copied().collect();
        self.unify_family(&structs);
        let arrays: Vec<TypeId> = self.array_vs.iter().copied().collect();
        self.unify_family(&arrays);
    }

    fn unify_family(&mut self, parents: &[TypeId]) {
        let mut repr: FxHashMap<usize, TypeId> = FxHashMap::default();
        for &p in parents {
            // two-phase: record redirects first, then patch the edges
            let mut redirects: Vec<(usize, TypeId, TypeId)> = Vec::new();
            for (slot, &child) in self.succs[p.index()].iter().enumerate() {
                let TypeKind::Scalar { desc } = self.nodes[child.index()].kind else {
                    continue;
                };
                match repr.get(&desc) {
                    Some(&keep) if keep != child => redirects.push((slot, child, keep)),
                    Some(_) => {}
                    None => {
                        repr.insert(desc, child);
                    }
                }
            }
            for (slot, from, to) in redirects {
                self.succs[p.index()][slot] = to;
                let back = &mut self.preds[from.index()];
                if let Some(at) = back.iter().position(|&q| q == p) {
                    back.remove(at);
                }
                self.preds[to.index()].push(p);
            }
        }
    }

    fn retarget_pointers(&mut self) -> Result<(), GenError> {
        let pointers: Vec<TypeId> = self.pointer_vs.iter().copied().collect();
        for v in pointers {
            let mut cands = self.pointer_candidates(v);
            if cands.is_empty() {
                cands = self
                    .leaf_vs
                    .iter()
                    .chain(self.struct_vs.iter())
                    .copied()
                    .collect();
            }
            if cands.is_empty() {
                return Err(GenError::GraphBuild(format!(
                    "pointer P{} has no candidate targets",
                    v.0
                )));
            }
            let pick = cands[self.config.rand_positive() as usize % cands.len()];
            self.add_edge(v, pick);
        }
        Ok(())
    }

    // Walk both edge directions from the pointer, collecting reachable
    // vertices that are neither arrays nor pointers.
    fn pointer_candidates(&self, v: TypeId) -> Vec<TypeId> {
        let mut seen: BTreeSet<TypeId> = BTreeSet::new();
        let mut out = Vec::new();
        let mut queue: Vec<TypeId> = Vec::new();
        seen.insert(v);
        queue.extend(self.preds[v.index()].iter().copied());
        queue.extend(self.succs[v.index()].iter().copied());
        let mut at = 0;
        while at < queue.len() {
            let n = queue[at];
            at += 1;
            if !seen.insert(n) {
                continue;
            }
            let node = &self.nodes[n.index()];
            if node.is_array() || node.is_pointer() {
                continue;
            }
            out.push(n);
            queue.extend(self.preds[n.index()].iter().copied());
            queue.extend(self.succs[n.index()].iter().copied());
        }
        out
    }

    fn assign_bitfields(&mut self) -> Result<(), GenError> {
        let structs: Vec<TypeId> = self.struct_vs.iter().copied().collect();
        for s in structs {
            let fields: Vec<TypeId> = self.succs[s.index()].iter().copied().collect();
            let mut bitfields = Vec::new();
            for child in fields {
                if !self.nodes[child.index()].is_scalar() {
                    continue;
                }
                if self.config.get(Opt::TgBfprob)? == 1 {
                    bitfields.push((child, self.config.get(Opt::TgBfsize)?));
                }
            }
            match &mut self.nodes[s.index()].kind {
                TypeKind::Struct { bitfields: bf } => *bf = bitfields,
                _ => unreachable!("struct_vs holds structs only"),
            }
        }
        Ok(())
    }

    fn build_index_support(&mut self) -> Result<(), GenError> {
        self.idx_vs = self
            .nodes
            .iter()
            .filter(|n| n.scalar_desc().is_some_and(|d| !d.is_float))
            .map(|n| n.id)
            .collect();
        if self.idx_vs.is_empty() {
            let desc = SCALAR_CATALOG
                .iter()
                .position(|d| d.name == INDEX_SCALAR)
                .ok_or(ConfigError::NoIndexScalar)?;
            let v = self.add_node(TypeKind::Scalar { desc });
            self.leaf_vs.insert(v);
            self.idx_vs.push(v);
        }

        let (amin, amax) = self.config.minmax(Opt::TgArrsize)?;
        self.perm_vs = vec![Vec::new(); amax.max(1) as usize];
        let arrays: Vec<TypeId> = self.array_vs.iter().copied().collect();
        for a in &arrays {
            let TypeKind::Array { nitems } = self.nodes[a.index()].kind else {
                continue;
            };
            if nitems < 1 || nitems > amax {
                continue;
            }
            let elem = self.succs[a.index()][0];
            if self.nodes[elem.index()]
                .scalar_desc()
                .is_some_and(|d| !d.is_float)
            {
                self.perm_vs[(nitems - 1) as usize].push(*a);
            }
        }

        // a graph without arrays has no permutator demand
        if !arrays.is_empty() {
            let idx0 = self.idx_vs[0];
            for k in amin..amax {
                if !self.perm_vs[(k - 1) as usize].is_empty() {
                    continue;
                }
                let v = self.add_node(TypeKind::Array { nitems: k });
                self.add_edge(v, idx0);
                self.array_vs.insert(v);
                self.perm_vs[(k - 1) as usize].push(v);
            }
        }
        Ok(())
    }

    fn add_node(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode { id, kind });
        self.succs.push(SmallVec::new());
        self.preds.push(SmallVec::new());
        id
    }

    fn add_edge(&mut self, from: TypeId, to: TypeId) {
        self.succs[from.index()].push(to);
        self.preds[to.index()].push(from);
    }

    fn create_scalar(&mut self) -> Result<TypeId, GenError> {
        let desc = self.config.get(Opt::TgTypeprob)? as usize;
        let v = self.add_node(TypeKind::Scalar { desc });
        self.leaf_vs.insert(v);
        Ok(v)
    }

    fn create_scalar_at(&mut self, parent: TypeId) -> Result<TypeId, GenError> {
        let v = self.create_scalar()?;
        self.add_edge(parent, v);
        Ok(v)
    }

    fn pick_from(&self, set: &BTreeSet<TypeId>) -> Option<TypeId> {
        if set.is_empty() {
            return None;
        }
        let n = self.config.rand_positive() as usize % set.len();
        set.iter().nth(n).copied()
    }

    // ── queries ───────────────────────────────────────────────────────

    pub fn ntypes(&self) -> usize {
        self.nodes.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn vertex_from(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.index()]
    }

    /// Ordered typed children of a vertex.
    pub fn children(&self, v: TypeId) -> impl Iterator<Item = (TypeId, &TypeKind)> + '_ {
        self.succs[v.index()]
            .iter()
            .map(|&c| (c, &self.nodes[c.index()].kind))
    }

    pub fn succs(&self, v: TypeId) -> &[TypeId] {
        &self.succs[v.index()]
    }

    pub fn out_degree(&self, v: TypeId) -> usize {
        self.succs[v.index()].len()
    }

    pub fn in_degree(&self, v: TypeId) -> usize {
        self.preds[v.index()].len()
    }

    /// The unique out-neighbour of a pointer or array vertex.
    pub fn get_pointee(&self, v: TypeId) -> Option<TypeId> {
        self.succs[v.index()].first().copied()
    }

    /// Uniform draw over all vertices.
    pub fn get_random_type(&self) -> &TypeNode {
        let n = self.config.rand_positive() as usize % self.nodes.len();
        &self.nodes[n]
    }

    /// Uniform draw over index-capable scalars.
    pub fn get_random_index_type(&self) -> TypeId {
        self.idx_vs[self.config.rand_positive() as usize % self.idx_vs.len()]
    }

    /// Uniform draw over permutation arrays of length `k`.
    pub fn get_random_perm_type(&self, k: i32) -> Option<TypeId> {
        let pool = self.perm_vs.get((k - 1) as usize)?;
        if pool.is_empty() {
            return None;
        }
        Some(pool[self.config.rand_positive() as usize % pool.len()])
    }

    pub fn struct_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.struct_vs.iter().copied()
    }

    pub fn array_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.array_vs.iter().copied()
    }

    pub fn pointer_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.pointer_vs.iter().copied()
    }

    /// DOT rendering; only the node labels are load-bearing.
    pub fn dump_dot(&self) -> String {
        let mut out = String::from("digraph types {\n");
        for node in &self.nodes {
            let _ = writeln!(out, "  t{} [label=\"{}\"];", node.id.0, node.label());
        }
        for node in &self.nodes {
            for &child in &self.succs[node.id.index()] {
                let _ = writeln!(out, "  t{} -> t{};", node.id.0, child.0);
            }
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{options, OptionValue};

    fn cfg(seed: u64, overrides: &[(Opt, OptionValue)]) -> Config {
        let mut reg = options::default_registry();
        for (o, v) in overrides {
            reg.insert(*o, v.clone());
        }
        Config::new(seed, true, false, reg).expect("valid test config")
    }

    fn always_scalar() -> (Opt, OptionValue) {
        (Opt::TgScaltype, OptionValue::Probf(vec![100, 100]))
    }

    // integral scalars only, so an index type always exists
    fn integral_typeprob() -> (Opt, OptionValue) {
        (
            Opt::TgTypeprob,
            OptionValue::Probf(vec![13, 25, 38, 50, 63, 75, 88, 100, 100, 100]),
        )
    }

    #[test]
    fn seeds_without_splits_stay_scalar() {
        let c = cfg(
            1,
            &[
                (Opt::TgSeeds, OptionValue::Single(3)),
                (Opt::TgSplits, OptionValue::Single(0)),
                always_scalar(),
                integral_typeprob(),
            ],
        );
        let tg = TypeGraph::generate(c).unwrap();
        assert_eq!(tg.ntypes(), 3);
        assert!(tg.ids().all(|v| tg.vertex_from(v).is_scalar()));
    }

    #[test]
    fn single_struct_split() {
        let c = cfg(
            1,
            &[
                (Opt::TgSeeds, OptionValue::Single(1)),
                (Opt::TgSplits, OptionValue::Single(1)),
                always_scalar(),
                integral_typeprob(),
                (Opt::TgConttype, OptionValue::Probf(vec![0, 1])),
                (Opt::TgNfields, OptionValue::Range { from: 2, to: 2 }),
                (Opt::TgMorescalars, OptionValue::Pflag { prob: 0, total: 100 }),
                (Opt::TgBfprob, OptionValue::Pflag { prob: 0, total: 100 }),
            ],
        );
        let tg = TypeGraph::generate(c).unwrap();
        let structs: Vec<TypeId> = tg.struct_ids().collect();
        assert_eq!(structs.len(), 1);
        let s = structs[0];
        assert_eq!(tg.out_degree(s), 2);
        for (child, kind) in tg.children(s) {
            assert!(matches!(kind, TypeKind::Scalar { .. }), "{child:?}");
        }
        match &tg.vertex_from(s).kind {
            TypeKind::Struct { bitfields } => assert!(bitfields.is_empty()),
            other => panic!("expected struct, got {other:?}"),
        }
        // struct plus two children (one possibly an orphaned duplicate)
        assert_eq!(tg.ntypes(), 3);
    }

    #[test]
    fn well_formedness_on_defaults() {
        let tg = TypeGraph::generate(cfg(11, &[])).unwrap();
        for v in tg.ids() {
            match &tg.vertex_from(v).kind {
                TypeKind::Scalar { .. } => assert_eq!(tg.out_degree(v), 0),
                TypeKind::Array { .. } => assert_eq!(tg.out_degree(v), 1),
                TypeKind::Pointer => assert_eq!(tg.out_degree(v), 1),
                TypeKind::Struct { bitfields } => {
                    assert!(tg.out_degree(v) >= 1);
                    for (child, width) in bitfields {
                        assert!(tg.vertex_from(*child).is_scalar());
                        assert!(tg.succs(v).contains(child));
                        assert!(*width >= 1);
                    }
                }
            }
        }
    }

    #[test]
    fn unification_shares_duplicate_scalars() {
        // a single-entry scalar distribution forces duplicates in every
        // multi-field struct
        let c = cfg(
            5,
            &[
                (Opt::TgSeeds, OptionValue::Single(4)),
                (Opt::TgSplits, OptionValue::Single(4)),
                always_scalar(),
                (
                    Opt::TgTypeprob,
                    OptionValue::Probf(vec![100; SCALAR_CATALOG.len()]),
                ),
                (Opt::TgConttype, OptionValue::Probf(vec![0, 1])),
                (Opt::TgNfields, OptionValue::Range { from: 4, to: 4 }),
            ],
        );
        let tg = TypeGraph::generate(c).unwrap();
        let shared = tg
            .ids()
            .any(|v| tg.vertex_from(v).is_scalar() && tg.in_degree(v) >= 2);
        assert!(shared, "expected at least one shared subscalar");
    }

    #[test]
    fn pointers_get_exactly_one_target() {
        let c = cfg(
            9,
            &[
                (Opt::TgSeeds, OptionValue::Single(24)),
                (Opt::TgScaltype, OptionValue::Probf(vec![50, 100])),
            ],
        );
        let tg = TypeGraph::generate(c).unwrap();
        for p in tg.pointer_ids() {
            assert_eq!(tg.out_degree(p), 1);
        }
    }

    #[test]
    fn perm_support_covers_array_range_when_arrays_exist() {
        let c = cfg(
            13,
            &[
                (Opt::TgConttype, OptionValue::Probf(vec![100, 100])),
                always_scalar(),
            ],
        );
        let tg = TypeGraph::generate(c).unwrap();
        if tg.array_ids().next().is_some() {
            let (amin, amax) = (2, 10);
            for k in amin..amax {
                assert!(
                    tg.get_random_perm_type(k).is_some(),
                    "no permutation type of length {k}"
                );
            }
        }
    }

    #[test]
    fn index_type_is_integral() {
        let tg = TypeGraph::generate(cfg(17, &[])).unwrap();
        for _ in 0..20 {
            let idx = tg.get_random_index_type();
            let desc = tg.vertex_from(idx).scalar_desc().expect("index is scalar");
            assert!(!desc.is_float);
        }
    }

    #[test]
    fn dump_labels_parse() {
        let tg = TypeGraph::generate(cfg(21, &[])).unwrap();
        let dot = tg.dump_dot();
        assert!(dot.starts_with("digraph types {"));
        for v in tg.ids() {
            assert!(dot.contains(&tg.vertex_from(v).label()));
        }
    }
}
