//! Stage 3: variable assignment.
//!
//! One process-wide variable arena plus per-function groupings:
//!
//! - globals, folded into every function whose metastructure accepts
//!   their type
//! - free index variables and locals drawn per function
//! - one variable per declared argument
//! - auxiliary variables dictated by a variable's type shape: pointees
//!   for pointers, permutators for arrays, access indexes for every
//!   array reached inside the type
//!
//! Variable names encode the role: `g<id>` global, `p<id>` permutator,
//! `i<id>` index, `v<id>` plain.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::callgraph::{CallGraph, FuncId};
use crate::config::{Config, Opt};
use crate::dbgstream;
use crate::errors::GenError;
use crate::typegraph::{TypeGraph, TypeId};

/// Dense process-wide variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub id: VarId,
    pub type_id: TypeId,
}

/// Variable groupings of one function.
#[derive(Default)]
pub struct FuncVars {
    /// Ordered list the control graph draws defs and uses from.
    pub visible: Vec<VarId>,
    pub args: FxHashSet<VarId>,
    pub indexes: FxHashSet<VarId>,
    pub perms: FxHashSet<VarId>,
    /// Pointer variable -> (pointer type id -> pointee variable).
    pub pointees: FxHashMap<VarId, FxHashMap<TypeId, VarId>>,
    /// Variable -> index variables for every array inside its type.
    pub accidxs: FxHashMap<VarId, Vec<VarId>>,
    /// Array variable -> its permutator variables.
    pub permutators: FxHashMap<VarId, Vec<VarId>>,
}

pub struct VarAssign {
    config: Config,
    tg: Arc<TypeGraph>,
    cg: Arc<CallGraph>,
    vars: Vec<Variable>,
    globals: Vec<VarId>,
    global_set: FxHashSet<VarId>,
    funcs: Vec<FuncVars>,
}

impl VarAssign {
    /// The only modifying operation; assignments are immutable afterwards.
    pub fn generate(
        config: Config,
        tg: Arc<TypeGraph>,
        cg: Arc<CallGraph>,
    ) -> Result<Self, GenError> {
        if !config.quiet() {
            dbgstream::debug_line("creating varassign");
        }
        let mut va = VarAssign {
            config,
            tg,
            cg,
            vars: Vec::new(),
            globals: Vec::new(),
            global_set: FxHashSet::default(),
            funcs: Vec::new(),
        };

        let nglobals = va.config.get(Opt::VaNglobals)?;
        for _ in 0..nglobals {
            let t = va.tg.get_random_type().id;
            let g = va.new_var(t);
            va.globals.push(g);
            va.global_set.insert(g);
        }

        let funcs: Vec<FuncId> = va.cg.ids().collect();
        for f in funcs {
            let fv = va.assign_function(f)?;
            va.funcs.push(fv);
        }
        Ok(va)
    }

    fn assign_function(&mut self, f: FuncId) -> Result<FuncVars, GenError> {
        let mut fv = FuncVars::default();

        // free indexes
        let nidx = self.config.get(Opt::VaNidx)?;
        for _ in 0..nidx {
            let t = self.tg.get_random_index_type();
            let v = self.new_var(t);
            fv.indexes.insert(v);
            fv.visible.push(v);
        }

        // globals this function's metastructure accepts
        for &g in &self.globals {
            if self.cg.accept_type(f, self.vars[g.index()].type_id) {
                fv.visible.push(g);
            }
        }

        // locals, bounded by the attempt budget
        let want = self.config.get(Opt::MsNvars)?;
        let attempts = self.config.get(Opt::VaNvatts)?;
        let mut added = 0;
        for _ in 0..attempts {
            if added >= want {
                break;
            }
            let t = self.tg.get_random_type().id;
            if self.cg.accept_type(f, t) {
                let v = self.new_var(t);
                fv.visible.push(v);
                added += 1;
            }
        }

        // argument variables
        let arg_types: Vec<TypeId> = self.cg.vertex_from(f).arg_types.to_vec();
        for at in arg_types {
            let v = self.new_var(at);
            fv.args.insert(v);
            fv.visible.push(v);
        }

        // shape-driven auxiliaries, in creation order
        let maxperm = self.config.get(Opt::VaMaxperm)?;
        let mut nperms = 0;
        for &v in &fv.visible.clone() {
            self.assign_auxiliaries(&mut fv, v, maxperm, &mut nperms)?;
        }

        Ok(fv)
    }

    fn assign_auxiliaries(
        &mut self,
        fv: &mut FuncVars,
        v: VarId,
        maxperm: i32,
        nperms: &mut i32,
    ) -> Result<(), GenError> {
        let tg = Arc::clone(&self.tg);
        let root = self.vars[v.index()].type_id;

        if tg.vertex_from(root).is_pointer() {
            let pt = tg.get_pointee(root).expect("pointers have one out-edge");
            let pv = self.new_var(pt);
            fv.pointees.entry(v).or_default().insert(root, pv);
        }

        if let crate::typegraph::TypeKind::Array { nitems } = tg.vertex_from(root).kind {
            while self.config.get(Opt::VaUseperm)? == 1 {
                if *nperms >= maxperm {
                    break;
                }
                let Some(pt) = tg.get_random_perm_type(nitems) else {
                    break;
                };
                let pv = self.new_var(pt);
                fv.perms.insert(pv);
                fv.permutators.entry(v).or_default().push(pv);
                *nperms += 1;
            }
        }

        // breadth-first over the type shape; pointer cycles end at the
        // visited check
        let mut seen: BTreeSet<TypeId> = BTreeSet::new();
        let mut queue: Vec<TypeId> = vec![root];
        let mut at = 0;
        while at < queue.len() {
            let t = queue[at];
            at += 1;
            if !seen.insert(t) {
                continue;
            }
            if tg.vertex_from(t).is_array() {
                let it = tg.get_random_index_type();
                let iv = self.new_var(it);
                fv.indexes.insert(iv);
                fv.accidxs.entry(v).or_default().push(iv);
            }
            if tg.vertex_from(t).is_pointer() && t != root {
                let pt = tg.get_pointee(t).expect("pointers have one out-edge");
                let pv = self.new_var(pt);
                fv.pointees.entry(v).or_default().insert(t, pv);
            }
            queue.extend(tg.succs(t).iter().copied());
        }
        Ok(())
    }

    fn new_var(&mut self, type_id: TypeId) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Variable { id, type_id });
        id
    }

    // ── queries ───────────────────────────────────────────────────────

    pub fn nvars(&self) -> usize {
        self.vars.len()
    }

    pub fn var(&self, v: VarId) -> &Variable {
        &self.vars[v.index()]
    }

    pub fn globals(&self) -> &[VarId] {
        &self.globals
    }

    pub fn is_global(&self, v: VarId) -> bool {
        self.global_set.contains(&v)
    }

    pub fn func_vars(&self, f: FuncId) -> &FuncVars {
        &self.funcs[f.index()]
    }

    pub fn have_pointee(&self, f: FuncId, v: VarId, t: TypeId) -> bool {
        self.pointee(f, v, t).is_some()
    }

    pub fn pointee(&self, f: FuncId, v: VarId, t: TypeId) -> Option<VarId> {
        self.funcs[f.index()].pointees.get(&v)?.get(&t).copied()
    }

    pub fn have_accs(&self, f: FuncId, v: VarId) -> bool {
        !self.accs(f, v).is_empty()
    }

    pub fn accs(&self, f: FuncId, v: VarId) -> &[VarId] {
        match self.funcs[f.index()].accidxs.get(&v) {
            Some(list) => list,
            None => &[],
        }
    }

    /// Role-prefixed variable name within a function.
    pub fn get_name(&self, v: VarId, f: FuncId) -> String {
        let fv = &self.funcs[f.index()];
        let prefix = if self.is_global(v) {
            "g"
        } else if fv.perms.contains(&v) {
            "p"
        } else if fv.indexes.contains(&v) {
            "i"
        } else {
            "v"
        };
        format!("{prefix}{}", v.0)
    }

    /// Per-function textual dump.
    pub fn dump(&self) -> String {
        let mut out = String::from("globals:\n");
        for &g in &self.globals {
            let t = self.tg.vertex_from(self.vars[g.index()].type_id);
            let _ = writeln!(out, "  {} g{}", t.short_name(), g.0);
        }
        for f in self.cg.ids() {
            let _ = writeln!(out, "function foo{}:", f.0);
            let fv = &self.funcs[f.index()];
            for &v in &fv.visible {
                let t = self.tg.vertex_from(self.vars[v.index()].type_id);
                let _ = writeln!(out, "  {} {}", t.short_name(), self.get_name(v, f));
            }
            for &v in &fv.visible {
                if let Some(ptrs) = fv.pointees.get(&v) {
                    let mut keys: Vec<TypeId> = ptrs.keys().copied().collect();
                    keys.sort();
                    for k in keys {
                        let _ = writeln!(
                            out,
                            "  {} pointee[{}] -> {}",
                            self.get_name(v, f),
                            self.tg.vertex_from(k).short_name(),
                            self.get_name(ptrs[&k], f)
                        );
                    }
                }
                if let Some(accs) = fv.accidxs.get(&v) {
                    let names: Vec<String> =
                        accs.iter().map(|&a| self.get_name(a, f)).collect();
                    let _ = writeln!(out, "  {} accs: {}", self.get_name(v, f), names.join(" "));
                }
                if let Some(perms) = fv.permutators.get(&v) {
                    let names: Vec<String> =
                        perms.iter().map(|&p| self.get_name(p, f)).collect();
                    let _ = writeln!(out, "  {} perms: {}", self.get_name(v, f), names.join(" "));
                }
            }
        }
        out
    }
}
