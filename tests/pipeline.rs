//! End-to-end pipeline scenarios: fixed-seed stage outcomes and byte
//! determinism across runs and consumer counts.

use std::sync::Arc;
use std::thread;

use coelacanth::callgraph::{CallGraph, CallMask};
use coelacanth::config::{options, Config, Opt, OptionValue};
use coelacanth::controlgraph::{BreakKind, CnKind, ControlGraph};
use coelacanth::tasks::{consumer_loop, submit, TaskQueue};
use coelacanth::typegraph::{TypeGraph, TypeKind};
use coelacanth::varassign::VarAssign;

fn config_with(seed: u64, overrides: &[(Opt, OptionValue)]) -> Config {
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

// Three seeds and no splits leave three scalar vertices.
#[test]
fn scenario_minimal_typegraph() {
    let cfg = config_with(
        1,
        &[
            (Opt::TgSeeds, OptionValue::Single(3)),
            (Opt::TgSplits, OptionValue::Single(0)),
            always_scalar(),
            integral_typeprob(),
        ],
    );
    let tg = TypeGraph::generate(cfg).unwrap();
    assert_eq!(tg.ntypes(), 3);
    for v in tg.ids() {
        assert!(tg.vertex_from(v).is_scalar());
    }
}

// A single always-struct split over one seed yields one struct with two
// scalar children and, with the bitfield chance at zero, no bitfields.
#[test]
fn scenario_single_struct_split() {
    let cfg = config_with(
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
    let tg = TypeGraph::generate(cfg).unwrap();
    let structs: Vec<_> = tg.struct_ids().collect();
    assert_eq!(structs.len(), 1);
    let s = structs[0];
    assert_eq!(tg.out_degree(s), 2);
    for (_, kind) in tg.children(s) {
        assert!(matches!(kind, TypeKind::Scalar { .. }));
    }
    match &tg.vertex_from(s).kind {
        TypeKind::Struct { bitfields } => assert!(bitfields.is_empty()),
        other => panic!("expected a struct, got {other:?}"),
    }
}

// A complete 4-vertex digraph has no source, so an artificial root is
// added; after component repair everything is Direct-reachable from the
// single main root.
#[test]
fn scenario_dense_callgraph_repair() {
    let tg = Arc::new(TypeGraph::generate(config_with(1, &[])).unwrap());
    let cfg = config_with(
        1,
        &[
            (Opt::CgVertices, OptionValue::Range { from: 4, to: 4 }),
            (Opt::CgEdgeset, OptionValue::Probf(vec![0, 100])),
            (Opt::CgAddleafs, OptionValue::Range { from: 0, to: 0 }),
            (Opt::CgSelfloop, OptionValue::Pflag { prob: 0, total: 100 }),
        ],
    );
    let cg = CallGraph::generate(cfg, tg).unwrap();

    let main = cg.main_root();
    assert!(cg.callers(main, CallMask::ANY).next().is_none());

    let mut seen = vec![false; cg.nfuncs()];
    seen[main.index()] = true;
    let mut queue = vec![main];
    while let Some(v) = queue.pop() {
        for c in cg.callees(v, CallMask::DIRECT) {
            if !seen[c.index()] {
                seen[c.index()] = true;
                queue.push(c);
            }
        }
    }
    assert!(seen.iter().all(|&r| r), "a vertex escaped the direct tree");
}

fn pipeline_dumps(seed: u64, nthreads: usize) -> (String, String, String, String) {
    let root = config_with(seed, &[]);
    let queue = TaskQueue::new();
    let workers: Vec<thread::JoinHandle<()>> = (0..nthreads)
        .map(|_| {
            let q = Arc::clone(&queue);
            thread::spawn(move || consumer_loop(q))
        })
        .collect();

    let cfg = root.fork();
    let tg = Arc::new(
        submit(&queue, move || TypeGraph::generate(cfg))
            .get()
            .unwrap(),
    );

    let cfg = root.fork();
    let tgc = Arc::clone(&tg);
    let cg = Arc::new(
        submit(&queue, move || CallGraph::generate(cfg, tgc))
            .get()
            .unwrap(),
    );

    let cfg = root.fork();
    let tgc = Arc::clone(&tg);
    let cgc = Arc::clone(&cg);
    let va = Arc::new(
        submit(&queue, move || VarAssign::generate(cfg, tgc, cgc))
            .get()
            .unwrap(),
    );

    let cfg = root.fork();
    let cgc = Arc::clone(&cg);
    let vac = Arc::clone(&va);
    let cn = submit(&queue, move || ControlGraph::generate(cfg, cgc, vac))
        .get()
        .unwrap();

    queue.push_sentinel();
    for w in workers {
        w.join().unwrap();
    }

    (tg.dump_dot(), cg.dump_dot(), va.dump(), cn.dump())
}

// One seed, one consumer vs. eight consumers: identical artefacts.
#[test]
fn scenario_determinism_across_thread_counts() {
    let single = pipeline_dumps(7, 1);
    let pooled = pipeline_dumps(7, 8);
    assert_eq!(single.0, pooled.0, "type graphs differ");
    assert_eq!(single.1, pooled.1, "call graphs differ");
    assert_eq!(single.2, pooled.2, "variable assignments differ");
    assert_eq!(single.3, pooled.3, "control graphs differ");
}

#[test]
fn scenario_determinism_across_runs() {
    let first = pipeline_dumps(42, 3);
    let second = pipeline_dumps(42, 3);
    assert_eq!(first, second);
}

// With every special refinement drawing a break, break/continue
// payloads appear only under loops, everything else degrades to return.
#[test]
fn scenario_breaks_respect_loops() {
    let tg = Arc::new(TypeGraph::generate(config_with(5, &[])).unwrap());
    let cg = Arc::new(CallGraph::generate(config_with(6, &[]), Arc::clone(&tg)).unwrap());
    let va = Arc::new(
        VarAssign::generate(config_with(7, &[]), Arc::clone(&tg), Arc::clone(&cg)).unwrap(),
    );
    let cfg = config_with(
        8,
        &[
            (Opt::CnBlockprob, OptionValue::Probf(vec![0, 0, 100])),
            (Opt::MsSplits, OptionValue::Single(25)),
        ],
    );
    let cn = ControlGraph::generate(cfg, Arc::clone(&cg), va).unwrap();

    let mut nbreaks = 0;
    for st in cn.trees() {
        let tree = st.tree();
        for id in 1..tree.len() {
            if let CnKind::Break { kind } = &tree.payload(id).kind {
                nbreaks += 1;
                let in_loop = tree
                    .ancestors(id)
                    .any(|a| matches!(tree.payload(a).kind, CnKind::Loop { .. }));
                if matches!(kind, BreakKind::Break | BreakKind::Continue) {
                    assert!(in_loop, "loop break outside a loop");
                }
            }
        }
    }
    assert!(nbreaks > 0, "no break nodes were produced");
}

// Well-typedness across the stage boundary: every def/use reference
// names a variable visible in its function.
#[test]
fn scenario_cross_stage_references_hold() {
    let tg = Arc::new(TypeGraph::generate(config_with(11, &[])).unwrap());
    let cg = Arc::new(CallGraph::generate(config_with(12, &[]), Arc::clone(&tg)).unwrap());
    let va = Arc::new(
        VarAssign::generate(config_with(13, &[]), Arc::clone(&tg), Arc::clone(&cg)).unwrap(),
    );
    let cn = ControlGraph::generate(config_with(14, &[]), Arc::clone(&cg), Arc::clone(&va))
        .unwrap();

    for st in cn.trees() {
        let visible = &va.func_vars(st.nfunc()).visible;
        let tree = st.tree();
        for id in 1..tree.len() {
            let node = tree.payload(id);
            for v in node.defs.iter().chain(node.uses.iter()) {
                assert!(visible.contains(v));
            }
            if let CnKind::Call { callee, .. } = node.kind {
                assert!(callee.index() < cg.nfuncs());
            }
        }
    }
}
