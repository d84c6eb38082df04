//! Option identifiers, value kinds, and the default registry.
//!
//! Option groups mirror the pipeline levels: PG (program), PGC (program
//! control), TG (type graph), CG (call graph), MS (function
//! metastructure), VA (variable assignment), CN (control graph). The
//! hyphenated names double as CLI flag stems, so `Opt::TgSeeds` is set
//! with `--tg-seeds`.

use std::collections::BTreeMap;

use crate::typegraph::SCALAR_CATALOG;

/// Identifier of a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Opt {
    // program level
    PgConsumers,
    PgVar,
    PgSplits,
    PgLocs,
    PgArith,
    // program control
    PgcStopOnTg,
    PgcStopOnCg,
    PgcStopOnVa,
    PgcStopOnCn,
    // type graph
    TgSeeds,
    TgSplits,
    TgScaltype,
    TgTypeprob,
    TgConttype,
    TgNfields,
    TgArrsize,
    TgMaxarrpreds,
    TgMaxstructpreds,
    TgMaxpreds,
    TgBfprob,
    TgBfsize,
    TgMorescalars,
    // call graph
    CgVertices,
    CgEdgeset,
    CgArtificialConns,
    CgAddleafs,
    CgSelfloop,
    CgIndsetcnt,
    CgTypeattempts,
    CgNargs,
    // function metastructure
    MsUsesigned,
    MsUsefloat,
    MsUsecomplex,
    MsUsepointers,
    MsNvars,
    MsSplits,
    // variable assignment
    VaNglobals,
    VaNidx,
    VaNvatts,
    VaUseperm,
    VaMaxperm,
    // control graph
    CnAddblocks,
    CnExpandcont,
    CnContprob,
    CnBlockprob,
    CnBreaktype,
    CnNbranchesIf,
    CnNbranchesSwitch,
    CnNbranchesRgn,
    CnForStart,
    CnForSize,
    CnForStep,
    CnDefs,
    CnUses,
}

impl Opt {
    /// Every registered option, in registry order.
    pub fn all() -> &'static [Opt] {
        use Opt::*;
        &[
            PgConsumers,
            PgVar,
            PgSplits,
            PgLocs,
            PgArith,
            PgcStopOnTg,
            PgcStopOnCg,
            PgcStopOnVa,
            PgcStopOnCn,
            TgSeeds,
            TgSplits,
            TgScaltype,
            TgTypeprob,
            TgConttype,
            TgNfields,
            TgArrsize,
            TgMaxarrpreds,
            TgMaxstructpreds,
            TgMaxpreds,
            TgBfprob,
            TgBfsize,
            TgMorescalars,
            CgVertices,
            CgEdgeset,
            CgArtificialConns,
            CgAddleafs,
            CgSelfloop,
            CgIndsetcnt,
            CgTypeattempts,
            CgNargs,
            MsUsesigned,
            MsUsefloat,
            MsUsecomplex,
            MsUsepointers,
            MsNvars,
            MsSplits,
            VaNglobals,
            VaNidx,
            VaNvatts,
            VaUseperm,
            VaMaxperm,
            CnAddblocks,
            CnExpandcont,
            CnContprob,
            CnBlockprob,
            CnBreaktype,
            CnNbranchesIf,
            CnNbranchesSwitch,
            CnNbranchesRgn,
            CnForStart,
            CnForSize,
            CnForStep,
            CnDefs,
            CnUses,
        ]
    }

    /// Stable hyphenated name used for CLI flags and dumps.
    pub fn name(&self) -> &'static str {
        use Opt::*;
        match self {
            PgConsumers => "pg-consumers",
            PgVar => "pg-var",
            PgSplits => "pg-splits",
            PgLocs => "pg-locs",
            PgArith => "pg-arith",
            PgcStopOnTg => "pgc-stop-on-tg",
            PgcStopOnCg => "pgc-stop-on-cg",
            PgcStopOnVa => "pgc-stop-on-va",
            PgcStopOnCn => "pgc-stop-on-cn",
            TgSeeds => "tg-seeds",
            TgSplits => "tg-splits",
            TgScaltype => "tg-scaltype",
            TgTypeprob => "tg-typeprob",
            TgConttype => "tg-conttype",
            TgNfields => "tg-nfields",
            TgArrsize => "tg-arrsize",
            TgMaxarrpreds => "tg-maxarrpreds",
            TgMaxstructpreds => "tg-maxstructpreds",
            TgMaxpreds => "tg-maxpreds",
            TgBfprob => "tg-bfprob",
            TgBfsize => "tg-bfsize",
            TgMorescalars => "tg-morescalars",
            CgVertices => "cg-vertices",
            CgEdgeset => "cg-edgeset",
            CgArtificialConns => "cg-artificial-conns",
            CgAddleafs => "cg-addleafs",
            CgSelfloop => "cg-selfloop",
            CgIndsetcnt => "cg-indsetcnt",
            CgTypeattempts => "cg-typeattempts",
            CgNargs => "cg-nargs",
            MsUsesigned => "ms-usesigned",
            MsUsefloat => "ms-usefloat",
            MsUsecomplex => "ms-usecomplex",
            MsUsepointers => "ms-usepointers",
            MsNvars => "ms-nvars",
            MsSplits => "ms-splits",
            VaNglobals => "va-nglobals",
            VaNidx => "va-nidx",
            VaNvatts => "va-nvatts",
            VaUseperm => "va-useperm",
            VaMaxperm => "va-maxperm",
            CnAddblocks => "cn-addblocks",
            CnExpandcont => "cn-expandcont",
            CnContprob => "cn-contprob",
            CnBlockprob => "cn-blockprob",
            CnBreaktype => "cn-breaktype",
            CnNbranchesIf => "cn-nbranches-if",
            CnNbranchesSwitch => "cn-nbranches-switch",
            CnNbranchesRgn => "cn-nbranches-rgn",
            CnForStart => "cn-for-start",
            CnForSize => "cn-for-size",
            CnForStep => "cn-for-step",
            CnDefs => "cn-defs",
            CnUses => "cn-uses",
        }
    }

    /// One-line description for `--help` output.
    pub fn description(&self) -> &'static str {
        use Opt::*;
        match self {
            PgConsumers => "Number of consumer threads",
            PgVar => "Number of varassign randomizations",
            PgSplits => "Number of controlgraph randomizations",
            PgLocs => "Number of LocIR randomizations",
            PgArith => "Number of ExprIR randomizations",
            PgcStopOnTg => "Stop the pipeline after the typegraph",
            PgcStopOnCg => "Stop the pipeline after the callgraph",
            PgcStopOnVa => "Stop the pipeline after variable assignment",
            PgcStopOnCn => "Stop the pipeline after the controlgraphs",
            TgSeeds => "Number of typegraph seed nodes",
            TgSplits => "Number of typegraph splits to perform",
            TgScaltype => "Probability function for seed kinds (scalar, pointer)",
            TgTypeprob => "Probability function over the scalar catalog",
            TgConttype => "Probability function for type containers (array, struct)",
            TgNfields => "Number of structure fields",
            TgArrsize => "Size of array",
            TgMaxarrpreds => "Maximum number of nested arrays",
            TgMaxstructpreds => "Maximum number of nested structures",
            TgMaxpreds => "Maximum number of nested types",
            TgBfprob => "Bitfield probability",
            TgBfsize => "Bitfield size range",
            TgMorescalars => "Probability of adding a scalar after each split",
            CgVertices => "Number of initial leaf and non-leaf functions",
            CgEdgeset => "Probability function for each candidate call edge (skip, add)",
            CgArtificialConns => "Connections of an artificial root function",
            CgAddleafs => "Number of additional leaf functions",
            CgSelfloop => "Probability of a function calling itself",
            CgIndsetcnt => "Number of indirectly callable functions",
            CgTypeattempts => "Random attempts before scanning the type storage",
            CgNargs => "Number of function arguments",
            MsUsesigned => "Probability that a function accepts signed types",
            MsUsefloat => "Probability that a function accepts FP types",
            MsUsecomplex => "Probability that a function accepts structs and arrays",
            MsUsepointers => "Probability that a function accepts pointers",
            MsNvars => "Number of local variables per function",
            MsSplits => "Number of splits per split tree",
            VaNglobals => "Number of global variables",
            VaNidx => "Number of free index variables per function",
            VaNvatts => "Attempts to draw acceptable local variables",
            VaUseperm => "Probability of adding an array permutator",
            VaMaxperm => "Maximum permutators per function",
            CnAddblocks => "Sibling blocks added per split",
            CnExpandcont => "Probability that a split creates a container",
            CnContprob => "Probability function for containers (if, for, switch, region)",
            CnBlockprob => "Probability function for specials (cond call, ind call, break)",
            CnBreaktype => "Probability function for breaks (break, continue, return)",
            CnNbranchesIf => "Number of if branches",
            CnNbranchesSwitch => "Number of switch branches",
            CnNbranchesRgn => "Number of region branches",
            CnForStart => "Loop start value",
            CnForSize => "Loop trip count",
            CnForStep => "Loop step",
            CnDefs => "Variable definitions per eligible node",
            CnUses => "Variable uses per eligible node",
        }
    }

    /// Expected entry count for probability-function options.
    pub fn probf_arity(&self) -> Option<usize> {
        use Opt::*;
        match self {
            TgScaltype | TgConttype | CgEdgeset => Some(2),
            TgTypeprob => Some(SCALAR_CATALOG.len()),
            CnContprob => Some(4),
            CnBlockprob | CnBreaktype => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed value of a configuration option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Fixed integer value.
    Single(i32),
    /// Boolean switch, settable with `--name` / `--no-name`.
    SingleBool(bool),
    /// Fixed string value.
    SingleString(String),
    /// Uniform draw from the inclusive range on every `get`.
    Range { from: i32, to: i32 },
    /// Discrete distribution in cumulative form; the last entry is the
    /// normalizing total.
    Probf(Vec<i32>),
    /// Bernoulli trial: `get` is 1 with chance `prob` out of `total`.
    Pflag { prob: i32, total: i32 },
}

impl OptionValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OptionValue::Single(_) => "single",
            OptionValue::SingleBool(_) => "bool",
            OptionValue::SingleString(_) => "string",
            OptionValue::Range { .. } => "range",
            OptionValue::Probf(_) => "probf",
            OptionValue::Pflag { .. } => "pflag",
        }
    }
}

fn pflag(prob: i32) -> OptionValue {
    OptionValue::Pflag { prob, total: 100 }
}

/// The default option registry.
pub fn default_registry() -> BTreeMap<Opt, OptionValue> {
    use Opt::*;
    use OptionValue::*;

    let mut reg = BTreeMap::new();
    let mut put = |opt: Opt, val: OptionValue| {
        reg.insert(opt, val);
    };

    put(PgConsumers, Single(5));
    put(PgVar, Single(2));
    put(PgSplits, Single(5));
    put(PgLocs, Single(5));
    put(PgArith, Single(10));
    put(PgcStopOnTg, SingleBool(false));
    put(PgcStopOnCg, SingleBool(false));
    put(PgcStopOnVa, SingleBool(false));
    put(PgcStopOnCn, SingleBool(false));

    put(TgSeeds, Single(12));
    put(TgSplits, Single(20));
    put(TgScaltype, Probf(vec![85, 100]));
    // uniform over the ten catalog scalars
    put(TgTypeprob, Probf(vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]));
    put(TgConttype, Probf(vec![50, 100]));
    put(TgNfields, Range { from: 2, to: 6 });
    put(TgArrsize, Range { from: 2, to: 10 });
    put(TgMaxarrpreds, Single(3));
    put(TgMaxstructpreds, Single(3));
    put(TgMaxpreds, Single(5));
    put(TgBfprob, pflag(10));
    put(TgBfsize, Range { from: 1, to: 31 });
    put(TgMorescalars, pflag(50));

    put(CgVertices, Range { from: 10, to: 20 });
    put(CgEdgeset, Probf(vec![85, 100]));
    put(CgArtificialConns, Single(3));
    put(CgAddleafs, Range { from: 10, to: 15 });
    put(CgSelfloop, pflag(10));
    put(CgIndsetcnt, Single(3));
    put(CgTypeattempts, Single(10));
    put(CgNargs, Range { from: 0, to: 4 });

    put(MsUsesigned, pflag(50));
    put(MsUsefloat, pflag(20));
    put(MsUsecomplex, pflag(70));
    put(MsUsepointers, pflag(50));
    put(MsNvars, Range { from: 4, to: 10 });
    put(MsSplits, Single(10));

    put(VaNglobals, Single(4));
    put(VaNidx, Single(3));
    put(VaNvatts, Single(40));
    put(VaUseperm, pflag(30));
    put(VaMaxperm, Single(4));

    put(CnAddblocks, Range { from: 1, to: 3 });
    put(CnExpandcont, pflag(40));
    put(CnContprob, Probf(vec![30, 60, 80, 100]));
    put(CnBlockprob, Probf(vec![40, 60, 100]));
    put(CnBreaktype, Probf(vec![40, 70, 100]));
    put(CnNbranchesIf, Range { from: 2, to: 3 });
    put(CnNbranchesSwitch, Range { from: 2, to: 5 });
    put(CnNbranchesRgn, Range { from: 2, to: 4 });
    put(CnForStart, Range { from: 0, to: 10 });
    put(CnForSize, Range { from: 1, to: 20 });
    put(CnForStep, Range { from: 1, to: 3 });
    put(CnDefs, Range { from: 1, to: 3 });
    put(CnUses, Range { from: 1, to: 4 });

    reg
}

/// Look an option up by its hyphenated name.
pub fn by_name(name: &str) -> Option<Opt> {
    Opt::all().iter().copied().find(|o| o.name() == name)
}
