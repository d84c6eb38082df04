//! Seeded configuration: the option registry plus the random facade.
//!
//! Every pipeline stage owns its own `Config`. The embedded generator
//! is a 64-bit Mersenne Twister behind a mutex; stages never share one.
//! Instead, the orchestrator calls [`Config::fork`] to derive a child
//! config whose seed is a fresh draw from the parent, which keeps runs
//! byte-identical regardless of worker count.

pub mod options;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use rand::Rng;
use rand_mt::Mt64;

use crate::errors::ConfigError;

pub use options::{Opt, OptionValue};

pub struct Config {
    options: BTreeMap<Opt, OptionValue>,
    quiet: bool,
    dumps: bool,
    rng: Mutex<Mt64>,
}

impl Config {
    /// Build a config from a seed and a validated option map.
    pub fn new(
        seed: u64,
        quiet: bool,
        dumps: bool,
        options: BTreeMap<Opt, OptionValue>,
    ) -> Result<Self, ConfigError> {
        validate(&options)?;
        Ok(Self {
            options,
            quiet,
            dumps,
            rng: Mutex::new(Mt64::new(seed)),
        })
    }

    /// Default registry, given seed, quiet mode, no dumps.
    pub fn with_defaults(seed: u64) -> Result<Self, ConfigError> {
        Self::new(seed, true, false, options::default_registry())
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn dumps(&self) -> bool {
        self.dumps
    }

    /// Derive a child config for a spawned task: same options, fresh
    /// seed drawn from this config.
    pub fn fork(&self) -> Config {
        let seed = self.rand_positive() as u64;
        Config {
            options: self.options.clone(),
            quiet: self.quiet,
            dumps: self.dumps,
            rng: Mutex::new(Mt64::new(seed)),
        }
    }

    /// Resolve an option to an integer, drawing randomness for Range,
    /// Probf, and Pflag kinds.
    pub fn get(&self, opt: Opt) -> Result<i32, ConfigError> {
        match self.value(opt)? {
            OptionValue::Single(v) => Ok(*v),
            OptionValue::SingleBool(b) => Ok(*b as i32),
            OptionValue::SingleString(s) => {
                s.parse().map_err(|_| ConfigError::InvalidKind {
                    opt,
                    expected: "numeric string",
                    found: "string",
                })
            }
            OptionValue::Range { from, to } => Ok(self.rand_from(*from, *to)),
            OptionValue::Pflag { prob, total } => {
                Ok((self.rand_from(0, total - 1) < *prob) as i32)
            }
            OptionValue::Probf(cum) => Ok(self.from_probf(cum)),
        }
    }

    /// Resolve an option to a string: the stored value for string
    /// options, the decimal of [`Config::get`] otherwise.
    pub fn gets(&self, opt: Opt) -> Result<String, ConfigError> {
        match self.value(opt)? {
            OptionValue::SingleString(s) => Ok(s.clone()),
            _ => Ok(self.get(opt)?.to_string()),
        }
    }

    /// Bounds of a Range option.
    pub fn minmax(&self, opt: Opt) -> Result<(i32, i32), ConfigError> {
        match self.value(opt)? {
            OptionValue::Range { from, to } => Ok((*from, *to)),
            other => Err(ConfigError::InvalidKind {
                opt,
                expected: "range",
                found: other.kind_name(),
            }),
        }
    }

    /// Entry count of a Probf option.
    pub fn prob_size(&self, opt: Opt) -> Result<usize, ConfigError> {
        match self.value(opt)? {
            OptionValue::Probf(cum) => Ok(cum.len()),
            other => Err(ConfigError::InvalidKind {
                opt,
                expected: "probf",
                found: other.kind_name(),
            }),
        }
    }

    /// Uniform draw from `[0, i32::MAX]`.
    pub fn rand_positive(&self) -> i32 {
        self.rand_from(0, i32::MAX)
    }

    /// Human-readable dump of the resolved registry (stored values, no
    /// draws).
    pub fn dump(&self) -> String {
        let mut out = String::from("Program config:\n");
        for (opt, value) in &self.options {
            let rendered = match value {
                OptionValue::Single(v) => v.to_string(),
                OptionValue::SingleBool(b) => b.to_string(),
                OptionValue::SingleString(s) => format!("\"{s}\""),
                OptionValue::Range { from, to } => format!("[{from}, {to}]"),
                OptionValue::Probf(cum) => {
                    let entries: Vec<String> = cum.iter().map(i32::to_string).collect();
                    format!("{{{}}}", entries.join(", "))
                }
                OptionValue::Pflag { prob, total } => format!("{prob}/{total}"),
            };
            let _ = writeln!(out, "  {} = {rendered}", opt.name());
        }
        out
    }

    fn value(&self, opt: Opt) -> Result<&OptionValue, ConfigError> {
        self.options.get(&opt).ok_or(ConfigError::OutOfRange(opt))
    }

    fn rand_from(&self, from: i32, to: i32) -> i32 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(from..=to)
    }

    // Draw from a cumulative distribution like [10, 50, 100]: returns 0
    // with chance 10/100, 1 with 40/100, 2 with 50/100.
    fn from_probf(&self, cum: &[i32]) -> i32 {
        let total = *cum.last().expect("probf validated non-empty");
        let v = self.rand_from(0, total - 1);
        let mut idx = 0;
        for &border in cum {
            if border > v {
                break;
            }
            idx += 1;
        }
        idx
    }
}

fn validate(options: &BTreeMap<Opt, OptionValue>) -> Result<(), ConfigError> {
    for (opt, value) in options {
        match value {
            OptionValue::Probf(cum) => {
                if let Some(expected) = opt.probf_arity() {
                    if cum.len() != expected {
                        return Err(ConfigError::ProbfArity {
                            opt: *opt,
                            expected,
                            got: cum.len(),
                        });
                    }
                }
                let shaped = !cum.is_empty()
                    && *cum.last().expect("non-empty") > 0
                    && cum.windows(2).all(|w| w[0] <= w[1])
                    && cum[0] >= 0;
                if !shaped {
                    return Err(ConfigError::ProbfShape(*opt));
                }
            }
            OptionValue::Range { from, to } => {
                if from > to {
                    return Err(ConfigError::BadRange {
                        opt: *opt,
                        from: *from,
                        to: *to,
                    });
                }
            }
            OptionValue::Pflag { total, .. } => {
                if *total < 1 {
                    return Err(ConfigError::PflagShape(*opt));
                }
            }
            _ => {}
        }
    }
    Ok(())
}
