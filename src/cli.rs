//! Command-line surface.
//!
//! Besides the fixed flags (`--seed`, `--quiet`, `--dumps`,
//! `--showval`), one long option per registry entry is generated from
//! the option's name and kind: plain values take `--name <N>`,
//! booleans add a `--no-name` switch, ranges split into `--name-min` /
//! `--name-max`, and probability functions take a multi-valued list.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::config::{options, Config, Opt, OptionValue};
use crate::errors::{ConfigError, GenError};

pub struct Parsed {
    pub config: Config,
    pub seed: u64,
    pub showval: Option<String>,
}

/// Parse the command line into a resolved config. `Ok(None)` means a
/// help request was served.
pub fn parse_args(args: Vec<String>) -> Result<Option<Parsed>, GenError> {
    let registry = options::default_registry();
    let matches = match build_command(&registry).try_get_matches_from(args) {
        Ok(m) => m,
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
            let _ = e.print();
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::Cli(e.to_string()).into()),
    };

    let mut registry = registry;
    apply_overrides(&matches, &mut registry)?;

    let seed = matches.get_one::<u64>("seed").copied().unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });
    let quiet = matches.get_flag("quiet");
    let dumps = matches.get_flag("dumps");
    let showval = matches.get_one::<String>("showval").cloned();

    let config = Config::new(seed, quiet, dumps, registry)?;
    Ok(Some(Parsed {
        config,
        seed,
        showval,
    }))
}

/// Resolve one option by name for `--showval`.
pub fn show_value(config: &Config, name: &str) -> Result<String, GenError> {
    let opt = options::by_name(name)
        .ok_or_else(|| ConfigError::UnknownOption(name.to_string()))?;
    Ok(config.gets(opt)?)
}

fn build_command(registry: &BTreeMap<Opt, OptionValue>) -> Command {
    let mut cmd = Command::new("coelacanth")
        .about("Generate randomized test-program descriptions")
        .allow_negative_numbers(true)
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(clap::value_parser!(u64))
                .help("Seed for the random generator"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress informational messages"),
        )
        .arg(
            Arg::new("dumps")
                .long("dumps")
                .action(ArgAction::SetTrue)
                .help("Write per-stage dump files"),
        )
        .arg(
            Arg::new("showval")
                .long("showval")
                .value_name("OPTION")
                .help("Print the resolved value of one option and exit"),
        );

    for (opt, value) in registry {
        let name = opt.name();
        match value {
            OptionValue::Single(_) | OptionValue::Pflag { .. } => {
                cmd = cmd.arg(
                    Arg::new(name)
                        .long(name)
                        .value_name("N")
                        .value_parser(clap::value_parser!(i32))
                        .help(opt.description()),
                );
            }
            OptionValue::SingleString(_) => {
                cmd = cmd.arg(
                    Arg::new(name)
                        .long(name)
                        .value_name("S")
                        .help(opt.description()),
                );
            }
            OptionValue::SingleBool(_) => {
                let no_name = format!("no-{name}");
                cmd = cmd
                    .arg(
                        Arg::new(name)
                            .long(name)
                            .action(ArgAction::SetTrue)
                            .help(opt.description()),
                    )
                    .arg(
                        Arg::new(no_name.clone())
                            .long(no_name)
                            .action(ArgAction::SetTrue)
                            .help("Switch the option off"),
                    );
            }
            OptionValue::Range { .. } => {
                let min_name = format!("{name}-min");
                let max_name = format!("{name}-max");
                cmd = cmd
                    .arg(
                        Arg::new(min_name.clone())
                            .long(min_name)
                            .value_name("N")
                            .value_parser(clap::value_parser!(i32))
                            .help(opt.description()),
                    )
                    .arg(
                        Arg::new(max_name.clone())
                            .long(max_name)
                            .value_name("N")
                            .value_parser(clap::value_parser!(i32))
                            .help(opt.description()),
                    );
            }
            OptionValue::Probf(_) => {
                cmd = cmd.arg(
                    Arg::new(name)
                        .long(name)
                        .value_name("CUM")
                        .num_args(1..)
                        .value_parser(clap::value_parser!(i32))
                        .help(opt.description()),
                );
            }
        }
    }
    cmd
}

fn apply_overrides(
    matches: &ArgMatches,
    registry: &mut BTreeMap<Opt, OptionValue>,
) -> Result<(), ConfigError> {
    for (opt, value) in registry.iter_mut() {
        let name = opt.name();
        match value {
            OptionValue::Single(v) => {
                if let Some(&n) = matches.get_one::<i32>(name) {
                    *v = n;
                }
            }
            OptionValue::Pflag { prob, .. } => {
                if let Some(&n) = matches.get_one::<i32>(name) {
                    *prob = n;
                }
            }
            OptionValue::SingleString(s) => {
                if let Some(n) = matches.get_one::<String>(name) {
                    *s = n.clone();
                }
            }
            OptionValue::SingleBool(b) => {
                if matches.get_flag(&format!("no-{name}")) {
                    *b = false;
                } else if matches.get_flag(name) {
                    *b = true;
                }
            }
            OptionValue::Range { from, to } => {
                let min = matches.get_one::<i32>(&format!("{name}-min")).copied();
                let max = matches.get_one::<i32>(&format!("{name}-max")).copied();
                match (min, max) {
                    (Some(lo), Some(hi)) => {
                        *from = lo;
                        *to = hi;
                    }
                    (None, None) => {}
                    _ => {
                        return Err(ConfigError::HalfRange {
                            name: name.to_string(),
                        })
                    }
                }
            }
            OptionValue::Probf(cum) => {
                if let Some(vals) = matches.get_many::<i32>(name) {
                    *cum = vals.copied().collect();
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Option<Parsed>, GenError> {
        let mut args = vec!["coelacanth".to_string(), "--seed".into(), "1".into()];
        args.extend(extra.iter().map(|s| s.to_string()));
        parse_args(args)
    }

    #[test]
    fn defaults_parse_without_flags() {
        let parsed = parse(&[]).unwrap().expect("not a help run");
        assert_eq!(parsed.seed, 1);
        assert!(!parsed.config.dumps());
        assert_eq!(parsed.config.get(Opt::TgSeeds).unwrap(), 12);
    }

    #[test]
    fn single_override_applies() {
        let parsed = parse(&["--tg-seeds", "3"]).unwrap().unwrap();
        assert_eq!(parsed.config.get(Opt::TgSeeds).unwrap(), 3);
    }

    #[test]
    fn range_override_needs_both_bounds() {
        let err = parse(&["--tg-nfields-min", "2"]).err().unwrap();
        assert!(matches!(
            err,
            GenError::Config(ConfigError::HalfRange { .. })
        ));
        let parsed = parse(&["--tg-nfields-min", "4", "--tg-nfields-max", "4"])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.config.minmax(Opt::TgNfields).unwrap(), (4, 4));
    }

    #[test]
    fn bool_negation_wins() {
        let parsed = parse(&["--pgc-stop-on-tg"]).unwrap().unwrap();
        assert_eq!(parsed.config.get(Opt::PgcStopOnTg).unwrap(), 1);
        let parsed = parse(&["--pgc-stop-on-tg", "--no-pgc-stop-on-tg"])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.config.get(Opt::PgcStopOnTg).unwrap(), 0);
    }

    #[test]
    fn probf_override_takes_a_list() {
        let parsed = parse(&["--cn-breaktype", "10", "20", "100"])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.config.prob_size(Opt::CnBreaktype).unwrap(), 3);
    }

    #[test]
    fn probf_override_with_wrong_arity_fails() {
        let err = parse(&["--cn-breaktype", "10", "100"]).err().unwrap();
        assert!(matches!(
            err,
            GenError::Config(ConfigError::ProbfArity { .. })
        ));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse(&["--definitely-not-an-option"]).is_err());
    }

    #[test]
    fn showval_resolves_options_by_name() {
        let parsed = parse(&["--showval", "tg-seeds"]).unwrap().unwrap();
        let name = parsed.showval.as_deref().unwrap();
        assert_eq!(show_value(&parsed.config, name).unwrap(), "12");
        assert!(show_value(&parsed.config, "bogus").is_err());
    }
}
