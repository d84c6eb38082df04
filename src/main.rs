use std::process::ExitCode;

use coelacanth::cli;
use coelacanth::driver::Driver;

fn main() -> ExitCode {
    let parsed = match cli::parse_args(std::env::args().collect()) {
        Ok(Some(p)) => p,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(name) = &parsed.showval {
        return match cli::show_value(&parsed.config, name) {
            Ok(value) => {
                println!("{name} = {value}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if !parsed.config.quiet() {
        println!("coelacanth: run with --help for the option list");
        println!("coelacanth: starting with seed = {}", parsed.seed);
    }

    match Driver::new(parsed.config).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
