use clap::Parser;
use std::process::ExitCode;

use cuebench::cli::{Cli, Command};
use cuebench::config::{load_config, validate_config};
use cuebench::{CuebenchError, build, judge, runner};

fn run() -> Result<(), CuebenchError> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    match cli.command {
        Command::Stitch(args) => {
            args.apply(&mut config);
            let out = args.out.unwrap_or_else(|| config.data.stitched.clone());
            build::handle_stitch(&config, &out)
        }
        Command::Unify(args) => {
            args.apply(&mut config);
            let out = args.out.unwrap_or_else(|| config.data.unified.clone());
            build::handle_unify(&config, &out)
        }
        Command::Evaluate(args) => {
            args.model.apply(&mut config.model);
            validate_config(&config)?;
            let input = args.input.unwrap_or_else(|| config.data.unified.clone());
            runner::handle_evaluate(&config.model, &input, &args.out)
        }
        Command::Judge(args) => {
            args.model.apply(&mut config.judge);
            validate_config(&config)?;
            judge::handle_judge(&config.judge, &args.input, &args.out, args.summary_file.as_deref())
        }
        Command::Summarize(args) => judge::handle_summarize(&args.input, args.summary_file.as_deref()),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cuebench: {e}");
            ExitCode::from(1)
        }
    }
}
