use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};

use lips::config::Config;
use lips::eval::Interpreter;
use lips::repl;

/// Stack of the thread that runs the interpreter.
const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;
/// Headroom left below `EVAL_STACK_SIZE` when it becomes `Config::max_stack`.
const STACK_HEADROOM: usize = 4 * 1024 * 1024;

fn print_usage() {
    println!("Usage: lips [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --load <file>      Evaluate a source file before starting the REPL (repeatable)");
    println!("  --no-prelude       Do not define DEFUN, IF, NULL, NOT, CADR, ...");
    println!("  --max-depth <n>    Maximum evaluation depth (default {})", Config::default().max_depth);
    println!("  --help, -h         Show this help message");
    println!();
    println!("Ctrl-C at the prompt discards the current input. It does not interrupt");
    println!("a running form: a (LOOP ...) that never fails can only be stopped by");
    println!("ending the process.");
    println!();
    println!("Environment variables:");
    println!("  LIPS_LOG=<filter>  Log filter, e.g. debug or trace (default warn)");
}

/// Fill a config from command-line flags. Returns None when --help was given.
fn parse_args(args: &[String]) -> Result<Option<Config>> {
    let mut config = Config::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--load" => {
                let path = args.get(i + 1).context("--load requires a file path")?;
                config.bootstrap.push(PathBuf::from(path));
                i += 2;
            }
            "--no-prelude" => {
                config.load_prelude = false;
                i += 1;
            }
            "--max-depth" => {
                let n = args.get(i + 1).context("--max-depth requires a number")?;
                config.max_depth = n
                    .parse()
                    .with_context(|| format!("invalid --max-depth value '{}'", n))?;
                i += 2;
            }
            "--help" | "-h" => return Ok(None),
            other => bail!("unknown argument: {}\nTry 'lips --help' for usage information.", other),
        }
    }
    Ok(Some(config))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("LIPS_LOG", "warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = match parse_args(&args)? {
        Some(config) => config,
        None => {
            print_usage();
            return Ok(());
        }
    };
    config.max_stack = EVAL_STACK_SIZE - STACK_HEADROOM;

    let session = thread::Builder::new()
        .name("lips".into())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run(config))
        .context("failed to spawn interpreter thread")?;
    session
        .join()
        .map_err(|_| anyhow!("interpreter thread panicked"))?
}

/// Build the interpreter, load bootstrap files and run the REPL.
fn run(config: Config) -> Result<()> {
    let bootstrap = config.bootstrap.clone();
    let mut interp = Interpreter::with_config(config).context("failed to start interpreter")?;

    for path in &bootstrap {
        let count = interp
            .load_file(path)
            .with_context(|| format!("error loading {}", path.display()))?;
        log::info!("loaded {} forms from {}", count, path.display());
    }
    interp.collect_garbage();

    repl::run(&mut interp)
}
