use std::{env, fs, process::ExitCode, thread};

use pyprune::{OptimizeError, OptimizeOptions, Optimizer, StderrTracer, parse, render, tree::Module};

const USAGE: &str = "usage: pyprune [--json] [--trace] [--max-rounds N] [--no-hoist] [--no-dce] FILE...";

/// Parsed command line.
#[derive(Debug)]
struct Args {
    /// Print the optimized tree as JSON instead of source.
    json: bool,
    /// Log optimizer events to stderr.
    trace: bool,
    options: OptimizeOptions,
    files: Vec<String>,
}

fn main() -> ExitCode {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // one worker per file; output keeps argument order
    let results: Vec<Result<String, String>> = thread::scope(|scope| {
        let args = &args;
        let handles: Vec<_> = args
            .files
            .iter()
            .map(|path| scope.spawn(move || process(path, args)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|_| Err("worker thread panicked".to_owned())))
            .collect()
    });

    let mut status = ExitCode::SUCCESS;
    let multiple = args.files.len() > 1;
    for (path, result) in args.files.iter().zip(results) {
        match result {
            Ok(output) => {
                if multiple && !args.json {
                    println!("# {path}");
                }
                print!("{output}");
            }
            Err(err) => {
                eprintln!("{err}");
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        json: false,
        trace: false,
        options: OptimizeOptions::default(),
        files: Vec::new(),
    };
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--json" => args.json = true,
            "--trace" => args.trace = true,
            "--no-hoist" => args.options.hoist_invariants = false,
            "--no-dce" => args.options.remove_useless = false,
            "--max-rounds" => {
                let value = raw.next().ok_or("--max-rounds needs a value")?;
                let rounds = value
                    .parse()
                    .map_err(|err| format!("invalid --max-rounds value {value:?}: {err}"))?;
                args.options.max_rounds = rounds;
            }
            "-h" | "--help" => return Err("help requested".to_owned()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ => args.files.push(arg),
        }
    }
    if args.files.is_empty() {
        return Err("no input files".to_owned());
    }
    Ok(args)
}

/// Reads, optimizes and renders one file; errors are prefixed with its path.
fn process(path: &str, args: &Args) -> Result<String, String> {
    let source = fs::read_to_string(path).map_err(|err| format!("{path}: {err}"))?;
    let module = parse(&source).map_err(|err| format!("{path}:{err}"))?;
    let mut optimizer = Optimizer::new(args.options.clone());
    let optimized = if args.trace {
        optimizer.with_tracer(StderrTracer::with_label(path)).optimize(module)
    } else {
        optimizer.optimize(module)
    };
    let module = optimized.map_err(|err| match err {
        OptimizeError::NoFixpoint { .. } => format!("{path}: {err}"),
        _ => format!("{path}:{err}"),
    })?;
    if args.json {
        to_json(&module).map_err(|err| format!("{path}: {err}"))
    } else {
        Ok(render(&module))
    }
}

fn to_json(module: &Module) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(module)?;
    json.push('\n');
    Ok(json)
}
