//! Runs every `tests/cases/*.py` fixture: the program above the `# ---- optimized ----` line must
//! optimize to the text below it.

use std::{error::Error, fs, path::Path};

use pretty_assertions::assert_eq;
use pyprune::optimize_source;

const SEPARATOR: &str = "# ---- optimized ----\n";

fn run_case(path: &Path) -> Result<(), Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let (input, expected) = contents
        .split_once(SEPARATOR)
        .ok_or_else(|| format!("{}: missing `{}` line", path.display(), SEPARATOR.trim_end()))?;
    let optimized = optimize_source(input).map_err(|err| format!("{}:{err}", path.display()))?;
    assert_eq!(optimized, expected, "{}", path.display());
    // the output is already optimal
    assert_eq!(optimize_source(&optimized)?, optimized, "{} is not idempotent", path.display());
    Ok(())
}

datatest_stable::harness!(run_case, "tests/cases", r"^.*\.py$");
