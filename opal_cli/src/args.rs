//! Command-line argument parsing.

use opal_gc::DEFAULT_GC_THRESHOLD;

/// Parsed invocation: `opal <file> [--no-jit] [--gc=N]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub file: String,
    pub jit_enabled: bool,
    pub gc_threshold: usize,
}

/// Parse raw arguments (excluding argv[0]).
pub fn parse(args: &[String]) -> Result<CliArgs, String> {
    let mut iter = args.iter();
    let file = iter
        .next()
        .ok_or_else(|| "usage: opal <file> [--no-jit] [--gc=N]".to_string())?
        .clone();

    let mut parsed = CliArgs {
        file,
        jit_enabled: true,
        gc_threshold: DEFAULT_GC_THRESHOLD,
    };

    for arg in iter {
        if arg == "--no-jit" {
            parsed.jit_enabled = false;
        } else if let Some(n) = arg.strip_prefix("--gc=") {
            parsed.gc_threshold = n
                .parse()
                .map_err(|_| format!("bad --gc value: {n}"))?;
        } else {
            return Err(format!("Unknown arg: {arg}"));
        }
    }

    Ok(parsed)
}
