use std::{
    io::{self, Read},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use bytecode_structure_analyzer::{
    analysis,
    contract::{BytecodeKind, Contract},
    listing::{Listing, ProgramDocument, SplitDocument, SplitListing},
    watchdog::{DeadlineWatchdog, LazyWatchdog},
};
use clap::Parser;

/// evm-dis - recovers basic blocks, jump labels and expressions from EVM
/// bytecode
#[derive(Debug, Parser)]
#[command(name = "evm-dis", version, about, long_about = None)]
struct Cli {
    /// File containing the hex-encoded bytecode. Reads stdin if omitted.
    #[arg(value_name = "FILE")]
    path: Option<PathBuf>,

    /// Strip the swarm metadata trailer before analysis (the default).
    #[arg(long, overrides_with = "no_swarm")]
    swarm: bool,

    /// Keep the swarm metadata trailer.
    #[arg(long, overrides_with = "swarm")]
    no_swarm: bool,

    /// Treat the input as creation bytecode and analyse the constructor and
    /// the deployed code separately.
    #[arg(long)]
    ctor: bool,

    /// Read the input as a compiled contract in JSON rather than as hex.
    #[arg(long)]
    compiled: bool,

    /// Emit output as JSON instead of a listing.
    #[arg(long)]
    json: bool,

    /// Enable debug-level logging output.
    #[arg(short = 'v', long = "log", alias = "verbose")]
    log: bool,

    /// The number of times, per block, that the analysis may revisit a block
    /// before giving up.
    #[arg(long, value_name = "FACTOR")]
    max_block_visits: Option<usize>,

    /// Give up on the analysis after this many milliseconds.
    #[arg(long, value_name = "MILLIS")]
    timeout: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Silent by default; --log enables debug; RUST_LOG overrides
    let level = if cli.log {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::new()
        .filter_module("bytecode_structure_analyzer", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    let kind = if cli.ctor {
        BytecodeKind::Creation
    } else {
        BytecodeKind::Deployed
    };
    let contract = match (&cli.path, cli.compiled) {
        (Some(path), true) => Contract::new_from_file(path, kind)?,
        (path, compiled) => {
            let input = read_input(path.as_ref())?;
            if compiled {
                Contract::from_compiled_json(&input, kind)?
            } else {
                let text = String::from_utf8(input).context("Input is not valid UTF-8")?;
                Contract::from_hex(&text)?
            }
        }
    };

    let strip_metadata = cli.swarm || !cli.no_swarm;
    let mut config = analysis::Config::default().with_strip_metadata(strip_metadata);
    if let Some(factor) = cli.max_block_visits {
        config = config.with_max_block_visits_factor(factor);
    }
    let watchdog = match cli.timeout {
        Some(millis) => DeadlineWatchdog::new(Duration::from_millis(millis)).in_rc(),
        None => LazyWatchdog.in_rc(),
    };
    let analyzer = bytecode_structure_analyzer::new(contract, config, watchdog);

    if cli.ctor {
        let split = analyzer.analyze_with_constructor()?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&SplitDocument::from(&split))?);
        } else {
            print!("{}", SplitListing::new(&split));
        }

        let failures: Vec<String> = split
            .failures()
            .map(|(part, errors)| format!("Analysis of the {part} part failed: {errors}"))
            .collect();
        if !failures.is_empty() {
            anyhow::bail!(failures.join("\n"));
        }
    } else {
        let program = analyzer.analyze()?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&ProgramDocument::from(&program))?);
        } else {
            print!("{}", Listing::new(&program));
        }
    }

    Ok(())
}

/// Reads the whole input from the file at `path`, or from stdin if there is
/// none.
fn read_input(path: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    if let Some(path) = path {
        return std::fs::read(path).with_context(|| format!("Could not read {}", path.display()));
    }

    let mut contents = vec![];
    io::stdin()
        .read_to_end(&mut contents)
        .context("Could not read stdin")?;
    Ok(contents)
}
