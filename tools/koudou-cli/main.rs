use clap::{Parser, Subcommand};
use koudou::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Validate, run and convert behavior tree documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a document, check its graph and compile it
    Validate {
        /// Path to a JSON or binary tree document
        document: PathBuf,
    },
    /// Compile a document and drive it for a number of logical ticks
    Run {
        document: PathBuf,
        /// Number of logical ticks to perform
        #[arg(short, long, default_value_t = 10)]
        ticks: u32,
        /// Executor configuration as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Seed for probabilistic nodes, overriding the configuration
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Re-encode a document
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Write the compact binary encoding instead of JSON
        #[arg(short, long)]
        binary: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Validate { document } => validate(&document),
        Command::Run {
            document,
            ticks,
            config,
            seed,
        } => run(&document, ticks, config.as_deref(), seed),
        Command::Convert {
            input,
            output,
            binary,
        } => convert(&input, &output, binary),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load(path: &Path) -> Result<TreeDocument> {
    let bytes = fs::read(path)
        .map_err(|e| format!("Could not read '{}': {}", path.display(), e))?;
    Ok(TreeDocument::decode(&bytes)?)
}

fn validate(path: &Path) -> Result<()> {
    let workspace = load(path)?.into_workspace(TemplateRegistry::builtin())?;
    let tree = workspace.build(&TreeBuilder::new())?;

    println!("Document '{}' is valid", workspace.metadata().name);
    println!("  nodes:       {}", workspace.graph().len());
    println!("  connections: {}", workspace.graph().connections().len());
    println!("  compiled:    {}", tree.len());
    for id in tree.excluded() {
        println!("  excluded:    {} (not reachable from the root)", id);
    }
    for scope in [Scope::Local, Scope::Global] {
        for variable in workspace.variables(scope) {
            println!(
                "  variable:    {} [{}] {} = {}",
                variable.name, scope, variable.value_type, variable.value
            );
        }
    }
    Ok(())
}

fn run(path: &Path, ticks: u32, config_path: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let workspace = load(path)?.into_workspace(TemplateRegistry::builtin())?;
    let mut config = match config_path {
        Some(config_path) => {
            let json = fs::read_to_string(config_path)
                .map_err(|e| format!("Could not read '{}': {}", config_path.display(), e))?;
            ExecutorConfig::from_json(&json)?
        }
        None => ExecutorConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = Some(seed);
    }

    let tree = workspace.build(&TreeBuilder::new())?;
    let interval = config.tick_interval;
    let mut executor = workspace.executor(tree, config);
    executor.on_report(|report| {
        println!(
            "tick {:>4} ({:.2}s) root={}",
            report.tick,
            report.elapsed,
            report.root_status()
        );
        for (id, status) in &report.statuses {
            println!("    {:<24} {}", id, status);
        }
        for line in &report.logs {
            println!("    {}", line);
        }
    });

    executor.start()?;
    for _ in 0..ticks {
        executor.tick(interval)?;
    }
    executor.stop()?;
    Ok(())
}

fn convert(input: &Path, output: &Path, binary: bool) -> Result<()> {
    let document = load(input)?;
    let bytes = if binary {
        document.to_bytes()?
    } else {
        document.to_json_pretty()?.into_bytes()
    };
    fs::write(output, &bytes)
        .map_err(|e| format!("Could not write '{}': {}", output.display(), e))?;
    println!(
        "Wrote {} ({} bytes, {})",
        output.display(),
        bytes.len(),
        if binary { "binary" } else { "json" }
    );
    Ok(())
}
