use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use irbridge::{inspect, transpile, TargetProfile, TranspileOptions};
use irbridge::{OverflowPolicy, UnknownIntrinsicPolicy};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// irbridge: LLVM IR to safe Rust translator with emulated exceptions.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a textual LLVM IR module (.ll) to Rust
    Translate(TranslateArgs),
    /// List the functions of a generated Rust file
    Inspect {
        /// Generated Rust source file
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct TranslateArgs {
    /// Input LLVM IR module (.ll)
    input: PathBuf,

    /// Output Rust source file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Target profile (JSON)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Resolve unregistered declarations through `Context::call_external`
    #[arg(long)]
    allow_external_calls: bool,

    /// Ignore nsw/nuw/exact flags instead of trapping on violations
    #[arg(long)]
    wrap_overflow: bool,

    /// Statement limit per function
    #[arg(long)]
    max_statements: Option<usize>,

    /// Drop provably dead exception checks
    #[arg(long)]
    elide_checks: bool,

    /// Translate functions on a single thread
    #[arg(long)]
    no_parallel: bool,
}

impl TranslateArgs {
    fn options(&self) -> Result<TranspileOptions> {
        let mut profile = match &self.profile {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                TargetProfile::from_json(&text)
                    .with_context(|| format!("invalid target profile {}", path.display()))?
            }
            None => TargetProfile::default(),
        };
        if self.allow_external_calls {
            profile.unknown_intrinsics = UnknownIntrinsicPolicy::External;
        }
        if self.wrap_overflow {
            profile.overflow = OverflowPolicy::Wrap;
        }
        if let Some(limit) = self.max_statements {
            profile.max_statements = limit;
        }
        if self.elide_checks {
            profile.elide_proven_checks = true;
        }
        Ok(TranspileOptions {
            profile,
            parallel: !self.no_parallel,
        })
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn translate(args: &TranslateArgs) -> Result<()> {
    eprintln!("irbridge: translating {}", args.input.display());

    let source =
        fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    let options = args.options()?;

    let rust_code = transpile(&source, &options).context("translation failed")?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &rust_code)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("irbridge: wrote {}", output_path.display());
    } else {
        print!("{}", rust_code);
    }

    eprintln!("irbridge: translation complete");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Translate(args) => translate(args),
        Command::Inspect { file } => {
            let source = fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let summary = inspect(&source);
            for (name, blocks) in &summary.functions {
                println!("{name}\t{blocks}");
            }
            eprintln!(
                "irbridge: {} functions, {} blocks",
                summary.functions.len(),
                summary.block_count()
            );
            Ok(())
        }
    }
}
