mod apply;
mod archive;
mod config;
mod create;
mod edit_script;
mod error;
mod file_kind;
mod instruction;
mod patch_format;
mod path_map;
mod util;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{BuildOptions, Exclusions, APP_SETTINGS_FILE};

#[derive(Parser)]
#[command(name = "forkpatch", about = "Share a derivative project as a patch against its baseline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (true, 0) => log::LevelFilter::Error,
            (_, 0) => log::LevelFilter::Warn,
            (_, 1) => log::LevelFilter::Info,
            (_, 2) => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a patch by comparing a modified tree against the baseline
    Create {
        /// Path to the unmodified baseline project
        #[arg(long)]
        baseline: PathBuf,
        /// Path to the modified (derivative) project
        #[arg(long)]
        modified: PathBuf,
        /// Output path for the patch file [default: <MODIFIED>.forkpatch]
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Settings file, relative to each root, holding the "Name" field
        #[arg(long, default_value = APP_SETTINGS_FILE)]
        settings_file: String,
        /// Additional directory name to skip; a leading `.` matches as a suffix (repeatable)
        #[arg(long = "exclude-dir")]
        exclude_dirs: Vec<String>,
        /// Additional file extension to skip (repeatable)
        #[arg(long = "exclude-ext")]
        exclude_exts: Vec<String>,
        /// Keep carriage returns instead of normalizing to the baseline's line endings
        #[arg(long)]
        keep_line_endings: bool,
    },
    /// Rebuild the modified tree from the baseline and a patch
    Apply {
        /// Path to the unmodified baseline project
        #[arg(long)]
        baseline: PathBuf,
        /// Path to the patch file
        #[arg(long, short)]
        patch: PathBuf,
        /// Directory to create [default: patch path without its extension]
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG, when set, refines the level chosen on the command line.
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Create {
            baseline,
            modified,
            output,
            settings_file,
            exclude_dirs,
            exclude_exts,
            keep_line_endings,
        } => {
            let output = output.unwrap_or_else(|| create::default_output(&modified));
            let options = BuildOptions {
                settings_file,
                exclusions: Exclusions::with_extra(exclude_dirs, exclude_exts),
                normalize_line_endings: !keep_line_endings,
            };

            if !cli.quiet {
                println!("Creating patch...");
                println!("  Baseline: {}", baseline.display());
                println!("  Modified: {}", modified.display());
                println!("  Output: {}", output.display());
            }

            let start = Instant::now();
            let summary = create::create_patch(&baseline, &modified, &output, &options).await?;
            let elapsed = start.elapsed();

            if !cli.quiet {
                println!("\nPatch created successfully!");
                println!("  Files unchanged: {}", summary.files_same);
                println!("  Files added: {}", summary.files_new);
                println!("  Files modified: {}", summary.files_diff);
                println!("  Paths excluded: {}", summary.files_excluded);
                println!("  Patch size: {} bytes", summary.archive_bytes);
                println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
            }
        }
        Commands::Apply {
            baseline,
            patch,
            output,
        } => {
            let output = output.unwrap_or_else(|| apply::default_output(&patch));

            if !cli.quiet {
                println!("Applying patch...");
                println!("  Baseline: {}", baseline.display());
                println!("  Patch: {}", patch.display());
                println!("  Output: {}", output.display());
            }

            let start = Instant::now();
            let summary = apply::apply_patch(&baseline, &patch, &output).await?;
            let elapsed = start.elapsed();

            if !cli.quiet {
                println!("\nPatch applied successfully!");
                println!("  Files copied: {}", summary.files_copied);
                println!("  Files added: {}", summary.files_added);
                println!("  Files patched: {}", summary.files_patched);
                println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
            }
        }
    }

    Ok(())
}
