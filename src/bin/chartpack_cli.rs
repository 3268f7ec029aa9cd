//! Chartpack CLI - export chart archives from the command line
//!
//! Commands: export, inspect, default-config
//! Outputs JSON to stdout, logs to stderr
//! Returns 1 on bad input, 2 on export failure

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use chartpack::{
    items::load_items, read_entry_names, resolve_text_engine, telemetry, DirectoryHost,
    ExportConfig, ExportPipeline, PlotRenderer,
};

#[derive(Parser)]
#[command(name = "chartpack-cli")]
#[command(about = "Chartpack CLI - render charts into an annotated image archive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Render items into an archive
    Export {
        /// JSON array of export items
        #[arg(short, long)]
        items: PathBuf,

        /// Directory the archive is delivered into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Archive file name
        #[arg(short, long, default_value = "charts.zip")]
        archive_name: String,

        /// Configuration file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the entries of an archive
    Inspect {
        archive: PathBuf,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message.to_string() });
    println!("{}", output);
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = telemetry::init_tracing(telemetry::level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Export { items, output_dir, archive_name, config } => {
            let config = match config {
                Some(path) => match ExportConfig::load(&path) {
                    Ok(c) => c,
                    Err(e) => return fail(e),
                },
                None => ExportConfig::default(),
            };

            let items = match load_items(&items) {
                Ok(i) => i,
                Err(e) => return fail(format!("Invalid items: {}", e)),
            };
            if items.is_empty() {
                return fail("Nothing to export: the item list is empty");
            }

            let text = match resolve_text_engine(&config.fonts) {
                Ok(t) => t,
                Err(e) => return fail(e),
            };
            let pipeline = match ExportPipeline::new(config, Box::new(PlotRenderer), text) {
                Ok(p) => p,
                Err(e) => return fail(e),
            };

            let host = DirectoryHost::new(output_dir);
            match pipeline.export_as_archive(&items, &archive_name, &host) {
                Ok(report) => {
                    let output = serde_json::json!({
                        "success": true,
                        "report": report,
                    });
                    match serde_json::to_string_pretty(&output) {
                        Ok(json) => {
                            println!("{}", json);
                            ExitCode::SUCCESS
                        }
                        Err(e) => fail(e),
                    }
                }
                Err(e) => {
                    error!(error = %e, "export aborted");
                    let output = serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                    });
                    println!("{}", output);
                    ExitCode::from(2)
                }
            }
        }

        Commands::Inspect { archive } => {
            let bytes = match fs::read(&archive) {
                Ok(b) => b,
                Err(e) => return fail(format!("Failed to read {}: {}", archive.display(), e)),
            };
            match read_entry_names(&bytes) {
                Ok(names) => {
                    let output = serde_json::json!({ "success": true, "entries": names });
                    println!("{}", output);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::DefaultConfig => match ExportConfig::default().to_toml() {
            Ok(toml) => {
                print!("{}", toml);
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },
    }
}
