//! App Control policy simulator CLI
//!
//! Evaluates files against a policy model and prints one verdict per file,
//! plus helpers to inspect a single file's hashes and signers.

use appcontrol_simulator::{
    adapters::{PortableHashPrimitive, PortableTrustVerifier},
    infra::progress::{ProgressFactory, ProgressStyle},
    services::{collect_files, HashEngine, SignerExtractor},
    ConfigManager, ExportFormat, PolicyModel, Simulation, SimulationRequest,
};
use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "appcontrol-sim")]
#[command(about = "Simulate App Control (WDAC) policy decisions for files")]
#[command(long_about = "
App Control Simulator - predicts whether a code integrity policy allows files to run

EXAMPLES:
    # Simulate a policy over a folder
    appcontrol-sim simulate --policy policy.json --folder C:\\Tools

    # Write verdicts as JSON and skip catalog scanning
    appcontrol-sim simulate --policy policy.toml --file app.exe --no-catalogs -o verdicts.json

    # Show every authenticode digest of a file
    appcontrol-sim hashes app.exe --all

    # List the signers of a file
    appcontrol-sim signers app.exe

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a policy over files and folders
    Simulate {
        /// Policy model (.json or .toml)
        #[arg(short, long, value_name = "POLICY_FILE")]
        policy: PathBuf,

        /// File to evaluate (repeatable)
        #[arg(short, long = "file", value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Folder searched recursively for supported files (repeatable)
        #[arg(short = 'd', long = "folder", value_name = "FOLDER")]
        folders: Vec<PathBuf>,

        /// Worker thread count (defaults to the configured value)
        #[arg(short, long)]
        threads: Option<u16>,

        /// Catalog root directory (repeatable, overrides configuration)
        #[arg(long = "catalog-root", value_name = "DIR")]
        catalog_roots: Vec<PathBuf>,

        /// Do not scan security catalogs
        #[arg(long)]
        no_catalogs: bool,

        /// Write the verdicts as JSON to this file
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: Option<PathBuf>,

        /// Progress indicator style
        #[arg(long, value_enum)]
        progress: Option<ProgressStyleArg>,

        /// Disable progress indicators
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the authenticode and page hashes of a file
    Hashes {
        file: PathBuf,

        /// Include SHA-384/512, SHA3 and flat digests
        #[arg(long)]
        all: bool,
    },

    /// Print the signers and certificate chains of a file
    Signers { file: PathBuf },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Create default configuration file
    Init,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Export configuration
    Export {
        /// Export format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import configuration
    Import {
        /// Configuration file to import
        file: PathBuf,
        /// Import format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
    },
}

#[derive(ValueEnum, Clone)]
enum ProgressStyleArg {
    Percentage,
    Bar,
    Silent,
}

impl From<ProgressStyleArg> for ProgressStyle {
    fn from(arg: ProgressStyleArg) -> Self {
        match arg {
            ProgressStyleArg::Percentage => ProgressStyle::Percentage,
            ProgressStyleArg::Bar => ProgressStyle::ProgressBar,
            ProgressStyleArg::Silent => ProgressStyle::Silent,
        }
    }
}

#[derive(ValueEnum, Clone)]
enum ExportFormatArg {
    Toml,
    Json,
    Yaml,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Toml => ExportFormat::Toml,
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

/// Parameters for the simulate command
struct SimulateCommandArgs {
    policy: PathBuf,
    files: Vec<PathBuf>,
    folders: Vec<PathBuf>,
    threads: Option<u16>,
    catalog_roots: Vec<PathBuf>,
    no_catalogs: bool,
    output: Option<PathBuf>,
    progress: Option<ProgressStyleArg>,
    no_progress: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Simulate {
            policy,
            files,
            folders,
            threads,
            catalog_roots,
            no_catalogs,
            output,
            progress,
            no_progress,
        } => {
            let args = SimulateCommandArgs {
                policy,
                files,
                folders,
                threads,
                catalog_roots,
                no_catalogs,
                output,
                progress,
                no_progress,
            };
            handle_simulate_command(args)?;
        }

        Commands::Hashes { file, all } => {
            handle_hashes_command(file, all)?;
        }

        Commands::Signers { file } => {
            handle_signers_command(file)?;
        }

        Commands::Config(config_cmd) => {
            handle_config_command(config_cmd)?;
        }
    }

    Ok(())
}

fn handle_simulate_command(args: SimulateCommandArgs) -> Result<()> {
    let config = ConfigManager::new()?.load_or_default()?;
    let policy = PolicyModel::load(&args.policy)?;
    let files = collect_files(&args.files, &args.folders)?;

    let catalog_roots = if args.no_catalogs {
        None
    } else if !args.catalog_roots.is_empty() {
        Some(args.catalog_roots)
    } else {
        config.effective_catalog_roots()
    };
    let threads = usize::from(args.threads.unwrap_or(config.threads));

    let style = if args.no_progress {
        ProgressStyle::Silent
    } else {
        args.progress
            .map(ProgressStyle::from)
            .unwrap_or_else(|| ProgressFactory::suggest_style(files.len()))
    };
    let reporter = ProgressFactory::create_reporter(style);

    let request = SimulationRequest::new(files)
        .with_threads(threads)
        .with_catalog_roots(catalog_roots);
    let report = Simulation::new(policy)
        .with_config(config)
        .with_progress(reporter)
        .run(&request)?;

    for verdict in report.sorted() {
        let status = if verdict.is_authorized() {
            "ALLOWED"
        } else {
            "BLOCKED"
        };
        println!(
            "{status:<8} {:<14} {}  [{}]",
            verdict.source().as_str(),
            verdict.file_path().display(),
            verdict.reason()
        );
    }

    println!();
    println!("Summary:");
    for (source, count) in report.summary() {
        println!("  {source:<14} {count}");
    }
    if report.is_cancelled() {
        println!("  (cancelled before all files were evaluated)");
    }

    if let Some(output) = args.output {
        std::fs::write(&output, report.to_json()?).into_diagnostic()?;
        println!("Verdicts written to: {}", output.display());
    }

    Ok(())
}

fn handle_hashes_command(file: PathBuf, all: bool) -> Result<()> {
    let config = ConfigManager::new()?.load_or_default()?;
    let engine = HashEngine::from_config(Arc::new(PortableHashPrimitive::new()), &config);

    let rendered = if all {
        serde_json::to_string_pretty(&engine.all_hashes(&file)?)
    } else {
        serde_json::to_string_pretty(&engine.ci_hashes(&file)?)
    }
    .into_diagnostic()?;
    println!("{rendered}");
    Ok(())
}

fn handle_signers_command(file: PathBuf) -> Result<()> {
    let extractor = SignerExtractor::new(Arc::new(PortableTrustVerifier::new()));
    let records = extractor.extract(&file)?;

    if records.is_empty() {
        println!("No embedded signers: {}", file.display());
        return Ok(());
    }

    for (index, record) in records.iter().enumerate() {
        println!("Signer #{index}");
        let ekus = record.signer_ekus();
        if !ekus.is_empty() {
            println!("  EKUs: {}", ekus.join(", "));
        }
        let chain = record.chain();
        for (position, cert) in chain.elements().iter().enumerate() {
            let role = if position + 1 == chain.len() {
                "root"
            } else if position == 0 {
                "leaf"
            } else {
                "intermediate"
            };
            println!("  [{role}] {}", cert.subject_cn());
            println!("      issuer:    {}", cert.issuer_cn());
            println!("      not after: {}", cert.not_after());
            println!("      TBS hash:  {}", cert.tbs_hash());
        }
    }
    Ok(())
}

fn handle_config_command(config_cmd: ConfigCommands) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    match config_cmd {
        ConfigCommands::Show => match config_manager.load() {
            Ok(config) => {
                println!("Current Configuration:");
                println!("  Worker threads: {}", config.threads);
                println!("  Scan security catalogs: {}", config.scan_security_catalogs);
                for root in &config.catalog_roots {
                    println!("  Catalog root: {}", root.display());
                }
                println!(
                    "  Unsigned extensions: {}",
                    config.unsigned_extensions.join(" ")
                );
                println!("  Hash chunk size: {} MiB", config.hash_chunk_size_mib);
                println!("  Progress interval: {} ms", config.progress_interval_ms);
                println!("  Flat hashes: {}", config.compute_flat_hashes);
                println!(
                    "  Configuration file: {}",
                    config_manager.config_path().display()
                );
            }
            Err(_) => {
                println!("No configuration file found. Use 'config init' to create one.");
            }
        },

        ConfigCommands::Init => {
            let _config = config_manager.load_or_create_default()?;
            println!(
                "Configuration initialized: {}",
                config_manager.config_path().display()
            );
            println!("   Edit the file to customize settings, or use 'config set' commands.");
        }

        ConfigCommands::Set { key, value } => {
            config_manager.update_value(&key, &value)?;
            println!("Configuration updated: {key} = {value}");
        }

        ConfigCommands::Export { format, output } => {
            let content = config_manager.export_config(format.into())?;

            if let Some(output_path) = output {
                std::fs::write(&output_path, content).into_diagnostic()?;
                println!("Configuration exported to: {}", output_path.display());
            } else {
                println!("{content}");
            }
        }

        ConfigCommands::Import { file, format } => {
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            config_manager.import_config(&content, format.into())?;
            println!("Configuration imported from: {}", file.display());
        }
    }

    Ok(())
}
