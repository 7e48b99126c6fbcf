use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use php_prefixer::{
    LocalFileSystem, MemoryFileSystem, Pipeline, PrefixError, PrefixerConfig,
};

/// Prefix the namespaces, classes, functions and constants of a PHP
/// project's dependencies.
#[derive(Parser, Debug)]
#[command(name = "php-prefixer", version, about)]
struct Cli {
    /// Project root holding composer.json.
    #[arg(default_value = ".")]
    project_dir: PathBuf,

    /// Read configuration from a TOML file instead of composer.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the dependency copies, relative to the project.
    #[arg(long)]
    target_directory: Option<String>,

    /// Report what would change without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Do not generate the aliases file.
    #[arg(long)]
    no_aliases: bool,

    /// Also rewrite references in the project's own files.
    #[arg(long)]
    update_call_sites: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<PrefixerConfig, PrefixError> {
    let mut config = match &cli.config {
        Some(path) => PrefixerConfig::from_toml_file(path)?,
        None => PrefixerConfig::from_composer_json(&cli.project_dir)?,
    };
    if let Some(dir) = &cli.target_directory {
        config.target_directory = dir.clone();
    }
    if cli.no_aliases {
        config.include_aliases = false;
    }
    if cli.update_call_sites {
        config.update_call_sites = true;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), PrefixError> {
    let config = load_config(cli)?;
    let pipeline = Pipeline::new(config, &cli.project_dir);

    if cli.dry_run {
        let fs = MemoryFileSystem::overlay();
        let report = pipeline.run(&fs)?;
        for path in fs.written_paths() {
            info!("would write {}", path.display());
        }
        info!("dry run: {}", report);
    } else {
        pipeline.run(&LocalFileSystem)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
