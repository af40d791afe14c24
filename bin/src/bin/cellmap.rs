use cellmap::{Config, RootPosition};
use cellmap_bin::{
    cli::{Cli, Command},
    commands,
};
use cellmap_log::LogConfig;
use clap::Parser;
use std::path::PathBuf;

fn discovered_config() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("cellmap").join("config.toml");
    path.exists().then_some(path)
}

fn main() {
    let cli = Cli::parse();

    let log_guard = match cellmap_log::init(LogConfig {
        log_file_path: cli.log_file.clone(),
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {e}");
            None
        },
    };

    let discovered = discovered_config();
    let config = Config::load_with_overrides(cli.config.as_deref(), discovered.as_deref())
        .unwrap_or_else(|e| {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        });

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Command::Dump { notebook } => commands::dump::run(&config, &notebook, &mut stdout),
        Command::Resolve {
            notebook,
            line,
            column,
        } => commands::resolve::run(
            &config,
            &notebook,
            RootPosition::new(line, column),
            &mut stdout,
        ),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        eprintln!("Command failed: {e:#}");
        drop(log_guard);
        std::process::exit(1);
    }
}
