pub mod audio;
pub mod cli;
pub mod commands;
pub mod error;
pub mod launcher;
pub mod sensing;
pub mod settings;
pub mod timer;
mod utils;

use clap::Parser;

use cli::Cli;

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging (RUST_LOG overrides the default level)
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    log::debug!("pomoguard starting with settings at {}", cli.config.display());

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(commands::dispatch(cli)));

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
