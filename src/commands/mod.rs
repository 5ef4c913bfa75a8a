pub mod config;
pub mod probe;
pub mod run;

use std::sync::Arc;

use anyhow::Result;

use crate::{
    audio,
    cli::{Cli, Commands},
    launcher::SystemLauncher,
    sensing::SystemWindowInspector,
    settings::SettingsStore,
    timer::Collaborators,
};

pub async fn dispatch(cli: Cli) -> Result<()> {
    let store = SettingsStore::new(cli.config);

    match cli.command {
        Commands::Run => run::run(&store, system_collaborators()).await,
        Commands::Config { action } => config::run(&store, action),
        Commands::Schedule { json } => config::print_schedule(&store.snapshot(), json),
        Commands::Window { watch } => probe::window(watch).await,
        Commands::Sound { stage, secs } => probe::sound(&store.snapshot(), stage, secs).await,
    }
}

/// The real OS-backed collaborators used outside tests.
pub fn system_collaborators() -> Collaborators {
    Collaborators {
        inspector: Arc::new(SystemWindowInspector::new()),
        player: audio::default_player(),
        launcher: Arc::new(SystemLauncher::new()),
    }
}
