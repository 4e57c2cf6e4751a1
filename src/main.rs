//! elm-watch - watch-mode build orchestrator for Elm with hot reload.

mod actor;
mod cache;
mod cli;
mod compiler;
mod config;
mod core;
mod deps;
mod logger;
mod project;
mod reload;
mod utils;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ColorChoice, Parser};

use actor::{CompilerSettings, Coordinator, RunSummary};
use cache::PersistedState;
use cli::{Cli, Commands};
use config::WatchConfig;
use crate::core::RunMode;
use project::Project;
use utils::path::{normalize_path, resolve_path};

fn main() -> Result<()> {
    // Before anything blocks, so Ctrl+C always works
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    logger::set_verbose(cli.verbose);

    let cwd = std::env::current_dir().context("cannot read the current directory")?;
    let config = WatchConfig::discover(&normalize_path(&cwd))?;
    crate::debug!("config"; "loaded {}", config.config_path.display());

    let (run_mode, mode) = match &cli.command {
        Commands::Make { args } => (RunMode::Make, Some(args.mode())),
        Commands::Hot { .. } => (RunMode::Hot, None),
    };

    let persisted = cache::restore_state(&config.root).unwrap_or_else(|e| {
        crate::debug!("cache"; "ignoring saved state: {}", e);
        PersistedState::new()
    });

    let filters = cli.target_filters();
    let project = Project::from_config(&config, filters, mode, &persisted);
    if !filters.is_empty() && project.targets().all(|t| t.disabled) {
        let names: Vec<&str> = project.names().collect();
        bail!(
            "no target matches {}; available targets: {}",
            filters.join(", "),
            names.join(", ")
        );
    }

    let settings = CompilerSettings {
        compiler: resolve_compiler(&config.compiler, &config.root)?,
        postprocess: config.postprocess.clone(),
        run_mode,
        root: config.root.clone(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let coordinator = Coordinator::new(config, project, persisted, settings);
    match run_mode {
        RunMode::Make => {
            let summary = runtime.block_on(coordinator.run_make());
            report_make(&summary);
            if !summary.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        RunMode::Hot => {
            let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
            core::register_shutdown(shutdown_tx);
            runtime.block_on(coordinator.with_shutdown_signal(shutdown_rx).run_hot())
        }
    }
}

/// A bare name is looked up in `PATH`; anything with a directory part is
/// relative to `elm-watch.json`.
fn resolve_compiler(name: &str, root: &Path) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return Ok(resolve_path(path, root));
    }
    which::which(name).with_context(|| format!("compiler `{name}` not found in PATH"))
}

fn report_make(summary: &RunSummary) {
    for (name, error) in &summary.failed {
        crate::log!("error"; "{}", name);
        eprintln!("{error}\n");
    }
    if summary.is_success() {
        crate::log!("make"; "{} compiled", summary.compiled);
    } else {
        crate::log!("make"; "{} compiled, {} failed", summary.compiled, summary.failed.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_compiler_relative_path() {
        let resolved = resolve_compiler("node_modules/.bin/elm", Path::new("/app")).unwrap();
        assert_eq!(resolved, PathBuf::from("/app/node_modules/.bin/elm"));
    }

    #[test]
    fn test_resolve_compiler_missing_bare_name() {
        assert!(resolve_compiler("surely-not-an-installed-compiler-x9", Path::new("/app")).is_err());
    }
}
