use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use ferrosync_core::editor::NavigationTarget;
use ferrosync_core::{DocumentUri, SessionState, SyncCommand, SyncConfig, ViewerKind};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ferrosync")]
#[command(about = "SyncTeX search between your editor and a running PDF viewer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Highlight a source line in the viewer showing the compiled document
    Forward {
        /// Compiled document (PDF, DVI, ...)
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// 1-based source line
        #[arg(value_name = "LINE")]
        line: i32,
        /// Source file the line belongs to
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(long, default_value_t = 1)]
        column: i32,
        /// Only use a viewer that already shows the document
        #[arg(long)]
        no_spawn: bool,
        /// evince, xreader or atril
        #[arg(long)]
        viewer: Option<ViewerKind>,
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
    /// Print every backward search from the viewer showing the compiled document
    Listen {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        #[arg(long)]
        viewer: Option<ViewerKind>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Vim,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Forward {
            output,
            line,
            input,
            column,
            no_spawn,
            viewer,
            timeout_ms,
        } => {
            let mut config = SyncConfig::load();
            config.spawn_viewer &= !no_spawn;
            if let Some(viewer) = viewer {
                config.viewer = viewer;
            }
            if let Some(ms) = timeout_ms {
                config.discovery_timeout_ms = ms;
            }
            forward(config, &output, &input, line, column).await
        }
        Commands::Listen {
            output,
            format,
            viewer,
        } => {
            let mut config = SyncConfig::load();
            config.spawn_viewer = false;
            if let Some(viewer) = viewer {
                config.viewer = viewer;
            }
            listen(config, &output, format).await
        }
    }
}

async fn forward(
    config: SyncConfig,
    output: &Path,
    input: &Path,
    line: i32,
    column: i32,
) -> anyhow::Result<()> {
    let output = resolve_existing(output)?;
    let input = absolute(input)?;
    let timeout = config.discovery_timeout();
    let uri = DocumentUri::from_path(&output)?;

    let registry = ferrosync_dbus::registry_from_config(config).await;
    let Some(session) = registry.session(&uri) else {
        bail!("viewer synchronization is unavailable");
    };
    session.forward(SyncCommand::now(input, line, column));

    if !session.wait_for_state(SessionState::Running, timeout).await {
        bail!("no viewer window showed {} within {:?}", uri, timeout);
    }
    log::info!("Forward search sent to {}", session.status().owner);
    Ok(())
}

async fn listen(config: SyncConfig, output: &Path, format: Format) -> anyhow::Result<()> {
    let output = resolve_existing(output)?;
    let uri = DocumentUri::from_path(&output)?;

    let registry = ferrosync_dbus::registry_from_config(config).await;
    if !registry.is_enabled() {
        bail!("viewer synchronization is unavailable");
    }
    registry.set_backward_search_handler(move |file: &Path, line, column| {
        let target = NavigationTarget::new(file, line, column);
        match format {
            Format::Json => match serde_json::to_string(&target) {
                Ok(json) => println!("{}", json),
                Err(e) => log::error!("Cannot encode {}: {}", file.display(), e),
            },
            Format::Vim => println!("{}", target.vim_command()),
        }
    });
    if registry.session(&uri).is_none() {
        bail!("viewer synchronization is unavailable");
    }
    log::info!("Listening for backward searches on {} (Ctrl-C to stop)", uri);

    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("cannot determine working directory")?
        .join(path))
}

/// Absolute form of an existing `path`. Symlinks are kept so the URI matches the one the
/// viewer was opened with.
fn resolve_existing(path: &Path) -> anyhow::Result<PathBuf> {
    let resolved = absolute(path)?;
    if !resolved.exists() {
        bail!("{} does not exist", path.display());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_resolve_keeps_symlinked_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("build").join("main.pdf");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"%PDF").unwrap();
        let link = dir.path().join("main.pdf");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(resolve_existing(&link).unwrap(), link);
    }

    #[test]
    fn test_resolve_rejects_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_existing(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn test_relative_path_joins_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("out/main.pdf")).unwrap(), cwd.join("out/main.pdf"));
    }
}
