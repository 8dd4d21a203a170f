use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use previsit::app::{self, PlayOptions};
use previsit::cli::{Cli, Commands, ConfigAction};
use previsit::config::Config;
use previsit::playback::PlaybackStatus;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    tracing::debug!("previsit {}", previsit::version_string());

    // Environment writes must happen while this is the only thread.
    #[cfg(feature = "audio-playback")]
    if matches!(cli.command, Commands::Play { .. } | Commands::Devices) {
        previsit::playback::device::suppress_audio_warnings();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Play {
            patient,
            condition,
            server,
            no_audio,
            slow,
            device,
            evaluate,
            no_thinking,
            no_report,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let outcome = app::run_play(
                config,
                PlayOptions {
                    patient,
                    condition,
                    server,
                    no_audio,
                    slow,
                    device,
                    evaluate,
                    no_thinking,
                    no_report,
                    quiet: cli.quiet,
                },
            )
            .await?;
            match outcome.status {
                PlaybackStatus::Complete => {}
                PlaybackStatus::TornDown => {
                    if !cli.quiet {
                        eprintln!("{}", "Stopped.".dimmed());
                    }
                }
                PlaybackStatus::Stalled(_) => std::process::exit(2),
            }
        }
        Commands::Evaluate {
            condition,
            report,
            html,
            server,
        } => {
            let config = load_config(cli.config.as_deref())?;
            app::run_evaluate(
                &config,
                &condition,
                report.as_deref(),
                html,
                server.as_deref(),
            )
            .await?;
        }
        Commands::Diff { old, new, html, raw } => {
            app::run_diff(&old, &new, html, raw)?;
        }
        Commands::Patients { server } => {
            let config = load_config(cli.config.as_deref())?;
            app::run_patients(&config, server.as_deref()).await?;
        }
        #[cfg(feature = "audio-playback")]
        Commands::Devices => {
            app::run_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "previsit",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("previsit={level},{}", fallback(level))));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();
}

/// Dependencies only speak up at warn or above.
fn fallback(level: &str) -> &'static str {
    if level == "error" { "error" } else { "warn" }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/previsit/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top of all three.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    let config_path = custom_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            let toml = config.to_toml().context("Failed to render configuration")?;
            println!("{} {}", "#".dimmed(), config_path.display().dimmed());
            print!("{toml}");
        }
        ConfigAction::Dump => {
            print!("{}", Config::dump_template());
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
            if !config_path.exists() {
                eprintln!("{}", "(not created yet; defaults apply)".yellow());
            }
        }
    }
    Ok(())
}
