//! Command runners.
//!
//! Wires config, the API client, playback and terminal output together
//! for each subcommand.

use crate::api::{ApiClient, evaluate_or_message};
use crate::catalog;
use crate::config::{Config, Pace};
use crate::error::{PrevisitError, Result};
use crate::output;
use crate::playback::{
    AudioPlayer, NullAudioPlayer, PlaybackControls, PlaybackOutcome, PlaybackSettings,
    PlaybackStatus, TerminalSink,
};
use crate::report::{compute_diff, render_markdown};
use crate::session::{Session, SessionParams};
use std::io::{BufRead, IsTerminal, Read};
use std::path::Path;

/// Options for `previsit play`.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub patient: String,
    pub condition: String,
    pub server: Option<String>,
    pub no_audio: bool,
    pub slow: bool,
    pub device: Option<String>,
    pub evaluate: bool,
    pub no_thinking: bool,
    pub no_report: bool,
    pub quiet: bool,
}

/// Apply `--server`, falling back to the configured URL.
pub fn client_for(config: &Config, server: Option<&str>) -> Result<ApiClient> {
    ApiClient::new(server.unwrap_or(&config.server.url))
}

/// Initial playback settings from config and CLI flags.
pub fn initial_settings(config: &Config, no_audio: bool, slow: bool) -> PlaybackSettings {
    PlaybackSettings {
        audio_enabled: config.playback.audio && !no_audio,
        pace: if slow { Pace::Slow } else { config.playback.pace },
    }
}

/// Pick an audio player. The flag is false when no output could be opened;
/// playback then starts with audio off.
#[cfg(feature = "audio-playback")]
fn audio_player(client: &ApiClient, device: Option<String>) -> (Box<dyn AudioPlayer>, bool) {
    use crate::playback::RodioPlayer;

    let player = RodioPlayer::new(device).with_client(client.clone());
    match player.probe() {
        Ok(()) => (Box::new(player), true),
        Err(e) => {
            tracing::warn!("audio output unavailable: {e}");
            (Box::new(NullAudioPlayer), false)
        }
    }
}

#[cfg(not(feature = "audio-playback"))]
fn audio_player(_client: &ApiClient, _device: Option<String>) -> (Box<dyn AudioPlayer>, bool) {
    (Box::new(NullAudioPlayer), false)
}

/// Check the selection against the catalog when the backend offers one.
async fn validate_selection(client: &ApiClient, params: &SessionParams) -> Result<()> {
    let catalog = match catalog::load(client).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!("could not load patient catalog, skipping validation: {e}");
            return Ok(());
        }
    };
    catalog.patient(&params.patient)?;
    if !catalog.conditions.is_empty() && !catalog.has_condition(&params.condition) {
        tracing::warn!(
            "condition '{}' is not in the catalog; the backend may reject it",
            params.condition
        );
    }
    Ok(())
}

/// One interactive command line: `a`, `s` or `q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ToggleAudio,
    TogglePace,
    Quit,
}

impl KeyCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "a" | "audio" => Some(Self::ToggleAudio),
            "s" | "speed" | "pace" => Some(Self::TogglePace),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }

    /// Returns false once playback is gone.
    fn apply(self, controls: &PlaybackControls) -> bool {
        match self {
            Self::ToggleAudio => controls.toggle_audio(),
            Self::TogglePace => controls.toggle_pace(),
            Self::Quit => {
                controls.teardown();
                false
            }
        }
    }
}

/// Read key commands on a detached thread; a blocking stdin read cannot be
/// cancelled, so it must not hold up runtime shutdown.
fn spawn_key_commands(controls: PlaybackControls) {
    let spawned = std::thread::Builder::new()
        .name("key-commands".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match KeyCommand::parse(&line) {
                    Some(command) => {
                        if !command.apply(&controls) {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!(
                        "{}",
                        output::render_error("Commands: a (audio), s (pace), q (quit)")
                    ),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("interactive commands unavailable: {e}");
    }
}

/// Run `previsit play`: stream one interview and play it in the terminal.
pub async fn run_play(config: Config, options: PlayOptions) -> Result<PlaybackOutcome> {
    let client = client_for(&config, options.server.as_deref())?;
    let params = SessionParams::new(options.patient, options.condition);
    validate_selection(&client, &params).await?;

    let mut settings = initial_settings(&config, options.no_audio, options.slow);
    let device = options.device.or_else(|| config.playback.device.clone());
    let (audio, available) = if settings.audio_enabled {
        audio_player(&client, device)
    } else {
        (Box::new(NullAudioPlayer) as Box<dyn AudioPlayer>, false)
    };
    if settings.audio_enabled && !available {
        settings.audio_enabled = false;
        if !options.quiet {
            eprintln!("No audio output available; pacing by timer.");
        }
    }

    if !options.quiet {
        eprintln!(
            "Interviewing {} ({}). {}",
            params.patient,
            params.condition,
            output::render_settings(settings)
        );
    }

    let sink = TerminalSink::new()
        .with_thinking(!options.no_thinking)
        .with_reports(!options.no_report);
    let mut session = Session::start(&client, params, settings, audio, Box::new(sink));
    if std::io::stdin().is_terminal() {
        spawn_key_commands(session.controls());
        if !options.quiet {
            eprintln!("Type a + Enter to toggle audio, s + Enter to toggle pace, q + Enter to quit.");
        }
    }

    let outcome = tokio::select! {
        outcome = session.finished() => outcome,
        _ = tokio::signal::ctrl_c() => {
            output::clear_line();
            session.close();
            session.finished().await
        }
    };
    let outcome = outcome?;

    if options.evaluate {
        match (&outcome.status, outcome.report.current()) {
            (PlaybackStatus::Complete, Some(report)) => {
                let condition = &session.params().condition;
                let evaluation = evaluate_or_message(&client, report, condition).await;
                println!("\n{}", output::html_to_terminal(&evaluation));
            }
            (PlaybackStatus::Complete, None) => {
                eprintln!("{}", output::render_error("No report to evaluate."));
            }
            _ => tracing::info!("skipping evaluation: interview did not complete"),
        }
    }
    Ok(outcome)
}

/// Read report text from a file, or stdin when no path is given.
pub fn read_report(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

/// Report HTML from raw input: rendered from markdown unless already HTML.
pub fn report_html(text: &str, is_html: bool) -> String {
    if is_html {
        text.to_string()
    } else {
        render_markdown(text)
    }
}

/// Run `previsit evaluate`.
pub async fn run_evaluate(
    config: &Config,
    condition: &str,
    report: Option<&Path>,
    is_html: bool,
    server: Option<&str>,
) -> Result<()> {
    let client = client_for(config, server)?;
    let html = report_html(&read_report(report)?, is_html);
    if html.trim().is_empty() {
        return Err(PrevisitError::Other("report is empty".to_string()));
    }
    let evaluation = evaluate_or_message(&client, &html, condition).await;
    println!("{}", output::html_to_terminal(&evaluation));
    Ok(())
}

/// Annotated diff of two revisions.
pub fn diff_files(old: &Path, new: &Path, is_html: bool) -> Result<String> {
    let previous = report_html(&std::fs::read_to_string(old)?, is_html);
    let current = report_html(&std::fs::read_to_string(new)?, is_html);
    Ok(compute_diff(&previous, &current))
}

/// Run `previsit diff`.
pub fn run_diff(old: &Path, new: &Path, is_html: bool, raw: bool) -> Result<()> {
    let diff = diff_files(old, new, is_html)?;
    if raw {
        print!("{diff}");
    } else {
        println!("{}", output::html_to_terminal(&diff));
    }
    Ok(())
}

/// Run `previsit patients`.
pub async fn run_patients(config: &Config, server: Option<&str>) -> Result<()> {
    let client = client_for(config, server)?;
    let catalog = catalog::load(&client).await?;

    println!("Patients:");
    for patient in &catalog.patients {
        let details: Vec<&str> = [
            patient.age.as_deref(),
            patient.gender.as_deref(),
            patient.existing_condition.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if details.is_empty() {
            println!("  {}", patient.name);
        } else {
            println!("  {} ({})", patient.name, details.join(", "));
        }
    }

    if !catalog.conditions.is_empty() {
        println!("Conditions:");
        for condition in &catalog.conditions {
            match &condition.description {
                Some(description) => println!("  {}: {}", condition.name, description),
                None => println!("  {}", condition.name),
            }
        }
    }
    Ok(())
}

/// Run `previsit devices`.
#[cfg(feature = "audio-playback")]
pub fn run_devices() -> Result<()> {
    let devices = crate::playback::device::list_output_devices()?;
    if devices.is_empty() {
        return Err(PrevisitError::AudioDeviceNotFound {
            device: "any output".to_string(),
        });
    }
    println!(
        "Available audio output devices ({}):",
        crate::defaults::audio_backend()
    );
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{idx}] {device}");
    }
    Ok(())
}
