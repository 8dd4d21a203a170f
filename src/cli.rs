//! Command-line interface for previsit
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Terminal player for simulated pre-visit intake interviews
#[derive(Parser, Debug)]
#[command(
    name = "previsit",
    version,
    about = "Terminal player for simulated pre-visit intake interviews"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream and play one interview
    Play {
        /// Patient name, as listed by `previsit patients`
        #[arg(long, value_name = "NAME")]
        patient: String,

        /// Condition to simulate
        #[arg(long, value_name = "NAME")]
        condition: String,

        /// Backend base URL (overrides config)
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Start with audio off (timer pacing)
        #[arg(long)]
        no_audio: bool,

        /// Start with the slow pace (3 s per message)
        #[arg(long)]
        slow: bool,

        /// Audio output device (overrides config)
        #[arg(long, value_name = "NAME")]
        device: Option<String>,

        /// Evaluate the final report once the interview completes
        #[arg(long)]
        evaluate: bool,

        /// Hide the interviewer's thinking lines
        #[arg(long)]
        no_thinking: bool,

        /// Hide the report pane
        #[arg(long)]
        no_report: bool,
    },

    /// Evaluate a report against a condition
    Evaluate {
        /// Condition the report should support
        #[arg(long, value_name = "NAME")]
        condition: String,

        /// Report file (markdown unless --html); reads stdin when omitted
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// The report is already HTML
        #[arg(long)]
        html: bool,

        /// Backend base URL (overrides config)
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Show the annotated difference between two report revisions
    Diff {
        /// Older revision
        old: PathBuf,

        /// Newer revision
        new: PathBuf,

        /// Inputs are HTML rather than markdown
        #[arg(long)]
        html: bool,

        /// Print the annotated HTML instead of terminal colors
        #[arg(long)]
        raw: bool,
    },

    /// List patients and conditions offered by the backend
    Patients {
        /// Backend base URL (overrides config)
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// List available audio output devices
    #[cfg(feature = "audio-playback")]
    Devices,

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file + environment)
    Show,
    /// Dump a commented configuration template
    Dump,
    /// Print the default configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["previsit"]).is_err());
    }

    #[test]
    fn test_parse_play_minimal() {
        let cli = Cli::try_parse_from([
            "previsit",
            "play",
            "--patient",
            "Jordan Carter",
            "--condition",
            "Flu",
        ])
        .unwrap();
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
                assert_eq!(patient, "Jordan Carter");
                assert_eq!(condition, "Flu");
                assert!(server.is_none());
                assert!(!no_audio);
                assert!(!slow);
                assert!(device.is_none());
                assert!(!evaluate);
                assert!(!no_thinking);
                assert!(!no_report);
            }
            _ => panic!("Expected Play command"),
        }
    }

    #[test]
    fn test_parse_play_all_options() {
        let cli = Cli::try_parse_from([
            "previsit",
            "-vv",
            "play",
            "--patient",
            "Alex",
            "--condition",
            "Migraine",
            "--server",
            "http://demo:7860",
            "--no-audio",
            "--slow",
            "--device",
            "pulse",
            "--evaluate",
            "--no-thinking",
            "--no-report",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Play {
                server,
                no_audio,
                slow,
                device,
                evaluate,
                no_thinking,
                no_report,
                ..
            } => {
                assert_eq!(server.as_deref(), Some("http://demo:7860"));
                assert!(no_audio);
                assert!(slow);
                assert_eq!(device.as_deref(), Some("pulse"));
                assert!(evaluate);
                assert!(no_thinking);
                assert!(no_report);
            }
            _ => panic!("Expected Play command"),
        }
    }

    #[test]
    fn test_play_requires_patient_and_condition() {
        assert!(Cli::try_parse_from(["previsit", "play", "--patient", "Alex"]).is_err());
        assert!(Cli::try_parse_from(["previsit", "play", "--condition", "Flu"]).is_err());
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::try_parse_from([
            "previsit",
            "evaluate",
            "--condition",
            "Flu",
            "--report",
            "/tmp/report.md",
        ])
        .unwrap();
        match cli.command {
            Commands::Evaluate {
                condition,
                report,
                html,
                server,
            } => {
                assert_eq!(condition, "Flu");
                assert_eq!(report, Some(PathBuf::from("/tmp/report.md")));
                assert!(!html);
                assert!(server.is_none());
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_parse_diff() {
        let cli = Cli::try_parse_from(["previsit", "diff", "a.html", "b.html", "--html", "--raw"])
            .unwrap();
        match cli.command {
            Commands::Diff { old, new, html, raw } => {
                assert_eq!(old, PathBuf::from("a.html"));
                assert_eq!(new, PathBuf::from("b.html"));
                assert!(html);
                assert!(raw);
            }
            _ => panic!("Expected Diff command"),
        }
    }

    #[test]
    fn test_diff_requires_two_files() {
        assert!(Cli::try_parse_from(["previsit", "diff", "a.md"]).is_err());
    }

    #[test]
    fn test_parse_patients() {
        let cli = Cli::try_parse_from(["previsit", "patients", "--server", "http://x:1"]).unwrap();
        match cli.command {
            Commands::Patients { server } => assert_eq!(server.as_deref(), Some("http://x:1")),
            _ => panic!("Expected Patients command"),
        }
    }

    #[test]
    fn test_quiet_is_global() {
        let cli = Cli::try_parse_from(["previsit", "patients", "-q"]).unwrap();
        assert!(cli.quiet);
    }

    // ── Config command tests ────────────────────────────────────────────

    #[test]
    fn test_parse_config_actions() {
        for (arg, expected) in [("show", "Show"), ("dump", "Dump"), ("path", "Path")] {
            let cli = Cli::try_parse_from(["previsit", "config", arg]).unwrap();
            match cli.command {
                Commands::Config { action } => assert_eq!(format!("{action:?}"), expected),
                _ => panic!("Expected Config command"),
            }
        }
    }

    #[test]
    fn test_config_requires_subcommand() {
        assert!(Cli::try_parse_from(["previsit", "config"]).is_err());
    }

    #[test]
    fn test_config_path_flag() {
        let cli =
            Cli::try_parse_from(["previsit", "--config", "/tmp/p.toml", "config", "show"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["previsit", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }
}
