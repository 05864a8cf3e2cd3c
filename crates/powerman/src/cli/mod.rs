//! CLI subcommands: run a board, list boards, show configuration.

mod config_cmd;
mod devices;
mod run;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use powerman_lib::config::Config;
pub(super) use powerman_lib::device;
pub(super) use powerman_lib::error::{PowermanError, Result};
pub(super) use powerman_lib::melody::Tune;
pub(super) use powerman_lib::session::{self, DiscoveredBoard, SessionEnd};

const PADDING: usize = 2;

/// Settings shared by every subcommand.
pub struct Context {
    pub json: bool,
    /// `--config` override; `None` means the platform default path.
    pub config_path: Option<PathBuf>,
}

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {}", format_kv(key, value, w - 2));
}

pub(super) fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => log::error!("JSON serialization failed: {e}"),
    }
}

/// Load the config from `custom_path` (or the default path), logging parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

/// Reject a config that cannot drive a board, naming every problem.
pub(super) fn require_valid(config: &Config) -> Result<()> {
    config.validate().map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        PowermanError::Config(msgs.join("; "))
    })
}

/// Parse a tune name as written in the config file.
fn parse_tune(s: &str) -> std::result::Result<Tune, String> {
    Tune::ALL
        .into_iter()
        .find(|t| t.to_string().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            let names: Vec<String> = Tune::ALL.iter().map(|t| t.to_string()).collect();
            format!("unknown tune '{s}' (expected one of: {})", names.join(", "))
        })
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct RunOutput {
    pub serial: String,
    pub firmware: String,
    pub firmware_bytes: [u8; 4],
    pub tune: Option<Tune>,
    pub result: SessionEnd,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredBoard>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Find a board by serial, initialize it, and play a tune on its buzzer
    Run {
        /// Serial number of the board (exact match, case-sensitive)
        serial: String,
        /// Control file (accepted for compatibility; not read)
        control_file: Option<PathBuf>,
        /// Stop after initializing instead of playing
        #[arg(long)]
        no_play: bool,
        /// Tune to play (overrides the config file)
        #[arg(long, value_parser = parse_tune)]
        tune: Option<Tune>,
        /// Tempo in beats per minute (overrides the config file)
        #[arg(long)]
        bpm: Option<u32>,
    },

    /// List connected power boards
    Devices,

    /// Show current configuration and file path
    Config,
}

pub fn run(cmd: Command, ctx: &Context) -> Result<()> {
    match cmd {
        Command::Run {
            serial,
            control_file,
            no_play,
            tune,
            bpm,
        } => run::cmd_run(
            &serial,
            run::RunArgs {
                control_file,
                play: !no_play,
                tune,
                bpm,
            },
            ctx,
        ),
        Command::Devices => devices::cmd_devices(ctx),
        Command::Config => config_cmd::cmd_config(ctx),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Board:", "Firmware:"], &[]);
        // "Firmware:" = 9 + PADDING = 11
        assert_eq!(w, 11);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        // Indent key needs +2 for the prefix
        let w = kv_width(&["A:"], &["tatums_per_beat:"]);
        // "tatums_per_beat:" = 16 + PADDING + 2 = 20
        assert_eq!(w, 20);
    }

    #[test]
    fn kv_width_empty() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn format_kv_pads_key() {
        assert_eq!(format_kv("Bus:", 3, 6), "Bus:  3");
    }

    #[test]
    fn parse_tune_accepts_config_names() {
        assert_eq!(parse_tune("mario"), Ok(Tune::Mario));
        assert_eq!(parse_tune("Yakkety"), Ok(Tune::Yakkety));
    }

    #[test]
    fn parse_tune_lists_choices() {
        let err = parse_tune("bach").unwrap_err();
        assert!(err.contains("mario"));
        assert!(err.contains("yakkety"));
    }

    #[test]
    fn require_valid_joins_problems() {
        let config = Config {
            bpm: 0,
            vendor_id: 0,
            ..Config::default()
        };
        let err = require_valid(&config).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        let msg = err.to_string();
        assert!(msg.contains("vendor_id cannot be 0"));
        assert!(msg.contains("bpm must be positive"));
    }

    #[test]
    fn load_config_missing_custom_path_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("none.toml")));
        assert_eq!(config, Config::default());
    }
}
