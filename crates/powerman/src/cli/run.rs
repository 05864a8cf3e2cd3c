//! `run` subcommand: match one board, handshake, and play until Ctrl+C.

use std::path::PathBuf;

use powerman_lib::sequencer::CancelToken;
use powerman_lib::session::SessionOptions;

use super::{
    Context, Result, RunOutput, SessionEnd, Tune, device, kv, kv_width, load_config, print_json,
    require_valid, session,
};

pub(super) struct RunArgs {
    pub control_file: Option<PathBuf>,
    pub play: bool,
    pub tune: Option<Tune>,
    pub bpm: Option<u32>,
}

pub(super) fn cmd_run(serial: &str, args: RunArgs, ctx: &Context) -> Result<()> {
    if let Some(ref path) = args.control_file {
        log::debug!("control file {} is accepted but not read", path.display());
    }

    let mut config = load_config(ctx.config_path.as_deref());
    if let Some(tune) = args.tune {
        config.tune = tune;
    }
    if let Some(bpm) = args.bpm {
        config.bpm = bpm;
    }
    require_valid(&config)?;

    let options = SessionOptions::from_config(&config, args.play);
    let backend = device::platform_backend();
    let w = kv_width(&["Board:", "Firmware:", "Playing:"], &[]);

    let cancel = CancelToken::new();

    let outcome = session::run_session(&backend, serial, &options, &cancel, |firmware| {
        // Until here Ctrl+C keeps its default and ends the process
        if options.play {
            stop_on_ctrl_c(&cancel);
        }
        if ctx.json {
            return;
        }
        kv("Board:", serial, w);
        kv("Firmware:", firmware.format(config.version_format), w);
        if options.play {
            kv(
                "Playing:",
                format_args!(
                    "{} at {} bpm (Ctrl+C to stop)",
                    options.tune, options.tempo.bpm
                ),
                w,
            );
        }
    })?;

    if ctx.json {
        print_json(&RunOutput {
            serial: outcome.serial.clone(),
            firmware: outcome.firmware.format(config.version_format),
            firmware_bytes: outcome.firmware.bytes(),
            tune: options.play.then_some(options.tune),
            result: outcome.end,
        });
        return Ok(());
    }

    match outcome.end {
        SessionEnd::Idle => println!("Board initialized."),
        SessionEnd::Played(summary) => println!(
            "Stopped after {} note{} ({} full loop{}).",
            summary.notes_sent,
            if summary.notes_sent == 1 { "" } else { "s" },
            summary.loops,
            if summary.loops == 1 { "" } else { "s" }
        ),
    }
    Ok(())
}

/// Route Ctrl+C to `cancel` so playback stops at the next tatum boundary.
fn stop_on_ctrl_c(cancel: &CancelToken) {
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.cancel()) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }
}
