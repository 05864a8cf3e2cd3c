//! Melody playback: a timed, looping stream of set-tone commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::board::Board;
use crate::device::{ControlIo, Result};
use crate::melody::{Melody, Tempo};

/// Cooperative stop signal, safe to trigger from any thread.
///
/// Playback checks it once per tatum boundary, after the current tone has
/// been sent and its slot has elapsed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a cancelled playback got through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    /// Tone commands sent successfully.
    pub notes_sent: u64,
    /// Complete passes over the melody.
    pub loops: u64,
}

/// Play `melody` on `board` until `cancel` fires or a transfer fails.
pub fn play<H: ControlIo>(
    board: &Board<H>,
    melody: &Melody,
    tempo: Tempo,
    cancel: &CancelToken,
) -> Result<PlaybackSummary> {
    play_with(board, melody, tempo, cancel, std::thread::sleep)
}

/// [`play`] with an injectable sleep, called once per tatum.
///
/// Each note: send its tone, then sleep one full tatum (not the shorter tone
/// duration), then check `cancel`. Rests are sent as 0 Hz tones. After the
/// last note playback wraps to the first. The first failed transfer ends
/// playback and is returned; nothing after it is sent.
pub fn play_with<H, S>(
    board: &Board<H>,
    melody: &Melody,
    tempo: Tempo,
    cancel: &CancelToken,
    mut sleep: S,
) -> Result<PlaybackSummary>
where
    H: ControlIo,
    S: FnMut(Duration),
{
    let interval = tempo.tatum_interval();
    let mut summary = PlaybackSummary::default();
    let mut i = 0;

    log::info!(
        "playing {} notes at {} bpm x {} (tatum {} us, tone {} ms)",
        melody.len(),
        tempo.bpm,
        tempo.tatums_per_beat,
        interval.as_micros(),
        tempo.tone_duration_ms()
    );

    while !cancel.is_cancelled() {
        let tone = tempo.tone_for(melody.note_at(i));
        if let Err(e) = board.set_tone(tone) {
            log::debug!("playback stopped at note {i}: {e}");
            return Err(e);
        }
        summary.notes_sent += 1;

        sleep(interval);

        i = (i + 1) % melody.len();
        if i == 0 {
            summary.loops += 1;
        }
    }

    log::info!(
        "playback cancelled after {} notes ({} loops)",
        summary.notes_sent,
        summary.loops
    );
    Ok(summary)
}
