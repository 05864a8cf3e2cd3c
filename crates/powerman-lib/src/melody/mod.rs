//! Notes, melodies, and tempo arithmetic for the piezo buzzer.

pub mod tunes;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::ToneCommand;

pub use tunes::Tune;

/// Reference pitch for semitone offset 0 (A4).
pub const REFERENCE_HZ: f64 = 440.0;

/// Fraction of each tatum during which the tone sounds.
pub const TONE_FRACTION: f64 = 0.95;

/// Raw encoding of a rest in tune tables.
pub const REST: i16 = i16::MIN;

pub const DEFAULT_BPM: u32 = 80;
pub const DEFAULT_TATUMS_PER_BEAT: u32 = 8;

/// One tatum's worth of melody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    /// Silence for this tatum.
    Rest,
    /// Semitones relative to A4; negative values are below it.
    Semitone(i16),
}

impl Note {
    /// Decode a tune table entry; [`REST`] is a rest, anything else a semitone offset.
    pub const fn from_raw(raw: i16) -> Self {
        if raw == REST {
            Note::Rest
        } else {
            Note::Semitone(raw)
        }
    }

    /// Equal-tempered frequency rounded to the nearest Hz. Rests are 0.
    pub fn frequency_hz(&self) -> u16 {
        match *self {
            Note::Rest => 0,
            Note::Semitone(n) => {
                let hz = REFERENCE_HZ * 2f64.powf(f64::from(n) / 12.0);
                // float → int casts saturate
                hz.round() as u16
            }
        }
    }
}

/// A non-empty, circular sequence of notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Melody {
    notes: Vec<Note>,
}

impl Melody {
    /// Returns `None` for an empty note list.
    pub fn new(notes: Vec<Note>) -> Option<Self> {
        if notes.is_empty() {
            None
        } else {
            Some(Melody { notes })
        }
    }

    /// Build from a raw tune table (see [`REST`]).
    pub fn from_raw(raw: &[i16]) -> Option<Self> {
        Self::new(raw.iter().map(|&r| Note::from_raw(r)).collect())
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The note at position `i`, wrapping past the end.
    pub fn note_at(&self, i: usize) -> Note {
        self.notes[i % self.notes.len()]
    }
}

/// Beats per minute and tatums per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    pub bpm: u32,
    pub tatums_per_beat: u32,
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo {
            bpm: DEFAULT_BPM,
            tatums_per_beat: DEFAULT_TATUMS_PER_BEAT,
        }
    }
}

impl Tempo {
    pub fn new(bpm: u32, tatums_per_beat: u32) -> Self {
        Tempo {
            bpm,
            tatums_per_beat,
        }
    }

    fn tatums_per_minute(&self) -> u64 {
        u64::from(self.bpm) * u64::from(self.tatums_per_beat)
    }

    /// Wall-clock slot of one tatum: `60_000_000 / (bpm * tatums)` µs.
    ///
    /// Zero when either field is zero; [`crate::config::Config::validate`]
    /// rejects such tempos.
    pub fn tatum_interval(&self) -> Duration {
        match self.tatums_per_minute() {
            0 => Duration::ZERO,
            n => Duration::from_micros(60_000_000 / n),
        }
    }

    /// How long each tone sounds: 95% of the tatum, in whole milliseconds.
    pub fn tone_duration_ms(&self) -> u16 {
        match self.tatums_per_minute() {
            0 => 0,
            n => ((TONE_FRACTION * 60_000.0) / n as f64) as u16,
        }
    }

    /// Tone command for one note at this tempo.
    pub fn tone_for(&self, note: Note) -> ToneCommand {
        ToneCommand::new(note.frequency_hz(), self.tone_duration_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── pitch ──

    #[test]
    fn a4_is_440() {
        assert_eq!(Note::Semitone(0).frequency_hz(), 440);
    }

    #[test]
    fn octave_up_is_880() {
        assert_eq!(Note::Semitone(12).frequency_hz(), 880);
    }

    #[test]
    fn octave_down_is_220() {
        assert_eq!(Note::Semitone(-12).frequency_hz(), 220);
    }

    #[test]
    fn rest_is_silent() {
        assert_eq!(Note::Rest.frequency_hz(), 0);
        assert_eq!(Note::from_raw(REST), Note::Rest);
    }

    #[test]
    fn semitone_rounds_to_nearest() {
        // 440 * 2^(1/12) = 466.16
        assert_eq!(Note::Semitone(1).frequency_hz(), 466);
        // 440 * 2^(3/12) = 523.25
        assert_eq!(Note::Semitone(3).frequency_hz(), 523);
        // 440 * 2^(-8/12) = 277.18
        assert_eq!(Note::Semitone(-8).frequency_hz(), 277);
        // 440 * 2^(7/12) = 659.26
        assert_eq!(Note::Semitone(7).frequency_hz(), 659);
        // 440 * 2^(2/12) = 493.88
        assert_eq!(Note::Semitone(2).frequency_hz(), 494);
    }

    #[test]
    fn extreme_offset_saturates() {
        assert_eq!(Note::Semitone(300).frequency_hz(), u16::MAX);
        assert_eq!(Note::Semitone(-300).frequency_hz(), 0);
    }

    // ── tempo ──

    #[test]
    fn default_tempo_interval() {
        let t = Tempo::default();
        assert_eq!(t.tatum_interval(), Duration::from_micros(93_750));
    }

    #[test]
    fn default_tempo_tone_duration() {
        assert_eq!(Tempo::default().tone_duration_ms(), 89);
    }

    #[test]
    fn tone_shorter_than_tatum() {
        for (bpm, tatums) in [(60, 4), (80, 8), (120, 2), (200, 16)] {
            let t = Tempo::new(bpm, tatums);
            assert!(
                u128::from(t.tone_duration_ms()) < t.tatum_interval().as_millis().max(1),
                "tone must leave a gap at {bpm} bpm / {tatums}"
            );
        }
    }

    #[test]
    fn zero_tempo_is_degenerate_not_panicking() {
        let t = Tempo::new(0, 8);
        assert_eq!(t.tatum_interval(), Duration::ZERO);
        assert_eq!(t.tone_duration_ms(), 0);
    }

    #[test]
    fn tone_for_rest_keeps_duration() {
        let t = Tempo::default();
        assert_eq!(t.tone_for(Note::Rest), ToneCommand::new(0, 89));
        assert_eq!(t.tone_for(Note::Semitone(0)), ToneCommand::new(440, 89));
    }

    // ── melody ──

    #[test]
    fn empty_melody_rejected() {
        assert!(Melody::new(vec![]).is_none());
        assert!(Melody::from_raw(&[]).is_none());
    }

    #[test]
    fn melody_wraps() {
        let m = Melody::from_raw(&[0, REST, 12]).unwrap();
        assert_eq!(m.len(), 3);
        assert!(!m.is_empty());
        assert_eq!(m.note_at(0), Note::Semitone(0));
        assert_eq!(m.note_at(1), Note::Rest);
        assert_eq!(m.note_at(3), m.note_at(0));
        assert_eq!(m.note_at(7), Note::Rest);
    }
}
