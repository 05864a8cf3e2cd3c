//! Built-in tunes.
//!
//! Each table is one entry per tatum (eighth-of-a-beat at the default tempo),
//! semitones relative to A4, with `R` for a rest.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Melody, Note, REST};

const R: i16 = REST;

/// Selectable built-in tune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tune {
    #[default]
    Mario,
    Yakkety,
}

impl Tune {
    pub const ALL: [Tune; 2] = [Tune::Mario, Tune::Yakkety];

    pub fn raw(self) -> &'static [i16] {
        match self {
            Tune::Mario => &MARIO,
            Tune::Yakkety => &YAKKETY,
        }
    }

    pub fn melody(self) -> Melody {
        Melody {
            notes: self.raw().iter().map(|&r| Note::from_raw(r)).collect(),
        }
    }
}

impl fmt::Display for Tune {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tune::Mario => write!(f, "mario"),
            Tune::Yakkety => write!(f, "yakkety"),
        }
    }
}

#[rustfmt::skip]
const MARIO: [i16; 592] = [
    4, 4, R, 4, R, 0, 4, R, 7, R, R, R, -5, R, R, R,

    0, R, R, -5, R, R, -8, R, R, -3, R, -1, R, -2, -3, R,
    -5, 4, R, 7, 9, R, 5, 7, R, 4, R, 0, 2, -1, R, R,
    0, R, R, -5, R, R, -8, R, R, -3, R, -1, R, -2, -3, R,
    -5, 4, R, 7, 9, R, 5, 7, R, 4, R, 0, 2, -1, R, R,

    R, R, 7, 6, 5, 3, R, 4, R, -5, -3, 0, R, -3, 0, 2,
    R, R, 7, 6, 5, 3, R, 4, R, 12, R, 12, 12, R, R, R,
    R, R, 7, 6, 5, 3, R, 4, R, -5, -3, 0, R, -3, 0, 2,
    R, R, 3, R, R, 2, R, R, 0, R, R, R, R, R, R, R,

    R, R, 7, 6, 5, 3, R, 4, R, -5, -3, 0, R, -3, 0, 2,
    R, R, 7, 6, 5, 3, R, 4, R, 12, R, 12, 12, R, R, R,
    R, R, 7, 6, 5, 3, R, 4, R, -5, -3, 0, R, -3, 0, 2,
    R, R, 3, R, R, 2, R, R, 0, R, R, R, R, R, R, R,

    0, 0, R, 0, R, 0, 2, R, 4, 0, R, -3, -5, R, R, R,
    0, 0, R, 0, R, 0, 2, 4, R, R, R, R, R, R, R, R,
    0, 0, R, 0, R, 0, 2, R, 4, 0, R, -3, -5, R, R, R,
    4, 4, R, 4, R, 0, 4, R, 7, R, R, R, -5, R, R, R,

    0, R, R, -5, R, R, -8, R, R, -3, R, -1, R, -2, -3, R,
    -5, 4, R, 7, 9, R, 5, 7, R, 4, R, 0, 2, -1, R, R,
    0, R, R, -5, R, R, -8, R, R, -3, R, -1, R, -2, -3, R,
    -5, 4, R, 7, 9, R, 5, 7, R, 4, R, 0, 2, -1, R, R,

    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 9, R, 9, 9, 7, R, 5, 4, 0, R, -3, -5, R, R, R,
    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 5, R, 5, 5, 4, R, 2, 0, R, R, R, R, R, R, R,

    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 9, R, 9, 9, 7, R, 5, 4, 0, R, -3, -5, R, R, R,
    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 5, R, 5, 5, 4, R, 2, 0, R, R, R, R, R, R, R,

    0, 0, R, 0, R, 0, 2, R, 4, 0, R, -3, -5, R, R, R,
    0, 0, R, 0, R, 0, 2, 4, R, R, R, R, R, R, R, R,
    0, 0, R, 0, R, 0, 2, R, 4, 0, R, -3, -5, R, R, R,
    4, 4, R, 4, R, 0, 4, R, 7, R, R, R, -5, R, R, R,

    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 9, R, 9, 9, 7, R, 5, 4, 0, R, -3, -5, R, R, R,
    4, 0, R, -5, R, R, -4, R, -3, 5, R, 5, -3, R, R, R,
    -1, 5, R, 5, 5, 4, R, 2, 0, R, R, R, R, R, R, R,
];

#[rustfmt::skip]
const YAKKETY: [i16; 128] = [
    12, R, 12, R, 9, 7, 4, 0, 7, 7, 9, 9, 7, 3, 2, 0,
    0, R, 3, 4, R, 7, 9, 7, 12, R, R, R, R, 7, 9, 7,
    12, R, 12, R, 9, 7, 4, 0, 7, 7, 9, 9, 7, 3, 2, 0,
    7, R, 7, 9, 11, 14, 10, 9, 7, R, R, R, R, 7, 9, 7,
    12, R, 12, R, 12, R, 12, R, 12, R, 12, R, 9, 7, 4, 0,
    5, R, 5, R, 5, R, 5, R, 9, R, 12, 14, 15, 12, 9, 5,
    16, 15, 16, 15, 16, 19, R, R, 16, 19, 16, 12, R, R, R, R,
    16, 12, R, 7, 15, R, R, R, R, R, R, R, R, R, 7, R,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunes_are_non_empty() {
        for tune in Tune::ALL {
            assert!(!tune.raw().is_empty(), "{tune} is empty");
            assert_eq!(tune.melody().len(), tune.raw().len());
        }
    }

    #[test]
    fn mario_fills_whole_bars() {
        // 16 tatums per bar
        assert_eq!(MARIO.len() % 16, 0);
    }

    #[test]
    fn mario_opens_on_c_sharp_5() {
        let m = Tune::Mario.melody();
        assert_eq!(m.note_at(0), Note::Semitone(4));
        assert_eq!(m.note_at(2), Note::Rest);
        assert_eq!(m.note_at(0).frequency_hz(), 554);
    }

    #[test]
    fn tunes_stay_in_buzzer_range() {
        for tune in Tune::ALL {
            for &raw in tune.raw() {
                if raw != REST {
                    assert!((-24..=24).contains(&raw), "{tune}: offset {raw} out of range");
                }
            }
        }
    }

    #[test]
    fn display_matches_config_names() {
        assert_eq!(Tune::Mario.to_string(), "mario");
        assert_eq!(Tune::Yakkety.to_string(), "yakkety");
    }
}
