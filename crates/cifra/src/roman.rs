//! Scale-degree ("Roman numeral") relationships between a pitch and a key.

use partitura::{ChordKind, ChordSymbol, PitchName};

use crate::harmonize::SpellingError;
use crate::types::{Key, KeyMode};

/// Diatonic triads of a major key: (semitones above tonic, degree, quality).
const MAJOR_DEGREES: [(u8, u8, ChordKind); 7] = [
    (0, 1, ChordKind::Major),
    (2, 2, ChordKind::Minor),
    (4, 3, ChordKind::Minor),
    (5, 4, ChordKind::Major),
    (7, 5, ChordKind::Major),
    (9, 6, ChordKind::Minor),
    (11, 7, ChordKind::Diminished),
];

/// Natural minor plus the raised leading tone. The dominant is major, as
/// the leading tone makes it in practice.
const MINOR_DEGREES: [(u8, u8, ChordKind); 8] = [
    (0, 1, ChordKind::Minor),
    (2, 2, ChordKind::Diminished),
    (3, 3, ChordKind::Major),
    (5, 4, ChordKind::Minor),
    (7, 5, ChordKind::Major),
    (8, 6, ChordKind::Major),
    (10, 7, ChordKind::Major),
    (11, 7, ChordKind::Diminished),
];

const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// The diatonic triad built on a scale degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomanNumeral {
    /// 1-based scale degree
    pub degree: u8,
    pub quality: ChordKind,
}

impl RomanNumeral {
    /// Relate a pitch class to a key. Pitches outside the key's scale fail
    /// with [`SpellingError::Chromatic`].
    pub fn in_key(pitch_class: u8, key: &Key) -> Result<Self, SpellingError> {
        let interval = (pitch_class % 12 + 12 - key.tonic.pitch_class()) % 12;
        let table: &[(u8, u8, ChordKind)] = match key.mode {
            KeyMode::Major => &MAJOR_DEGREES,
            KeyMode::Minor => &MINOR_DEGREES,
        };
        table
            .iter()
            .find(|(semitones, _, _)| *semitones == interval)
            .map(|&(_, degree, quality)| RomanNumeral { degree, quality })
            .ok_or_else(|| SpellingError::Chromatic {
                pitch_class,
                key: key.to_string(),
            })
    }

    /// Conventional figure: "I", "ii", "vii°", "III".
    pub fn figure(&self) -> String {
        let numeral = NUMERALS[(self.degree.clamp(1, 7) - 1) as usize];
        match self.quality {
            ChordKind::Minor => numeral.to_lowercase(),
            ChordKind::Diminished => format!("{}°", numeral.to_lowercase()),
            ChordKind::Augmented => format!("{numeral}+"),
            _ => numeral.to_string(),
        }
    }

    /// The chord this numeral denotes, rooted on `root`.
    pub fn to_chord_symbol(&self, root: PitchName) -> ChordSymbol {
        ChordSymbol::new(root, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partitura::Step;
    use pretty_assertions::assert_eq;

    fn c_major() -> Key {
        Key::new(PitchName::new(Step::C, 0), KeyMode::Major)
    }

    fn a_minor() -> Key {
        Key::new(PitchName::new(Step::A, 0), KeyMode::Minor)
    }

    #[test]
    fn major_key_degrees() {
        let figures: Vec<String> = [0u8, 2, 4, 5, 7, 9, 11]
            .iter()
            .map(|&pc| RomanNumeral::in_key(pc, &c_major()).unwrap().figure())
            .collect();
        assert_eq!(figures, vec!["I", "ii", "iii", "IV", "V", "vi", "vii°"]);
    }

    #[test]
    fn minor_key_degrees() {
        let key = a_minor();
        let tonic = RomanNumeral::in_key(9, &key).unwrap();
        assert_eq!(tonic.figure(), "i");
        assert_eq!(RomanNumeral::in_key(0, &key).unwrap().figure(), "III");
        assert_eq!(RomanNumeral::in_key(4, &key).unwrap().figure(), "V");
        // G natural and G# both belong to the key
        assert_eq!(RomanNumeral::in_key(7, &key).unwrap().figure(), "VII");
        assert_eq!(RomanNumeral::in_key(8, &key).unwrap().figure(), "vii°");
    }

    #[test]
    fn chromatic_pitch_fails() {
        let err = RomanNumeral::in_key(1, &c_major()).unwrap_err();
        assert!(matches!(err, SpellingError::Chromatic { pitch_class: 1, .. }));
    }

    #[test]
    fn chord_symbol_from_numeral() {
        let rn = RomanNumeral::in_key(2, &c_major()).unwrap();
        let symbol = rn.to_chord_symbol(PitchName::new(Step::D, 0));
        assert_eq!(symbol.figure(), "Dm");
    }

    #[test]
    fn flat_key_degrees() {
        let key = Key::new(PitchName::new(Step::E, -1), KeyMode::Major);
        // Ab is IV in Eb
        assert_eq!(RomanNumeral::in_key(8, &key).unwrap().figure(), "IV");
    }
}
