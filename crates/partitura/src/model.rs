//! Score data model.
//!
//! A small slice of notation: parts, measures and the events inside them,
//! plus the chord symbols the harmonizer attaches. Offsets and durations are
//! quarter lengths measured from the start of the enclosing measure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Diatonic step (letter name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub fn pitch_class(self) -> u8 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    pub fn from_char(c: char) -> Option<Step> {
        match c.to_ascii_uppercase() {
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Step::C => 'C',
            Step::D => 'D',
            Step::E => 'E',
            Step::F => 'F',
            Step::G => 'G',
            Step::A => 'A',
            Step::B => 'B',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pitch or chord figure: {0:?}")]
pub struct ParseNameError(pub String);

/// A spelled pitch without octave: "C#", "Bb", "F##".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchName {
    pub step: Step,
    /// Chromatic alteration in semitones (+1 sharp, -1 flat)
    pub alter: i8,
}

impl PitchName {
    pub fn new(step: Step, alter: i8) -> Self {
        Self { step, alter }
    }

    pub fn pitch_class(&self) -> u8 {
        (self.step.pitch_class() as i16 + self.alter as i16).rem_euclid(12) as u8
    }

    /// Split a leading pitch name off `s`, returning the name and the rest.
    pub(crate) fn split_prefix(s: &str) -> Option<(PitchName, &str)> {
        let mut chars = s.char_indices();
        let (_, first) = chars.next()?;
        let step = Step::from_char(first)?;
        let mut alter = 0i8;
        let mut rest_at = first.len_utf8();
        for (idx, c) in chars {
            match c {
                '#' => alter += 1,
                'b' => alter -= 1,
                _ => {
                    rest_at = idx;
                    break;
                }
            }
            rest_at = idx + c.len_utf8();
        }
        Some((PitchName { step, alter }, &s[rest_at..]))
    }
}

impl fmt::Display for PitchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step.as_char())?;
        let accidental = if self.alter > 0 { "#" } else { "b" };
        for _ in 0..self.alter.unsigned_abs() {
            f.write_str(accidental)?;
        }
        Ok(())
    }
}

impl FromStr for PitchName {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match PitchName::split_prefix(s) {
            Some((name, "")) => Ok(name),
            _ => Err(ParseNameError(s.to_string())),
        }
    }
}

/// A fully specified pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub step: Step,
    pub alter: i8,
    /// Scientific octave (middle C = C4)
    pub octave: i8,
}

impl Pitch {
    pub fn new(step: Step, alter: i8, octave: i8) -> Self {
        Self { step, alter, octave }
    }

    pub fn name(&self) -> PitchName {
        PitchName::new(self.step, self.alter)
    }

    pub fn pitch_class(&self) -> u8 {
        self.name().pitch_class()
    }

    /// MIDI note number (C4 = 60). Not clamped to 0..=127.
    pub fn midi(&self) -> i16 {
        (self.octave as i16 + 1) * 12 + self.step.pitch_class() as i16 + self.alter as i16
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave)
    }
}

impl FromStr for Pitch {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = PitchName::split_prefix(s).ok_or_else(|| ParseNameError(s.to_string()))?;
        let octave = rest.parse::<i8>().map_err(|_| ParseNameError(s.to_string()))?;
        Ok(Pitch::new(name.step, name.alter, octave))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u32,
    pub beat_type: u32,
}

impl TimeSignature {
    pub fn new(beats: u32, beat_type: u32) -> Self {
        Self { beats, beat_type }
    }

    /// Length of a full bar in quarter notes.
    pub fn bar_length(&self) -> f64 {
        if self.beat_type == 0 {
            return 0.0;
        }
        self.beats as f64 * 4.0 / self.beat_type as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    /// Sharps (positive) or flats (negative)
    pub fifths: i8,
    /// "major", "minor", or any other mode name found in the source
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    /// "G", "F", "C", "percussion", "TAB"
    pub sign: String,
    pub line: Option<u8>,
    /// Staff number within a multi-staff part
    pub number: Option<u8>,
}

/// Chord quality as carried by a chord symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordKind {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended4,
    Suspended2,
    Dominant7,
    Major7,
    Minor7,
    MinorMajor7,
    Diminished7,
    HalfDiminished7,
    Major6,
    Minor6,
    Add9,
    Power,
}

impl ChordKind {
    pub const ALL: [ChordKind; 16] = [
        ChordKind::Major,
        ChordKind::Minor,
        ChordKind::Diminished,
        ChordKind::Augmented,
        ChordKind::Suspended4,
        ChordKind::Suspended2,
        ChordKind::Dominant7,
        ChordKind::Major7,
        ChordKind::Minor7,
        ChordKind::MinorMajor7,
        ChordKind::Diminished7,
        ChordKind::HalfDiminished7,
        ChordKind::Major6,
        ChordKind::Minor6,
        ChordKind::Add9,
        ChordKind::Power,
    ];

    /// Suffix for chord symbol display
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordKind::Major => "",
            ChordKind::Minor => "m",
            ChordKind::Diminished => "dim",
            ChordKind::Augmented => "aug",
            ChordKind::Suspended4 => "sus4",
            ChordKind::Suspended2 => "sus2",
            ChordKind::Dominant7 => "7",
            ChordKind::Major7 => "maj7",
            ChordKind::Minor7 => "m7",
            ChordKind::MinorMajor7 => "m(maj7)",
            ChordKind::Diminished7 => "dim7",
            ChordKind::HalfDiminished7 => "m7b5",
            ChordKind::Major6 => "6",
            ChordKind::Minor6 => "m6",
            ChordKind::Add9 => "add9",
            ChordKind::Power => "5",
        }
    }

    /// Value of the MusicXML `<kind>` element. `Add9` is written as a major
    /// kind plus an added ninth degree.
    pub fn musicxml_kind(&self) -> &'static str {
        match self {
            ChordKind::Major | ChordKind::Add9 => "major",
            ChordKind::Minor => "minor",
            ChordKind::Diminished => "diminished",
            ChordKind::Augmented => "augmented",
            ChordKind::Suspended4 => "suspended-fourth",
            ChordKind::Suspended2 => "suspended-second",
            ChordKind::Dominant7 => "dominant",
            ChordKind::Major7 => "major-seventh",
            ChordKind::Minor7 => "minor-seventh",
            ChordKind::MinorMajor7 => "major-minor",
            ChordKind::Diminished7 => "diminished-seventh",
            ChordKind::HalfDiminished7 => "half-diminished",
            ChordKind::Major6 => "major-sixth",
            ChordKind::Minor6 => "minor-sixth",
            ChordKind::Power => "power",
        }
    }

    /// Map a MusicXML `<kind>` value onto the closest kind we model.
    /// Extended chords collapse onto their seventh; "none" and unknown
    /// values yield `None`.
    pub fn from_musicxml_kind(value: &str) -> Option<ChordKind> {
        let kind = match value.trim() {
            "major" => ChordKind::Major,
            "minor" => ChordKind::Minor,
            "diminished" => ChordKind::Diminished,
            "augmented" | "augmented-seventh" => ChordKind::Augmented,
            "suspended-fourth" => ChordKind::Suspended4,
            "suspended-second" => ChordKind::Suspended2,
            "dominant" | "dominant-seventh" | "dominant-ninth" | "dominant-11th" | "dominant-13th" => {
                ChordKind::Dominant7
            }
            "major-seventh" | "major-ninth" | "major-11th" | "major-13th" => ChordKind::Major7,
            "minor-seventh" | "minor-ninth" | "minor-11th" | "minor-13th" => ChordKind::Minor7,
            "major-minor" => ChordKind::MinorMajor7,
            "diminished-seventh" => ChordKind::Diminished7,
            "half-diminished" => ChordKind::HalfDiminished7,
            "major-sixth" => ChordKind::Major6,
            "minor-sixth" => ChordKind::Minor6,
            "power" => ChordKind::Power,
            _ => return None,
        };
        Some(kind)
    }

    fn from_suffix(suffix: &str) -> Option<ChordKind> {
        if let Some(kind) = ChordKind::ALL.iter().find(|k| k.suffix() == suffix) {
            return Some(*kind);
        }
        let alias = match suffix {
            "M" | "maj" => ChordKind::Major,
            "min" | "-" => ChordKind::Minor,
            "°" | "o" => ChordKind::Diminished,
            "+" => ChordKind::Augmented,
            "sus" => ChordKind::Suspended4,
            "M7" | "Δ" | "Δ7" => ChordKind::Major7,
            "min7" | "-7" => ChordKind::Minor7,
            "°7" | "o7" => ChordKind::Diminished7,
            "ø" | "ø7" => ChordKind::HalfDiminished7,
            "mM7" => ChordKind::MinorMajor7,
            _ => return None,
        };
        Some(alias)
    }
}

/// A chord symbol placed above a staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordSymbol {
    pub root: PitchName,
    pub kind: ChordKind,
    /// Slash bass, when different from the root
    pub bass: Option<PitchName>,
    /// Free text attached to the symbol, e.g. "(uncertain)"
    pub lyrics: Vec<String>,
}

impl ChordSymbol {
    pub fn new(root: PitchName, kind: ChordKind) -> Self {
        Self {
            root,
            kind,
            bass: None,
            lyrics: Vec::new(),
        }
    }

    pub fn with_bass(mut self, bass: PitchName) -> Self {
        self.bass = Some(bass);
        self
    }

    pub fn with_lyric(mut self, text: impl Into<String>) -> Self {
        self.add_lyric(text);
        self
    }

    pub fn add_lyric(&mut self, text: impl Into<String>) {
        self.lyrics.push(text.into());
    }

    /// Display figure: "C", "F#m7b5", "Bb/D".
    pub fn figure(&self) -> String {
        let mut figure = format!("{}{}", self.root, self.kind.suffix());
        if let Some(bass) = &self.bass {
            figure.push('/');
            figure.push_str(&bass.to_string());
        }
        figure
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.figure())
    }
}

impl FromStr for ChordSymbol {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseNameError(s.to_string());
        let (root, rest) = PitchName::split_prefix(s.trim()).ok_or_else(invalid)?;
        let (suffix, bass) = match rest.split_once('/') {
            Some((suffix, bass)) => (suffix, Some(bass.parse::<PitchName>().map_err(|_| invalid())?)),
            None => (rest, None),
        };
        let kind = ChordKind::from_suffix(suffix).ok_or_else(invalid)?;
        Ok(ChordSymbol {
            root,
            kind,
            bass,
            lyrics: Vec::new(),
        })
    }
}

/// What an event is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// A single note; `None` means the pitch could not be determined
    Note(Option<Pitch>),
    /// Simultaneous pitches sharing one stem; may be empty
    Chord(Vec<Pitch>),
    Rest { whole_measure: bool, hidden: bool },
    Harmony(ChordSymbol),
    /// Dynamics, tempo marks, text and the like, carried through untouched
    Direction(Direction),
}

/// A `<direction>` kept as written. The timing lives on the owning event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub placement: Option<String>,
    /// Raw `<direction-type>` elements, in source order
    pub types: Vec<String>,
    /// Raw `<sound>` element (tempo, dynamics playback)
    pub sound: Option<String>,
}

/// Tuplet ratio: `actual` notes in the time of `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeModification {
    pub actual: u32,
    pub normal: u32,
}

/// One timed element inside a measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Quarter lengths from the start of the measure
    pub offset: f64,
    /// Quarter lengths; 0 for grace notes and chord symbols
    pub duration: f64,
    pub kind: EventKind,
    pub voice: Option<String>,
    pub staff: Option<u8>,
    /// Written type ("quarter", "eighth", ...) when the source gave one
    pub note_type: Option<String>,
    pub dots: u8,
    pub grace: bool,
    pub tie_start: bool,
    pub tie_stop: bool,
    pub lyrics: Vec<String>,
    pub time_modification: Option<TimeModification>,
    /// Staff position for a note without a pitch
    pub display: Option<Pitch>,
}

impl Event {
    pub fn new(offset: f64, duration: f64, kind: EventKind) -> Self {
        Self {
            offset,
            duration,
            kind,
            voice: None,
            staff: None,
            note_type: None,
            dots: 0,
            grace: false,
            tie_start: false,
            tie_stop: false,
            lyrics: Vec::new(),
            time_modification: None,
            display: None,
        }
    }

    pub fn note(offset: f64, duration: f64, pitch: Pitch) -> Self {
        Self::new(offset, duration, EventKind::Note(Some(pitch)))
    }

    /// A note whose pitch could not be determined.
    pub fn unpitched(offset: f64, duration: f64) -> Self {
        Self::new(offset, duration, EventKind::Note(None))
    }

    pub fn chord(offset: f64, duration: f64, pitches: Vec<Pitch>) -> Self {
        Self::new(offset, duration, EventKind::Chord(pitches))
    }

    pub fn rest(offset: f64, duration: f64) -> Self {
        Self::new(
            offset,
            duration,
            EventKind::Rest {
                whole_measure: false,
                hidden: false,
            },
        )
    }

    pub fn harmony(offset: f64, symbol: ChordSymbol) -> Self {
        Self::new(offset, 0.0, EventKind::Harmony(symbol))
    }

    pub fn direction(offset: f64, direction: Direction) -> Self {
        Self::new(offset, 0.0, EventKind::Direction(direction))
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    /// Duration as notated, before any tuplet ratio is applied.
    pub fn written_duration(&self) -> f64 {
        match self.time_modification {
            Some(tm) if tm.normal > 0 => self.duration * tm.actual as f64 / tm.normal as f64,
            _ => self.duration,
        }
    }

    /// Note or chord, i.e. something that sounds (or was meant to).
    pub fn is_note_like(&self) -> bool {
        matches!(self.kind, EventKind::Note(_) | EventKind::Chord(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Number exactly as written in the source ("0", "12", "12a")
    pub number: String,
    /// Present only where the source states one; readers inherit otherwise
    pub time_signature: Option<TimeSignature>,
    pub key_signature: Option<KeySignature>,
    pub clefs: Vec<Clef>,
    pub staves: Option<u8>,
    /// Pickup or partial bar excluded from bar numbering
    pub implicit: bool,
    pub events: Vec<Event>,
}

impl Measure {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            time_signature: None,
            key_signature: None,
            clefs: Vec::new(),
            staves: None,
            implicit: false,
            events: Vec::new(),
        }
    }

    pub fn with_time_signature(mut self, time_signature: TimeSignature) -> Self {
        self.time_signature = Some(time_signature);
        self
    }

    pub fn with_key_signature(mut self, key_signature: KeySignature) -> Self {
        self.key_signature = Some(key_signature);
        self
    }

    pub fn with_implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Furthest point any event reaches, in quarter lengths.
    pub fn extent(&self) -> f64 {
        self.events.iter().map(Event::end).fold(0.0, f64::max)
    }

    /// Note and chord events in source order.
    pub fn notes(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_note_like())
    }

    pub fn harmonies(&self) -> impl Iterator<Item = &ChordSymbol> {
        self.events.iter().filter_map(|e| match &e.kind {
            EventKind::Harmony(symbol) => Some(symbol),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    pub name: String,
    /// Overrides the number of staff lines; `Some(0)` hides the staff
    pub staff_lines: Option<u8>,
    pub measures: Vec<Measure>,
}

impl Part {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            staff_lines: None,
            measures: Vec::new(),
        }
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Every event of every measure, in order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.measures.iter().flat_map(|m| m.events.iter())
    }
}

/// A complete score. Parts are shared handles so that derived scores can
/// reference the originals without copying or mutating them.
#[derive(Debug, Clone, Default)]
pub struct Score {
    pub title: Option<String>,
    pub parts: Vec<Arc<Part>>,
}

impl Score {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            title: None,
            parts: parts.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(parts: Vec<Arc<Part>>) -> Self {
        Self { title: None, parts }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn part(&self, id: &str) -> Option<&Arc<Part>> {
        self.parts.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pitch_parsing_and_display() {
        let p: Pitch = "C#4".parse().unwrap();
        assert_eq!(p, Pitch::new(Step::C, 1, 4));
        assert_eq!(p.midi(), 61);
        assert_eq!(p.to_string(), "C#4");

        let p: Pitch = "Bb3".parse().unwrap();
        assert_eq!(p.pitch_class(), 10);
        assert_eq!(p.name().to_string(), "Bb");

        let p: Pitch = "Cb-1".parse().unwrap();
        assert_eq!(p.octave, -1);
        assert_eq!(p.pitch_class(), 11);

        assert!("H4".parse::<Pitch>().is_err());
        assert!("C".parse::<Pitch>().is_err());
    }

    #[test]
    fn double_accidentals() {
        let name: PitchName = "F##".parse().unwrap();
        assert_eq!(name.alter, 2);
        assert_eq!(name.pitch_class(), 7);
        assert_eq!(name.to_string(), "F##");

        let name: PitchName = "Ebb".parse().unwrap();
        assert_eq!(name.pitch_class(), 2);
    }

    #[test]
    fn chord_symbol_figures() {
        let c = ChordSymbol::new(PitchName::new(Step::C, 0), ChordKind::Major7);
        assert_eq!(c.figure(), "Cmaj7");

        let f = ChordSymbol::new(PitchName::new(Step::F, 1), ChordKind::HalfDiminished7);
        assert_eq!(f.figure(), "F#m7b5");

        let slash = ChordSymbol::new(PitchName::new(Step::B, -1), ChordKind::Major)
            .with_bass(PitchName::new(Step::D, 0));
        assert_eq!(slash.figure(), "Bb/D");
    }

    #[test]
    fn chord_symbol_from_figure() {
        let cs: ChordSymbol = "Bbm7".parse().unwrap();
        assert_eq!(cs.root, PitchName::new(Step::B, -1));
        assert_eq!(cs.kind, ChordKind::Minor7);

        let cs: ChordSymbol = "C#".parse().unwrap();
        assert_eq!(cs.kind, ChordKind::Major);
        assert_eq!(cs.figure(), "C#");

        let cs: ChordSymbol = "G7/B".parse().unwrap();
        assert_eq!(cs.bass, Some(PitchName::new(Step::B, 0)));

        let cs: ChordSymbol = "Ebm(maj7)".parse().unwrap();
        assert_eq!(cs.kind, ChordKind::MinorMajor7);

        assert!("Cxyz".parse::<ChordSymbol>().is_err());
        assert!("".parse::<ChordSymbol>().is_err());
    }

    #[test]
    fn every_suffix_parses_back() {
        for kind in ChordKind::ALL {
            let figure = format!("D{}", kind.suffix());
            let cs: ChordSymbol = figure.parse().unwrap();
            assert_eq!(cs.kind, kind, "figure {}", figure);
        }
    }

    #[test]
    fn musicxml_kind_mapping() {
        assert_eq!(ChordKind::from_musicxml_kind("dominant"), Some(ChordKind::Dominant7));
        assert_eq!(ChordKind::from_musicxml_kind("major-ninth"), Some(ChordKind::Major7));
        assert_eq!(ChordKind::from_musicxml_kind("none"), None);
        assert_eq!(ChordKind::Add9.musicxml_kind(), "major");
    }

    #[test]
    fn measure_extent_and_notes() {
        let c4: Pitch = "C4".parse().unwrap();
        let m = Measure::new("3")
            .with_event(Event::note(0.0, 1.0, c4))
            .with_event(Event::rest(1.0, 1.0))
            .with_event(Event::chord(2.0, 2.0, vec![c4]));
        assert_eq!(m.extent(), 4.0);
        assert_eq!(m.notes().count(), 2);
        assert_eq!(Measure::new("1").extent(), 0.0);
    }

    #[test]
    fn bar_length() {
        assert_eq!(TimeSignature::new(3, 4).bar_length(), 3.0);
        assert_eq!(TimeSignature::new(6, 8).bar_length(), 3.0);
        assert_eq!(TimeSignature::default().bar_length(), 4.0);
    }
}
