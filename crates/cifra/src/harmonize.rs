//! Per-measure chord inference.
//!
//! Each measure's sounding pitches go through an ordered list of stages;
//! the first stage that produces a chord symbol wins. Stage failures are
//! ordinary values, logged at debug level and never surfaced.

use partitura::{ChordKind, ChordSymbol, EventKind, Measure, Part, Pitch, PitchName};
use tracing::debug;

use crate::chord_templates::{reduce_to_triad, spell_exact};
use crate::roman::RomanNumeral;
use crate::types::{Inference, Key};

/// Why a stage could not produce a chord symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpellingError {
    #[error("no pitches sound in the measure")]
    Empty,

    #[error("no chord template matches the pitch collection exactly")]
    NoTemplate,

    #[error("no triad reduction scores above threshold")]
    NoTriad,

    #[error("no global key available")]
    NoKey,

    #[error("no pitched downbeat note to relate to the key")]
    NoReferencePitch,

    #[error("pitch class {pitch_class} is not diatonic in {key}")]
    Chromatic { pitch_class: u8, key: String },
}

/// Pitches sounding within a measure, in collection order. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchSet(Vec<Pitch>);

impl PitchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pitch: Pitch) {
        self.0.push(pitch);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pitch> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Pitch> {
        self.0.first()
    }

    pub fn pitch_classes(&self) -> Vec<u8> {
        self.0.iter().map(Pitch::pitch_class).collect()
    }

    /// Lowest sounding pitch; the earliest collected wins a tie.
    pub fn bass(&self) -> Option<&Pitch> {
        self.0
            .iter()
            .reduce(|low, p| if p.midi() < low.midi() { p } else { low })
    }

    /// Spelling of a pitch class as it first occurs in the collection.
    pub fn spelling(&self, pitch_class: u8) -> Option<PitchName> {
        self.0
            .iter()
            .find(|p| p.pitch_class() == pitch_class % 12)
            .map(Pitch::name)
    }
}

impl FromIterator<Pitch> for PitchSet {
    fn from_iter<I: IntoIterator<Item = Pitch>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything the stages may look at for one measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureEvidence {
    pub pitches: PitchSet,
    /// A pitchless note or an empty chord was seen
    pub uncertain: bool,
    /// Pitch of the note nearest the downbeat, if that note has one
    pub reference: Option<Pitch>,
}

impl MeasureEvidence {
    /// Gather single notes first, then chord members, as the measure
    /// lists them.
    pub fn collect(measure: &Measure) -> Self {
        let mut pitches = PitchSet::new();
        let mut uncertain = false;

        for event in &measure.events {
            match &event.kind {
                EventKind::Note(Some(p)) => pitches.push(*p),
                EventKind::Note(None) => uncertain = true,
                _ => {}
            }
        }
        for event in &measure.events {
            if let EventKind::Chord(members) = &event.kind {
                if members.is_empty() {
                    uncertain = true;
                }
                for p in members {
                    pitches.push(*p);
                }
            }
        }

        let downbeat = measure
            .notes()
            .find(|e| e.offset.abs() < 1e-8)
            .or_else(|| measure.notes().next());
        let reference = downbeat.and_then(|e| match &e.kind {
            EventKind::Note(Some(p)) => Some(*p),
            _ => None,
        });

        Self {
            pitches,
            uncertain,
            reference,
        }
    }

    fn bass_class(&self) -> Option<u8> {
        self.pitches.bass().map(Pitch::pitch_class)
    }

    fn symbol(&self, root: u8, kind: ChordKind) -> Result<ChordSymbol, SpellingError> {
        let name = self.pitches.spelling(root).ok_or(SpellingError::Empty)?;
        Ok(ChordSymbol::new(name, kind))
    }
}

pub type StageFn = fn(&MeasureEvidence, Option<&Key>) -> Result<ChordSymbol, SpellingError>;

#[derive(Clone, Copy)]
pub struct Stage {
    pub inference: Inference,
    pub run: StageFn,
}

/// Fallback chain, tried in order.
pub const STAGES: [Stage; 4] = [
    Stage {
        inference: Inference::Direct,
        run: direct,
    },
    Stage {
        inference: Inference::ForcedTriad,
        run: forced_triad,
    },
    Stage {
        inference: Inference::KeyRelative,
        run: key_relative,
    },
    Stage {
        inference: Inference::BareRoot,
        run: bare_root,
    },
];

/// Exact chord spelling of the whole collection as a simultaneity.
pub fn direct(evidence: &MeasureEvidence, _key: Option<&Key>) -> Result<ChordSymbol, SpellingError> {
    if evidence.pitches.is_empty() {
        return Err(SpellingError::Empty);
    }
    let (root, kind) = spell_exact(&evidence.pitches.pitch_classes(), evidence.bass_class())
        .ok_or(SpellingError::NoTemplate)?;
    evidence.symbol(root, kind)
}

/// Best-fitting triad when no template matches exactly.
pub fn forced_triad(
    evidence: &MeasureEvidence,
    _key: Option<&Key>,
) -> Result<ChordSymbol, SpellingError> {
    if evidence.pitches.is_empty() {
        return Err(SpellingError::Empty);
    }
    let (root, kind) = reduce_to_triad(&evidence.pitches.pitch_classes(), evidence.bass_class())
        .ok_or(SpellingError::NoTriad)?;
    evidence.symbol(root, kind)
}

/// Diatonic triad on the downbeat note's scale degree.
pub fn key_relative(
    evidence: &MeasureEvidence,
    key: Option<&Key>,
) -> Result<ChordSymbol, SpellingError> {
    let key = key.ok_or(SpellingError::NoKey)?;
    let reference = evidence.reference.ok_or(SpellingError::NoReferencePitch)?;
    let numeral = RomanNumeral::in_key(reference.pitch_class(), key)?;
    debug!(figure = %numeral.figure(), key = %key, "key-relative inference");
    Ok(numeral.to_chord_symbol(reference.name()))
}

/// Major chord named after the first collected pitch.
pub fn bare_root(
    evidence: &MeasureEvidence,
    _key: Option<&Key>,
) -> Result<ChordSymbol, SpellingError> {
    let first = evidence.pitches.first().ok_or(SpellingError::Empty)?;
    Ok(ChordSymbol::new(first.name(), ChordKind::Major))
}

/// Outcome for one measure of the melody part.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult<'a> {
    pub measure: &'a Measure,
    pub chord: Option<ChordSymbol>,
    /// Source data was incomplete. Independent of which stage succeeded.
    pub uncertain: bool,
    pub inference: Option<Inference>,
}

pub fn harmonize_measure<'a>(measure: &'a Measure, key: Option<&Key>) -> AnalysisResult<'a> {
    let evidence = MeasureEvidence::collect(measure);
    let mut result = AnalysisResult {
        measure,
        chord: None,
        uncertain: evidence.uncertain,
        inference: None,
    };

    if evidence.pitches.is_empty() {
        return result;
    }

    for stage in &STAGES {
        match (stage.run)(&evidence, key) {
            Ok(chord) => {
                result.chord = Some(chord);
                result.inference = Some(stage.inference);
                break;
            }
            Err(err) => {
                debug!(
                    measure = %measure.number,
                    stage = stage.inference.as_str(),
                    error = %err,
                    "chord stage failed"
                );
            }
        }
    }

    result
}

/// One result per measure, in measure order.
pub fn harmonize_part<'a>(part: &'a Part, key: Option<&Key>) -> Vec<AnalysisResult<'a>> {
    part.measures
        .iter()
        .map(|m| harmonize_measure(m, key))
        .collect()
}
