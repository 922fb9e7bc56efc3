use partitura::PitchName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

/// Global tonal center of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub tonic: PitchName,
    pub mode: KeyMode,
    /// Pearson correlation with the best-matching key profile
    pub correlation: f64,
}

impl Key {
    pub fn new(tonic: PitchName, mode: KeyMode) -> Self {
        Self {
            tonic,
            mode,
            correlation: 1.0,
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tonic, self.mode)
    }
}

/// Which fallback stage produced a measure's chord label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inference {
    /// Exact template match on the sounding pitch classes
    Direct,
    /// Best-scoring triad reduction
    ForcedTriad,
    /// Scale degree of the downbeat note in the global key
    KeyRelative,
    /// Name of the first collected pitch as a major chord
    BareRoot,
}

impl Inference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Inference::Direct => "direct",
            Inference::ForcedTriad => "forced_triad",
            Inference::KeyRelative => "key_relative",
            Inference::BareRoot => "bare_root",
        }
    }
}

/// Per-measure outcome in a form that outlives the score it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureChord {
    pub number: String,
    pub chord: Option<String>,
    pub uncertain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference: Option<Inference>,
}

/// Metadata returned to whoever ran the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// "C major", or `None` when no key could be estimated
    pub key: Option<String>,
    pub measures: usize,
    pub uncertain_measures: usize,
    pub pdf_written: bool,
}
