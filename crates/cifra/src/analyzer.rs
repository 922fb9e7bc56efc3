use std::sync::Arc;

use partitura::{Part, Score};

use crate::harmonize::{harmonize_part, AnalysisResult};
use crate::key::estimate_key;
use crate::melody::select_melody;
use crate::types::Key;
use crate::CifraError;

/// Trait for harmonic analysis backends.
///
/// `HeuristicAnalyzer` is the template-matching implementation; other
/// backends slot in through `Annotator::with_analyzer`.
pub trait ScoreAnalyzer: Send + Sync {
    /// Best-effort global key. `None` is a valid answer.
    fn estimate_key(&self, score: &Score) -> Option<Key>;

    fn select_melody<'s>(&self, score: &'s Score) -> Result<&'s Arc<Part>, CifraError>;

    fn harmonize<'p>(&self, melody: &'p Part, key: Option<&Key>) -> Vec<AnalysisResult<'p>>;
}

/// Krumhansl-Schmuckler key estimation, note-count melody selection and
/// the staged chord fallback chain.
pub struct HeuristicAnalyzer;

impl ScoreAnalyzer for HeuristicAnalyzer {
    fn estimate_key(&self, score: &Score) -> Option<Key> {
        estimate_key(score)
    }

    fn select_melody<'s>(&self, score: &'s Score) -> Result<&'s Arc<Part>, CifraError> {
        select_melody(score)
    }

    fn harmonize<'p>(&self, melody: &'p Part, key: Option<&Key>) -> Vec<AnalysisResult<'p>> {
        harmonize_part(melody, key)
    }
}
