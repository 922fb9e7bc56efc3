pub mod analyzer;
pub mod assemble;
pub mod chord_templates;
pub mod harmonize;
pub mod key;
pub mod melody;
pub mod pipeline;
pub mod roman;
pub mod types;

pub use analyzer::{HeuristicAnalyzer, ScoreAnalyzer};
pub use harmonize::{AnalysisResult, SpellingError};
pub use pipeline::{annotate_file, process_musicxml_file, render_pdf};
pub use types::{Inference, Key, KeyMode, MeasureChord, RunSummary};

use std::path::PathBuf;
use std::sync::Arc;

use partitura::Score;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CifraError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error(transparent)]
    Score(#[from] partitura::Error),
}

/// Result of annotating one score.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Chord part first, then the original parts
    pub score: Score,
    pub key: Option<Key>,
    pub melody_part_id: String,
    pub measures: Vec<MeasureChord>,
    /// `pdf_written` is always false here; rendering happens later
    pub summary: RunSummary,
}

/// Runs key estimation, melody selection, harmonization and chord-track
/// assembly over a parsed score.
pub struct Annotator {
    analyzer: Arc<dyn ScoreAnalyzer>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Create with the default heuristic analyzer.
    pub fn new() -> Self {
        Self {
            analyzer: Arc::new(HeuristicAnalyzer),
        }
    }

    /// Create with a custom analyzer.
    pub fn with_analyzer(analyzer: Arc<dyn ScoreAnalyzer>) -> Self {
        Self { analyzer }
    }

    pub fn annotate(&self, score: &Score) -> Result<Annotation, CifraError> {
        let key = self.analyzer.estimate_key(score);
        match &key {
            Some(k) => info!(key = %k, correlation = k.correlation, "detected key"),
            None => info!("could not estimate a key, continuing without one"),
        }

        let melody = self.analyzer.select_melody(score)?;

        info!(measures = melody.measures.len(), "analyzing measures");
        let results = self.analyzer.harmonize(melody, key.as_ref());

        let measures: Vec<MeasureChord> = results
            .iter()
            .map(|r| MeasureChord {
                number: r.measure.number.clone(),
                chord: r.chord.as_ref().map(|c| c.figure()),
                uncertain: r.uncertain,
                inference: r.inference,
            })
            .collect();

        let composite = assemble::assemble(score, melody, &results);

        let summary = RunSummary {
            key: key.as_ref().map(Key::to_string),
            measures: measures.len(),
            uncertain_measures: measures.iter().filter(|m| m.uncertain).count(),
            pdf_written: false,
        };

        Ok(Annotation {
            score: composite,
            key,
            melody_part_id: melody.id.clone(),
            measures,
            summary,
        })
    }
}
