use std::sync::Arc;

use partitura::{EventKind, Part, Score};
use tracing::{debug, info};

use crate::CifraError;

/// Number of single, pitched notes anywhere in the part.
pub fn note_count(part: &Part) -> usize {
    part.events()
        .filter(|e| matches!(e.kind, EventKind::Note(Some(_))))
        .count()
}

/// Pick the part most likely to carry the melody: the one with the most
/// single notes, earliest part on a tie.
///
/// This is a heuristic. A busy accompaniment can out-count a sparse melody.
pub fn select_melody(score: &Score) -> Result<&Arc<Part>, CifraError> {
    let mut best: Option<(&Arc<Part>, usize)> = None;
    for part in &score.parts {
        let count = note_count(part);
        debug!(part = %part.id, notes = count, "melody candidate");
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((part, count));
        }
    }

    let (part, count) =
        best.ok_or_else(|| CifraError::InvalidInput("no parts found in score".to_string()))?;
    info!(part = %part.id, name = %part.name, notes = count, "selected melody part");
    Ok(part)
}
