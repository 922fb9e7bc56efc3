use std::sync::Arc;

use partitura::{Event, EventKind, Measure, Part, Score, TimeSignature};
use tracing::{info, warn};

use crate::harmonize::AnalysisResult;

pub const CHORD_PART_ID: &str = "Chords";
pub const CHORD_PART_NAME: &str = "Chords";
pub const UNCERTAIN_MARKER: &str = "(uncertain)";

/// Build the composite score: a staff-less chord part first, then every
/// original part in its original order. The originals are shared, not
/// copied, and nothing in `score` is modified.
pub fn assemble(score: &Score, melody: &Part, results: &[AnalysisResult]) -> Score {
    if results.len() != melody.measures.len() {
        warn!(
            part = %melody.id,
            measures = melody.measures.len(),
            results = results.len(),
            "analysis does not cover every melody measure"
        );
    }

    let mut chord_part = Part::new(unique_part_id(score), CHORD_PART_NAME);
    chord_part.staff_lines = Some(0);

    let mut time_signature = TimeSignature::default();
    for result in results {
        let source = result.measure;
        if let Some(ts) = source.time_signature {
            time_signature = ts;
        }

        let mut measure = Measure::new(source.number.clone());
        measure.time_signature = source.time_signature;
        measure.key_signature = source.key_signature.clone();
        measure.implicit = source.implicit;

        if let Some(chord) = &result.chord {
            let mut symbol = chord.clone();
            symbol.lyrics.clear();
            if result.uncertain {
                symbol.add_lyric(UNCERTAIN_MARKER);
            }
            measure.events.push(Event::harmony(0.0, symbol));
        }

        let length = match source.extent() {
            extent if extent > 0.0 => extent,
            _ => time_signature.bar_length(),
        };
        measure.events.push(Event::new(
            0.0,
            length,
            EventKind::Rest {
                whole_measure: true,
                hidden: true,
            },
        ));

        chord_part.measures.push(measure);
    }

    info!(
        part = %chord_part.id,
        measures = chord_part.measures.len(),
        "assembled chord track"
    );

    let mut parts = Vec::with_capacity(score.parts.len() + 1);
    parts.push(Arc::new(chord_part));
    parts.extend(score.parts.iter().cloned());

    Score {
        title: score.title.clone(),
        parts,
    }
}

fn unique_part_id(score: &Score) -> String {
    if score.part(CHORD_PART_ID).is_none() {
        return CHORD_PART_ID.to_string();
    }
    (2..)
        .map(|n| format!("{CHORD_PART_ID}-{n}"))
        .find(|id| score.part(id).is_none())
        .unwrap_or_else(|| CHORD_PART_ID.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonize::harmonize_part;
    use partitura::{ChordSymbol, KeySignature, Pitch};
    use pretty_assertions::assert_eq;

    fn pitch(s: &str) -> Pitch {
        s.parse().unwrap()
    }

    fn melody() -> Part {
        Part::new("P1", "Melody")
            .with_measure(
                Measure::new("0")
                    .with_implicit(true)
                    .with_time_signature(TimeSignature::new(3, 4))
                    .with_key_signature(KeySignature {
                        fifths: 1,
                        mode: Some("major".into()),
                    })
                    .with_event(Event::note(2.0, 1.0, pitch("D4"))),
            )
            .with_measure(
                Measure::new("1")
                    .with_event(Event::note(0.0, 1.0, pitch("G4")))
                    .with_event(Event::note(1.0, 1.0, pitch("B4")))
                    .with_event(Event::note(2.0, 1.0, pitch("D5"))),
            )
            .with_measure(Measure::new("2"))
            .with_measure(Measure::new("3").with_event(Event::unpitched(0.0, 1.0)).with_event(
                Event::note(1.0, 2.0, pitch("C5")),
            ))
    }

    #[test]
    fn chord_part_mirrors_melody_measures() {
        let part = melody();
        let score = Score::new(vec![part.clone(), Part::new("P2", "Bass")]);
        let melody = &score.parts[0];
        let results = harmonize_part(melody, None);
        let composite = assemble(&score, melody, &results);

        assert_eq!(composite.parts.len(), 3);
        let chords = &composite.parts[0];
        assert_eq!(chords.id, "Chords");
        assert_eq!(chords.staff_lines, Some(0));

        let numbers: Vec<&str> = chords.measures.iter().map(|m| m.number.as_str()).collect();
        assert_eq!(numbers, vec!["0", "1", "2", "3"]);
        assert_eq!(chords.measures[0].time_signature, Some(TimeSignature::new(3, 4)));
        assert_eq!(chords.measures[0].key_signature, part.measures[0].key_signature);
        assert!(chords.measures[0].implicit);
        assert!(!chords.measures[1].implicit);
        assert_eq!(chords.measures[1].time_signature, None);

        // originals follow in order, shared rather than copied
        assert!(Arc::ptr_eq(&composite.parts[1], &score.parts[0]));
        assert!(Arc::ptr_eq(&composite.parts[2], &score.parts[1]));
    }

    #[test]
    fn chord_placed_at_downbeat_with_uncertain_marker() {
        let score = Score::new(vec![melody()]);
        let results = harmonize_part(&score.parts[0], None);
        let composite = assemble(&score, &score.parts[0], &results);
        let chords = &composite.parts[0];

        let symbols: Vec<Option<&ChordSymbol>> =
            chords.measures.iter().map(|m| m.harmonies().next()).collect();
        assert_eq!(symbols[1].map(ChordSymbol::figure).as_deref(), Some("G"));
        assert!(symbols[1].unwrap().lyrics.is_empty());
        assert_eq!(symbols[2], None);

        let uncertain = symbols[3].unwrap();
        assert_eq!(uncertain.lyrics, vec![UNCERTAIN_MARKER.to_string()]);
        let harmony_event = chords.measures[3]
            .events
            .iter()
            .find(|e| matches!(e.kind, EventKind::Harmony(_)))
            .unwrap();
        assert_eq!(harmony_event.offset, 0.0);
    }

    #[test]
    fn hidden_rest_keeps_time_alignment() {
        let score = Score::new(vec![melody()]);
        let results = harmonize_part(&score.parts[0], None);
        let composite = assemble(&score, &score.parts[0], &results);
        let chords = &composite.parts[0];

        // pickup measure spans to its last note, empty measure to a 3/4 bar
        assert_eq!(chords.measures[0].extent(), 3.0);
        assert_eq!(chords.measures[2].extent(), 3.0);
        assert!(chords.measures.iter().all(|m| m.events.iter().any(|e| matches!(
            e.kind,
            EventKind::Rest {
                hidden: true,
                whole_measure: true
            }
        ))));
    }

    #[test]
    fn source_score_untouched() {
        let score = Score::new(vec![melody()]);
        let before = score.parts[0].as_ref().clone();
        let results = harmonize_part(&score.parts[0], None);
        let _ = assemble(&score, &score.parts[0], &results);
        assert_eq!(score.parts.len(), 1);
        assert_eq!(*score.parts[0], before);
    }

    #[test]
    fn chord_part_id_avoids_collision() {
        let score = Score::new(vec![Part::new("Chords", "Guitar"), Part::new("Chords-2", "Uke")]);
        assert_eq!(unique_part_id(&score), "Chords-3");
    }
}
