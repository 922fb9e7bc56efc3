use std::path::{Path, PathBuf};

use cifra::{process_musicxml_file, Annotator, CifraError, Inference};
use partitura::{musicxml, EventKind, Renderer};
use pretty_assertions::assert_eq;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../partitura/tests/fixtures/two_part.musicxml")
}

#[test]
fn annotates_fixture_measure_by_measure() {
    let score = musicxml::read_file(fixture()).unwrap();
    let annotation = Annotator::new().annotate(&score).unwrap();

    assert_eq!(annotation.melody_part_id, "P1");
    assert_eq!(annotation.summary.key.as_deref(), Some("C major"));

    let labels: Vec<Option<&str>> = annotation
        .measures
        .iter()
        .map(|m| m.chord.as_deref())
        .collect();
    assert_eq!(labels, vec![Some("C"), Some("F"), Some("G7"), Some("C")]);

    let inferences: Vec<Option<Inference>> =
        annotation.measures.iter().map(|m| m.inference).collect();
    assert_eq!(
        inferences,
        vec![
            Some(Inference::Direct),
            Some(Inference::Direct),
            Some(Inference::Direct),
            Some(Inference::KeyRelative),
        ]
    );
    assert_eq!(annotation.summary.uncertain_measures, 0);

    let ids: Vec<&str> = annotation.score.parts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["Chords", "P1", "P2"]);
}

#[tokio::test]
async fn file_pipeline_writes_readable_musicxml() {
    let dir = tempfile::tempdir().unwrap();
    let out_xml = dir.path().join("musicxml_limpo.xml");

    let summary = process_musicxml_file(&fixture(), &out_xml, None, None)
        .await
        .unwrap();
    assert_eq!(summary.measures, 4);
    assert_eq!(summary.uncertain_measures, 0);
    assert!(!summary.pdf_written);

    let written = musicxml::read_file(&out_xml).unwrap();
    let chords = &written.parts[0];
    assert_eq!(chords.id, "Chords");
    assert_eq!(chords.staff_lines, Some(0));
    let figures: Vec<String> = chords
        .measures
        .iter()
        .flat_map(|m| m.harmonies().map(|h| h.figure()))
        .collect();
    assert_eq!(figures, vec!["C", "F", "G7", "C"]);

    // the chord track stays time-aligned with the melody
    for (chord_m, melody_m) in chords.measures.iter().zip(&written.parts[1].measures) {
        assert_eq!(chord_m.number, melody_m.number);
        assert_eq!(chord_m.extent(), melody_m.extent());
    }
}

#[tokio::test]
async fn missing_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = process_musicxml_file(
        &dir.path().join("nope.musicxml"),
        &dir.path().join("out.xml"),
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CifraError::InputNotFound(_)));
    assert!(!dir.path().join("out.xml").exists());
}

#[tokio::test]
async fn render_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let out_xml = dir.path().join("out.xml");
    let out_pdf = dir.path().join("out.pdf");
    let renderer = Renderer::new(dir.path().join("missing-mscore"));

    let summary = process_musicxml_file(&fixture(), &out_xml, Some(&out_pdf), Some(&renderer))
        .await
        .unwrap();
    assert!(!summary.pdf_written);
    assert!(out_xml.exists());

    // no renderer configured at all behaves the same way
    let summary = process_musicxml_file(&fixture(), &out_xml, Some(&out_pdf), None)
        .await
        .unwrap();
    assert!(!summary.pdf_written);
}

#[tokio::test]
async fn uncertain_measures_are_marked() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.musicxml");
    std::fs::write(
        &input,
        r#"<?xml version="1.0"?>
<score-partwise version="3.1">
  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <note><unpitched/><duration>1</duration></note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration></note>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>1</duration></note>
      <note><pitch><step>A</step><octave>4</octave></pitch><duration>1</duration></note>
    </measure>
    <measure number="2">
      <note><unpitched/><duration>4</duration></note>
    </measure>
  </part>
</score-partwise>"#,
    )
    .unwrap();
    let out_xml = dir.path().join("out.xml");

    let summary = process_musicxml_file(&input, &out_xml, None, None)
        .await
        .unwrap();
    assert_eq!(summary.measures, 2);
    assert_eq!(summary.uncertain_measures, 2);

    let xml = std::fs::read_to_string(&out_xml).unwrap();
    assert_eq!(xml.matches("<words>(uncertain)</words>").count(), 1);

    let written = musicxml::read_str(&xml).unwrap();
    let second = &written.parts[0].measures[1];
    assert!(second
        .events
        .iter()
        .all(|e| !matches!(e.kind, EventKind::Harmony(_))));
}
