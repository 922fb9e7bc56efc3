use std::collections::HashMap;
use std::path::Path;

use roxmltree::{Document, Node, ParsingOptions};
use tracing::debug;

use super::EPSILON;
use crate::model::{
    ChordKind, ChordSymbol, Clef, Direction, Event, EventKind, KeySignature, Measure, Part, Pitch,
    PitchName, Score, Step, TimeModification, TimeSignature,
};
use crate::{Error, Result};

/// Longest span, in quarter notes, a single duration or offset may cover.
const MAX_QUARTERS: f64 = 1e6;

/// Parse a MusicXML document from a file on disk. Compressed `.mxl`
/// archives are recognised by their zip signature.
pub fn read_file(path: impl AsRef<Path>) -> Result<Score> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.starts_with(super::mxl::ZIP_MAGIC) {
        return super::mxl::read_mxl_bytes(&bytes);
    }
    let xml = std::str::from_utf8(&bytes)
        .map_err(|e| Error::Invalid(format!("{} is not UTF-8 text: {e}", path.display())))?;
    read_str(xml)
}

/// Parse a MusicXML document held in memory.
///
/// Only `score-partwise` documents are understood; OMR tools and notation
/// editors export that form.
pub fn read_str(xml: &str) -> Result<Score> {
    let xml = xml.trim_start_matches('\u{feff}');
    let options = ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "score-partwise" => read_partwise(root),
        "score-timewise" => Err(Error::Unsupported(
            "score-timewise documents (export as partwise)".to_string(),
        )),
        other => Err(Error::Invalid(format!(
            "unexpected root element <{other}>, expected <score-partwise>"
        ))),
    }
}

fn read_partwise(root: Node) -> Result<Score> {
    let names = root
        .children()
        .find(|n| n.has_tag_name("part-list"))
        .map(part_names)
        .unwrap_or_default();

    let title = child(root, "work")
        .and_then(|w| child_text(w, "work-title"))
        .or_else(|| child_text(root, "movement-title"))
        .map(str::to_string);

    let mut parts = Vec::new();
    for (index, node) in root.children().filter(|n| n.has_tag_name("part")).enumerate() {
        let id = node
            .attribute("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("P{}", index + 1));
        let name = names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Part {}", index + 1));
        parts.push(read_part(node, id, name)?);
    }

    if parts.is_empty() {
        debug!("MusicXML document contains no <part> elements");
    }

    let mut score = Score::new(parts);
    score.title = title;
    Ok(score)
}

fn part_names(part_list: Node) -> HashMap<String, String> {
    part_list
        .children()
        .filter(|n| n.has_tag_name("score-part"))
        .filter_map(|sp| {
            let id = sp.attribute("id")?;
            let name = child_text(sp, "part-name").unwrap_or("").trim().to_string();
            (!name.is_empty()).then(|| (id.to_string(), name))
        })
        .collect()
}

/// Reading state that survives measure boundaries.
struct PartReader {
    divisions: f64,
    staff_lines: Option<u8>,
}

impl PartReader {
    /// Child `name` converted from divisions to quarter notes. Missing or
    /// unparsable values read as zero.
    fn quarters(&self, node: Node, name: &str) -> Result<f64> {
        let Some(value) = child_text(node, name).and_then(|t| t.trim().parse::<f64>().ok()) else {
            return Ok(0.0);
        };
        let quarters = value / self.divisions;
        if !quarters.is_finite() || quarters.abs() > MAX_QUARTERS {
            return Err(Error::Invalid(format!("<{name}> value {value} is out of range")));
        }
        Ok(quarters)
    }
}

fn read_part(node: Node, id: String, name: String) -> Result<Part> {
    let mut reader = PartReader {
        divisions: 1.0,
        staff_lines: None,
    };
    let mut part = Part::new(id, name);

    for (index, m) in node.children().filter(|n| n.has_tag_name("measure")).enumerate() {
        let number = m
            .attribute("number")
            .map(str::to_string)
            .unwrap_or_else(|| (index + 1).to_string());
        part.measures.push(read_measure(&mut reader, m, number)?);
    }

    part.staff_lines = reader.staff_lines;
    Ok(part)
}

fn read_measure(reader: &mut PartReader, node: Node, number: String) -> Result<Measure> {
    let mut measure = Measure::new(number);
    measure.implicit = node.attribute("implicit") == Some("yes");
    let mut cursor = 0.0_f64;
    // Index of the most recent note-like event, target of <chord/> merges
    let mut last_note: Option<usize> = None;

    for el in node.children().filter(Node::is_element) {
        match el.tag_name().name() {
            "attributes" => read_attributes(reader, el, &mut measure),
            "backup" => {
                cursor = (cursor - reader.quarters(el, "duration")?).max(0.0);
            }
            "forward" => {
                cursor += reader.quarters(el, "duration")?;
            }
            "harmony" => {
                if let Some(symbol) = read_harmony(el) {
                    let offset = (cursor + reader.quarters(el, "offset")?).max(0.0);
                    measure.events.push(Event::harmony(offset, symbol));
                } else {
                    debug!(measure = %measure.number, "skipping harmony without a usable root/kind");
                }
            }
            "direction" => {
                let offset = (cursor + reader.quarters(el, "offset")?).max(0.0);
                measure.events.push(read_direction(el, offset));
            }
            "note" => {
                let is_chord_member = child(el, "chord").is_some();
                if is_chord_member {
                    if let Some(idx) = last_note {
                        merge_chord_member(&mut measure.events[idx], read_pitch_data(el));
                        continue;
                    }
                }

                let event = read_note(reader, el, cursor)?;
                cursor += event.duration;
                if event.is_note_like() {
                    last_note = Some(measure.events.len());
                }
                measure.events.push(event);
            }
            _ => {}
        }
        if cursor > MAX_QUARTERS {
            return Err(Error::Invalid(format!(
                "measure {} runs past {MAX_QUARTERS} quarter notes",
                measure.number
            )));
        }
    }

    Ok(measure)
}

enum PitchData {
    Pitched(Pitch),
    /// Percussion and the like, with the staff position if one was given
    Unpitched(Option<Pitch>),
    Rest,
}

fn read_pitch_data(note: Node) -> PitchData {
    if child(note, "rest").is_some() {
        return PitchData::Rest;
    }
    match child(note, "pitch").and_then(read_pitch) {
        Some(p) => PitchData::Pitched(p),
        None => PitchData::Unpitched(child(note, "unpitched").and_then(read_display)),
    }
}

fn read_display(node: Node) -> Option<Pitch> {
    let step = child_text(node, "display-step")?.trim().chars().next().and_then(Step::from_char)?;
    let octave = child_text(node, "display-octave")?.trim().parse::<i8>().ok()?;
    Some(Pitch::new(step, 0, octave))
}

fn read_pitch(node: Node) -> Option<Pitch> {
    let step = child_text(node, "step")?.trim().chars().next().and_then(Step::from_char)?;
    let alter = match child_text(node, "alter") {
        Some(t) => t.trim().parse::<f64>().ok()?.round() as i8,
        None => 0,
    };
    let octave = child_text(node, "octave")?.trim().parse::<i8>().ok()?;
    Some(Pitch::new(step, alter, octave))
}

fn merge_chord_member(target: &mut Event, data: PitchData) {
    let mut pitches = match &target.kind {
        EventKind::Note(Some(p)) => vec![*p],
        EventKind::Note(None) => Vec::new(),
        EventKind::Chord(ps) => ps.clone(),
        _ => return,
    };
    if let PitchData::Pitched(p) = data {
        pitches.push(p);
    }
    target.kind = EventKind::Chord(pitches);
}

fn read_note(reader: &PartReader, el: Node, cursor: f64) -> Result<Event> {
    let grace = child(el, "grace").is_some();
    let duration = if grace { 0.0 } else { reader.quarters(el, "duration")? };

    let mut display = None;
    let kind = match read_pitch_data(el) {
        PitchData::Pitched(p) => EventKind::Note(Some(p)),
        PitchData::Unpitched(position) => {
            display = position;
            EventKind::Note(None)
        }
        PitchData::Rest => EventKind::Rest {
            whole_measure: child(el, "rest").and_then(|r| r.attribute("measure")) == Some("yes"),
            hidden: el.attribute("print-object") == Some("no"),
        },
    };

    let mut event = Event::new(cursor, duration, kind);
    event.display = display;
    event.time_modification = child(el, "time-modification").and_then(read_time_modification);
    event.grace = grace;
    event.voice = child_text(el, "voice").map(|v| v.trim().to_string());
    event.staff = child_text(el, "staff").and_then(|s| s.trim().parse().ok());
    event.note_type = child_text(el, "type").map(|t| t.trim().to_string());
    event.dots = el.children().filter(|n| n.has_tag_name("dot")).count() as u8;
    for tie in el.children().filter(|n| n.has_tag_name("tie")) {
        match tie.attribute("type") {
            Some("start") => event.tie_start = true,
            Some("stop") => event.tie_stop = true,
            _ => {}
        }
    }
    event.lyrics = el
        .children()
        .filter(|n| n.has_tag_name("lyric"))
        .filter_map(|l| child_text(l, "text"))
        .map(str::to_string)
        .collect();
    Ok(event)
}

fn read_time_modification(node: Node) -> Option<TimeModification> {
    let actual = child_text(node, "actual-notes")?.trim().parse::<u32>().ok()?;
    let normal = child_text(node, "normal-notes")?.trim().parse::<u32>().ok()?;
    (actual > 0 && normal > 0).then_some(TimeModification { actual, normal })
}

/// Keeps the markup of each `<direction-type>` and `<sound>` verbatim.
fn read_direction(el: Node, offset: f64) -> Event {
    let input = el.document().input_text();
    let raw = |n: Node| input[n.range()].to_string();

    let direction = Direction {
        placement: el.attribute("placement").map(str::to_string),
        types: el
            .children()
            .filter(|n| n.has_tag_name("direction-type"))
            .map(raw)
            .collect(),
        sound: child(el, "sound").map(raw),
    };
    let mut event = Event::direction(offset, direction);
    event.voice = child_text(el, "voice").map(|v| v.trim().to_string());
    event.staff = child_text(el, "staff").and_then(|s| s.trim().parse().ok());
    event
}

fn read_harmony(el: Node) -> Option<ChordSymbol> {
    let root = child(el, "root")?;
    let root = read_step_alter(root, "root-step", "root-alter")?;

    let kind_node = child(el, "kind")?;
    let mut kind = ChordKind::from_musicxml_kind(kind_node.text().unwrap_or(""))?;

    let adds_ninth = el.children().filter(|n| n.has_tag_name("degree")).any(|d| {
        child_text(d, "degree-value").map(str::trim) == Some("9")
            && child_text(d, "degree-type").map(str::trim) == Some("add")
    });
    if kind == ChordKind::Major && adds_ninth {
        kind = ChordKind::Add9;
    }

    let mut symbol = ChordSymbol::new(root, kind);
    symbol.bass = child(el, "bass").and_then(|b| read_step_alter(b, "bass-step", "bass-alter"));
    Some(symbol)
}

fn read_step_alter(node: Node, step_tag: &str, alter_tag: &str) -> Option<PitchName> {
    let step = child_text(node, step_tag)?.trim().chars().next().and_then(Step::from_char)?;
    let alter = child_text(node, alter_tag)
        .and_then(|a| a.trim().parse::<f64>().ok())
        .map(|a| a.round() as i8)
        .unwrap_or(0);
    Some(PitchName::new(step, alter))
}

fn read_attributes(reader: &mut PartReader, el: Node, measure: &mut Measure) {
    if let Some(d) = child_text(el, "divisions").and_then(|t| t.trim().parse::<f64>().ok()) {
        if d.is_finite() && d > EPSILON {
            reader.divisions = d;
        }
    }

    if let Some(key) = child(el, "key") {
        if let Some(fifths) = child_text(key, "fifths").and_then(|f| f.trim().parse::<i8>().ok()) {
            measure.key_signature = Some(KeySignature {
                fifths,
                mode: child_text(key, "mode").map(|m| m.trim().to_string()),
            });
        }
    }

    if let Some(time) = child(el, "time") {
        let beats = child_text(time, "beats").map(sum_beats);
        let beat_type = child_text(time, "beat-type").and_then(|b| b.trim().parse::<u32>().ok());
        if let (Some(Some(beats)), Some(beat_type)) = (beats, beat_type) {
            measure.time_signature = Some(TimeSignature::new(beats, beat_type));
        }
    }

    if let Some(staves) = child_text(el, "staves").and_then(|s| s.trim().parse().ok()) {
        measure.staves = Some(staves);
    }

    for clef in el.children().filter(|n| n.has_tag_name("clef")) {
        let Some(sign) = child_text(clef, "sign") else {
            continue;
        };
        measure.clefs.push(Clef {
            sign: sign.trim().to_string(),
            line: child_text(clef, "line").and_then(|l| l.trim().parse().ok()),
            number: clef.attribute("number").and_then(|n| n.parse().ok()),
        });
    }

    if let Some(lines) = child(el, "staff-details")
        .and_then(|sd| child_text(sd, "staff-lines"))
        .and_then(|l| l.trim().parse().ok())
    {
        reader.staff_lines = Some(lines);
    }
}

/// "3+2" → 5, "4" → 4. `None` when a term is not a number or the sum
/// overflows.
fn sum_beats(text: &str) -> Option<u32> {
    text.split('+')
        .try_fold(0u32, |acc, b| acc.checked_add(b.trim().parse().ok()?))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrap(measures: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
  <part id="P1">{measures}</part>
</score-partwise>"#
        )
    }

    fn pitch(s: &str) -> Pitch {
        s.parse().unwrap()
    }

    #[test]
    fn reads_notes_with_cursor_and_divisions() {
        let xml = wrap(
            r#"<measure number="1">
                 <attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type></note>
                 <note><pitch><step>F</step><alter>1</alter><octave>4</octave></pitch><duration>3</duration><dot/></note>
                 <note><rest/><duration>1</duration></note>
               </measure>
               <measure number="2">
                 <note><pitch><step>G</step><octave>4</octave></pitch><duration>8</duration></note>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        let part = &score.parts[0];
        assert_eq!(part.name, "Voice");

        let m1 = &part.measures[0];
        assert_eq!(m1.time_signature, Some(TimeSignature::new(4, 4)));
        assert_eq!(m1.events.len(), 3);
        assert_eq!(m1.events[0].kind, EventKind::Note(Some(pitch("C4"))));
        assert_eq!(m1.events[0].voice.as_deref(), Some("1"));
        assert_eq!(m1.events[1].offset, 1.0);
        assert_eq!(m1.events[1].duration, 1.5);
        assert_eq!(m1.events[1].dots, 1);
        assert_eq!(m1.events[2].offset, 2.5);

        // divisions carry over into measure 2
        let m2 = &part.measures[1];
        assert_eq!(m2.time_signature, None);
        assert_eq!(m2.events[0].duration, 4.0);
    }

    #[test]
    fn chord_members_merge_without_advancing() {
        let xml = wrap(
            r#"<measure number="1">
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration></note>
                 <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>1</duration></note>
                 <note><chord/><unpitched><display-step>G</display-step><display-octave>4</display-octave></unpitched><duration>1</duration></note>
                 <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration></note>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        let events = &score.parts[0].measures[0].events;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].kind,
            EventKind::Chord(vec![pitch("C4"), pitch("E4")])
        );
        assert_eq!(events[1].offset, 1.0);
    }

    #[test]
    fn pitchless_chord_becomes_empty_chord() {
        let xml = wrap(
            r#"<measure number="1">
                 <note><unpitched/><duration>1</duration></note>
                 <note><chord/><unpitched/><duration>1</duration></note>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        let events = &score.parts[0].measures[0].events;
        assert_eq!(events[0].kind, EventKind::Chord(vec![]));
    }

    #[test]
    fn backup_forward_and_grace() {
        let xml = wrap(
            r#"<measure number="7a">
                 <note><grace/><pitch><step>B</step><octave>3</octave></pitch></note>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
                 <backup><duration>4</duration></backup>
                 <forward><duration>2</duration></forward>
                 <note><pitch><step>E</step><octave>3</octave></pitch><duration>2</duration><voice>2</voice></note>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        let m = &score.parts[0].measures[0];
        assert_eq!(m.number, "7a");
        assert!(m.events[0].grace);
        assert_eq!(m.events[0].duration, 0.0);
        assert_eq!(m.events[1].offset, 0.0);
        assert_eq!(m.events[2].offset, 2.0);
        assert_eq!(m.extent(), 4.0);
    }

    #[test]
    fn harmony_and_attributes() {
        let xml = wrap(
            r#"<measure number="1">
                 <attributes>
                   <divisions>4</divisions>
                   <key><fifths>-2</fifths><mode>major</mode></key>
                   <time><beats>3+2</beats><beat-type>8</beat-type></time>
                   <clef><sign>G</sign><line>2</line></clef>
                   <staff-details><staff-lines>0</staff-lines></staff-details>
                 </attributes>
                 <harmony><root><root-step>B</root-step><root-alter>-1</root-alter></root><kind>major</kind><bass><bass-step>D</bass-step></bass></harmony>
                 <note><pitch><step>B</step><alter>-1</alter><octave>4</octave></pitch><duration>4</duration></note>
                 <harmony><root><root-step>E</root-step><root-alter>-1</root-alter></root><kind>dominant-ninth</kind><offset>2</offset></harmony>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        let part = &score.parts[0];
        assert_eq!(part.staff_lines, Some(0));

        let m = &part.measures[0];
        assert_eq!(m.time_signature, Some(TimeSignature::new(5, 8)));
        assert_eq!(
            m.key_signature,
            Some(KeySignature {
                fifths: -2,
                mode: Some("major".to_string())
            })
        );
        assert_eq!(m.clefs[0].sign, "G");

        let figures: Vec<String> = m.harmonies().map(ChordSymbol::figure).collect();
        assert_eq!(figures, vec!["Bb/D".to_string(), "Eb7".to_string()]);
        assert_eq!(m.events[2].offset, 1.5);
    }

    #[test]
    fn rejects_timewise_and_foreign_roots() {
        let timewise = r#"<score-timewise version="3.1"></score-timewise>"#;
        assert!(matches!(read_str(timewise), Err(Error::Unsupported(_))));

        let html = "<html><body/></html>";
        assert!(matches!(read_str(html), Err(Error::Invalid(_))));

        assert!(matches!(read_str("<score-partwise>"), Err(Error::Xml(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_file("/definitely/not/here.musicxml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn additive_beats() {
        assert_eq!(sum_beats("3+2+2"), Some(7));
        assert_eq!(sum_beats("4"), Some(4));
        assert_eq!(sum_beats("x"), None);
        assert_eq!(sum_beats("4294967295+1"), None);
    }

    #[test]
    fn overflowing_time_signature_is_ignored() {
        let xml = wrap(
            r#"<measure number="1">
                 <attributes><time><beats>4294967295+1</beats><beat-type>4</beat-type></time></attributes>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        assert_eq!(score.parts[0].measures[0].time_signature, None);
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        for value in ["1e300", "NaN", "inf", "-inf"] {
            let note = wrap(&format!(
                r#"<measure number="1"><note><pitch><step>C</step><octave>4</octave></pitch><duration>{value}</duration></note></measure>"#
            ));
            assert!(
                matches!(read_str(&note), Err(Error::Invalid(_))),
                "duration {value}"
            );
        }

        let forward = wrap(r#"<measure number="1"><forward><duration>1e300</duration></forward></measure>"#);
        assert!(matches!(read_str(&forward), Err(Error::Invalid(_))));

        let harmony = wrap(
            r#"<measure number="1"><harmony><root><root-step>C</root-step></root><kind>major</kind><offset>inf</offset></harmony></measure>"#,
        );
        assert!(matches!(read_str(&harmony), Err(Error::Invalid(_))));
    }

    #[test]
    fn runaway_cursor_is_rejected() {
        let forwards = r#"<forward><duration>900000</duration></forward>"#.repeat(2);
        let xml = wrap(&format!(r#"<measure number="1">{forwards}</measure>"#));
        assert!(matches!(read_str(&xml), Err(Error::Invalid(_))));
    }

    #[test]
    fn unusable_divisions_keep_the_previous_value() {
        let xml = wrap(
            r#"<measure number="1">
                 <attributes><divisions>inf</divisions></attributes>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration></note>
               </measure>"#,
        );
        let score = read_str(&xml).unwrap();
        assert_eq!(score.parts[0].measures[0].events[0].duration, 2.0);
    }
}
