use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;

use super::EPSILON;
use crate::model::{
    ChordKind, ChordSymbol, Clef, Direction, Event, EventKind, Measure, Part, Pitch, PitchName,
    Score, Step,
};
use crate::{Error, Result};

const DOCTYPE: &str = r#"score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd""#;

/// Divisions-per-quarter values tried in order; the first that represents
/// every position in a part exactly is used.
const DIVISION_CANDIDATES: [u32; 20] = [
    1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 120, 192, 240, 384, 480, 960, 1920,
];
const FALLBACK_DIVISIONS: u32 = 960;

/// Note types by quarter length, longest first.
const NOTE_TYPES: [(&str, f64); 8] = [
    ("breve", 8.0),
    ("whole", 4.0),
    ("half", 2.0),
    ("quarter", 1.0),
    ("eighth", 0.5),
    ("16th", 0.25),
    ("32nd", 0.125),
    ("64th", 0.0625),
];

type XmlResult = quick_xml::Result<()>;

/// Serialize a score as MusicXML 3.1 partwise.
pub fn write_string(score: &Score) -> Result<String> {
    let mut out = ScoreWriter {
        w: Writer::new_with_indent(Vec::new(), b' ', 2),
    };
    out.score(score).map_err(|e| Error::Write(e.to_string()))?;
    String::from_utf8(out.w.into_inner()).map_err(|e| Error::Write(e.to_string()))
}

/// Serialize a score to a MusicXML file, replacing any existing file.
pub fn write_file(score: &Score, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let xml = write_string(score)?;
    std::fs::write(path, xml).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

struct ScoreWriter {
    w: Writer<Vec<u8>>,
}

impl ScoreWriter {
    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> XmlResult {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.w.write_event(XmlEvent::Start(el))
    }

    fn end(&mut self, name: &str) -> XmlResult {
        self.w.write_event(XmlEvent::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> XmlResult {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.w.write_event(XmlEvent::Empty(el))
    }

    fn text(&mut self, name: &str, value: &str) -> XmlResult {
        self.text_with(name, &[], value)
    }

    fn text_with(&mut self, name: &str, attrs: &[(&str, &str)], value: &str) -> XmlResult {
        self.start(name, attrs)?;
        self.w.write_event(XmlEvent::Text(BytesText::new(value)))?;
        self.end(name)
    }

    fn score(&mut self, score: &Score) -> XmlResult {
        self.w
            .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.w
            .write_event(XmlEvent::DocType(BytesText::from_escaped(DOCTYPE)))?;
        self.start("score-partwise", &[("version", "3.1")])?;

        if let Some(title) = &score.title {
            self.start("work", &[])?;
            self.text("work-title", title)?;
            self.end("work")?;
        }

        self.start("part-list", &[])?;
        for part in &score.parts {
            self.start("score-part", &[("id", part.id.as_str())])?;
            if part.staff_lines == Some(0) {
                self.text_with("part-name", &[("print-object", "no")], &part.name)?;
            } else {
                self.text("part-name", &part.name)?;
            }
            self.end("score-part")?;
        }
        self.end("part-list")?;

        for part in &score.parts {
            self.part(part)?;
        }

        self.end("score-partwise")
    }

    fn part(&mut self, part: &Part) -> XmlResult {
        let divisions = pick_divisions(part);
        let mut clefs: Vec<Clef> = Vec::new();
        self.start("part", &[("id", part.id.as_str())])?;
        for (index, measure) in part.measures.iter().enumerate() {
            for clef in &measure.clefs {
                clefs.retain(|c| c.number.unwrap_or(1) != clef.number.unwrap_or(1));
                clefs.push(clef.clone());
            }
            let ctx = MeasureContext {
                divisions,
                first: index == 0,
                staff_lines: part.staff_lines,
                clefs: &clefs,
            };
            self.measure(measure, &ctx)?;
        }
        self.end("part")
    }

    fn measure(&mut self, measure: &Measure, ctx: &MeasureContext) -> XmlResult {
        if measure.implicit {
            self.start(
                "measure",
                &[("number", measure.number.as_str()), ("implicit", "yes")],
            )?;
        } else {
            self.start("measure", &[("number", measure.number.as_str())])?;
        }

        let has_attributes = measure.time_signature.is_some()
            || measure.key_signature.is_some()
            || measure.staves.is_some()
            || !measure.clefs.is_empty();
        if ctx.first || has_attributes {
            self.attributes(measure, ctx)?;
        }

        for event in &measure.events {
            match &event.kind {
                EventKind::Harmony(symbol) => {
                    self.harmony(symbol, ctx.divs(event.offset))?;
                    for lyric in &symbol.lyrics {
                        self.words(lyric, ctx.divs(event.offset))?;
                    }
                }
                EventKind::Direction(direction) => self.direction(direction, event, ctx)?,
                _ => {}
            }
        }

        let mut voices: Vec<(String, Vec<&Event>)> = Vec::new();
        let timed = measure
            .events
            .iter()
            .filter(|e| !matches!(e.kind, EventKind::Harmony(_) | EventKind::Direction(_)));
        for event in timed {
            let voice = event.voice.clone().unwrap_or_else(|| "1".to_string());
            match voices.iter_mut().find(|(v, _)| *v == voice) {
                Some((_, events)) => events.push(event),
                None => voices.push((voice, vec![event])),
            }
        }

        let mut position: i64 = 0;
        for (voice, mut events) in voices {
            events.sort_by(|a, b| a.offset.total_cmp(&b.offset));
            if position > 0 {
                self.start("backup", &[])?;
                self.text("duration", &position.to_string())?;
                self.end("backup")?;
                position = 0;
            }
            for event in events {
                let start = ctx.divs(event.offset);
                if start > position {
                    self.start("forward", &[])?;
                    self.text("duration", &start.saturating_sub(position).to_string())?;
                    self.end("forward")?;
                } else if start < position {
                    self.start("backup", &[])?;
                    self.text("duration", &position.saturating_sub(start).to_string())?;
                    self.end("backup")?;
                }
                position = start;
                self.note_event(event, &voice, ctx)?;
                if !event.grace {
                    position = position.saturating_add(ctx.divs(event.duration));
                }
            }
        }

        self.end("measure")
    }

    fn attributes(&mut self, measure: &Measure, ctx: &MeasureContext) -> XmlResult {
        self.start("attributes", &[])?;
        if ctx.first {
            self.text("divisions", &ctx.divisions.to_string())?;
        }
        if let Some(key) = &measure.key_signature {
            self.start("key", &[])?;
            self.text("fifths", &key.fifths.to_string())?;
            if let Some(mode) = &key.mode {
                self.text("mode", mode)?;
            }
            self.end("key")?;
        }
        if let Some(time) = &measure.time_signature {
            self.start("time", &[])?;
            self.text("beats", &time.beats.to_string())?;
            self.text("beat-type", &time.beat_type.to_string())?;
            self.end("time")?;
        }
        if let Some(staves) = measure.staves {
            self.text("staves", &staves.to_string())?;
        }
        for clef in &measure.clefs {
            self.clef(clef)?;
        }
        if ctx.first {
            if let Some(lines) = ctx.staff_lines {
                self.start("staff-details", &[])?;
                self.text("staff-lines", &lines.to_string())?;
                self.end("staff-details")?;
            }
        }
        self.end("attributes")
    }

    fn clef(&mut self, clef: &Clef) -> XmlResult {
        let number = clef.number.map(|n| n.to_string());
        match &number {
            Some(n) => self.start("clef", &[("number", n.as_str())])?,
            None => self.start("clef", &[])?,
        }
        self.text("sign", &clef.sign)?;
        if let Some(line) = clef.line {
            self.text("line", &line.to_string())?;
        }
        self.end("clef")
    }

    fn harmony(&mut self, symbol: &ChordSymbol, offset: i64) -> XmlResult {
        self.start("harmony", &[("print-frame", "no")])?;
        self.start("root", &[])?;
        self.step_alter("root-step", "root-alter", &symbol.root)?;
        self.end("root")?;
        self.text_with(
            "kind",
            &[("text", symbol.kind.suffix())],
            symbol.kind.musicxml_kind(),
        )?;
        if let Some(bass) = &symbol.bass {
            self.start("bass", &[])?;
            self.step_alter("bass-step", "bass-alter", bass)?;
            self.end("bass")?;
        }
        if symbol.kind == ChordKind::Add9 {
            self.start("degree", &[])?;
            self.text("degree-value", "9")?;
            self.text("degree-alter", "0")?;
            self.text("degree-type", "add")?;
            self.end("degree")?;
        }
        if offset != 0 {
            self.text("offset", &offset.to_string())?;
        }
        self.end("harmony")
    }

    fn step_alter(&mut self, step_tag: &str, alter_tag: &str, name: &PitchName) -> XmlResult {
        self.text(step_tag, &name.step.as_char().to_string())?;
        if name.alter != 0 {
            self.text(alter_tag, &name.alter.to_string())?;
        }
        Ok(())
    }

    fn words(&mut self, text: &str, offset: i64) -> XmlResult {
        self.start("direction", &[("placement", "above")])?;
        self.start("direction-type", &[])?;
        self.text("words", text)?;
        self.end("direction-type")?;
        if offset != 0 {
            self.text("offset", &offset.to_string())?;
        }
        self.end("direction")
    }

    /// Direction types and sound are replayed from the source markup.
    fn direction(
        &mut self,
        direction: &Direction,
        event: &Event,
        ctx: &MeasureContext,
    ) -> XmlResult {
        match &direction.placement {
            Some(placement) => self.start("direction", &[("placement", placement.as_str())])?,
            None => self.start("direction", &[])?,
        }
        for raw in &direction.types {
            self.w.write_event(XmlEvent::Text(BytesText::from_escaped(raw.as_str())))?;
        }
        let offset = ctx.divs(event.offset);
        if offset != 0 {
            self.text("offset", &offset.to_string())?;
        }
        if let Some(voice) = &event.voice {
            self.text("voice", voice)?;
        }
        if let Some(staff) = event.staff {
            self.text("staff", &staff.to_string())?;
        }
        if let Some(raw) = &direction.sound {
            self.w.write_event(XmlEvent::Text(BytesText::from_escaped(raw.as_str())))?;
        }
        self.end("direction")
    }

    fn note_event(&mut self, event: &Event, voice: &str, ctx: &MeasureContext) -> XmlResult {
        match &event.kind {
            EventKind::Note(pitch) => self.note(event, pitch.as_ref(), false, voice, ctx),
            EventKind::Chord(pitches) if pitches.is_empty() => {
                self.note(event, None, false, voice, ctx)
            }
            EventKind::Chord(pitches) => {
                for (i, pitch) in pitches.iter().enumerate() {
                    self.note(event, Some(pitch), i > 0, voice, ctx)?;
                }
                Ok(())
            }
            EventKind::Rest { whole_measure, hidden } => {
                if *hidden {
                    self.start("note", &[("print-object", "no")])?;
                } else {
                    self.start("note", &[])?;
                }
                if *whole_measure {
                    self.empty("rest", &[("measure", "yes")])?;
                } else {
                    self.empty("rest", &[])?;
                }
                self.text("duration", &ctx.divs(event.duration).to_string())?;
                self.text("voice", voice)?;
                if !*whole_measure {
                    self.note_type(event)?;
                }
                self.time_modification(event)?;
                if let Some(staff) = event.staff {
                    self.text("staff", &staff.to_string())?;
                }
                self.end("note")
            }
            EventKind::Harmony(_) | EventKind::Direction(_) => Ok(()),
        }
    }

    fn note(
        &mut self,
        event: &Event,
        pitch: Option<&Pitch>,
        chord_member: bool,
        voice: &str,
        ctx: &MeasureContext,
    ) -> XmlResult {
        self.start("note", &[])?;
        if event.grace {
            self.empty("grace", &[])?;
        }
        if chord_member {
            self.empty("chord", &[])?;
        }
        match pitch {
            Some(p) => {
                self.start("pitch", &[])?;
                self.text("step", &p.step.as_char().to_string())?;
                if p.alter != 0 {
                    self.text("alter", &p.alter.to_string())?;
                }
                self.text("octave", &p.octave.to_string())?;
                self.end("pitch")?;
            }
            None => {
                let display = event.display.unwrap_or_else(|| ctx.middle_line(event.staff));
                self.start("unpitched", &[])?;
                self.text("display-step", &display.step.as_char().to_string())?;
                self.text("display-octave", &display.octave.to_string())?;
                self.end("unpitched")?;
            }
        }
        if !event.grace {
            self.text("duration", &ctx.divs(event.duration).to_string())?;
        }
        if event.tie_stop {
            self.empty("tie", &[("type", "stop")])?;
        }
        if event.tie_start {
            self.empty("tie", &[("type", "start")])?;
        }
        self.text("voice", voice)?;
        self.note_type(event)?;
        self.time_modification(event)?;
        if let Some(staff) = event.staff {
            self.text("staff", &staff.to_string())?;
        }
        if event.tie_start || event.tie_stop {
            self.start("notations", &[])?;
            if event.tie_stop {
                self.empty("tied", &[("type", "stop")])?;
            }
            if event.tie_start {
                self.empty("tied", &[("type", "start")])?;
            }
            self.end("notations")?;
        }
        if !chord_member {
            for text in &event.lyrics {
                self.start("lyric", &[])?;
                self.text("text", text)?;
                self.end("lyric")?;
            }
        }
        self.end("note")
    }

    fn note_type(&mut self, event: &Event) -> XmlResult {
        let (kind, dots) = match &event.note_type {
            Some(t) => (Some(t.as_str()), event.dots),
            None if event.grace => (Some("eighth"), 0),
            None => match infer_note_type(event.written_duration()) {
                Some((t, d)) => (Some(t), d),
                None => (None, 0),
            },
        };
        if let Some(kind) = kind {
            self.text("type", kind)?;
            for _ in 0..dots {
                self.empty("dot", &[])?;
            }
        }
        Ok(())
    }

    fn time_modification(&mut self, event: &Event) -> XmlResult {
        if let Some(tm) = event.time_modification {
            self.start("time-modification", &[])?;
            self.text("actual-notes", &tm.actual.to_string())?;
            self.text("normal-notes", &tm.normal.to_string())?;
            self.end("time-modification")?;
        }
        Ok(())
    }
}

struct MeasureContext<'a> {
    divisions: u32,
    first: bool,
    staff_lines: Option<u8>,
    /// Clef in force on each staff
    clefs: &'a [Clef],
}

impl MeasureContext<'_> {
    fn divs(&self, quarters: f64) -> i64 {
        (quarters * self.divisions as f64).round() as i64
    }

    /// Where a pitchless note sits when the source gave no display position.
    fn middle_line(&self, staff: Option<u8>) -> Pitch {
        let staff = staff.unwrap_or(1);
        let sign = self
            .clefs
            .iter()
            .find(|c| c.number.unwrap_or(1) == staff)
            .map(|c| c.sign.as_str());
        match sign {
            Some("F") => Pitch::new(Step::D, 0, 3),
            Some("C") => Pitch::new(Step::C, 0, 4),
            _ => Pitch::new(Step::B, 0, 4),
        }
    }
}

/// Smallest divisions value that expresses every offset and duration in the
/// part as a whole number.
fn pick_divisions(part: &Part) -> u32 {
    let values: Vec<f64> = part
        .events()
        .flat_map(|e| [e.offset, e.duration])
        .collect();

    DIVISION_CANDIDATES
        .iter()
        .copied()
        .find(|&d| {
            values.iter().all(|v| {
                let scaled = v * d as f64;
                (scaled - scaled.round()).abs() < EPSILON * d as f64
            })
        })
        .unwrap_or(FALLBACK_DIVISIONS)
}

/// Note type and dot count for a duration, when it is a plain or dotted value.
fn infer_note_type(quarters: f64) -> Option<(&'static str, u8)> {
    for (name, base) in NOTE_TYPES {
        if (quarters - base).abs() < EPSILON {
            return Some((name, 0));
        }
        if (quarters - base * 1.5).abs() < EPSILON {
            return Some((name, 1));
        }
        if (quarters - base * 1.75).abs() < EPSILON {
            return Some((name, 2));
        }
    }
    None
}
