//! Compressed MusicXML (`.mxl`): a zip archive whose `META-INF/container.xml`
//! names the score document inside it.

use std::io::{Cursor, Read};

use roxmltree::Document;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::read::read_str;
use crate::model::Score;
use crate::{Error, Result};

pub(crate) const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

const CONTAINER: &str = "META-INF/container.xml";
const MUSICXML_MEDIA_TYPE: &str = "application/vnd.recordare.musicxml+xml";

/// Parse a compressed MusicXML archive held in memory.
pub fn read_mxl_bytes(bytes: &[u8]) -> Result<Score> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let root = match read_entry(&mut archive, CONTAINER) {
        Ok(container) => rootfile(&container)?,
        Err(Error::Archive(ZipError::FileNotFound)) => None,
        Err(e) => return Err(e),
    };
    let root = match root {
        Some(path) => path,
        None => {
            debug!("no rootfile in {CONTAINER}, taking the first score document");
            archive
                .file_names()
                .filter(|name| !name.starts_with("META-INF/"))
                .find(|name| name.ends_with(".musicxml") || name.ends_with(".xml"))
                .map(str::to_string)
                .ok_or_else(|| Error::Invalid("archive holds no MusicXML document".to_string()))?
        }
    };

    let xml = read_entry(&mut archive, &root)?;
    read_str(&xml)
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String> {
    let mut entry = archive.by_name(name)?;
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(ZipError::from)?;
    Ok(text)
}

/// First MusicXML `<rootfile full-path>` listed in the container.
fn rootfile(container: &str) -> Result<Option<String>> {
    let doc = Document::parse(container.trim_start_matches('\u{feff}'))?;
    let path = doc
        .descendants()
        .filter(|n| n.has_tag_name("rootfile"))
        .filter(|n| {
            n.attribute("media-type")
                .map_or(true, |t| t == MUSICXML_MEDIA_TYPE)
        })
        .find_map(|n| n.attribute("full-path"))
        .map(str::to_string);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const SCORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
  <part id="P1"><measure number="1">
    <note><pitch><step>A</step><octave>4</octave></pitch><duration>4</duration></note>
  </measure></part>
</score-partwise>"#;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn follows_container_rootfile() {
        let container = r#"<?xml version="1.0" encoding="UTF-8"?>
<container><rootfiles>
  <rootfile full-path="preview.png" media-type="image/png"/>
  <rootfile full-path="scores/flute.xml" media-type="application/vnd.recordare.musicxml+xml"/>
</rootfiles></container>"#;
        let bytes = archive(&[
            ("mimetype", "application/vnd.recordare.musicxml"),
            ("META-INF/container.xml", container),
            ("decoy.xml", "<html/>"),
            ("scores/flute.xml", SCORE),
        ]);
        assert!(bytes.starts_with(ZIP_MAGIC));

        let score = read_mxl_bytes(&bytes).unwrap();
        assert_eq!(score.parts[0].name, "Flute");
        assert_eq!(score.parts[0].measures[0].events[0].duration, 4.0);
    }

    #[test]
    fn without_container_takes_first_score_document() {
        let bytes = archive(&[("song.musicxml", SCORE)]);
        let score = read_mxl_bytes(&bytes).unwrap();
        assert_eq!(score.parts.len(), 1);
    }

    #[test]
    fn rejects_archives_without_a_score() {
        let bytes = archive(&[("readme.txt", "hello")]);
        assert!(matches!(read_mxl_bytes(&bytes), Err(Error::Invalid(_))));
        assert!(matches!(read_mxl_bytes(b"PK\x03\x04garbage"), Err(Error::Archive(_))));
    }

    #[test]
    fn read_file_detects_compressed_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flute.mxl");
        std::fs::write(&path, archive(&[("flute.xml", SCORE)])).unwrap();

        let score = super::super::read_file(&path).unwrap();
        assert_eq!(score.parts[0].name, "Flute");
    }
}
