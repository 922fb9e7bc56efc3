//! Score model adapter.
//!
//! Holds the in-memory score hierarchy (parts → measures → events), reads
//! and writes MusicXML, and drives an external notation renderer to produce
//! PDFs. No musical inference happens here.

pub mod model;
pub mod musicxml;
pub mod render;

pub use model::{
    ChordKind, ChordSymbol, Clef, Direction, Event, EventKind, KeySignature, Measure,
    ParseNameError, Part, Pitch, PitchName, Score, Step, TimeModification, TimeSignature,
};
pub use render::{RenderError, Renderer};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid MusicXML: {0}")]
    Invalid(String),

    #[error("unsupported MusicXML: {0}")]
    Unsupported(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable compressed MusicXML: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to write MusicXML: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, Error>;
