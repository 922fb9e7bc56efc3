//! MusicXML (partwise) reading and writing.

mod mxl;
mod read;
mod write;

pub use mxl::read_mxl_bytes;
pub use read::{read_file, read_str};
pub use write::{write_file, write_string};

/// Quarter lengths are compared with this tolerance.
pub(crate) const EPSILON: f64 = 1e-6;
