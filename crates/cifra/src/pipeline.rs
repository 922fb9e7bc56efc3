//! File-to-file run: parse, annotate, write MusicXML, optionally render.

use std::path::Path;

use partitura::{musicxml, Renderer};
use tracing::{error, info, warn};

use crate::types::RunSummary;
use crate::{Annotator, CifraError};

/// Annotate `input` and write the result to `out_xml`.
///
/// When `out_pdf` is given the composite score is also rendered. Render
/// problems never fail the run; they show up as `pdf_written = false`.
pub async fn process_musicxml_file(
    input: &Path,
    out_xml: &Path,
    out_pdf: Option<&Path>,
    renderer: Option<&Renderer>,
) -> Result<RunSummary, CifraError> {
    let mut summary = annotate_file(input, out_xml)?;
    if let Some(pdf) = out_pdf {
        summary.pdf_written = render_pdf(out_xml, pdf, renderer).await;
    }
    Ok(summary)
}

/// The synchronous half of [`process_musicxml_file`]: everything up to and
/// including the MusicXML write. CPU-bound, so async callers should run it
/// on the blocking pool.
pub fn annotate_file(input: &Path, out_xml: &Path) -> Result<RunSummary, CifraError> {
    if !input.exists() {
        return Err(CifraError::InputNotFound(input.to_path_buf()));
    }

    info!(input = %input.display(), "parsing input MusicXML");
    let score = musicxml::read_file(input)?;

    let annotation = Annotator::new().annotate(&score)?;

    info!(out_xml = %out_xml.display(), "writing annotated MusicXML");
    musicxml::write_file(&annotation.score, out_xml)?;

    Ok(annotation.summary)
}

/// Render `xml` to `pdf`. Returns whether the PDF was produced.
pub async fn render_pdf(xml: &Path, pdf: &Path, renderer: Option<&Renderer>) -> bool {
    let Some(renderer) = renderer else {
        warn!(
            pdf = %pdf.display(),
            "PDF requested but no renderer is configured; install MuseScore and pass its path"
        );
        return false;
    };

    info!(pdf = %pdf.display(), "attempting PDF export");
    match renderer.render(xml, pdf).await {
        Ok(()) => {
            info!("PDF export succeeded");
            true
        }
        Err(err) => {
            error!(
                error = %err,
                renderer = %renderer.program.display(),
                "PDF export failed; check that MuseScore is installed and its path is configured"
            );
            false
        }
    }
}
