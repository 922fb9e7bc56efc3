//! One scanned-score job: PDF upload → OMR → chord annotation → rendered PDF.
//!
//! Each job gets its own `score_work_*` directory and a random token that
//! names the output PDF, so concurrent jobs never share files.

use std::path::{Path, PathBuf};

use cifra::RunSummary;
use cifraconf::{CifraConfig, OmrConfig};
use partitura::Renderer;
use tracing::{info, warn};

use crate::omr::{run_omr, OmrError};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Omr(#[from] OmrError),

    #[error(transparent)]
    Annotate(#[from] cifra::CifraError),

    #[error("annotation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("PDF export failed. Verify MuseScore is installed and CIFRA_RENDERER (or MUSESCORE_PATH) points at it")]
    PdfExport,
}

impl JobError {
    fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| JobError::Io { context, source }
    }
}

/// Everything a job needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub omr: OmrConfig,
    pub renderer: Option<Renderer>,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl JobSettings {
    pub fn from_config(config: &CifraConfig) -> Self {
        let renderer = config
            .renderer
            .resolve()
            .map(|program| Renderer::new(program).with_timeout(config.renderer.timeout()));
        match &renderer {
            Some(r) => info!(renderer = %r.program.display(), "using renderer"),
            None => warn!("no MuseScore installation found; PDF export will fail"),
        }

        Self {
            omr: config.omr.clone(),
            renderer,
            output_dir: config.paths.output_dir.clone(),
            work_dir: config.paths.work_dir.clone(),
        }
    }

    /// Where the PDF for `token` lives.
    pub fn output_pdf(&self, token: &str) -> PathBuf {
        self.output_dir.join(format!("{token}.pdf"))
    }
}

/// Result of a finished job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub token: String,
    pub output_pdf: PathBuf,
    pub summary: RunSummary,
}

/// Run the whole flow for one uploaded PDF.
///
/// When `keep_xml` is set, the annotated MusicXML is copied there before the
/// work directory is removed.
pub async fn build_score_from_pdf(
    pdf: &[u8],
    settings: &JobSettings,
    keep_xml: Option<&Path>,
) -> Result<JobOutput, JobError> {
    tokio::fs::create_dir_all(&settings.work_dir)
        .await
        .map_err(JobError::io("Failed to create work directory"))?;
    let work = tempfile::Builder::new()
        .prefix("score_work_")
        .tempdir_in(&settings.work_dir)
        .map_err(JobError::io("Failed to create job directory"))?;

    let pdf_path = work.path().join("input.pdf");
    tokio::fs::write(&pdf_path, pdf)
        .await
        .map_err(JobError::io("Failed to save uploaded PDF"))?;

    let musicxml = run_omr(&pdf_path, &work.path().join("audiveris"), &settings.omr).await?;

    let token = uuid::Uuid::new_v4().simple().to_string();
    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .map_err(JobError::io("Failed to create output directory"))?;
    let output_pdf = settings.output_pdf(&token);
    let output_xml = work.path().join("with_chords.musicxml");

    let summary = {
        let (input, out) = (musicxml.clone(), output_xml.clone());
        tokio::task::spawn_blocking(move || cifra::annotate_file(&input, &out)).await??
    };

    let pdf_written =
        cifra::render_pdf(&output_xml, &output_pdf, settings.renderer.as_ref()).await;
    if !pdf_written || !tokio::fs::try_exists(&output_pdf).await.unwrap_or(false) {
        return Err(JobError::PdfExport);
    }

    if let Some(dest) = keep_xml {
        tokio::fs::copy(&output_xml, dest)
            .await
            .map_err(JobError::io(format!("Failed to copy MusicXML to {}", dest.display())))?;
    }

    info!(%token, measures = summary.measures, "job complete");
    Ok(JobOutput {
        token,
        output_pdf,
        summary: RunSummary {
            pdf_written,
            ..summary
        },
    })
}
