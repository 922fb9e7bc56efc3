//! External notation renderer (MuseScore command line).
//!
//! The renderer is an explicit value handed to whoever needs a PDF; nothing
//! here reads or writes process-wide state.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to start renderer {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer did not finish: {0}")]
    Wait(#[source] std::io::Error),

    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    #[error("renderer exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("renderer reported success but {0} was not written")]
    NoOutput(PathBuf),
}

/// A notation renderer invoked as `<program> -o <pdf> <xml>`.
#[derive(Debug, Clone)]
pub struct Renderer {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Renderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render a MusicXML file to PDF. The child is killed if it outlives
    /// the timeout.
    pub async fn render(&self, xml: &Path, pdf: &Path) -> Result<(), RenderError> {
        debug!(program = %self.program.display(), xml = %xml.display(), "starting renderer");

        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg(pdf)
            .arg(xml)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // MuseScore needs a display unless told otherwise
        if std::env::var_os("QT_QPA_PLATFORM").is_none() {
            cmd.env("QT_QPA_PLATFORM", "offscreen");
        }

        let child = cmd.spawn().map_err(|source| RenderError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(RenderError::Wait)?,
            Err(_) => return Err(RenderError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(RenderError::Exit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(pdf).await.unwrap_or(false) {
            return Err(RenderError::NoOutput(pdf.to_path_buf()));
        }

        info!(pdf = %pdf.display(), "rendered score");
        Ok(())
    }
}
