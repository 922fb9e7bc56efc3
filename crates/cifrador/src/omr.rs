//! Optical music recognition: PDF in, MusicXML out, via the Audiveris CLI.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use cifraconf::OmrConfig;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum OmrError {
    #[error("failed to prepare OMR output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start OMR program {program}: {source}. Point CIFRA_OMR (or AUDIVERIS_CLI) at audiveris or its .jar")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OMR timed out after {0:?}")]
    Timeout(Duration),

    #[error("OMR failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("OMR did not produce a MusicXML file in {}. Check the input PDF quality and the OMR program path", .0.display())]
    NoOutput(PathBuf),
}

/// The full command line for one recognition run, program first.
pub fn command_line(pdf: &Path, out_dir: &Path, config: &OmrConfig) -> Vec<String> {
    let mut argv = Vec::new();
    if config.is_jar() {
        argv.push("java".to_string());
        argv.push("-jar".to_string());
    }
    argv.push(config.program.clone());
    argv.extend(config.args.iter().cloned());
    argv.extend(
        ["-batch", "-export", "-output"]
            .into_iter()
            .map(str::to_string),
    );
    argv.push(out_dir.display().to_string());
    argv.push(pdf.display().to_string());
    argv
}

/// Run recognition on `pdf`, exporting into `out_dir`, and return the
/// MusicXML file it wrote.
pub async fn run_omr(pdf: &Path, out_dir: &Path, config: &OmrConfig) -> Result<PathBuf, OmrError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| OmrError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;

    let argv = command_line(pdf, out_dir, config);
    info!(command = %argv.join(" "), "running OMR");

    let child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| OmrError::Spawn {
            program: argv[0].clone(),
            source,
        })?;

    let timeout = config.timeout();
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| OmrError::Spawn {
            program: argv[0].clone(),
            source,
        })?,
        Err(_) => return Err(OmrError::Timeout(timeout)),
    };

    if !output.status.success() {
        return Err(OmrError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!(stdout = %String::from_utf8_lossy(&output.stdout), "OMR finished");

    find_musicxml(out_dir).await
}

/// First `.musicxml`, then `.xml`, then compressed `.mxl`, in name order.
async fn find_musicxml(dir: &Path) -> Result<PathBuf, OmrError> {
    let io_err = |source| OmrError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let with_ext = |ext: &str| {
        files
            .iter()
            .find(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            })
            .cloned()
    };

    let found = with_ext("musicxml")
        .or_else(|| with_ext("xml"))
        .or_else(|| with_ext("mxl"))
        .ok_or_else(|| OmrError::NoOutput(dir.to_path_buf()))?;
    info!(musicxml = %found.display(), "OMR output");
    Ok(found)
}
