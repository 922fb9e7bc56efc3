//! Configuration sections. All of these are fixed for the life of the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Filesystem locations used by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Rendered PDFs, served back by token.
    /// Default: ~/.local/share/cifra/outputs
    #[serde(default = "PathsConfig::default_output_dir")]
    pub output_dir: PathBuf,

    /// Parent of the per-run `score_work_*` directories.
    /// Default: /tmp
    #[serde(default = "PathsConfig::default_work_dir")]
    pub work_dir: PathBuf,
}

impl PathsConfig {
    fn default_output_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/cifra/outputs"))
            .unwrap_or_else(|| PathBuf::from("outputs"))
    }

    fn default_work_dir() -> PathBuf {
        PathBuf::from("/tmp")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            work_dir: Self::default_work_dir(),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 5000
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        5000
    }

    /// `host:port` suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Optical music recognition tool (Audiveris).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmrConfig {
    /// Executable, or a `.jar` path that runs through `java -jar`.
    /// Default: audiveris
    #[serde(default = "OmrConfig::default_program")]
    pub program: String,

    /// Extra arguments placed before the batch export flags.
    #[serde(default)]
    pub args: Vec<String>,

    /// Default: 360
    #[serde(default = "OmrConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OmrConfig {
    fn default_program() -> String {
        "audiveris".to_string()
    }

    fn default_timeout_secs() -> u64 {
        360
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_jar(&self) -> bool {
        self.program.to_ascii_lowercase().ends_with(".jar")
    }
}

impl Default for OmrConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Vec::new(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Places MuseScore usually lands, checked in order.
pub const MUSESCORE_LOCATIONS: &[&str] = &[
    "/usr/bin/mscore",
    "/usr/bin/musescore",
    "/usr/bin/mscore4portable",
    "/usr/bin/mscore3",
    "/usr/local/bin/mscore",
    "/usr/local/bin/musescore",
    "/snap/bin/musescore",
    "/Applications/MuseScore 4.app/Contents/MacOS/mscore",
    "/Applications/MuseScore 3.app/Contents/MacOS/mscore",
    r"C:\Program Files\MuseScore 4\bin\MuseScore4.exe",
    r"C:\Program Files\MuseScore Studio 4\bin\MuseScore4.exe",
];

/// Notation renderer (MuseScore) used for PDF export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Path to the executable. Empty means autodetect.
    #[serde(default)]
    pub program: String,

    /// Default: 120
    #[serde(default = "RendererConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RendererConfig {
    fn default_timeout_secs() -> u64 {
        120
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pick the renderer executable.
    ///
    /// A configured path that exists wins. A configured path that does not
    /// exist is reported and autodetection takes over.
    pub fn resolve(&self) -> Option<PathBuf> {
        self.resolve_among(MUSESCORE_LOCATIONS)
    }

    pub(crate) fn resolve_among(&self, candidates: &[&str]) -> Option<PathBuf> {
        let configured = self.program.trim();
        if !configured.is_empty() {
            let path = Path::new(configured);
            if path.exists() {
                return Some(path.to_path_buf());
            }
            if let Some(found) = find_in_path(configured) {
                return Some(found);
            }
            warn!(
                renderer = configured,
                "configured renderer was not found on disk, trying known install locations"
            );
        }

        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Bare command names are looked up on `PATH`.
fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        return None;
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive (trace, debug, info, warn, error, or per-target).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
