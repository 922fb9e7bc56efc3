//! Config file discovery, loading, and environment variable overlay.

use crate::{CifraConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/cifra/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("cifra/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("cifra.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay its values over `base`.
pub fn load_from_file(path: &Path, base: CifraConfig) -> Result<CifraConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path, base)
}

/// Lay the keys present in `contents` over `base`. Absent keys keep the base value.
pub(crate) fn parse_toml(
    contents: &str,
    path: &Path,
    base: CifraConfig,
) -> Result<CifraConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let mut config = base;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("output_dir").and_then(|v| v.as_str()) {
            config.paths.output_dir = expand_path(v);
        }
        if let Some(v) = paths.get("work_dir").and_then(|v| v.as_str()) {
            config.paths.work_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.bind.http_port = u16::try_from(v)
                .map_err(|_| parse_err(format!("bind.http_port out of range: {v}")))?;
        }
    }

    if let Some(omr) = table.get("omr").and_then(|v| v.as_table()) {
        if let Some(v) = omr.get("program").and_then(|v| v.as_str()) {
            config.omr.program = v.to_string();
        }
        if let Some(args) = omr.get("args").and_then(|v| v.as_array()) {
            config.omr.args = args
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = omr.get("timeout_secs").and_then(|v| v.as_integer()) {
            config.omr.timeout_secs = u64::try_from(v)
                .map_err(|_| parse_err(format!("omr.timeout_secs must be positive: {v}")))?;
        }
    }

    if let Some(renderer) = table.get("renderer").and_then(|v| v.as_table()) {
        if let Some(v) = renderer.get("program").and_then(|v| v.as_str()) {
            config.renderer.program = v.to_string();
        }
        if let Some(v) = renderer.get("timeout_secs").and_then(|v| v.as_integer()) {
            config.renderer.timeout_secs = u64::try_from(v)
                .map_err(|_| parse_err(format!("renderer.timeout_secs must be positive: {v}")))?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CifraConfig, sources: &mut ConfigSources) {
    apply_overrides(config, sources, |name| env::var(name).ok());
}

/// Overrides from any variable source. Later names in each group win.
pub(crate) fn apply_overrides(
    config: &mut CifraConfig,
    sources: &mut ConfigSources,
    var: impl Fn(&str) -> Option<String>,
) {
    let mut take = |name: &str| {
        let value = var(name).filter(|v| !v.is_empty());
        if value.is_some() {
            sources.env_overrides.push(name.to_string());
        }
        value
    };

    if let Some(v) = take("CIFRA_OUTPUT_DIR") {
        config.paths.output_dir = expand_path(&v);
    }
    if let Some(v) = take("CIFRA_WORK_DIR") {
        config.paths.work_dir = expand_path(&v);
    }

    if let Some(v) = take("CIFRA_HOST") {
        config.bind.host = v;
    }
    // PORT is what most hosting platforms set
    for name in ["PORT", "CIFRA_HTTP_PORT"] {
        if let Some(port) = take(name).and_then(|v| v.parse().ok()) {
            config.bind.http_port = port;
        }
    }

    for name in ["AUDIVERIS_CLI", "CIFRA_OMR"] {
        if let Some(v) = take(name) {
            config.omr.program = v;
        }
    }
    for name in ["AUDIVERIS_TIMEOUT", "CIFRA_OMR_TIMEOUT"] {
        if let Some(secs) = take(name).and_then(|v| v.parse().ok()) {
            config.omr.timeout_secs = secs;
        }
    }

    for name in ["MUSESCORE_PATH", "CIFRA_RENDERER"] {
        if let Some(v) = take(name) {
            config.renderer.program = v;
        }
    }
    if let Some(secs) = take("CIFRA_RENDER_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.renderer.timeout_secs = secs;
    }

    if let Some(v) = take("CIFRA_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            Some(home) => home.join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml: &str) -> Result<CifraConfig, ConfigError> {
        parse_toml(toml, Path::new("test.toml"), CifraConfig::default())
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse(
            r#"
[paths]
output_dir = "/srv/cifra/outputs"
"#,
        )
        .unwrap();
        assert_eq!(config.paths.output_dir, PathBuf::from("/srv/cifra/outputs"));
        // Other values should be defaults
        assert_eq!(config.bind.http_port, 5000);
        assert_eq!(config.omr.program, "audiveris");
    }

    #[test]
    fn test_parse_full_toml() {
        let config = parse(
            r#"
[paths]
output_dir = "/data/outputs"
work_dir = "/data/work"

[bind]
host = "127.0.0.1"
http_port = 8080

[omr]
program = "/opt/audiveris/audiveris.jar"
args = ["-Xmx2g"]
timeout_secs = 600

[renderer]
program = "/usr/bin/mscore4portable"
timeout_secs = 45

[telemetry]
log_level = "cifra=debug,info"
"#,
        )
        .unwrap();

        assert_eq!(config.paths.output_dir, PathBuf::from("/data/outputs"));
        assert_eq!(config.paths.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.bind.addr(), "127.0.0.1:8080");
        assert!(config.omr.is_jar());
        assert_eq!(config.omr.args, vec!["-Xmx2g".to_string()]);
        assert_eq!(config.omr.timeout_secs, 600);
        assert_eq!(config.renderer.program, "/usr/bin/mscore4portable");
        assert_eq!(config.renderer.timeout_secs, 45);
        assert_eq!(config.telemetry.log_level, "cifra=debug,info");
    }

    #[test]
    fn test_later_file_overlays_earlier() {
        let first = parse("[bind]\nhttp_port = 9000\n[omr]\ntimeout_secs = 10\n").unwrap();
        // a later file can set a value back to its default
        let second =
            parse_toml("[bind]\nhttp_port = 5000\n", Path::new("local.toml"), first).unwrap();
        assert_eq!(second.bind.http_port, 5000);
        assert_eq!(second.omr.timeout_secs, 10);
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let err = parse("[bind\nhttp_port = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == Path::new("test.toml")));

        let err = parse("[bind]\nhttp_port = 70000\n").unwrap_err();
        assert!(err.to_string().contains("http_port"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = load_from_file(Path::new("/no/such/cifra.toml"), CifraConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "7000"),
            ("AUDIVERIS_CLI", "/opt/audiveris.jar"),
            ("AUDIVERIS_TIMEOUT", "90"),
            ("MUSESCORE_PATH", "/usr/bin/mscore"),
            ("CIFRA_RENDER_TIMEOUT", "not-a-number"),
            ("CIFRA_LOG_LEVEL", "debug"),
        ]);
        let mut config = CifraConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides(&mut config, &mut sources, |name| {
            vars.get(name).map(|v| v.to_string())
        });

        assert_eq!(config.bind.http_port, 7000);
        assert_eq!(config.omr.program, "/opt/audiveris.jar");
        assert_eq!(config.omr.timeout_secs, 90);
        assert_eq!(config.renderer.program, "/usr/bin/mscore");
        assert_eq!(config.renderer.timeout_secs, 120);
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(sources.env_overrides.contains(&"AUDIVERIS_CLI".to_string()));
    }

    #[test]
    fn test_cifra_names_beat_legacy_names() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "7000"),
            ("CIFRA_HTTP_PORT", "7100"),
            ("MUSESCORE_PATH", "/usr/bin/mscore"),
            ("CIFRA_RENDERER", "/opt/mscore"),
            ("CIFRA_LOG_LEVEL", "debug"),
            ("RUST_LOG", "warn"),
        ]);
        let mut config = CifraConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides(&mut config, &mut sources, |name| {
            vars.get(name).map(|v| v.to_string())
        });

        assert_eq!(config.bind.http_port, 7100);
        assert_eq!(config.renderer.program, "/opt/mscore");
        assert_eq!(config.telemetry.log_level, "warn");
    }
}
