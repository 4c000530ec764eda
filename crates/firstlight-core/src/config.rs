use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;
use crate::pipeline::{InputPaths, RunOptions};

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "firstlight.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no {key} configured (pass {flag} or set {key} in firstlight.toml)")]
    MissingPath {
        key: &'static str,
        flag: &'static str,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::MissingPath { .. } => ErrorCode::MissingPath,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
    /// Directory relative paths in the file are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InputsConfig {
    #[serde(default)]
    pub reviews: Option<PathBuf>,
    #[serde(default)]
    pub meta: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default)]
    pub partitions: Option<NonZeroUsize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Command-line values for `fl curate`; `None` falls back to the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurateOverrides {
    pub reviews: Option<PathBuf>,
    pub meta: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub partitions: Option<NonZeroUsize>,
    pub force: bool,
}

/// Fully resolved settings for one curation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurateSettings {
    pub inputs: InputPaths,
    pub out: PathBuf,
    pub options: RunOptions,
    pub force: bool,
}

/// Load the project config.
///
/// An explicit `path` must exist. Without one, `firstlight.toml` in `cwd` is
/// used if present, and defaults otherwise.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_project_config(cwd: &Path, path: Option<&Path>) -> Result<ProjectConfig, ConfigError> {
    let path = match path {
        Some(explicit) => cwd.join(explicit),
        None => {
            let default = cwd.join(PROJECT_CONFIG_FILE);
            if !default.exists() {
                return Ok(ProjectConfig {
                    base_dir: cwd.to_path_buf(),
                    ..ProjectConfig::default()
                });
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let mut config =
        toml::from_str::<ProjectConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    config.base_dir = path
        .parent()
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
    Ok(config)
}

/// Load `<config_dir>/firstlight/config.toml`, or defaults if absent.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig, ConfigError> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("firstlight/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str::<UserConfig>(&content).map_err(|source| ConfigError::Parse { path, source })
}

/// Load both config layers and resolve the output mode.
///
/// # Errors
///
/// Returns [`ConfigError`] if either config file is unreadable or invalid.
pub fn resolve_config(
    cwd: &Path,
    config_path: Option<&Path>,
    cli_json: bool,
    cli_format: Option<&str>,
) -> Result<EffectiveConfig, ConfigError> {
    let project = load_project_config(cwd, config_path)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, cli_format, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// Merge command-line values over the project config.
///
/// # Errors
///
/// Returns [`ConfigError::MissingPath`] if an input or the output directory
/// is set in neither place.
pub fn resolve_curate(
    project: &ProjectConfig,
    overrides: CurateOverrides,
) -> Result<CurateSettings, ConfigError> {
    let from_file = |p: Option<&PathBuf>| p.map(|p| project.base_dir.join(p));

    let reviews = overrides
        .reviews
        .or_else(|| from_file(project.inputs.reviews.as_ref()))
        .ok_or(ConfigError::MissingPath {
            key: "inputs.reviews",
            flag: "--reviews",
        })?;
    let meta = overrides
        .meta
        .or_else(|| from_file(project.inputs.meta.as_ref()))
        .ok_or(ConfigError::MissingPath {
            key: "inputs.meta",
            flag: "--meta",
        })?;
    let out = overrides
        .out
        .or_else(|| from_file(project.output.dir.as_ref()))
        .ok_or(ConfigError::MissingPath {
            key: "output.dir",
            flag: "--out",
        })?;

    let options = overrides
        .partitions
        .or(project.run.partitions)
        .map_or_else(RunOptions::default, |partitions| RunOptions { partitions });

    Ok(CurateSettings {
        inputs: InputPaths { reviews, meta },
        out,
        options,
        force: overrides.force || project.output.force,
    })
}

/// Output mode precedence: `--json`, `--format`, `FORMAT`, user config, TTY.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    cli_format: Option<&str>,
    user_output: Option<String>,
    env_format: Option<String>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    let layered = [cli_format, env_format.as_deref(), user_output.as_deref()];
    if let Some(mode) = layered.into_iter().flatten().find_map(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}
