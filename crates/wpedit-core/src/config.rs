use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_pixels_per_day")]
    pub pixels_per_day: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            pixels_per_day: default_pixels_per_day(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_true")]
    pub refresh_parent: bool,
    #[serde(default = "default_true")]
    pub invalidate_activity: bool,
    #[serde(default = "default_true")]
    pub publish_events: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            refresh_parent: default_true(),
            invalidate_activity: default_true(),
            publish_events: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "default_true")]
    pub notify_success: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            notify_success: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub editor: EditorConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_editor_config(root: &Path) -> Result<EditorConfig> {
    let path = root.join(".wpedit/config.toml");
    if !path.exists() {
        return Ok(EditorConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<EditorConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if !(config.timeline.pixels_per_day.is_finite() && config.timeline.pixels_per_day > 0.0) {
        anyhow::bail!(
            "Invalid timeline.pixels_per_day in {}: must be a positive number",
            path.display()
        );
    }
    Ok(config)
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("wpedit/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let editor = load_editor_config(root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        editor,
        user,
        resolved_output,
    })
}

/// Output mode, in precedence order: `--json`, `FORMAT`, user config, then
/// `human` on a terminal and `json` otherwise.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" | "text" => Some("human"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "human".to_string()
    } else {
        "json".to_string()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_pixels_per_day() -> f64 {
    30.0
}
