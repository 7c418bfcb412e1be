//! Config file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use image_loader::LoaderConfig;

/// Directory name under the config home.
const APP_DIR: &str = "image-loader";

/// Config file name.
const CONFIG_FILE: &str = "config.toml";

/// Key/value config file contents. Every field is optional; unset fields keep
/// the library default (or the CLI flag, which wins over both).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Root for the per-term directories.
    pub output_dir: Option<PathBuf>,
    /// Suffix directories with the run date.
    pub date_stamp: Option<bool>,
    /// Maximum simultaneous downloads.
    pub concurrency: Option<u8>,
    /// Run the browser headless.
    pub headless: Option<bool>,
    /// Chromium executable.
    pub chrome_path: Option<PathBuf>,
    /// Results page URL containing `{query}`.
    pub query_template: Option<String>,
    /// Consent button selector.
    pub consent_selector: Option<String>,
    /// Load-more control selector.
    pub load_more_selector: Option<String>,
    /// Thumbnail selector.
    pub thumbnail_selector: Option<String>,
    /// Revealed full-resolution image selector.
    pub revealed_image_selector: Option<String>,
    /// Attribute holding the image locator.
    pub locator_attribute: Option<String>,
    /// Wait after scrolling, in milliseconds.
    pub settle_interval_ms: Option<u64>,
    /// Wait after activating a thumbnail, in milliseconds.
    pub reveal_delay_ms: Option<u64>,
    /// Navigation timeout in seconds.
    pub navigation_timeout_secs: Option<u64>,
    /// Per-term render budget in seconds.
    pub render_budget_secs: Option<u64>,
    /// Download connect timeout in seconds.
    pub download_connect_timeout_secs: Option<u64>,
    /// Download read timeout in seconds.
    pub download_read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(template) = &self.query_template
            && !template.contains("{query}")
        {
            bail!("Invalid config value for `query_template`: '{template}' has no {{query}} placeholder");
        }
        validate_range("settle_interval_ms", self.settle_interval_ms, 0..=60_000)?;
        validate_range("reveal_delay_ms", self.reveal_delay_ms, 0..=60_000)?;
        validate_range("navigation_timeout_secs", self.navigation_timeout_secs, 1..=3600)?;
        validate_range("render_budget_secs", self.render_budget_secs, 1..=3600)?;
        validate_range(
            "download_connect_timeout_secs",
            self.download_connect_timeout_secs,
            1..=3600,
        )?;
        validate_range(
            "download_read_timeout_secs",
            self.download_read_timeout_secs,
            1..=3600,
        )?;
        Ok(())
    }

    /// Copies every set field onto `config`.
    pub fn apply_to(&self, config: &mut LoaderConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_root.clone_from(dir);
        }
        if let Some(date_stamp) = self.date_stamp {
            config.date_stamp = date_stamp;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(path) = &self.chrome_path {
            config.chromium_path = Some(path.clone());
        }
        if let Some(template) = &self.query_template {
            config.query_template.clone_from(template);
        }
        let markers = &mut config.markers;
        for (value, slot) in [
            (&self.consent_selector, &mut markers.consent_button),
            (&self.load_more_selector, &mut markers.load_more),
            (&self.thumbnail_selector, &mut markers.thumbnail),
            (&self.revealed_image_selector, &mut markers.revealed_image),
            (&self.locator_attribute, &mut markers.locator_attribute),
        ] {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
        if let Some(ms) = self.settle_interval_ms {
            config.settle_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reveal_delay_ms {
            config.reveal_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.navigation_timeout_secs {
            config.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.render_budget_secs {
            config.render_budget = Duration::from_secs(secs);
        }
        if let Some(secs) = self.download_connect_timeout_secs {
            config.http.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = self.download_read_timeout_secs {
            config.http.read = Duration::from_secs(secs);
        }
    }
}

fn validate_range(
    field: &str,
    value: Option<u64>,
    range: std::ops::RangeInclusive<u64>,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/image-loader/config.toml`
/// 2. `$HOME/.config/image-loader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, or the default one if it exists.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(read_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "chrome_path" => {
                cfg.chrome_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "date_stamp" => cfg.date_stamp = Some(parse_boolean(value).with_context(context)?),
            "headless" => cfg.headless = Some(parse_boolean(value).with_context(context)?),
            "concurrency" => cfg.concurrency = Some(parse_integer_u8(value).with_context(context)?),
            "query_template" => {
                cfg.query_template = Some(parse_string_literal(value).with_context(context)?);
            }
            "consent_selector" => {
                cfg.consent_selector = Some(parse_string_literal(value).with_context(context)?);
            }
            "load_more_selector" => {
                cfg.load_more_selector = Some(parse_string_literal(value).with_context(context)?);
            }
            "thumbnail_selector" => {
                cfg.thumbnail_selector = Some(parse_string_literal(value).with_context(context)?);
            }
            "revealed_image_selector" => {
                cfg.revealed_image_selector =
                    Some(parse_string_literal(value).with_context(context)?);
            }
            "locator_attribute" => {
                cfg.locator_attribute = Some(parse_string_literal(value).with_context(context)?);
            }
            "settle_interval_ms" => {
                cfg.settle_interval_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "reveal_delay_ms" => {
                cfg.reveal_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "navigation_timeout_secs" => {
                cfg.navigation_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "render_budget_secs" => {
                cfg.render_budget_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "download_connect_timeout_secs" => {
                cfg.download_connect_timeout_secs =
                    Some(parse_integer_u64(value).with_context(context)?);
            }
            "download_read_timeout_secs" => {
                cfg.download_read_timeout_secs =
                    Some(parse_integer_u64(value).with_context(context)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let Some(inner) = raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("Expected double-quoted string");
    };
    Ok(inner.to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
