use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "ZOOPEEK_CONFIG";

/// Longest message the chat host accepts. `message.maxLen` may lower the
/// budget but never raise it past this.
pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Message
    #[serde(rename = "message.maxLen")]
    pub max_len: usize,

    // Pager
    #[serde(rename = "pager.defaultPageSize")]
    pub default_page_size: usize,

    #[serde(rename = "pager.pageSizeChoices")]
    pub page_size_choices: Vec<usize>,

    #[serde(rename = "pager.scrollSteps")]
    pub scroll_steps: Vec<i64>,

    #[serde(rename = "pager.idleTimeoutSecs")]
    pub idle_timeout_secs: u64,

    // Macros
    #[serde(rename = "macros.contextFile")]
    pub macro_context_file: Option<PathBuf>,  // None = built-in context

    // Query
    #[serde(rename = "query.showExpanded")]
    pub show_expanded: bool,

    // Storage
    #[serde(rename = "storage.database")]
    pub database: Option<PathBuf>,

    #[serde(rename = "storage.perUserDir")]
    pub per_user_dir: Option<PathBuf>,

    // Errors
    #[serde(rename = "errors.traceDir")]
    pub trace_dir: Option<PathBuf>,  // None = system temp dir
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_len: MAX_MESSAGE_LEN,
            default_page_size: 10,
            page_size_choices: vec![1, 5, 10, 20, 50],
            scroll_steps: vec![-50, -10, -1, 1, 10, 50],
            idle_timeout_secs: 300,
            macro_context_file: None,
            show_expanded: false,
            database: None,
            per_user_dir: None,
            trace_dir: None,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("zoopeek");
        config_dir.join("settings.json")
    }

    /// Load settings from `$ZOOPEEK_CONFIG`, or the default path (creating a
    /// commented default file there on first use).
    pub fn load() -> Self {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let path = Self::config_path();
        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }
        Self::load_from(&path)
    }

    /// Load settings from an explicit file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(mut settings) => {
                    for warning in settings.validate() {
                        log::warn!("{}: {}", path.display(), warning);
                    }
                    settings
                }
                Err(e) => {
                    log::warn!("Error parsing {}: {}", path.display(), e);
                    log::warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Reset out-of-range values to their defaults. Returns one message per
    /// reset value.
    pub fn validate(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        if self.max_len == 0 {
            warnings.push("message.maxLen must be positive; using 2000".to_string());
            self.max_len = defaults.max_len;
        } else if self.max_len > MAX_MESSAGE_LEN {
            warnings.push(format!(
                "message.maxLen {} exceeds the host limit; using {}",
                self.max_len, MAX_MESSAGE_LEN
            ));
            self.max_len = MAX_MESSAGE_LEN;
        }
        if self.default_page_size == 0 {
            warnings.push("pager.defaultPageSize must be positive; using 10".to_string());
            self.default_page_size = defaults.default_page_size;
        }
        if self.page_size_choices.is_empty() || self.page_size_choices.contains(&0) {
            warnings.push("pager.pageSizeChoices must be non-empty and positive; using defaults".to_string());
            self.page_size_choices = defaults.page_size_choices;
        }
        if self.scroll_steps.is_empty() || self.scroll_steps.contains(&0) {
            warnings.push("pager.scrollSteps must be non-empty and non-zero; using defaults".to_string());
            self.scroll_steps = defaults.scroll_steps;
        }
        if self.database.is_some() && self.per_user_dir.is_some() {
            warnings.push("storage.database and storage.perUserDir both set; using storage.perUserDir".to_string());
            self.database = None;
        }

        warnings
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(path, DEFAULT_FILE) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

const DEFAULT_FILE: &str = r#"{
    // Longest message the chat host accepts, in characters
    "message.maxLen": 2000,

    // Result pager
    "pager.defaultPageSize": 10,
    "pager.pageSizeChoices": [1, 5, 10, 20, 50],
    "pager.scrollSteps": [-50, -10, -1, 1, 10, 50],
    "pager.idleTimeoutSecs": 300,

    // Macro context prepended to every query (null = built-in)
    "macros.contextFile": null,

    // Echo the macro-expanded query instead of the original
    "query.showExpanded": false,

    // Snapshots: one shared file, or a directory of <user>.sqlite files
    "storage.database": null,
    "storage.perUserDir": null,

    // Where internal error traces are written (null = system temp dir)
    "errors.traceDir": null
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_parses_to_defaults() {
        assert_eq!(Settings::parse(DEFAULT_FILE).unwrap(), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let s = Settings::parse(
            "{\n  // tighter budget\n  \"message.maxLen\": 500,\n  \"storage.database\": \"/srv/zoo.sqlite\"\n}",
        )
        .unwrap();
        assert_eq!(s.max_len, 500);
        assert_eq!(s.database, Some(PathBuf::from("/srv/zoo.sqlite")));
        assert_eq!(s.default_page_size, 10);
        assert_eq!(s.scroll_steps, vec![-50, -10, -1, 1, 10, 50]);
    }

    #[test]
    fn validate_resets_bad_values() {
        let mut s = Settings {
            max_len: 0,
            default_page_size: 0,
            page_size_choices: vec![],
            scroll_steps: vec![1, 0],
            ..Settings::default()
        };
        let warnings = s.validate();
        assert_eq!(warnings.len(), 4);
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn load_from_bad_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(Settings::load_from(&dir.path().join("missing.json")), Settings::default());
    }

    #[test]
    fn max_len_is_capped_at_host_limit() {
        let mut s = Settings::parse("{ \"message.maxLen\": 4000 }").unwrap();
        let warnings = s.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("4000"));
        assert_eq!(s.max_len, MAX_MESSAGE_LEN);

        let mut s = Settings::parse("{ \"message.maxLen\": 2000 }").unwrap();
        assert!(s.validate().is_empty());
    }

    #[test]
    fn load_from_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            "{\n  \"message.maxLen\": 9999,\n  \"query.showExpanded\": true,\n  \"storage.perUserDir\": \"/srv/snapshots\"\n}",
        )
        .unwrap();
        let s = Settings::load_from(&path);
        assert_eq!(s.max_len, MAX_MESSAGE_LEN);
        assert!(s.show_expanded);
        assert_eq!(s.per_user_dir, Some(PathBuf::from("/srv/snapshots")));
    }
}
