use crate::models::FastQuitConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use std::fs;
use std::sync::{PoisonError, RwLock};

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "fastquit-config.txt";

/// Result of parsing the text config format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    pub settings: FastQuitConfig,
    /// Version tag found in the file, if it was present and parseable.
    pub version: Option<Version>,
    /// Number of non-comment lines that could not be applied.
    pub skipped_lines: usize,
}

/// Parse `key:value` lines on top of `base`.
///
/// Comment (`#`) and blank lines are ignored, as are unknown keys. A malformed line is
/// skipped on its own and never aborts the parse.
pub fn parse_config(contents: &str, base: FastQuitConfig) -> ParsedConfig {
    let mut settings = base;
    let mut version = None;
    let mut skipped_lines = 0;

    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            tracing::debug!("Skipping config line {}: missing ':'", index + 1);
            skipped_lines += 1;
            continue;
        };
        let value = value.trim();

        let applied = match key.trim() {
            "version" => Version::parse(value).map(|v| version = Some(v)).is_ok(),
            "showToasts" => parse_bool(value).map(|b| settings.show_toasts = b).is_some(),
            "renderSavingScreen" => parse_bool(value)
                .map(|b| settings.render_saving_screen = b)
                .is_some(),
            "backgroundPriority" => value
                .parse::<i64>()
                .map(|p| settings.background_priority = FastQuitConfig::clamp_priority(p))
                .is_ok(),
            unknown => {
                tracing::debug!("Ignoring unknown config key '{}'", unknown);
                true
            }
        };

        if !applied {
            tracing::debug!("Skipping config line {}: bad value '{}'", index + 1, value);
            skipped_lines += 1;
        }
    }

    ParsedConfig {
        settings,
        version,
        skipped_lines,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Render settings in the stable on-disk order, with explanatory comments.
pub fn render_config(settings: &FastQuitConfig, version: &Version) -> String {
    let lines = [
        "# FastQuit Config".to_string(),
        format!("version:{version}"),
        String::new(),
        "## Show a toast when a world finishes saving in the background".to_string(),
        format!("showToasts:{}", settings.show_toasts),
        String::new(),
        "## Clearing client-side chunk storage can take a while on high render distances.".to_string(),
        "## Enable this to keep rendering the 'Saving world' screen while that happens.".to_string(),
        format!("renderSavingScreen:{}", settings.render_saving_screen),
        String::new(),
        "## Thread priority of worlds saving in the background.".to_string(),
        "## Lower values keep the game smoother but make saving take longer overall.".to_string(),
        format!(
            "## Must be between 0 and {}, 0 leaves the thread priority unchanged",
            crate::models::MAX_PRIORITY
        ),
        format!("backgroundPriority:{}", settings.background_priority),
    ];

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

/// Configuration manager for the FastQuit text config.
///
/// Holds the process-wide [`FastQuitConfig`]. Settings are loaded once at startup and
/// change afterwards only through [`update`](Self::update). Loading and saving never
/// fail: problems are logged and defaults are kept.
#[derive(Debug)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    current_version: Version,
    settings: RwLock<FastQuitConfig>,
}

impl ConfigManager {
    /// Create a ConfigManager for the running crate version.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `fastquit-config.txt`, created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let version = Version::parse(crate::VERSION)
            .with_context(|| format!("Invalid crate version: {}", crate::VERSION))?;
        Self::with_version(config_dir, version)
    }

    /// Create a ConfigManager that considers `current_version` the running version.
    pub fn with_version<P: AsRef<Utf8Path>>(config_dir: P, current_version: Version) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            current_version,
            settings: RwLock::new(FastQuitConfig::default()),
        })
    }

    /// Read the config file if there is one, then rewrite it when it is missing or outdated.
    pub fn initialize(&self) {
        if self.config_path.is_file() {
            if self.load("read") {
                self.save("update");
            }
        } else {
            self.save("create");
        }
    }

    /// Restore settings from the config file.
    ///
    /// # Returns
    /// `true` if the file's version tag is missing, unparseable or older than the running
    /// version, meaning the file should be rewritten.
    pub fn load(&self, action: &str) -> bool {
        let contents = match fs::read_to_string(&self.config_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!("Failed to {} config {}: {}", action, self.config_path, e);
                return true;
            }
        };

        let parsed = parse_config(&contents, self.settings());
        if parsed.skipped_lines > 0 {
            tracing::warn!(
                "Skipped {} malformed line(s) in {}",
                parsed.skipped_lines,
                self.config_path
            );
        }

        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = parsed.settings;
        tracing::info!("Loaded config from {}: {:?}", self.config_path, parsed.settings);

        parsed
            .version
            .is_none_or(|version| version < self.current_version)
    }

    /// Write the current settings to the config file.
    pub fn save(&self, action: &str) {
        let rendered = render_config(&self.settings(), &self.current_version);

        match fs::write(&self.config_path, rendered) {
            Ok(()) => tracing::info!("Config {}d at {}", action, self.config_path),
            Err(e) => tracing::error!("Failed to {} config {}: {}", action, self.config_path, e),
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> FastQuitConfig {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a user change to the settings and persist it.
    ///
    /// # Returns
    /// The settings after the change
    pub fn update<F>(&self, update_fn: F) -> FastQuitConfig
    where
        F: FnOnce(&mut FastQuitConfig),
    {
        let updated = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            update_fn(&mut settings);
            settings.normalize();
            *settings
        };

        self.save("update");
        updated
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_PRIORITY;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::with_version(&config_path, Version::new(3, 0, 0)).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_save_failure_is_logged_not_raised() {
        let (manager, _temp) = create_test_config_manager();
        // A directory where the file should be makes every write fail
        fs::create_dir(manager.config_path()).unwrap();
        let before = manager.settings();

        manager.save("update");
        assert_eq!(manager.settings(), before);
        assert!(manager.config_path().is_dir());

        // A user change still applies in memory when persisting it fails
        let after = manager.update(|s| s.background_priority = 6);
        assert_eq!(after.background_priority, 6);
        assert_eq!(manager.settings(), after);
    }

    #[test]
    fn test_parse_all_keys() {
        let parsed = parse_config(
            "# comment\nversion:2.1.0\n\nshowToasts:false\nrenderSavingScreen:TRUE\nbackgroundPriority:7\n",
            FastQuitConfig::default(),
        );

        assert_eq!(parsed.version, Some(Version::new(2, 1, 0)));
        assert!(!parsed.settings.show_toasts);
        assert!(parsed.settings.render_saving_screen);
        assert_eq!(parsed.settings.background_priority, 7);
        assert_eq!(parsed.skipped_lines, 0);
    }

    #[test]
    fn test_parse_skips_malformed_lines_individually() {
        let parsed = parse_config(
            "showToasts\nbackgroundPriority:fast\nrenderSavingScreen:yes\nshowToasts:false\nversion:banana\n",
            FastQuitConfig::default(),
        );

        assert!(!parsed.settings.show_toasts);
        assert!(!parsed.settings.render_saving_screen);
        assert_eq!(parsed.settings.background_priority, 2);
        assert_eq!(parsed.version, None);
        assert_eq!(parsed.skipped_lines, 4);
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let parsed = parse_config("theme:dark\n  backgroundPriority :  4 \n", FastQuitConfig::default());

        assert_eq!(parsed.settings.background_priority, 4);
        assert_eq!(parsed.skipped_lines, 0);
    }

    #[test]
    fn test_parse_clamps_priority() {
        let high = parse_config("backgroundPriority:42", FastQuitConfig::default());
        let low = parse_config("backgroundPriority:-3", FastQuitConfig::default());
        let sentinel = parse_config("backgroundPriority:0", FastQuitConfig::default());

        assert_eq!(high.settings.background_priority, MAX_PRIORITY);
        assert_eq!(low.settings.background_priority, 0);
        assert_eq!(sentinel.settings.background_priority, 0);
    }

    #[test]
    fn test_render_is_stable_and_parseable() {
        let settings = FastQuitConfig {
            show_toasts: false,
            render_saving_screen: true,
            background_priority: 9,
        };
        let version = Version::new(3, 0, 0);

        let rendered = render_config(&settings, &version);
        assert_eq!(rendered, render_config(&settings, &version));

        let keys: Vec<&str> = rendered
            .lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .filter_map(|l| l.split_once(':').map(|(k, _)| k))
            .collect();
        assert_eq!(
            keys,
            ["version", "showToasts", "renderSavingScreen", "backgroundPriority"]
        );

        let parsed = parse_config(&rendered, FastQuitConfig::default());
        assert_eq!(parsed.settings, settings);
        assert_eq!(parsed.version, Some(version));
    }

    #[test]
    fn test_load_missing_file_keeps_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        assert!(manager.load("read"));
        assert_eq!(manager.settings(), FastQuitConfig::default());
    }

    #[test]
    fn test_initialize_creates_file() {
        let (manager, _temp_dir) = create_test_config_manager();

        manager.initialize();

        let contents = fs::read_to_string(manager.config_path()).unwrap();
        assert!(contents.contains("version:3.0.0"));
        assert!(contents.contains("backgroundPriority:2"));
    }

    #[test]
    fn test_update_persists_and_clamps() {
        let (manager, _temp_dir) = create_test_config_manager();

        let updated = manager.update(|s| s.background_priority = 99);
        assert_eq!(updated.background_priority, MAX_PRIORITY);

        let contents = fs::read_to_string(manager.config_path()).unwrap();
        assert!(contents.contains(&format!("backgroundPriority:{}", MAX_PRIORITY)));
    }

    proptest! {
        #[test]
        fn prop_priority_always_in_range(raw in any::<i64>()) {
            let parsed = parse_config(&format!("backgroundPriority:{raw}"), FastQuitConfig::default());
            prop_assert!(parsed.settings.background_priority <= MAX_PRIORITY);
            if raw <= 0 {
                prop_assert_eq!(parsed.settings.background_priority, 0);
            }
        }
    }
}
