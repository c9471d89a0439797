use super::operation::MAX_PRIORITY;

/// User-facing options persisted in `fastquit-config.txt`.
///
/// The version tag is not part of this struct: it always reflects the running crate
/// version when written, see [`crate::config::ConfigManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastQuitConfig {
    /// Show a toast when a world finishes saving in the background.
    pub show_toasts: bool,

    /// Keep rendering the "Saving world" screen on quit instead of returning
    /// to the menu straight away.
    pub render_saving_screen: bool,

    /// Thread priority of background saves, 0 leaves the priority untouched.
    pub background_priority: u8,
}

impl Default for FastQuitConfig {
    fn default() -> Self {
        Self {
            show_toasts: true,
            render_saving_screen: false,
            background_priority: 2,
        }
    }
}

impl FastQuitConfig {
    /// Clamp a raw priority value into `0..=MAX_PRIORITY`.
    pub fn clamp_priority(raw: i64) -> u8 {
        raw.clamp(0, i64::from(MAX_PRIORITY)) as u8
    }

    /// Whether background saves should have their priority changed at all.
    pub fn adjusts_priority(&self) -> bool {
        self.background_priority != 0
    }

    /// Re-apply the priority bounds after a direct mutation.
    pub fn normalize(&mut self) {
        self.background_priority = Self::clamp_priority(i64::from(self.background_priority));
    }
}
