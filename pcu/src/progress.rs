use crate::config::ProgressSettings;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

const DEFAULT_CHARS: &str = "#>-";

/// Colors for one progress bar theme
///
/// Colors use indicatif's dotted style syntax, e.g. `cyan.bright` or
/// `yellow.bold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeSettings {
    pub spinner: String,
    pub description: String,
    pub bar: String,
    pub bar_background: String,
    pub progress_chars: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            spinner: "green".to_string(),
            description: "blue.bold".to_string(),
            bar: "cyan".to_string(),
            bar_background: "blue".to_string(),
            progress_chars: DEFAULT_CHARS.to_string(),
        }
    }
}

impl ThemeSettings {
    pub fn neon() -> Self {
        Self {
            spinner: "magenta.bright".to_string(),
            description: "yellow.bright".to_string(),
            bar: "green.bright".to_string(),
            bar_background: "white".to_string(),
            progress_chars: "█▓░".to_string(),
        }
    }

    pub fn minimal() -> Self {
        Self {
            spinner: "white".to_string(),
            description: "white.dim".to_string(),
            bar: "white".to_string(),
            bar_background: "white.dim".to_string(),
            progress_chars: "=> ".to_string(),
        }
    }

    /// Look up a built-in theme by name
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "neon" => Some(Self::neon()),
            "minimal" => Some(Self::minimal()),
            "default" => Some(Self::default()),
            _ => None,
        }
    }

    pub fn template(&self) -> String {
        format!(
            "{{spinner:.{}}} {{msg:.{}}} [{{elapsed_precise}}] [{{bar:40.{}/{}}}] {{pos}}/{{len}} ({{eta}})",
            self.spinner, self.description, self.bar, self.bar_background
        )
    }

    /// indicatif needs at least two characters of equal display width
    fn usable_chars(&self) -> &str {
        let chars = &self.progress_chars;
        let ascii = chars.chars().all(|c| c.is_ascii());
        let wide = chars.chars().all(|c| !c.is_ascii());
        if chars.chars().count() >= 2 && (ascii || wide) {
            chars
        } else {
            DEFAULT_CHARS
        }
    }

    pub fn style(&self) -> ProgressStyle {
        match ProgressStyle::with_template(&self.template()) {
            Ok(style) => style.progress_chars(self.usable_chars()),
            Err(e) => {
                tracing::warn!(error = %e, "invalid progress theme, using the default");
                ProgressStyle::default_bar().progress_chars(DEFAULT_CHARS)
            }
        }
    }
}

/// The configured theme: user themes first, then built-ins, then the default
pub fn resolve_theme(settings: &ProgressSettings) -> ThemeSettings {
    let name = settings.theme.as_str();
    settings
        .themes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, theme)| theme.clone())
        .or_else(|| ThemeSettings::builtin(name))
        .unwrap_or_else(|| {
            tracing::warn!(theme = %name, "unknown progress theme, using the default");
            ThemeSettings::default()
        })
}

/// A themed progress bar with a message
pub fn progress_bar(len: u64, theme: &ThemeSettings, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(theme.style());
    bar.set_message(message);
    bar
}
