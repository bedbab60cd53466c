use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFERENCES_FILE: &str = "preferences.toml";
pub const THEME_KEY: &str = "bol-theme";
pub const USER_TYPE_KEY: &str = "bol-user-type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Persona the chat is talking to. Selects the webhook endpoint and the UI copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Audience {
    #[default]
    Buyer,
    Farmer,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Buyer => "buyer",
            Audience::Farmer => "farmer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "buyer" => Some(Audience::Buyer),
            "farmer" => Some(Audience::Farmer),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Audience::Buyer => Audience::Farmer,
            Audience::Farmer => Audience::Buyer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    pub theme: Theme,
    pub audience: Audience,
}

impl Preferences {
    /// Reads `preferences.toml` from `dir`. Anything missing or unknown falls back to the default.
    pub fn load(dir: &Path) -> Self {
        let path = Self::path_in(dir);
        let values: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        let theme = values
            .get(THEME_KEY)
            .and_then(|v| Theme::parse(v))
            .unwrap_or_default();
        let audience = values
            .get(USER_TYPE_KEY)
            .and_then(|v| Audience::parse(v))
            .unwrap_or_default();

        debug!(theme = theme.as_str(), audience = audience.as_str(), "loaded preferences");
        Preferences { theme, audience }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating preferences dir {}", dir.display()))?;

        let mut values = BTreeMap::new();
        values.insert(THEME_KEY.to_string(), self.theme.as_str().to_string());
        values.insert(USER_TYPE_KEY.to_string(), self.audience.as_str().to_string());

        let path = Self::path_in(dir);
        let contents = toml::to_string(&values)?;
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn toggle_audience(&mut self) -> Audience {
        self.audience = self.audience.toggled();
        self.audience
    }

    fn path_in(dir: &Path) -> PathBuf {
        dir.join(PREFERENCES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs.theme, Theme::Light);
        assert_eq!(prefs.audience, Audience::Buyer);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::default();
        prefs.toggle_theme();
        prefs.toggle_audience();
        prefs.save(dir.path()).unwrap();

        let reloaded = Preferences::load(dir.path());
        assert_eq!(reloaded.theme, Theme::Dark);
        assert_eq!(reloaded.audience, Audience::Farmer);

        let raw = fs::read_to_string(dir.path().join(PREFERENCES_FILE)).unwrap();
        assert!(raw.contains("bol-theme = \"dark\""));
        assert!(raw.contains("bol-user-type = \"farmer\""));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PREFERENCES_FILE),
            "bol-theme = \"sepia\"\nbol-user-type = \"wholesaler\"\n",
        )
        .unwrap();

        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_read_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(PREFERENCES_FILE)).unwrap();

        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_toggles_flip_back() {
        assert_eq!(Theme::Light.toggled().toggled(), Theme::Light);
        assert_eq!(Audience::Farmer.toggled(), Audience::Buyer);
    }
}
