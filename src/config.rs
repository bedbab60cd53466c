use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::preferences::Audience;

pub const DEFAULT_WEBHOOK_URL: &str = "https://hook.eu2.make.com/8ydjx0yjpi6r8npacsvweup1vsfnqef6";
const DEFAULT_CTA_LABEL: &str = "Start chatting";
const DEFAULT_CTA_MESSAGE: &str = "Hi, what can you do?";

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_webhook_url() -> String {
    DEFAULT_WEBHOOK_URL.to_string()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub copy: HashMap<String, CopyOverride>,
}

/// Webhook URL per audience. Audiences without their own entry use `default`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_webhook_url")]
    pub default: String,
    #[serde(default)]
    pub buyer: Option<String>,
    #[serde(default)]
    pub farmer: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

/// Per-audience text shown by the front end.
#[derive(Debug, Clone)]
pub struct UiCopy {
    pub title: String,
    pub placeholder: String,
    pub cta_label: String,
    pub cta_message: String,
    pub starters: Vec<Starter>,
}

/// `[copy.<audience>]` table. Any field left out keeps the built-in text.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CopyOverride {
    pub title: Option<String>,
    pub placeholder: Option<String>,
    pub cta_label: Option<String>,
    pub cta_message: Option<String>,
    pub starters: Option<Vec<Starter>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Starter {
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl Starter {
    /// Text sent when the card is pressed; a card without a message sends its title.
    pub fn prompt(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.title)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            default: default_webhook_url(),
            buyer: None,
            farmer: None,
        }
    }
}

impl EndpointConfig {
    pub fn url_for(&self, audience: Audience) -> &str {
        let specific = match audience {
            Audience::Buyer => self.buyer.as_deref(),
            Audience::Farmer => self.farmer.as_deref(),
        };
        specific.unwrap_or(&self.default)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 480,
            height: 720,
            min_width: 360,
            min_height: 480,
        }
    }
}

impl UiCopy {
    fn buyer() -> Self {
        UiCopy {
            title: "Basket of Life".to_string(),
            placeholder: "Ask about fresh produce, orders or delivery...".to_string(),
            cta_label: DEFAULT_CTA_LABEL.to_string(),
            cta_message: DEFAULT_CTA_MESSAGE.to_string(),
            starters: vec![
                Starter {
                    title: "What's in season?".to_string(),
                    message: Some("What fruit and vegetables are in season right now?".to_string()),
                },
                Starter {
                    title: "Track my order".to_string(),
                    message: Some("How can I track my order?".to_string()),
                },
                Starter {
                    title: "Delivery areas".to_string(),
                    message: None,
                },
            ],
        }
    }

    fn farmer() -> Self {
        UiCopy {
            title: "Basket of Life for Farmers".to_string(),
            placeholder: "Ask about listing produce, pricing or payouts...".to_string(),
            cta_label: DEFAULT_CTA_LABEL.to_string(),
            cta_message: DEFAULT_CTA_MESSAGE.to_string(),
            starters: vec![
                Starter {
                    title: "List my produce".to_string(),
                    message: Some("How do I list my produce for sale?".to_string()),
                },
                Starter {
                    title: "Payouts".to_string(),
                    message: Some("When and how do I get paid?".to_string()),
                },
            ],
        }
    }

    fn with_override(mut self, changes: &CopyOverride) -> Self {
        let CopyOverride {
            title,
            placeholder,
            cta_label,
            cta_message,
            starters,
        } = changes.clone();

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(placeholder) = placeholder {
            self.placeholder = placeholder;
        }
        if let Some(cta_label) = cta_label {
            self.cta_label = cta_label;
        }
        if let Some(cta_message) = cta_message {
            self.cta_message = cta_message;
        }
        if let Some(starters) = starters {
            self.starters = starters;
        }
        self
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => warn!("Error parsing config.toml: {}. Using defaults.", e),
                },
                Err(e) => warn!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    /// Built-in UI copy for the audience with any configured overrides applied.
    pub fn copy_for(&self, audience: Audience) -> UiCopy {
        let builtin = match audience {
            Audience::Buyer => UiCopy::buyer(),
            Audience::Farmer => UiCopy::farmer(),
        };
        match self.copy.get(audience.as_str()) {
            Some(changes) => builtin.with_override(changes),
            None => builtin,
        }
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/basket-chat")
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.endpoints.default, DEFAULT_WEBHOOK_URL);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.window.width, 480);
    }

    #[test]
    fn test_endpoint_falls_back_to_default() {
        let config: Config = toml::from_str(
            r#"
            [endpoints]
            default = "http://example.test/default"
            farmer = "http://example.test/farmer"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.url_for(Audience::Farmer), "http://example.test/farmer");
        assert_eq!(config.endpoints.url_for(Audience::Buyer), "http://example.test/default");
    }

    #[test]
    fn test_copy_override_and_starter_prompt() {
        let config: Config = toml::from_str(
            r#"
            [copy.farmer]
            title = "Growers"
            placeholder = "Ask away"
            cta_label = "Let's talk"

            [[copy.farmer.starters]]
            title = "Prices"
            "#,
        )
        .unwrap();

        let farmer = config.copy_for(Audience::Farmer);
        assert_eq!(farmer.title, "Growers");
        assert_eq!(farmer.cta_label, "Let's talk");
        assert_eq!(farmer.cta_message, "Hi, what can you do?");
        assert_eq!(farmer.starters.len(), 1);
        assert_eq!(farmer.starters[0].prompt(), "Prices");

        let buyer = config.copy_for(Audience::Buyer);
        assert_eq!(buyer.title, "Basket of Life");
        assert_eq!(buyer.cta_label, "Start chatting");
        assert_eq!(
            buyer.starters[1].prompt(),
            "How can I track my order?"
        );
    }

    #[test]
    fn test_partial_copy_table_keeps_rest_of_file() {
        let config: Config = toml::from_str(
            r#"
            [endpoints]
            default = "http://example.test/default"

            [copy.farmer]
            cta_label = "Ask a grower"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.default, "http://example.test/default");

        let farmer = config.copy_for(Audience::Farmer);
        assert_eq!(farmer.cta_label, "Ask a grower");
        assert_eq!(farmer.title, "Basket of Life for Farmers");
        assert!(!farmer.placeholder.is_empty());
        assert_eq!(farmer.starters.len(), 2);
    }
}
