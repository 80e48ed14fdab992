//! Configuration types.
//!
//! Everything is read from environment variables. `from_lookup` takes the
//! lookup as a closure so tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::types::Source;

/// Name of the label/folder matched messages are filed into.
pub const DEFAULT_REFERENCE_NAME: &str = "Reference Emails";

/// Default report destination.
pub const DEFAULT_REPORT_PATH: &str = "classified_testimonials.json";

/// Keywords OR-ed into the provider query when keyword filtering is on.
pub const KEYWORDS: &[&str] = &[
    "thank you",
    "testimonial",
    "great work",
    "reference",
    "appreciate",
    "recommend",
    "endorse",
];

/// External classifier process settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Program to run (e.g. `ollama`).
    pub program: String,
    /// Model passed as `run <model>`.
    pub model: String,
    /// Kill the process after this long.
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            program: "ollama".to_string(),
            model: "llama3".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Where a provider's access token comes from.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Environment variable holding a raw access token.
    pub env_var: String,
    /// The token value, if the variable was set.
    pub env_value: Option<String>,
    /// JSON token file used when the variable is unset.
    pub token_file: PathBuf,
}

/// Scan configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Providers to scan, in order.
    pub providers: Vec<Source>,
    /// Skip threads that have no reply yet.
    pub only_with_replies: bool,
    /// Add the keyword OR-clause to the Gmail query. Outlook always searches by keyword.
    pub use_keywords: bool,
    /// Reference label/folder name.
    pub reference_name: String,
    /// Report destination, overwritten each run.
    pub report_path: PathBuf,
    pub classifier: ClassifierConfig,
    pub gmail_token: TokenConfig,
    pub outlook_token: TokenConfig,
    /// Retries for transient transport failures (0 disables retrying).
    pub max_retries: u32,
}

impl ScanConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = parse_providers(
            &lookup("TESTIMONIAL_PROVIDERS").unwrap_or_else(|| "gmail".to_string()),
        )?;

        let only_with_replies = parse_bool(&lookup, "TESTIMONIAL_ONLY_WITH_REPLIES", true)?;
        let use_keywords = parse_bool(&lookup, "TESTIMONIAL_USE_KEYWORDS", false)?;

        let reference_name = lookup("TESTIMONIAL_REFERENCE_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_REFERENCE_NAME.to_string());

        let report_path = lookup("TESTIMONIAL_REPORT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH));

        let defaults = ClassifierConfig::default();
        let classifier = ClassifierConfig {
            program: lookup("CLASSIFIER_PROGRAM").unwrap_or(defaults.program),
            model: lookup("CLASSIFIER_MODEL").unwrap_or(defaults.model),
            timeout: match lookup("CLASSIFIER_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_number(
                    "CLASSIFIER_TIMEOUT_SECS",
                    &raw,
                )?),
                None => defaults.timeout,
            },
        };

        let max_retries = match lookup("MAILBOX_MAX_RETRIES") {
            Some(raw) => u32::try_from(parse_number("MAILBOX_MAX_RETRIES", &raw)?).map_err(
                |_| ConfigError::InvalidValue {
                    key: "MAILBOX_MAX_RETRIES".to_string(),
                    message: "value too large".to_string(),
                },
            )?,
            None => 2,
        };

        Ok(Self {
            providers,
            only_with_replies,
            use_keywords,
            reference_name,
            report_path,
            classifier,
            gmail_token: token_config(&lookup, "GMAIL", "token_gmail.json"),
            outlook_token: token_config(&lookup, "OUTLOOK", "token_outlook.json"),
            max_retries,
        })
    }

    /// Keywords to use for the provider query, if keyword filtering is on.
    pub fn keywords(&self) -> Option<Vec<String>> {
        self.use_keywords
            .then(|| KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

fn token_config<F>(lookup: &F, prefix: &str, default_file: &str) -> TokenConfig
where
    F: Fn(&str) -> Option<String>,
{
    let env_var = format!("{prefix}_ACCESS_TOKEN");
    TokenConfig {
        env_value: lookup(&env_var).filter(|s| !s.trim().is_empty()),
        env_var,
        token_file: lookup(&format!("{prefix}_TOKEN_FILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default_file)),
    }
}

fn parse_providers(raw: &str) -> Result<Vec<Source>, ConfigError> {
    let mut providers = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let source = match name.to_ascii_lowercase().as_str() {
            "gmail" => Source::Gmail,
            "outlook" => Source::Outlook,
            _ => return Err(ConfigError::UnknownProvider(name.to_string())),
        };
        if !providers.contains(&source) {
            providers.push(source);
        }
    }
    if providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }
    Ok(providers)
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ScanConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ScanConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.providers, vec![Source::Gmail]);
        assert!(config.only_with_replies);
        assert!(!config.use_keywords);
        assert_eq!(config.reference_name, "Reference Emails");
        assert_eq!(config.report_path, PathBuf::from("classified_testimonials.json"));
        assert_eq!(config.classifier.program, "ollama");
        assert_eq!(config.classifier.model, "llama3");
        assert_eq!(config.max_retries, 2);
        assert!(config.keywords().is_none());
    }

    #[test]
    fn provider_list_is_ordered_and_deduplicated() {
        let config = config_from(&[("TESTIMONIAL_PROVIDERS", "Outlook, gmail,outlook")]).unwrap();
        assert_eq!(config.providers, vec![Source::Outlook, Source::Gmail]);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = config_from(&[("TESTIMONIAL_PROVIDERS", "yahoo")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(name) if name == "yahoo"));
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        let err = config_from(&[("TESTIMONIAL_PROVIDERS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::NoProviders));
    }

    #[test]
    fn invalid_boolean_names_the_key() {
        let err = config_from(&[("TESTIMONIAL_USE_KEYWORDS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("TESTIMONIAL_USE_KEYWORDS"));
    }

    #[test]
    fn keywords_enabled() {
        let config = config_from(&[("TESTIMONIAL_USE_KEYWORDS", "yes")]).unwrap();
        let keywords = config.keywords().unwrap();
        assert!(keywords.contains(&"thank you".to_string()));
        assert_eq!(keywords.len(), KEYWORDS.len());
    }

    #[test]
    fn token_sources() {
        let config = config_from(&[
            ("GMAIL_ACCESS_TOKEN", "ya29.abc"),
            ("OUTLOOK_TOKEN_FILE", "/tmp/outlook.json"),
        ])
        .unwrap();
        assert_eq!(config.gmail_token.env_value.as_deref(), Some("ya29.abc"));
        assert_eq!(config.gmail_token.env_var, "GMAIL_ACCESS_TOKEN");
        assert!(config.outlook_token.env_value.is_none());
        assert_eq!(config.outlook_token.token_file, PathBuf::from("/tmp/outlook.json"));
    }

    #[test]
    fn classifier_timeout_parsed() {
        let config = config_from(&[("CLASSIFIER_TIMEOUT_SECS", "45")]).unwrap();
        assert_eq!(config.classifier.timeout, Duration::from_secs(45));
        assert!(config_from(&[("CLASSIFIER_TIMEOUT_SECS", "soon")]).is_err());
    }
}
