//! Remedy text lookup
//!
//! Healthy predictions are answered locally. Everything else is sent as a
//! short prompt to a generative text API; any failure there degrades to a
//! fixed apology string instead of failing the request.

use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::catalog::is_healthy;

pub const HEALTHY_MESSAGE: &str = "The plant appears healthy. No remedy needed.";
pub const FALLBACK_MESSAGE: &str = "No remedy available due to an API error.";

pub const DEFAULT_REMEDY_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_REMEDY_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Anything that can turn a prompt into remedy text
pub trait RemedySource: Send + Sync {
    fn lookup(&self, prompt: &str) -> anyhow::Result<String>;
}

pub fn remedy_prompt(disease: &str) -> String {
    format!(
        "You are an agricultural expert. Provide a simple remedy in 2 small points for cure of the plant disease: '{}'.",
        disease
    )
}

/// Remedy text for a predicted class.
///
/// Never fails: healthy classes skip the lookup, errors and empty answers
/// become [`FALLBACK_MESSAGE`].
pub fn remedy_for(label: &str, source: &dyn RemedySource) -> String {
    if is_healthy(label) {
        return HEALTHY_MESSAGE.to_string();
    }

    match source.lookup(&remedy_prompt(label)) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("Remedy service returned no text for '{}'", label);
            FALLBACK_MESSAGE.to_string()
        }
        Err(e) => {
            warn!("Remedy lookup for '{}' failed: {:#}", label, e);
            FALLBACK_MESSAGE.to_string()
        }
    }
}

/// Settings for [`GeminiRemedyClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemedyConfig {
    pub endpoint: String,
    pub model: String,
    /// `None` disables the lookup, every call fails fast
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REMEDY_ENDPOINT.to_string(),
            model: DEFAULT_REMEDY_MODEL.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl RemedyConfig {
    /// Defaults with the API key taken from the environment
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        Some(text)
    }
}

/// Blocking client for the `generateContent` REST call
#[derive(Debug, Clone)]
pub struct GeminiRemedyClient {
    config: RemedyConfig,
    client: reqwest::blocking::Client,
}

impl GeminiRemedyClient {
    /// Must not be called from inside an async runtime thread
    pub fn new(config: RemedyConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        if config.api_key.is_none() {
            warn!(
                "{} is not set, remedy lookups will return the fallback message",
                API_KEY_ENV
            );
        }

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemedyConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl RemedySource for GeminiRemedyClient {
    fn lookup(&self, prompt: &str) -> anyhow::Result<String> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", API_KEY_ENV))?;

        debug!("Requesting remedy from {}", self.config.model);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self
            .client
            .post(self.url())
            .query(&[("key", key)])
            .json(&body)
            .send()
            .context("remedy request failed")?
            .error_for_status()
            .context("remedy service returned an error status")?
            .json()
            .context("remedy response was not valid JSON")?;

        response
            .text()
            .ok_or_else(|| anyhow!("remedy response contained no candidates"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        answer: Option<&'static str>,
    }

    impl CountingSource {
        fn new(answer: Option<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
            }
        }
    }

    impl RemedySource for CountingSource {
        fn lookup(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .ok_or_else(|| anyhow!("simulated outage"))
        }
    }

    #[test]
    fn test_healthy_never_calls_source() {
        let source = CountingSource::new(Some("spray"));
        for label in ["Tomato___healthy", "Apple___HEALTHY", "healthy"] {
            assert_eq!(remedy_for(label, &source), HEALTHY_MESSAGE);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disease_uses_source() {
        let source = CountingSource::new(Some("  1. Remove leaves\n2. Apply fungicide \n"));
        let remedy = remedy_for("Tomato___Late_blight", &source);
        assert_eq!(remedy, "1. Remove leaves\n2. Apply fungicide");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_and_empty_text_fall_back() {
        assert_eq!(
            remedy_for("Potato___Early_blight", &CountingSource::new(None)),
            FALLBACK_MESSAGE
        );
        assert_eq!(
            remedy_for("Potato___Early_blight", &CountingSource::new(Some("   "))),
            FALLBACK_MESSAGE
        );
    }

    #[test]
    fn test_prompt_names_disease() {
        let prompt = remedy_prompt("Grape___Black_rot");
        assert!(prompt.starts_with("You are an agricultural expert."));
        assert!(prompt.ends_with("'Grape___Black_rot'."));
    }

    #[test]
    fn test_client_without_key_fails_fast() {
        let client = GeminiRemedyClient::new(RemedyConfig::default()).unwrap();
        assert!(client.lookup("anything").is_err());
        assert_eq!(
            remedy_for("Corn___Common_rust", &client),
            FALLBACK_MESSAGE
        );
    }

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"1. Prune"},{"text":" 2. Spray"}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().unwrap(), "1. Prune 2. Spray");

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.text().is_none());
    }
}
