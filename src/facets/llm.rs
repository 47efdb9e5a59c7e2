//! LLM caller factory (spec §4.7) and provider wire formats (spec §6).
//!
//! Resolves a config into one reused `reqwest::Client` plus an effective
//! provider/key, the same "build once, reuse across calls" shape as the
//! teacher's proxy HTTP client in `proxy/server.rs`.

use crate::error::DeckError;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Ollama,
}

/// Configuration for one LLM caller (spec §4.7).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CredentialsFile {
    #[serde(default)]
    openai: Option<String>,
    #[serde(default)]
    anthropic: Option<String>,
    #[serde(default)]
    ollama: Option<String>,
}

fn credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deck").join("credentials.json"))
}

fn load_credentials() -> CredentialsFile {
    let Some(path) = credentials_path() else {
        return CredentialsFile::default();
    };
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn credential_for(provider: Provider, creds: &CredentialsFile) -> Option<String> {
    match provider {
        Provider::OpenAi => creds.openai.clone(),
        Provider::Anthropic => creds.anthropic.clone(),
        Provider::Ollama => creds.ollama.clone(),
    }
}

/// Per-provider lookup, falling back to whatever other provider slot in
/// the credentials store is populated (spec §4.7).
fn credential_with_fallback(provider: Provider, creds: &CredentialsFile) -> Option<String> {
    credential_for(provider, creds).or_else(|| {
        [Provider::OpenAi, Provider::Anthropic, Provider::Ollama]
            .into_iter()
            .filter(|p| *p != provider)
            .find_map(|p| credential_for(p, creds))
    })
}

fn env_key_for(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAi => Some("OPENAI_API_KEY"),
        Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
        Provider::Ollama => None,
    }
}

/// Resolves the effective key for a config: explicit, then the
/// credentials file, then the environment (spec §4.7 order).
fn resolve_key(cfg: &LlmConfig) -> Option<String> {
    if let Some(key) = &cfg.api_key {
        return Some(key.clone());
    }
    let creds = load_credentials();
    if let Some(key) = credential_with_fallback(cfg.provider, &creds) {
        return Some(key);
    }
    env_key_for(cfg.provider).and_then(|var| std::env::var(var).ok())
}

/// Reports whether a caller could be constructed from `cfg` without
/// making any network calls or erroring.
pub fn has_credentials(cfg: &LlmConfig) -> bool {
    cfg.provider == Provider::Ollama || resolve_key(cfg).is_some()
}

/// A resolved LLM call capability: one HTTP client, one effective
/// provider/model/key, reused across every `Extract` call.
pub struct LlmCaller {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    key: Option<String>,
    base_url: String,
}

impl LlmCaller {
    pub fn new(cfg: &LlmConfig) -> Result<Self, DeckError> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| DeckError::LlmTransport(format!("failed to build HTTP client: {e}")))?;

        let key = resolve_key(cfg);
        // Silently retarget to ollama when no key is available anywhere
        // and the provider isn't already ollama (spec §4.7).
        let (provider, key) = if key.is_none() && cfg.provider != Provider::Ollama {
            (Provider::Ollama, None)
        } else {
            (cfg.provider, key)
        };

        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        Ok(Self {
            client,
            provider,
            model: cfg.model.clone(),
            key,
            base_url,
        })
    }

    /// Invoke the resolved provider's wire contract with `prompt`,
    /// returning the raw text response.
    pub async fn call(&self, prompt: &str) -> Result<String, DeckError> {
        match self.provider {
            Provider::OpenAi => self.call_openai(prompt).await,
            Provider::Anthropic => self.call_anthropic(prompt).await,
            Provider::Ollama => self.call_ollama(prompt).await,
        }
    }

    async fn call_openai(&self, prompt: &str) -> Result<String, DeckError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| DeckError::LlmTransport("missing OpenAI API key".into()))?;
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeckError::LlmTransport(e.to_string()))?;
        let value = ensure_success(resp).await?;
        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeckError::LlmMalformed("missing choices[0].message.content".into()))
    }

    async fn call_anthropic(&self, prompt: &str) -> Result<String, DeckError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| DeckError::LlmTransport("missing Anthropic API key".into()))?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| DeckError::LlmTransport(e.to_string()))?;
        let value = ensure_success(resp).await?;
        value
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeckError::LlmMalformed("missing content[0].text".into()))
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String, DeckError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "format": "json",
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeckError::LlmTransport(e.to_string()))?;
        let value = ensure_success(resp).await?;
        value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeckError::LlmMalformed("missing message.content".into()))
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<serde_json::Value, DeckError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DeckError::LlmTransport(format!("{status} - {body}")));
    }
    resp.json()
        .await
        .map_err(|e| DeckError::LlmMalformed(format!("response not JSON: {e}")))
}

fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "https://api.openai.com",
        Provider::Anthropic => "https://api.anthropic.com",
        Provider::Ollama => OLLAMA_BASE_URL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_never_needs_credentials() {
        let cfg = LlmConfig {
            provider: Provider::Ollama,
            model: "llama3".into(),
            api_key: None,
            base_url: None,
        };
        assert!(has_credentials(&cfg));
    }

    #[test]
    fn explicit_key_is_sufficient() {
        let cfg = LlmConfig {
            provider: Provider::OpenAi,
            model: "gpt-4o-mini".into(),
            api_key: Some("sk-test".into()),
            base_url: None,
        };
        assert!(has_credentials(&cfg));
    }

    #[test]
    fn credentials_store_falls_back_across_providers() {
        let creds = CredentialsFile { openai: None, anthropic: Some("ant-key".into()), ollama: None };
        assert_eq!(credential_with_fallback(Provider::OpenAi, &creds).as_deref(), Some("ant-key"));
    }

    #[test]
    fn explicit_key_wins_over_env() {
        std::env::set_var("OPENAI_API_KEY", "env-key");
        let cfg = LlmConfig {
            provider: Provider::OpenAi,
            model: "gpt-4o-mini".into(),
            api_key: Some("explicit-key".into()),
            base_url: None,
        };
        assert_eq!(resolve_key(&cfg).as_deref(), Some("explicit-key"));
        std::env::remove_var("OPENAI_API_KEY");
    }
}
