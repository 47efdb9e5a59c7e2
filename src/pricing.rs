//! Pricing catalog and cost engine (spec §4.1).
//!
//! Maps a normalized model identifier to a four-field tariff priced per
//! million tokens, with cache-aware cost accounting. Generalizes the
//! teacher's single hardcoded Anthropic table into a catalog with a JSON
//! override overlay.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Per-million-token tariff for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tariff {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_read_per_million: f64,
    pub cache_write_per_million: f64,
}

/// Shape of the pricing override JSON document (spec §6): missing cache
/// fields default to zero.
#[derive(Debug, Deserialize)]
struct OverrideTariff {
    input: f64,
    output: f64,
    #[serde(default)]
    cache_read: f64,
    #[serde(default)]
    cache_write: f64,
}

/// Families whose `-N-M` suffix is rewritten to `-N.M` (spec §4.1).
const MINOR_VERSION_FAMILIES: &[(&str, &str)] =
    &[("-4-6", "-4.6"), ("-4-5", "-4.5"), ("-4-1", "-4.1"), ("-3-5", "-3.5")];

/// Normalize a raw model identifier for catalog lookup.
///
/// Lower-cases, trims, strips a trailing 8-digit date suffix
/// (Anthropic-style `-YYYYMMDD`) or a trailing `-YYYY-MM-DD` (OpenAI-style),
/// then rewrites `-N-M` minor versions to `-N.M` for the families above.
/// Idempotent: `normalize_model` applied twice gives the same result as once.
pub fn normalize_model(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    s = strip_trailing_date(&s).to_string();
    for (from, to) in MINOR_VERSION_FAMILIES {
        if let Some(idx) = s.find(from) {
            s.replace_range(idx..idx + from.len(), to);
            break;
        }
    }
    s
}

fn strip_trailing_date(s: &str) -> &str {
    if s.len() >= 9 {
        let (head, tail) = s.split_at(s.len() - 9);
        if tail.starts_with('-') && tail[1..].bytes().all(|b| b.is_ascii_digit()) {
            return head;
        }
    }
    if s.len() >= 11 {
        let (head, tail) = s.split_at(s.len() - 11);
        let b = tail.as_bytes();
        let shape_ok = b[0] == b'-'
            && b[1..5].iter().all(u8::is_ascii_digit)
            && b[5] == b'-'
            && b[6..8].iter().all(u8::is_ascii_digit)
            && b[8] == b'-'
            && b[9..11].iter().all(u8::is_ascii_digit);
        if shape_ok {
            return head;
        }
    }
    s
}

/// Tariff catalog: built-in defaults overlaid with a user-supplied override
/// file. Unknown models are not an error — they price at zero.
#[derive(Debug, Clone)]
pub struct Catalog {
    tariffs: HashMap<String, Tariff>,
}

impl Catalog {
    /// Built-in tariffs for the current Anthropic and OpenAI model lines,
    /// keyed by normalized id.
    pub fn with_defaults() -> Self {
        let mut tariffs = HashMap::new();
        let mut add = |model: &str, input: f64, output: f64, cache_read: f64, cache_write: f64| {
            tariffs.insert(
                model.to_string(),
                Tariff {
                    input_per_million: input,
                    output_per_million: output,
                    cache_read_per_million: cache_read,
                    cache_write_per_million: cache_write,
                },
            );
        };

        // Anthropic
        add("claude-3-opus", 15.00, 75.00, 1.50, 18.75);
        add("claude-3-sonnet", 3.00, 15.00, 0.30, 3.75);
        add("claude-3-haiku", 0.25, 1.25, 0.03, 0.30);
        add("claude-3.5-sonnet", 3.00, 15.00, 0.30, 3.75);
        add("claude-3.5-haiku", 0.80, 4.00, 0.08, 1.00);
        add("claude-3.7-sonnet", 3.00, 15.00, 0.30, 3.75);
        add("claude-4-opus", 15.00, 75.00, 1.50, 18.75);
        add("claude-4-sonnet", 3.00, 15.00, 0.30, 3.75);
        add("claude-4.1-opus", 15.00, 75.00, 1.50, 18.75);
        add("claude-4.5-sonnet", 3.00, 15.00, 0.30, 3.75);
        add("claude-4.5-haiku", 0.80, 4.00, 0.08, 1.00);
        add("claude-4.6-sonnet", 3.00, 15.00, 0.30, 3.75);

        // OpenAI
        add("gpt-4o", 2.50, 10.00, 1.25, 0.0);
        add("gpt-4o-mini", 0.15, 0.60, 0.075, 0.0);
        add("gpt-4.1", 2.00, 8.00, 0.50, 0.0);
        add("gpt-4.1-mini", 0.40, 1.60, 0.10, 0.0);
        add("gpt-4.1-nano", 0.10, 0.40, 0.025, 0.0);
        add("gpt-5", 1.25, 10.00, 0.125, 0.0);
        add("gpt-5-mini", 0.25, 2.00, 0.025, 0.0);

        Self { tariffs }
    }

    /// Overlay a JSON override document atop this catalog. Never errors on
    /// unknown models; only fails if the document itself isn't valid JSON.
    pub fn load_overrides(&mut self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = std::fs::read_to_string(path)?;
        self.apply_overrides_json(&contents)
    }

    fn apply_overrides_json(&mut self, contents: &str) -> anyhow::Result<()> {
        let overrides: HashMap<String, OverrideTariff> = serde_json::from_str(contents)?;
        for (model, t) in overrides {
            self.tariffs.insert(
                normalize_model(&model),
                Tariff {
                    input_per_million: t.input,
                    output_per_million: t.output,
                    cache_read_per_million: t.cache_read,
                    cache_write_per_million: t.cache_write,
                },
            );
        }
        Ok(())
    }

    /// Look up the tariff for a model, normalizing first. Returns a zero
    /// tariff for unknown models rather than erroring.
    pub fn tariff_for(&self, model: &str) -> Tariff {
        let key = normalize_model(model);
        self.tariffs.get(&key).copied().unwrap_or_default()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Token counts for one message, as carried on a `Node`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// Computed cost for one message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Cache-aware cost accounting (spec §4.1).
pub fn calculate_cost(tariff: Tariff, usage: TokenUsage) -> Cost {
    let base_input = usage
        .input
        .saturating_sub(usage.cache_creation)
        .saturating_sub(usage.cache_read);

    let input_cost = base_input as f64 / 1_000_000.0 * tariff.input_per_million
        + usage.cache_creation as f64 / 1_000_000.0 * tariff.cache_write_per_million
        + usage.cache_read as f64 / 1_000_000.0 * tariff.cache_read_per_million;
    let output_cost = usage.output as f64 / 1_000_000.0 * tariff.output_per_million;

    Cost {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_anthropic_date_suffix() {
        assert_eq!(
            normalize_model("Claude-3-5-Sonnet-20250101"),
            "claude-3.5-sonnet"
        );
    }

    #[test]
    fn normalize_openai_date_suffix() {
        assert_eq!(normalize_model("gpt-4o-2024-05-13"), "gpt-4o");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_model("Claude-3-5-Sonnet-20250101");
        let twice = normalize_model(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_leaves_plain_ids_alone() {
        assert_eq!(normalize_model("claude-4.5-sonnet"), "claude-4.5-sonnet");
        assert_eq!(normalize_model("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn cache_aware_cost_scenario() {
        let tariff = Tariff {
            input_per_million: 3.0,
            output_per_million: 15.0,
            cache_read_per_million: 0.30,
            cache_write_per_million: 3.75,
        };
        let usage = TokenUsage {
            input: 10_000,
            output: 2_000,
            cache_creation: 1_000_000,
            cache_read: 500_000,
        };
        let cost = calculate_cost(tariff, usage);
        assert!((cost.input_cost - 3.90).abs() < 1e-9);
        assert!((cost.output_cost - 0.03).abs() < 1e-9);
        assert!((cost.total_cost - 3.93).abs() < 1e-9);
    }

    #[test]
    fn cache_aware_cost_collapses_without_cache() {
        let tariff = Tariff {
            input_per_million: 3.0,
            output_per_million: 15.0,
            cache_read_per_million: 0.30,
            cache_write_per_million: 3.75,
        };
        let usage = TokenUsage {
            input: 1000,
            output: 500,
            cache_creation: 0,
            cache_read: 0,
        };
        let cost = calculate_cost(tariff, usage);
        let expected_input = 1000.0 / 1_000_000.0 * 3.0;
        let expected_output = 500.0 / 1_000_000.0 * 15.0;
        assert!((cost.input_cost - expected_input).abs() < 1e-12);
        assert!((cost.output_cost - expected_output).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_prices_at_zero() {
        let catalog = Catalog::with_defaults();
        let tariff = catalog.tariff_for("some-experimental-model-v9");
        assert_eq!(tariff, Tariff::default());
    }

    #[test]
    fn override_overlay_replaces_and_adds() {
        let mut catalog = Catalog::with_defaults();
        catalog
            .apply_overrides_json(
                r#"{"claude-3.5-sonnet": {"input": 1.0, "output": 2.0}, "custom-model": {"input": 5.0, "output": 6.0, "cache_read": 0.5}}"#,
            )
            .unwrap();

        let overridden = catalog.tariff_for("claude-3.5-sonnet");
        assert_eq!(overridden.input_per_million, 1.0);
        assert_eq!(overridden.cache_read_per_million, 0.0);

        let custom = catalog.tariff_for("custom-model");
        assert_eq!(custom.input_per_million, 5.0);
        assert_eq!(custom.cache_read_per_million, 0.5);
    }
}
