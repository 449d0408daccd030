//! Engine tuning knobs. Defaults are the shipped behavior; each value can be
//! overridden through an environment variable at the composition root, with
//! out-of-range values clamped rather than rejected.

const WHOLE_PHRASE_THRESHOLD: f64 = 0.5;
const WORD_THRESHOLD: f64 = 0.7;
const BASE_CONFIDENCE: f64 = 0.3;
const DEICTIC_FALLBACK_ENABLED: bool = true;

const WHOLE_PHRASE_THRESHOLD_ENV: &str = "SPROUT_WHOLE_PHRASE_THRESHOLD";
const WORD_THRESHOLD_ENV: &str = "SPROUT_WORD_THRESHOLD";
const BASE_CONFIDENCE_ENV: &str = "SPROUT_BASE_CONFIDENCE";
const DEICTIC_FALLBACK_ENV: &str = "SPROUT_DEICTIC_FALLBACK";

/// Resolver and classifier configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum normalized similarity between the whole message and a full
    /// activity name for a fuzzy match.
    pub whole_phrase_threshold: f64,
    /// Minimum per-word similarity used for short phrases.
    pub word_threshold: f64,
    /// Confidence before corroborating signals are added.
    pub base_confidence: f64,
    /// Whether "this"/"that"/"it"/"now" may resolve to the current pointer
    /// activity. Recall-biased; product can switch it off.
    pub deictic_fallback_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            whole_phrase_threshold: WHOLE_PHRASE_THRESHOLD,
            word_threshold: WORD_THRESHOLD,
            base_confidence: BASE_CONFIDENCE,
            deictic_fallback_enabled: DEICTIC_FALLBACK_ENABLED,
        }
    }
}

impl EngineConfig {
    /// Build a config from `SPROUT_*` environment variables, falling back to
    /// the defaults above. Thresholds are clamped into [0, 1].
    pub fn from_env() -> Self {
        Self {
            whole_phrase_threshold: parse_env_f64_with_bounds(
                std::env::var(WHOLE_PHRASE_THRESHOLD_ENV).ok(),
                0.0,
                1.0,
                WHOLE_PHRASE_THRESHOLD,
            ),
            word_threshold: parse_env_f64_with_bounds(
                std::env::var(WORD_THRESHOLD_ENV).ok(),
                0.0,
                1.0,
                WORD_THRESHOLD,
            ),
            base_confidence: parse_env_f64_with_bounds(
                std::env::var(BASE_CONFIDENCE_ENV).ok(),
                0.0,
                1.0,
                BASE_CONFIDENCE,
            ),
            deictic_fallback_enabled: parse_env_bool_flag(
                std::env::var(DEICTIC_FALLBACK_ENV).ok(),
                DEICTIC_FALLBACK_ENABLED,
            ),
        }
    }
}

fn parse_env_f64_with_bounds(raw: Option<String>, min: f64, max: f64, default: f64) -> f64 {
    match raw.and_then(|value| value.parse::<f64>().ok()) {
        Some(parsed) => parsed.clamp(min, max),
        None => default,
    }
}

fn parse_env_bool_flag(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}
