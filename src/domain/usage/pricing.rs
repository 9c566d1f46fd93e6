//! Cost estimator: pure lookup-table pricing in micro-dollars

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::record::ResourceUnits;

/// Per-1K-token rates for a text model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenRates {
    pub input_per_1k_micros: i64,
    pub output_per_1k_micros: i64,
}

impl TokenRates {
    pub fn new(input_per_1k_usd: f64, output_per_1k_usd: f64) -> Self {
        Self {
            input_per_1k_micros: (input_per_1k_usd * 1_000_000.0) as i64,
            output_per_1k_micros: (output_per_1k_usd * 1_000_000.0) as i64,
        }
    }
}

/// Flat fallback for models absent from the table
const DEFAULT_TOKEN_RATES: TokenRates = TokenRates {
    input_per_1k_micros: 1_000,
    output_per_1k_micros: 2_000,
};

const DEFAULT_IMAGE_RATE_MICROS: i64 = 40_000;
const DEFAULT_AUDIO_RATE_PER_MINUTE_MICROS: i64 = 6_000;

static TOKEN_RATES: Lazy<HashMap<&'static str, TokenRates>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", TokenRates::new(0.005, 0.015)),
        ("gpt-4o-mini", TokenRates::new(0.00015, 0.0006)),
        ("gpt-4-turbo", TokenRates::new(0.01, 0.03)),
        ("claude-3-5-sonnet-20241022", TokenRates::new(0.003, 0.015)),
        ("claude-3-haiku-20240307", TokenRates::new(0.00025, 0.00125)),
        ("gemini-1.5-flash", TokenRates::new(0.000075, 0.0003)),
        ("gemini-1.5-pro", TokenRates::new(0.00125, 0.005)),
    ])
});

static IMAGE_RATES: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("dall-e-3", 40_000),
        ("dall-e-2", 20_000),
        ("imagen-3", 30_000),
    ])
});

static AUDIO_RATES_PER_MINUTE: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("tts-1", 15_000),
        ("tts-1-hd", 30_000),
        ("eleven-multilingual-v2", 18_000),
    ])
});

/// Cost of a token-based call in micro-dollars:
/// `input/1000 * rate_in + output/1000 * rate_out`
pub fn token_cost_micros(model: &str, input_tokens: u64, output_tokens: u64) -> i64 {
    let rates = TOKEN_RATES.get(model).copied().unwrap_or(DEFAULT_TOKEN_RATES);

    input_tokens as i64 * rates.input_per_1k_micros / 1_000
        + output_tokens as i64 * rates.output_per_1k_micros / 1_000
}

/// Cost of image generations in micro-dollars
pub fn image_cost_micros(model: &str, count: u64) -> i64 {
    let per_image = IMAGE_RATES
        .get(model)
        .copied()
        .unwrap_or(DEFAULT_IMAGE_RATE_MICROS);

    count as i64 * per_image
}

/// Cost of synthesized audio in micro-dollars, metered per minute
pub fn audio_cost_micros(model: &str, seconds: u64) -> i64 {
    let per_minute = AUDIO_RATES_PER_MINUTE
        .get(model)
        .copied()
        .unwrap_or(DEFAULT_AUDIO_RATE_PER_MINUTE_MICROS);

    seconds as i64 * per_minute / 60
}

/// Combined estimate for all units consumed by one call
pub fn estimate_cost_micros(model: &str, units: &ResourceUnits) -> i64 {
    let mut cost = 0;

    if units.tokens.total() > 0 {
        cost += token_cost_micros(model, units.tokens.input_tokens, units.tokens.output_tokens);
    }
    if units.images > 0 {
        cost += image_cost_micros(model, units.images);
    }
    if units.audio_seconds > 0 {
        cost += audio_cost_micros(model, units.audio_seconds);
    }

    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::usage::TokenUsage;

    #[test]
    fn test_gpt_4o_mini_reference_cost() {
        // 1000 in + 1000 out = 0.00015 + 0.0006 = 0.00075 USD
        let cost = token_cost_micros("gpt-4o-mini", 1000, 1000);
        assert_eq!(cost, 750);
        assert!((cost as f64 / 1_000_000.0 - 0.00075).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_flat_default() {
        let cost = token_cost_micros("some-future-model", 1000, 1000);
        assert_eq!(
            cost,
            DEFAULT_TOKEN_RATES.input_per_1k_micros + DEFAULT_TOKEN_RATES.output_per_1k_micros
        );
    }

    #[test]
    fn test_image_cost() {
        assert_eq!(image_cost_micros("dall-e-3", 3), 120_000);
        assert_eq!(image_cost_micros("unknown", 1), DEFAULT_IMAGE_RATE_MICROS);
    }

    #[test]
    fn test_audio_cost_per_minute() {
        // 90 seconds of tts-1 at $0.015/min = $0.0225
        assert_eq!(audio_cost_micros("tts-1", 90), 22_500);
    }

    #[test]
    fn test_combined_estimate() {
        let units = ResourceUnits::tokens(TokenUsage::new(1000, 1000)).with_images(1);

        let cost = estimate_cost_micros("gpt-4o-mini", &units);

        assert_eq!(cost, 750 + DEFAULT_IMAGE_RATE_MICROS);
    }

    #[test]
    fn test_zero_units_cost_nothing() {
        assert_eq!(estimate_cost_micros("gpt-4o", &ResourceUnits::default()), 0);
    }
}
