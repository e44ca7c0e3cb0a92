//! Token-count to cost conversion.

use std::collections::HashMap;

/// Per-model rate pair, cost per 1K tokens
#[derive(Debug, Clone, Copy)]
pub struct TokenRates {
    /// Cost per 1K input tokens
    pub input_per_1k: f64,
    /// Cost per 1K output tokens
    pub output_per_1k: f64,
}

/// Pricing model with a default rate and per-model overrides
#[derive(Debug, Clone)]
pub struct PricingModel {
    default: TokenRates,
    overrides: HashMap<String, TokenRates>,
}

impl PricingModel {
    /// Create a pricing model from the default rates
    #[must_use]
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            default: TokenRates {
                input_per_1k,
                output_per_1k,
            },
            overrides: HashMap::new(),
        }
    }

    /// Register an override for a specific model identifier
    pub fn with_override(mut self, model: impl Into<String>, rates: TokenRates) -> Self {
        self.overrides.insert(model.into(), rates);
        self
    }

    /// Rates in effect for `model`
    #[must_use]
    pub fn rates_for(&self, model: &str) -> TokenRates {
        self.overrides.get(model).copied().unwrap_or(self.default)
    }

    /// Cost of a call in the billing currency
    #[must_use]
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let rates = self.rates_for(model);
        f64::from(input_tokens) / 1_000.0 * rates.input_per_1k
            + f64::from(output_tokens) / 1_000.0 * rates.output_per_1k
    }

    /// Worst-case cost estimate before the call: the full prompt plus the
    /// maximum completion length, both billed at the model's rates
    #[must_use]
    pub fn estimate(&self, model: &str, input_tokens: u32, max_output_tokens: u32) -> f64 {
        self.cost(model, input_tokens, max_output_tokens)
    }
}
