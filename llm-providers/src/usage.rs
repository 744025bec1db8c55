//! Token usage accounting
//!
//! Vendors report usage under different field names and not always with the
//! same reliability: fields may be missing, null, or arrive only on some
//! stream chunks. Everything here degrades to zero instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Token counts for one inference call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }

    /// Fold a newer observation into this subtotal.
    ///
    /// Non-zero fields replace the running value; zero fields keep it, so a
    /// chunk reporting only output tokens does not erase the prompt count.
    pub fn absorb(&mut self, observed: LlmUsage) {
        if observed.prompt_tokens > 0 {
            self.prompt_tokens = observed.prompt_tokens;
        }
        if observed.completion_tokens > 0 {
            self.completion_tokens = observed.completion_tokens;
        }
    }
}

/// Field names a vendor uses for its token counts, in lookup order.
///
/// The first field holding a positive count wins.
#[derive(Debug, Clone, Copy)]
pub struct UsageFields {
    pub prompt: &'static [&'static str],
    pub completion: &'static [&'static str],
}

impl UsageFields {
    pub const ANTHROPIC: Self = Self {
        prompt: &["input_tokens"],
        completion: &["output_tokens"],
    };

    pub const OPENAI: Self = Self {
        prompt: &["prompt_tokens", "prompt_tokens_cost"],
        completion: &["completion_tokens", "completion_tokens_cost"],
    };

    pub const GOOGLE: Self = Self {
        prompt: &["promptTokenCount"],
        completion: &["candidatesTokenCount"],
    };
}

/// Read a vendor usage object into [`LlmUsage`].
///
/// Anything that is not an object, and any field that is missing, null,
/// negative or non-numeric, counts as zero.
pub fn extract_usage(raw: Option<&Value>, fields: UsageFields) -> LlmUsage {
    let Some(Value::Object(map)) = raw else {
        return LlmUsage::default();
    };

    let read = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| map.get(*key))
            .map(token_count)
            .find(|count| *count > 0)
            .unwrap_or(0)
    };

    LlmUsage {
        prompt_tokens: read(fields.prompt),
        completion_tokens: read(fields.completion),
    }
}

fn token_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Shared, lock-guarded usage slot.
///
/// Used both as an adapter's "last observed usage" and as the running tally
/// of a single stream. Writers from concurrent calls are not ordered.
#[derive(Debug, Clone, Default)]
pub struct UsageCell(Arc<Mutex<LlmUsage>>);

impl UsageCell {
    pub fn get(&self) -> LlmUsage {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, usage: LlmUsage) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = usage;
    }

    pub fn absorb(&self, observed: LlmUsage) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(observed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_extract_anthropic_usage() {
        let raw = json!({"input_tokens": 12, "output_tokens": 40});
        let usage = extract_usage(Some(&raw), UsageFields::ANTHROPIC);
        assert_eq!(usage, LlmUsage::new(12, 40));
        assert_eq!(usage.total_tokens(), 52);
    }

    #[test]
    fn test_missing_and_null_fields_are_zero() {
        assert_eq!(
            extract_usage(None, UsageFields::OPENAI),
            LlmUsage::default()
        );
        assert_eq!(
            extract_usage(Some(&Value::Null), UsageFields::OPENAI),
            LlmUsage::default()
        );

        let raw = json!({"prompt_tokens": null, "completion_tokens": 7});
        assert_eq!(
            extract_usage(Some(&raw), UsageFields::OPENAI),
            LlmUsage::new(0, 7)
        );
    }

    #[test]
    fn test_openai_cost_fallback() {
        let raw = json!({"prompt_tokens": 0, "prompt_tokens_cost": 9, "completion_tokens": 3});
        assert_eq!(
            extract_usage(Some(&raw), UsageFields::OPENAI),
            LlmUsage::new(9, 3)
        );
    }

    #[test]
    fn test_odd_values_coerce() {
        let raw = json!({"promptTokenCount": "15", "candidatesTokenCount": -4});
        assert_eq!(
            extract_usage(Some(&raw), UsageFields::GOOGLE),
            LlmUsage::new(15, 0)
        );

        let raw = json!({"promptTokenCount": 2.0, "candidatesTokenCount": [1]});
        assert_eq!(
            extract_usage(Some(&raw), UsageFields::GOOGLE),
            LlmUsage::new(2, 0)
        );
    }

    #[test]
    fn test_absorb_keeps_prior_values_for_zero_fields() {
        let mut tally = LlmUsage::default();
        tally.absorb(LlmUsage::new(5, 1));
        tally.absorb(LlmUsage::new(0, 2));
        tally.absorb(LlmUsage::default());
        assert_eq!(tally, LlmUsage::new(5, 2));
    }

    #[test]
    fn test_usage_cell_is_shared_between_clones() {
        let cell = UsageCell::default();
        let other = cell.clone();
        other.absorb(LlmUsage::new(3, 0));
        other.absorb(LlmUsage::new(0, 4));
        assert_eq!(cell.get(), LlmUsage::new(3, 4));

        cell.set(LlmUsage::default());
        assert!(other.get().is_empty());
    }

    fn arbitrary_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<f64>().prop_map(|f| json!(f)),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("input_tokens".to_string()),
                        Just("output_tokens".to_string()),
                        Just("prompt_tokens".to_string()),
                        Just("completion_tokens".to_string()),
                        "[a-z]{1,8}".prop_map(String::from),
                    ],
                    inner,
                    0..4
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn extract_ignores_non_objects(raw in arbitrary_json()) {
            for fields in [UsageFields::ANTHROPIC, UsageFields::OPENAI, UsageFields::GOOGLE] {
                let usage = extract_usage(Some(&raw), fields);
                if !raw.is_object() {
                    prop_assert!(usage.is_empty());
                }
            }
        }

        #[test]
        fn extract_reads_non_negative_integers(p in any::<i64>(), c in any::<i64>()) {
            let raw = json!({"input_tokens": p, "output_tokens": c});
            let usage = extract_usage(Some(&raw), UsageFields::ANTHROPIC);
            prop_assert_eq!(usage.prompt_tokens, p.max(0) as u64);
            prop_assert_eq!(usage.completion_tokens, c.max(0) as u64);
        }
    }
}
