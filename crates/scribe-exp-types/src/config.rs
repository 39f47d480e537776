//! Variant config payloads and the shallow-merge overlay
//!
//! A variant carries an override payload for the feature under test. Known
//! features get typed shapes; anything else rides in the `Custom` key-value
//! map. Overrides are partial: fields a variant leaves unset fall through to
//! the caller-supplied default when merged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Override payload carried by a variant, keyed by feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", content = "values", rename_all = "snake_case")]
pub enum VariantConfig {
    /// AI editor model settings
    EditorModel(EditorModelConfig),
    /// Paywall presentation
    PaywallCopy(PaywallCopyConfig),
    /// Onboarding flow shape
    OnboardingFlow(OnboardingFlowConfig),
    /// Escape hatch for features without a typed shape yet
    Custom(BTreeMap<String, Value>),
}

/// AI editor model override
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorModelConfig {
    /// Model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum inline suggestions shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_suggestions: Option<u32>,
    /// Whether completions stream token by token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
}

/// Paywall presentation override
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaywallCopyConfig {
    /// Headline text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    /// Call-to-action button label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta_label: Option<String>,
    /// Show the annual-billing discount badge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_annual_discount: Option<bool>,
    /// Free-trial length offered, in days
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_days: Option<u32>,
}

/// Onboarding flow override
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OnboardingFlowConfig {
    /// Ordered step names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    /// Whether the flow can be skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_allowed: Option<bool>,
    /// Show the template gallery on first run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_template_gallery: Option<bool>,
}

impl VariantConfig {
    /// Empty custom payload
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::Custom(BTreeMap::new())
    }

    /// Custom payload from key-value pairs
    #[inline]
    pub fn custom<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Custom(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shallow-merge this override on top of `default`, returning a new
    /// config. Keys (or set fields) in `self` win; everything else keeps the
    /// default. Inputs are untouched.
    ///
    /// When the two payloads target different features the override is
    /// returned wholesale: a variant that redefines the feature replaces the
    /// default shape rather than mixing into it.
    #[must_use]
    pub fn merge_over(&self, default: &VariantConfig) -> VariantConfig {
        match (self, default) {
            (VariantConfig::EditorModel(over), VariantConfig::EditorModel(base)) => {
                VariantConfig::EditorModel(EditorModelConfig {
                    model: over.model.clone().or_else(|| base.model.clone()),
                    temperature: over.temperature.or(base.temperature),
                    max_suggestions: over.max_suggestions.or(base.max_suggestions),
                    streaming: over.streaming.or(base.streaming),
                })
            }
            (VariantConfig::PaywallCopy(over), VariantConfig::PaywallCopy(base)) => {
                VariantConfig::PaywallCopy(PaywallCopyConfig {
                    headline: over.headline.clone().or_else(|| base.headline.clone()),
                    cta_label: over.cta_label.clone().or_else(|| base.cta_label.clone()),
                    show_annual_discount: over.show_annual_discount.or(base.show_annual_discount),
                    trial_days: over.trial_days.or(base.trial_days),
                })
            }
            (VariantConfig::OnboardingFlow(over), VariantConfig::OnboardingFlow(base)) => {
                VariantConfig::OnboardingFlow(OnboardingFlowConfig {
                    steps: over.steps.clone().or_else(|| base.steps.clone()),
                    skip_allowed: over.skip_allowed.or(base.skip_allowed),
                    show_template_gallery: over
                        .show_template_gallery
                        .or(base.show_template_gallery),
                })
            }
            (VariantConfig::Custom(over), VariantConfig::Custom(base)) => {
                let mut merged = base.clone();
                for (k, v) in over {
                    merged.insert(k.clone(), v.clone());
                }
                VariantConfig::Custom(merged)
            }
            (over, _) => over.clone(),
        }
    }

    /// Look up a boolean value by key, for feature-flag style reads
    #[must_use]
    pub fn bool_value(&self, key: &str) -> Option<bool> {
        match self {
            VariantConfig::Custom(map) => map.get(key).and_then(Value::as_bool),
            typed => serde_json::to_value(typed)
                .ok()
                .and_then(|v| v.get("values")?.get(key)?.as_bool()),
        }
    }
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self::empty()
    }
}
