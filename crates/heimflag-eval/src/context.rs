use heimflag_core::{
    Attributes, ConditionEvaluator, ConfigError, ConfigWarning, Feature, TrackingCallback,
    WarningSink,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::conditions::MatchConditions;

/// Evaluation context: the subject plus the feature definitions.
///
/// Immutable once built. To change configuration, build a new context and
/// swap the reference.
#[derive(Clone)]
pub struct Context {
    pub(crate) enabled: bool,
    pub(crate) attributes: Attributes,
    pub(crate) url: Option<String>,
    pub(crate) features: HashMap<String, Feature>,
    pub(crate) forced_variations: HashMap<String, i64>,
    pub(crate) qa_mode: bool,
    pub(crate) tracking_callback: Option<Arc<dyn TrackingCallback>>,
    pub(crate) conditions: Arc<dyn ConditionEvaluator>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            enabled: true,
            attributes: Attributes::new(),
            url: None,
            features: HashMap::new(),
            forced_variations: HashMap::new(),
            qa_mode: false,
            tracking_callback: None,
            conditions: Arc::new(MatchConditions),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("enabled", &self.enabled)
            .field("attributes", &self.attributes)
            .field("url", &self.url)
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .field("forced_variations", &self.forced_variations)
            .field("qa_mode", &self.qa_mode)
            .field("tracking_callback", &self.tracking_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn qa_mode(&self) -> bool {
        self.qa_mode
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn feature(&self, key: &str) -> Option<&Feature> {
        self.features.get(key)
    }

    pub fn features(&self) -> &HashMap<String, Feature> {
        &self.features
    }

    pub fn forced_variation(&self, key: &str) -> Option<i64> {
        self.forced_variations.get(key).copied()
    }

    /// String form of an attribute for hashing. Missing, `null` and
    /// structured values yield an empty string.
    pub fn attribute(&self, key: &str) -> String {
        match self.attributes.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub(crate) fn condition_passes(&self, condition: &Value) -> bool {
        self.conditions.evaluate(&self.attributes, condition)
    }
}

/// Builder for [`Context`], either programmatic or from a JSON options
/// object via [`ContextBuilder::from_options`].
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    inner: Context,
}

impl ContextBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.inner.enabled = enabled;
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.inner.attributes = attributes;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inner.attributes.insert(key.into(), value);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.inner.url = Some(url.into());
        self
    }

    pub fn features(mut self, features: HashMap<String, Feature>) -> Self {
        self.inner.features = features;
        self
    }

    pub fn feature(mut self, key: impl Into<String>, feature: Feature) -> Self {
        self.inner.features.insert(key.into(), feature);
        self
    }

    pub fn forced_variations(mut self, forced: HashMap<String, i64>) -> Self {
        self.inner.forced_variations = forced;
        self
    }

    pub fn forced_variation(mut self, key: impl Into<String>, variation: i64) -> Self {
        self.inner.forced_variations.insert(key.into(), variation);
        self
    }

    pub fn qa_mode(mut self, qa_mode: bool) -> Self {
        self.inner.qa_mode = qa_mode;
        self
    }

    pub fn tracking_callback(mut self, callback: impl TrackingCallback + 'static) -> Self {
        self.inner.tracking_callback = Some(Arc::new(callback));
        self
    }

    pub fn condition_evaluator(mut self, evaluator: impl ConditionEvaluator + 'static) -> Self {
        self.inner.conditions = Arc::new(evaluator);
        self
    }

    pub fn build(self) -> Context {
        self.inner
    }

    /// Parses a JSON options document, see [`ContextBuilder::from_options`].
    pub fn from_json(json: &str, warnings: &mut dyn WarningSink) -> Result<Self, ConfigError> {
        let options: Value = serde_json::from_str(json)?;
        Self::from_options(options, warnings)
    }

    /// Ingests `enabled`, `attributes`, `url`, `features`,
    /// `forcedVariations` and `qaMode`.
    ///
    /// Unknown options and malformed individual features are reported to
    /// `warnings` and skipped. A known option of the wrong type is an error.
    pub fn from_options(options: Value, warnings: &mut dyn WarningSink) -> Result<Self, ConfigError> {
        let options = match options {
            Value::Object(options) => options,
            other => return Err(ConfigError::InvalidOptions(json_type(&other).to_string())),
        };

        let mut builder = Self::default();
        for (option, value) in options {
            match option.as_str() {
                "enabled" => {
                    if let Some(enabled) = expect_bool(&option, value)? {
                        builder = builder.enabled(enabled);
                    }
                }
                "qaMode" => {
                    if let Some(qa_mode) = expect_bool(&option, value)? {
                        builder = builder.qa_mode(qa_mode);
                    }
                }
                "attributes" => {
                    let attributes = expect_object(&option, value)?;
                    builder = builder.attributes(attributes.into_iter().collect());
                }
                "url" => match value {
                    Value::String(url) => builder = builder.url(url),
                    Value::Null => {}
                    other => return Err(invalid(&option, "string", &other)),
                },
                "features" => {
                    for (key, raw) in expect_object(&option, value)? {
                        match serde_json::from_value::<Feature>(raw) {
                            Ok(feature) => builder = builder.feature(key, feature),
                            Err(e) => warnings.warn(ConfigWarning::InvalidFeature {
                                key,
                                reason: e.to_string(),
                            }),
                        }
                    }
                }
                "forcedVariations" => {
                    for (key, raw) in expect_object(&option, value)? {
                        match raw.as_i64() {
                            Some(variation) => builder = builder.forced_variation(key, variation),
                            None => warnings.warn(ConfigWarning::InvalidForcedVariation(key)),
                        }
                    }
                }
                "trackingCallback" => warnings.warn(ConfigWarning::NotSerializable(option.clone())),
                _ => warnings.warn(ConfigWarning::UnknownOption(option.clone())),
            }
        }
        Ok(builder)
    }
}

/// Default [`WarningSink`]: forwards every warning to `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn warn(&mut self, warning: ConfigWarning) {
        tracing::warn!(%warning, "context configuration");
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid(option: &str, expected: &str, got: &Value) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_string(),
        reason: format!("expected {expected}, got {}", json_type(got)),
    }
}

fn expect_bool(option: &str, value: Value) -> Result<Option<bool>, ConfigError> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(invalid(option, "boolean", &other)),
    }
}

fn expect_object(option: &str, value: Value) -> Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(invalid(option, "object", &other)),
    }
}
