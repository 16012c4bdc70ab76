//! Experiment definitions and the two outcome records returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rule::{BucketRange, Filter, Namespace, VariationMeta};
use crate::{DEFAULT_HASH_ATTRIBUTE, DEFAULT_HASH_VERSION};

fn default_active() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// A randomized assignment of subjects to one of several variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    /// Tracking identity, globally unique.
    pub key: String,
    pub variations: Vec<Value>,
    /// Traffic split between variations. Must add up to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default = "default_active", skip_serializing_if = "is_true")]
    pub active: bool,
    /// Fraction of eligible traffic included (0..=1). Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Explicit per-variation bucket ranges; replaces coverage and weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    /// Unconditional variation override, applied after bucketing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<i64>,
    #[serde(default, alias = "hash_attribute", skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(default, alias = "hash_version", skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<VariationMeta>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Experiment {
    pub fn new(key: impl Into<String>, variations: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            variations,
            weights: None,
            active: true,
            coverage: None,
            ranges: None,
            condition: None,
            namespace: None,
            force: None,
            hash_attribute: None,
            hash_version: None,
            seed: None,
            meta: None,
            filters: None,
            name: None,
            phase: None,
        }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_force(mut self, variation: i64) -> Self {
        self.force = Some(variation);
        self
    }

    pub fn with_hash_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.hash_attribute = Some(attribute.into());
        self
    }

    pub fn with_hash_version(mut self, version: u32) -> Self {
        self.hash_version = Some(version);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn hash_attribute(&self) -> &str {
        self.hash_attribute.as_deref().unwrap_or(DEFAULT_HASH_ATTRIBUTE)
    }

    pub fn hash_version(&self) -> u32 {
        self.hash_version.unwrap_or(DEFAULT_HASH_VERSION)
    }

    /// Hash seed: explicit `seed`, else the tracking key.
    pub fn seed(&self) -> &str {
        self.seed.as_deref().unwrap_or(&self.key)
    }

    pub fn coverage(&self) -> f64 {
        self.coverage.unwrap_or(1.0)
    }
}

/// Outcome of running an experiment for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    /// True only for organic enrollment via bucketing.
    pub in_experiment: bool,
    /// Always within `[0, variations.len())`, or 0 for an empty list.
    pub variation_id: usize,
    pub value: Value,
    pub hash_attribute: String,
    pub hash_value: String,
    /// Whether the bucket hash was computed on the way to this result.
    #[serde(default)]
    pub hash_used: bool,
    /// Variation key from meta, else the index as a string.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub passthrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<f64>,
}

impl ExperimentResult {
    /// Single constructor for every exit path of the assigner.
    ///
    /// A missing, negative or out-of-range `variation` is clamped to 0.
    pub fn build(
        experiment: &Experiment,
        variation: Option<i64>,
        in_experiment: bool,
        hash_attribute: impl Into<String>,
        hash_value: impl Into<String>,
        bucket: Option<f64>,
    ) -> Self {
        let count = experiment.variations.len();
        let variation_id = variation
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v < count)
            .unwrap_or(0);

        let meta = experiment
            .meta
            .as_ref()
            .and_then(|meta| meta.get(variation_id));

        Self {
            in_experiment,
            variation_id,
            value: experiment
                .variations
                .get(variation_id)
                .cloned()
                .unwrap_or(Value::Null),
            hash_attribute: hash_attribute.into(),
            hash_value: hash_value.into(),
            hash_used: bucket.is_some(),
            key: meta
                .and_then(|m| m.key.clone())
                .unwrap_or_else(|| variation_id.to_string()),
            name: meta.and_then(|m| m.name.clone()),
            passthrough: meta.and_then(|m| m.passthrough).unwrap_or(false),
            bucket,
        }
    }
}

/// Why a feature resolved to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureSource {
    UnknownFeature,
    DefaultValue,
    Force,
    Experiment,
}

impl std::fmt::Display for FeatureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UnknownFeature => "unknownFeature",
            Self::DefaultValue => "defaultValue",
            Self::Force => "force",
            Self::Experiment => "experiment",
        })
    }
}

/// Outcome of resolving a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    /// `None` stands for an absent value (unknown feature, missing default).
    pub value: Option<Value>,
    pub source: FeatureSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_result: Option<ExperimentResult>,
}

impl FeatureResult {
    pub fn unknown() -> Self {
        Self::new(None, FeatureSource::UnknownFeature)
    }

    /// JSON `null` is normalised to an absent value.
    pub fn new(value: Option<Value>, source: FeatureSource) -> Self {
        Self {
            value: value.filter(|v| !v.is_null()),
            source,
            experiment: None,
            experiment_result: None,
        }
    }

    pub fn from_experiment(experiment: Experiment, result: ExperimentResult) -> Self {
        let value = Some(result.value.clone());
        Self {
            experiment: Some(experiment),
            experiment_result: Some(result),
            ..Self::new(value, FeatureSource::Experiment)
        }
    }

    pub fn on(&self) -> bool {
        is_truthy(self.value.as_ref())
    }

    pub fn off(&self) -> bool {
        !self.on()
    }

    pub fn value_or(&self, fallback: Value) -> Value {
        self.value.clone().unwrap_or(fallback)
    }
}

/// Absent, `null`, `false`, `0` and `""` are falsy; everything else is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exp() -> Experiment {
        Experiment::new("exp1", vec![json!("control"), json!("treatment")])
    }

    #[test]
    fn build_clamps_out_of_range_variation() {
        for v in [None, Some(-1), Some(2), Some(99)] {
            let r = ExperimentResult::build(&exp(), v, false, "id", "u1", None);
            assert_eq!(r.variation_id, 0, "variation {v:?}");
            assert_eq!(r.value, json!("control"));
        }
        let r = ExperimentResult::build(&exp(), Some(1), true, "id", "u1", Some(0.8));
        assert_eq!(r.variation_id, 1);
        assert_eq!(r.value, json!("treatment"));
        assert!(r.in_experiment);
        assert!(r.hash_used);
        assert_eq!(r.key, "1");
    }

    #[test]
    fn build_with_empty_variations_yields_null() {
        let empty = Experiment::new("none", vec![]);
        let r = ExperimentResult::build(&empty, Some(0), false, "id", "", None);
        assert_eq!(r.variation_id, 0);
        assert_eq!(r.value, Value::Null);
    }

    #[test]
    fn build_reads_variation_meta() {
        let mut e = exp();
        e.meta = Some(vec![
            VariationMeta {
                key: Some("ctl".into()),
                name: Some("Control".into()),
                passthrough: None,
            },
            VariationMeta {
                key: Some("trt".into()),
                name: None,
                passthrough: Some(true),
            },
        ]);
        let r = ExperimentResult::build(&e, Some(1), true, "id", "u1", Some(0.9));
        assert_eq!(r.key, "trt");
        assert!(r.name.is_none());
        assert!(r.passthrough);
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(None));
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(Some(&falsy)), "{falsy}");
        }
        for truthy in [json!(true), json!(1), json!("off"), json!([]), json!({})] {
            assert!(is_truthy(Some(&truthy)), "{truthy}");
        }
    }

    #[test]
    fn feature_result_views() {
        let r = FeatureResult::new(Some(json!(null)), FeatureSource::DefaultValue);
        assert!(r.value.is_none());
        assert!(r.off());
        assert_eq!(r.value_or(json!("fallback")), json!("fallback"));

        let on = FeatureResult::new(Some(json!(true)), FeatureSource::Force);
        assert!(on.on());
        assert!(on.experiment.is_none());
    }

    #[test]
    fn feature_result_from_experiment_carries_both_records() {
        let result = ExperimentResult::build(&exp(), Some(1), true, "id", "u1", Some(0.8));
        let fr = FeatureResult::from_experiment(exp(), result.clone());
        assert_eq!(fr.source, FeatureSource::Experiment);
        assert_eq!(fr.value, Some(json!("treatment")));
        assert_eq!(fr.experiment_result, Some(result));
        assert_eq!(fr.experiment.map(|e| e.key), Some("exp1".to_string()));
    }

    #[test]
    fn source_serializes_camel_case() {
        let s = serde_json::to_string(&FeatureSource::UnknownFeature).expect("serialize");
        assert_eq!(s, "\"unknownFeature\"");
        assert_eq!(FeatureSource::DefaultValue.to_string(), "defaultValue");
    }

    #[test]
    fn experiment_defaults_from_json() {
        let e: Experiment = serde_json::from_value(json!({
            "key": "exp1",
            "variations": [0, 1]
        }))
        .expect("Deserialization failed");
        assert!(e.active);
        assert_eq!(e.hash_attribute(), "id");
        assert_eq!(e.hash_version(), 1);
        assert_eq!(e.seed(), "exp1");
        assert!((e.coverage() - 1.0).abs() < f64::EPSILON);
    }
}
