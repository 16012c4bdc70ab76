//! Features and their rules.
//!
//! A [`Feature`] is a default value plus an ordered list of
//! [`FeatureRule`]s, evaluated top to bottom; the first matching rule wins.
//! A rule is either a force rule (fixed value, optionally rolled out to a
//! fraction of subjects) or an experiment rule (list of variations). The
//! shape is decided by which fields are present, not by a type tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::experiment::{Experiment, ExperimentResult};

/// Half-open interval `[start, end)` inside `[0, 1)`.
///
/// Encoded in JSON as a two-element array `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct BucketRange {
    pub start: f64,
    pub end: f64,
}

impl BucketRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// A value exactly on `start` is inside, one exactly on `end` is not.
    pub fn contains(&self, n: f64) -> bool {
        n >= self.start && n < self.end
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

impl From<(f64, f64)> for BucketRange {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<BucketRange> for (f64, f64) {
    fn from(r: BucketRange) -> Self {
        (r.start, r.end)
    }
}

/// Shared bucket space in which experiments claim disjoint sub-ranges.
/// Encoded in JSON as `[name, start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f64, f64)", into = "(String, f64, f64)")]
pub struct Namespace {
    pub id: String,
    pub range: BucketRange,
}

impl Namespace {
    pub fn new(id: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            id: id.into(),
            range: BucketRange::new(start, end),
        }
    }
}

impl From<(String, f64, f64)> for Namespace {
    fn from((id, start, end): (String, f64, f64)) -> Self {
        Self::new(id, start, end)
    }
}

impl From<Namespace> for (String, f64, f64) {
    fn from(ns: Namespace) -> Self {
        (ns.id, ns.range.start, ns.range.end)
    }
}

/// Human-readable labels for one variation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationMeta {
    /// Stable variation key; the index is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Subjects in this variation do not get its value and fall through
    /// to the next rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<bool>,
}

/// Hash-based pre-filter: a subject hashing into none of `ranges` is out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub seed: String,
    pub ranges: Vec<BucketRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, alias = "hash_version", skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
}

/// A tracking call fired when a force rule is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub experiment: Experiment,
    pub result: ExperimentResult,
}

/// One rule of a feature.
///
/// Every field is optional; serialization is compact, only set fields
/// appear in the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    /// Targeting condition, evaluated by the [`crate::ConditionEvaluator`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    /// Fraction of subjects (0..=1) the rule applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Fixed value; ignored when `variations` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Value>>,
    /// Experiment tracking key; defaults to the feature key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(default, alias = "hash_attribute", skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(default, alias = "hash_version", skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u32>,
    /// Explicit rollout slice for force rules; replaces `coverage`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<BucketRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<VariationMeta>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<TrackData>>,
}

/// Shape of a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleKind<'a> {
    Force(&'a Value),
    Experiment(&'a [Value]),
    /// Neither `force` nor `variations`: the rule does nothing.
    Inert,
}

impl FeatureRule {
    pub fn force(value: impl Into<Value>) -> Self {
        Self {
            force: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn experiment(variations: Vec<Value>) -> Self {
        Self {
            variations: Some(variations),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> RuleKind<'_> {
        match (&self.variations, &self.force) {
            (Some(variations), _) => RuleKind::Experiment(variations),
            (None, Some(value)) => RuleKind::Force(value),
            (None, None) => RuleKind::Inert,
        }
    }

    pub fn is_experiment(&self) -> bool {
        self.variations.is_some()
    }

    pub fn is_force(&self) -> bool {
        matches!(self.kind(), RuleKind::Force(_))
    }

    /// Derives the experiment of an experiment rule. The rule's condition
    /// is not carried over; it has already been checked at that point.
    pub fn to_experiment(&self, feature_key: &str) -> Option<Experiment> {
        let variations = self.variations.clone()?;
        Some(Experiment {
            key: self.key.clone().unwrap_or_else(|| feature_key.to_string()),
            variations,
            weights: self.weights.clone(),
            active: true,
            coverage: self.coverage,
            ranges: self.ranges.clone(),
            condition: None,
            namespace: self.namespace.clone(),
            force: None,
            hash_attribute: self.hash_attribute.clone(),
            hash_version: self.hash_version,
            seed: self.seed.clone(),
            meta: self.meta.clone(),
            filters: self.filters.clone(),
            name: self.name.clone(),
            phase: self.phase.clone(),
        })
    }

    /// Compact JSON form: only set fields.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// A feature with a default value and ordered rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

impl Feature {
    pub fn new(default_value: impl Into<Value>) -> Self {
        Self {
            default_value: Some(default_value.into()),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: FeatureRule) -> Self {
        self.rules.push(rule);
        self
    }
}
