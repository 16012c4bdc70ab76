#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod experiment;
pub mod rule;

use serde_json::Value;
use std::collections::BTreeMap;

pub use error::{ConfigError, ConfigWarning, Result, TrackingError, WarningSink};
pub use experiment::{is_truthy, Experiment, ExperimentResult, FeatureResult, FeatureSource};
pub use rule::{BucketRange, Feature, FeatureRule, Filter, Namespace, RuleKind, TrackData, VariationMeta};

/// Attribute used for hashing when an experiment or rule names none.
pub const DEFAULT_HASH_ATTRIBUTE: &str = "id";
/// Hash algorithm used when an experiment or rule names none.
pub const DEFAULT_HASH_VERSION: u32 = 1;

/// Attribute map of a context, keyed by the canonical string form.
pub type Attributes = BTreeMap<String, Value>;

/// Targeting matcher. The engine only asks it for a yes/no answer.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, attributes: &Attributes, condition: &Value) -> bool;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&Attributes, &Value) -> bool + Send + Sync,
{
    fn evaluate(&self, attributes: &Attributes, condition: &Value) -> bool {
        self(attributes, condition)
    }
}

/// Receives every organic experiment enrollment. Errors are logged by the
/// engine and never reach the caller of `run`/`eval_feature`.
pub trait TrackingCallback: Send + Sync {
    fn track(
        &self,
        experiment: &Experiment,
        result: &ExperimentResult,
    ) -> std::result::Result<(), TrackingError>;
}

impl<F> TrackingCallback for F
where
    F: Fn(&Experiment, &ExperimentResult) + Send + Sync,
{
    fn track(
        &self,
        experiment: &Experiment,
        result: &ExperimentResult,
    ) -> std::result::Result<(), TrackingError> {
        self(experiment, result);
        Ok(())
    }
}
