//! Experiment assignment: the precedence chain from overrides to bucketing.

use heimflag_bucketing::{
    bucket_ranges, choose_variation, hash, in_namespace, is_filtered_out, query_string_override,
};
use heimflag_core::{Experiment, ExperimentResult};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::Context;

/// Experiments need at least this many variations to run.
const MIN_VARIATIONS: usize = 2;

impl Context {
    /// Runs `experiment` for this context.
    ///
    /// The first applicable step decides: too few variations, disabled
    /// context, URL override, forced variation, inactive experiment, missing
    /// hash attribute, namespace/filters, condition, bucketing, experiment
    /// force, QA mode. Only the last step enrolls organically and fires the
    /// tracking callback.
    pub fn run(&self, experiment: &Experiment) -> ExperimentResult {
        let key = experiment.key.as_str();
        let variations = experiment.variations.len();

        if variations < MIN_VARIATIONS {
            return self.excluded(experiment, "fewer than two variations", None);
        }
        if !self.enabled {
            return self.excluded(experiment, "context disabled", None);
        }

        if let Some(url) = &self.url {
            if let Some(variation) = query_string_override(key, url, variations) {
                debug!(experiment = key, variation, "forced via query string");
                return self.experiment_result(experiment, Some(variation as i64), false, None);
            }
        }
        if let Some(variation) = self.forced_variation(key) {
            debug!(experiment = key, variation, "forced via context");
            return self.experiment_result(experiment, Some(variation), false, None);
        }

        if !experiment.active {
            return self.excluded(experiment, "experiment inactive", None);
        }

        let hash_value = self.attribute(experiment.hash_attribute());
        if hash_value.is_empty() {
            return self.excluded(experiment, "hash attribute missing", None);
        }

        if let Some(filters) = &experiment.filters {
            if is_filtered_out(filters, |attribute| self.attribute(attribute)) {
                return self.excluded(experiment, "filtered out", None);
            }
        } else if let Some(namespace) = &experiment.namespace {
            if !in_namespace(&hash_value, namespace) {
                return self.excluded(experiment, "outside namespace", None);
            }
        }

        if let Some(condition) = &experiment.condition {
            if !self.condition_passes(condition) {
                return self.excluded(experiment, "condition failed", None);
            }
        }

        let ranges = experiment.ranges.clone().unwrap_or_else(|| {
            bucket_ranges(variations, experiment.coverage(), experiment.weights.as_deref())
        });
        let n = match hash(experiment.seed(), &hash_value, experiment.hash_version()) {
            Ok(n) => n,
            Err(e) => {
                warn!(experiment = key, error = %e, "cannot hash subject");
                return self.excluded(experiment, "unsupported hash version", None);
            }
        };
        let Some(assigned) = choose_variation(n, &ranges).filter(|&i| i < variations) else {
            return self.excluded(experiment, "outside coverage", Some(n));
        };

        if let Some(force) = experiment.force {
            return self.experiment_result(experiment, Some(force), false, Some(n));
        }
        if self.qa_mode {
            return self.excluded(experiment, "qa mode", Some(n));
        }

        let result = self.experiment_result(experiment, Some(assigned as i64), true, Some(n));
        self.track(experiment, &result);
        result
    }

    fn excluded(
        &self,
        experiment: &Experiment,
        reason: &'static str,
        bucket: Option<f64>,
    ) -> ExperimentResult {
        debug!(experiment = %experiment.key, reason, "not in experiment");
        self.experiment_result(experiment, None, false, bucket)
    }

    fn experiment_result(
        &self,
        experiment: &Experiment,
        variation: Option<i64>,
        in_experiment: bool,
        bucket: Option<f64>,
    ) -> ExperimentResult {
        let attribute = experiment.hash_attribute();
        ExperimentResult::build(
            experiment,
            variation,
            in_experiment,
            attribute,
            self.attribute(attribute),
            bucket,
        )
    }

    /// Hands a finished result to the tracking callback. Neither an error
    /// nor a panic inside the callback leaves this function.
    pub(crate) fn track(&self, experiment: &Experiment, result: &ExperimentResult) {
        let Some(callback) = &self.tracking_callback else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| callback.track(experiment, result))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(experiment = %experiment.key, error = %e, "tracking callback failed"),
            Err(_) => warn!(experiment = %experiment.key, "tracking callback panicked"),
        }
    }
}
