//! Feature resolution: walk the rules, first match wins.

use heimflag_bucketing::{is_filtered_out, is_included_in_rollout};
use heimflag_core::{
    FeatureResult, FeatureRule, FeatureSource, RuleKind, DEFAULT_HASH_ATTRIBUTE,
    DEFAULT_HASH_VERSION,
};
use serde_json::Value;
use tracing::debug;

use crate::Context;

impl Context {
    /// Resolves `key` to a value and the reason it was chosen.
    pub fn eval_feature(&self, key: &str) -> FeatureResult {
        let Some(feature) = self.features.get(key) else {
            debug!(feature = key, "unknown feature");
            return FeatureResult::unknown();
        };

        for rule in &feature.rules {
            if let Some(condition) = &rule.condition {
                if !self.condition_passes(condition) {
                    continue;
                }
            }
            match rule.kind() {
                RuleKind::Force(value) => {
                    if !self.force_rule_applies(key, rule) {
                        continue;
                    }
                    for track in rule.tracks.iter().flatten() {
                        self.track(&track.experiment, &track.result);
                    }
                    return FeatureResult::new(Some(value.clone()), FeatureSource::Force);
                }
                RuleKind::Experiment(_) => {
                    let Some(experiment) = rule.to_experiment(key) else {
                        continue;
                    };
                    let result = self.run(&experiment);
                    if !result.in_experiment || result.passthrough {
                        continue;
                    }
                    return FeatureResult::from_experiment(experiment, result);
                }
                RuleKind::Inert => {}
            }
        }

        FeatureResult::new(feature.default_value.clone(), FeatureSource::DefaultValue)
    }

    pub fn is_on(&self, key: &str) -> bool {
        self.eval_feature(key).on()
    }

    pub fn is_off(&self, key: &str) -> bool {
        self.eval_feature(key).off()
    }

    /// Resolved value, or `fallback` when the value is absent.
    pub fn get_feature_value(&self, key: &str, fallback: Value) -> Value {
        self.eval_feature(key).value_or(fallback)
    }

    fn force_rule_applies(&self, key: &str, rule: &FeatureRule) -> bool {
        if let Some(filters) = &rule.filters {
            if is_filtered_out(filters, |attribute| self.attribute(attribute)) {
                return false;
            }
        }
        let hash_attribute = rule.hash_attribute.as_deref().unwrap_or(DEFAULT_HASH_ATTRIBUTE);
        is_included_in_rollout(
            rule.seed.as_deref().unwrap_or(key),
            &self.attribute(hash_attribute),
            rule.range.as_ref(),
            rule.coverage,
            rule.hash_version.unwrap_or(DEFAULT_HASH_VERSION),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use heimflag_core::{
        BucketRange, Experiment, ExperimentResult, Feature, Filter, TrackData, VariationMeta,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn user(id: &str) -> crate::ContextBuilder {
        Context::builder().attribute("id", json!(id))
    }

    #[test]
    fn unknown_feature() {
        let r = Context::builder().build().eval_feature("nope");
        assert_eq!(r.source, FeatureSource::UnknownFeature);
        assert!(r.value.is_none());
        assert!(r.off());
    }

    #[test]
    fn default_value_without_rules() {
        let ctx = user("u1").feature("show-banner", Feature::new(false)).build();
        let r = ctx.eval_feature("show-banner");
        assert_eq!(r.source, FeatureSource::DefaultValue);
        assert_eq!(r.value, Some(json!(false)));
    }

    #[test]
    fn absent_default_is_a_valid_outcome() {
        let ctx = user("u1").feature("empty", Feature::default()).build();
        let r = ctx.eval_feature("empty");
        assert_eq!(r.source, FeatureSource::DefaultValue);
        assert!(r.value.is_none());
        assert_eq!(ctx.get_feature_value("empty", json!(7)), json!(7));
    }

    #[test]
    fn first_matching_rule_wins() {
        let feature = Feature::new("blue")
            .with_rule(FeatureRule {
                condition: Some(json!({"country": "DE"})),
                ..FeatureRule::force("red")
            })
            .with_rule(FeatureRule::force("green"))
            .with_rule(FeatureRule::force("never"));
        let de = user("u1")
            .attribute("country", json!("DE"))
            .feature("color", feature.clone())
            .build();
        let fr = user("u1")
            .attribute("country", json!("FR"))
            .feature("color", feature)
            .build();

        assert_eq!(de.get_feature_value("color", json!(null)), json!("red"));
        assert_eq!(fr.get_feature_value("color", json!(null)), json!("green"));
        assert_eq!(fr.eval_feature("color").source, FeatureSource::Force);
    }

    #[test]
    fn rollout_coverage_skips_subjects_above() {
        // hash("user1" + "show-banner") = 0.625
        let feature = Feature::new("blue").with_rule(FeatureRule {
            coverage: Some(0.5),
            ..FeatureRule::force("red")
        });
        let ctx = user("user1").feature("show-banner", feature.clone()).build();
        let r = ctx.eval_feature("show-banner");
        assert_eq!(r.source, FeatureSource::DefaultValue);
        assert_eq!(r.value, Some(json!("blue")));

        // Without a hash attribute the rollout rule is skipped too.
        let anon = Context::builder().feature("show-banner", feature).build();
        assert_eq!(anon.eval_feature("show-banner").source, FeatureSource::DefaultValue);
    }

    #[test]
    fn rollout_coverage_includes_subjects_below() {
        // hash("u3" + "new-nav") = 0.029
        let feature = Feature::new(false).with_rule(FeatureRule {
            coverage: Some(0.1),
            ..FeatureRule::force(true)
        });
        let ctx = user("u3").feature("new-nav", feature).build();
        assert!(ctx.is_on("new-nav"));
    }

    #[test]
    fn rollout_range_replaces_coverage() {
        // hash("u1" + "new-nav") = 0.299
        let feature = Feature::new(false).with_rule(FeatureRule {
            range: Some(BucketRange::new(0.2, 0.3)),
            coverage: Some(0.0),
            ..FeatureRule::force(true)
        });
        let ctx = user("u1").feature("new-nav", feature).build();
        assert!(ctx.is_on("new-nav"));
    }

    #[test]
    fn force_rule_filters() {
        // v2: hash("pricing", "u1") = 0.5066
        let feature = Feature::new("old").with_rule(FeatureRule {
            filters: Some(vec![Filter {
                seed: "pricing".into(),
                ranges: vec![BucketRange::new(0.0, 0.5)],
                attribute: None,
                hash_version: None,
            }]),
            ..FeatureRule::force("new")
        });
        let u1 = user("u1").feature("pricing", feature.clone()).build();
        let u2 = user("u2").feature("pricing", feature).build();
        assert_eq!(u1.get_feature_value("pricing", json!(null)), json!("old"));
        assert_eq!(u2.get_feature_value("pricing", json!(null)), json!("new"));
    }

    #[test]
    fn experiment_rule_returns_variation() {
        // hash("u1" + "checkout") = 0.791
        let feature = Feature::new("A").with_rule(FeatureRule::experiment(vec![json!("A"), json!("B")]));
        let ctx = user("u1").feature("checkout", feature).build();
        let r = ctx.eval_feature("checkout");
        assert_eq!(r.source, FeatureSource::Experiment);
        assert_eq!(r.value, Some(json!("B")));
        assert_eq!(r.experiment.as_ref().map(|e| e.key.as_str()), Some("checkout"));
        let result = r.experiment_result.expect("experiment result");
        assert!(result.in_experiment);
        assert_eq!(result.variation_id, 1);
    }

    #[test]
    fn experiment_rule_falls_through_when_not_enrolled() {
        let feature = Feature::new("A")
            .with_rule(FeatureRule {
                coverage: Some(0.1),
                ..FeatureRule::experiment(vec![json!("A"), json!("B")])
            })
            .with_rule(FeatureRule::force("C"));
        let ctx = user("u1").feature("checkout", feature).build();
        let r = ctx.eval_feature("checkout");
        assert_eq!(r.source, FeatureSource::Force);
        assert_eq!(r.value, Some(json!("C")));
    }

    #[test]
    fn forced_experiment_rule_is_not_served() {
        // A forced variation is not organic enrollment; the feature falls through.
        let feature = Feature::new("A")
            .with_rule(FeatureRule::experiment(vec![json!("A"), json!("B")]));
        let ctx = user("u1")
            .forced_variation("checkout", 1)
            .feature("checkout", feature)
            .build();
        assert_eq!(ctx.eval_feature("checkout").source, FeatureSource::DefaultValue);
    }

    #[test]
    fn passthrough_variation_falls_through() {
        let feature = Feature::new("A")
            .with_rule(FeatureRule {
                meta: Some(vec![
                    VariationMeta::default(),
                    VariationMeta {
                        passthrough: Some(true),
                        ..VariationMeta::default()
                    },
                ]),
                ..FeatureRule::experiment(vec![json!("A"), json!("B")])
            });
        let ctx = user("u1").feature("checkout", feature).build();
        assert_eq!(ctx.eval_feature("checkout").source, FeatureSource::DefaultValue);
    }

    #[test]
    fn force_rule_fires_tracks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let experiment = Experiment::new("legacy", vec![json!(0), json!(1)]);
        let result = ExperimentResult::build(&experiment, Some(1), true, "id", "u1", None);
        let feature = Feature::new(0).with_rule(FeatureRule {
            tracks: Some(vec![TrackData {
                experiment,
                result,
            }]),
            ..FeatureRule::force(1)
        });
        let ctx = user("u1")
            .feature("legacy", feature)
            .tracking_callback(move |e: &Experiment, r: &ExperimentResult| {
                if let Ok(mut calls) = sink.lock() {
                    calls.push((e.key.clone(), r.variation_id));
                }
            })
            .build();

        assert!(ctx.is_on("legacy"));
        assert_eq!(*seen.lock().unwrap(), vec![("legacy".to_string(), 1)]);
    }

    #[test]
    fn inert_rules_are_skipped() {
        let feature = Feature::new("x").with_rule(FeatureRule {
            coverage: Some(1.0),
            ..FeatureRule::default()
        });
        let ctx = user("u1").feature("f", feature).build();
        assert_eq!(ctx.eval_feature("f").source, FeatureSource::DefaultValue);
    }

    #[test]
    fn on_off_views() {
        let ctx = user("u1")
            .feature("zero", Feature::new(0))
            .feature("text", Feature::new("yes"))
            .build();
        assert!(ctx.is_off("zero"));
        assert!(ctx.is_on("text"));
        assert!(ctx.is_off("missing"));
    }
}
