#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Feature resolution and experiment assignment.
//!
//! A [`Context`] bundles everything known about the current subject
//! (attributes, URL, overrides) together with the feature definitions.
//! Evaluation is synchronous, pure and deterministic apart from the optional
//! tracking callback, so one `Context` can be shared across threads.
//!
//! ```
//! use heimflag_eval::Context;
//! use heimflag_core::Feature;
//! use serde_json::json;
//!
//! let ctx = Context::builder()
//!     .attribute("id", json!("user1"))
//!     .feature("show-banner", Feature::new(false))
//!     .build();
//!
//! assert!(ctx.is_off("show-banner"));
//! ```

mod assign;
pub mod conditions;
mod context;
mod resolve;

pub use conditions::MatchConditions;
pub use context::{Context, ContextBuilder, TracingWarnings};

pub use heimflag_core::{
    Attributes, ConfigError, ConfigWarning, Experiment, ExperimentResult, Feature, FeatureResult,
    FeatureRule, FeatureSource, WarningSink,
};
