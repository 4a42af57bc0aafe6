//! Per-user personalization of scoring inputs.
//!
//! Each user may have up to three trained text models and a productivity
//! profile. [`PersonalizationGate`] turns a task title into a
//! [`PersonalizationResult`], trusting a model only when the title is
//! relevant to its vocabulary and, for classifiers, the prediction is
//! confident. Bundles are loaded through a [`BundleLoader`] and shared via
//! [`ModelCache`].

mod bundle;
mod cache;
mod gate;
pub mod model;

pub use bundle::{
    BundleStatus, ModelBundle, ModelKind, ModelSlot, ProductivityProfile, SlotStatus,
    MAX_PEAK_WINDOWS,
};
pub use cache::{BundleLoader, FsBundleLoader, ModelCache, PersonalizationService};
pub use gate::{
    difficulty_boost, relevance, GateOutcome, GateReport, GateThresholds, PersonalizationGate,
    PersonalizationResult, Prediction, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RELEVANCE_THRESHOLD,
    MAX_DIFFICULTY_BOOST,
};
pub use model::{Classifier, LinearRegressor, LogisticClassifier, Regressor, TextModel};
