//! Relevance and confidence gating of per-user model output.
//!
//! A model trained on a small personal vocabulary extrapolates badly on
//! unfamiliar text, so every prediction must first pass a vocabulary-overlap
//! check. Classifiers must additionally clear a probability floor. Anything
//! that fails a gate is dropped and the neutral default is used instead.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::bundle::{ModelBundle, ModelKind, ModelSlot};
use super::model::{Classifier, Regressor, TextModel, Vocabulary};
use crate::suggestion::{SmartSuggestion, SuggestionPolicy};
use crate::task::TaskId;

/// Minimum share of title tokens the model must know.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.4;
/// Minimum top-class probability for classifier output.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;
/// Upper bound on the difficulty boost.
pub const MAX_DIFFICULTY_BOOST: f64 = 20.0;

/// Boost points per 30 predicted minutes.
const BOOST_PER_HALF_HOUR: f64 = 5.0;

/// Gate thresholds, normally taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub relevance: f64,
    pub confidence: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            relevance: DEFAULT_RELEVANCE_THRESHOLD,
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Personalized inputs for the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationResult {
    pub difficulty_boost: f64,
    /// `None` leaves the caller's importance untouched
    pub new_importance: Option<i32>,
    pub is_high_friction: bool,
}

impl Default for PersonalizationResult {
    fn default() -> Self {
        Self {
            difficulty_boost: 0.0,
            new_importance: None,
            is_high_friction: false,
        }
    }
}

/// Raw accepted model output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Prediction {
    Value(f64),
    Class(i64),
}

/// What happened when a title was put through one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    /// No usable model for this user
    Absent,
    /// Model could not be loaded
    Broken { reason: String },
    /// Too few title tokens known to the model
    Irrelevant { relevance: f64 },
    /// Classifier was not sure enough
    LowConfidence { confidence: f64 },
    /// Model raised during prediction
    Failed { reason: String },
    Accepted {
        prediction: Prediction,
        relevance: f64,
        confidence: Option<f64>,
    },
}

impl GateOutcome {
    pub fn prediction(&self) -> Option<Prediction> {
        match self {
            GateOutcome::Accepted { prediction, .. } => Some(*prediction),
            _ => None,
        }
    }
}

/// Per-model outcomes for one title, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub title: String,
    pub difficulty: GateOutcome,
    pub importance: GateOutcome,
    pub friction: GateOutcome,
    pub result: PersonalizationResult,
}

/// Borrowed model of either shape, so one gating path serves all kinds.
enum GatedModel<'a> {
    Regression(&'a dyn Regressor),
    Classification(&'a dyn Classifier),
}

impl GatedModel<'_> {
    fn vocabulary(&self) -> &Vocabulary {
        match self {
            GatedModel::Regression(m) => m.vocabulary(),
            GatedModel::Classification(m) => m.vocabulary(),
        }
    }
}

/// Fraction of distinct lower-cased whitespace tokens found in a model's
/// training vocabulary. Empty titles score 0.
pub fn relevance(title: &str, vocabulary: &Vocabulary) -> f64 {
    let tokens: HashSet<String> = title.split_whitespace().map(str::to_lowercase).collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let known = tokens.iter().filter(|t| vocabulary.contains_key(t.as_str())).count();
    known as f64 / tokens.len() as f64
}

/// Boost for a predicted completion time.
pub fn difficulty_boost(predicted_minutes: f64) -> f64 {
    let minutes = predicted_minutes.max(0.0);
    ((minutes / 30.0) * BOOST_PER_HALF_HOUR).min(MAX_DIFFICULTY_BOOST)
}

/// Personalization for one user's bundle.
#[derive(Debug, Clone)]
pub struct PersonalizationGate {
    user_id: i64,
    bundle: Arc<ModelBundle>,
    thresholds: GateThresholds,
}

impl PersonalizationGate {
    pub fn new(user_id: i64, bundle: Arc<ModelBundle>, thresholds: GateThresholds) -> Self {
        Self {
            user_id,
            bundle,
            thresholds,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Run a title through every model and collect the gated results.
    pub fn get_personalization(&self, task_title: &str) -> PersonalizationResult {
        self.explain(task_title).result
    }

    /// Like [`get_personalization`](Self::get_personalization), keeping the
    /// per-model outcomes.
    pub fn explain(&self, task_title: &str) -> GateReport {
        let difficulty = self.gated_predict(ModelKind::Difficulty, task_title);
        let importance = self.gated_predict(ModelKind::Importance, task_title);
        let friction = self.gated_predict(ModelKind::Friction, task_title);

        let mut result = PersonalizationResult::default();
        for (kind, outcome) in [
            (ModelKind::Difficulty, &difficulty),
            (ModelKind::Importance, &importance),
            (ModelKind::Friction, &friction),
        ] {
            if let Some(prediction) = outcome.prediction() {
                apply(kind, prediction, &mut result);
            }
        }

        GateReport {
            title: task_title.to_string(),
            difficulty,
            importance,
            friction,
            result,
        }
    }

    /// Suggestion for a scored task, using this user's productivity profile.
    pub fn get_smart_suggestion(
        &self,
        task_id: TaskId,
        is_high_friction: bool,
        is_hard: bool,
        task_due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<SmartSuggestion> {
        SuggestionPolicy::new(&self.bundle.profile).suggest(
            task_id,
            is_high_friction,
            is_hard,
            task_due_date,
            now,
        )
    }

    fn slot(&self, kind: ModelKind) -> Result<GatedModel<'_>, GateOutcome> {
        fn unpack<'a, M: ?Sized>(
            slot: &'a ModelSlot<M>,
            wrap: impl FnOnce(&'a M) -> GatedModel<'a>,
        ) -> Result<GatedModel<'a>, GateOutcome> {
            match slot {
                ModelSlot::Ready(model) => Ok(wrap(model.as_ref())),
                ModelSlot::Absent => Err(GateOutcome::Absent),
                ModelSlot::Broken(reason) => Err(GateOutcome::Broken { reason: reason.clone() }),
            }
        }

        match kind {
            ModelKind::Difficulty => unpack(&self.bundle.difficulty, |m| GatedModel::Regression(m)),
            ModelKind::Importance => {
                unpack(&self.bundle.importance, |m| GatedModel::Classification(m))
            }
            ModelKind::Friction => unpack(&self.bundle.friction, |m| GatedModel::Classification(m)),
        }
    }

    fn gated_predict(&self, kind: ModelKind, title: &str) -> GateOutcome {
        let model = match self.slot(kind) {
            Ok(model) => model,
            Err(outcome) => return outcome,
        };

        let relevance = relevance(title, model.vocabulary());
        if relevance < self.thresholds.relevance {
            debug!(user_id = self.user_id, model = %kind, relevance, "failed relevance check");
            return GateOutcome::Irrelevant { relevance };
        }

        let outcome = match model {
            GatedModel::Regression(regressor) => match regressor.predict(title) {
                Ok(value) => GateOutcome::Accepted {
                    prediction: Prediction::Value(value),
                    relevance,
                    confidence: None,
                },
                Err(e) => GateOutcome::Failed { reason: e.to_string() },
            },
            GatedModel::Classification(classifier) => {
                self.classify(classifier, title, relevance)
            }
        };

        match &outcome {
            GateOutcome::Failed { reason } => {
                warn!(user_id = self.user_id, model = %kind, %reason, "prediction failed, ignoring model");
            }
            GateOutcome::LowConfidence { confidence } => {
                debug!(user_id = self.user_id, model = %kind, confidence, "failed confidence check");
            }
            GateOutcome::Accepted { prediction, .. } => {
                debug!(user_id = self.user_id, model = %kind, ?prediction, "passed gates");
            }
            _ => {}
        }
        outcome
    }

    fn classify(&self, classifier: &dyn Classifier, title: &str, relevance: f64) -> GateOutcome {
        let probabilities = match classifier.predict_proba(title) {
            Ok(p) => p,
            Err(e) => return GateOutcome::Failed { reason: e.to_string() },
        };

        let Some((best, confidence)) = probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return GateOutcome::Failed { reason: "empty probability vector".into() };
        };

        if confidence < self.thresholds.confidence {
            return GateOutcome::LowConfidence { confidence };
        }

        match classifier.classes().get(best) {
            Some(&class) => GateOutcome::Accepted {
                prediction: Prediction::Class(class),
                relevance,
                confidence: Some(confidence),
            },
            None => GateOutcome::Failed {
                reason: format!("probability index {best} has no class label"),
            },
        }
    }
}

/// Post-processing for an accepted prediction.
fn apply(kind: ModelKind, prediction: Prediction, result: &mut PersonalizationResult) {
    match (kind, prediction) {
        (ModelKind::Difficulty, Prediction::Value(minutes)) => {
            result.difficulty_boost = difficulty_boost(minutes);
        }
        (ModelKind::Importance, Prediction::Class(class)) => {
            if (1..=5).contains(&class) {
                result.new_importance = Some(class as i32);
            } else {
                warn!(class, "importance model predicted a class outside 1-5, ignoring");
            }
        }
        (ModelKind::Friction, Prediction::Class(label)) => {
            result.is_high_friction = label == 1;
        }
        (kind, prediction) => {
            warn!(model = %kind, ?prediction, "prediction shape does not match model kind");
        }
    }
}
