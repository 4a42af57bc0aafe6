//! Per-user model bundles.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::{Classifier, Regressor};

/// Default cap on stored peak windows.
pub const MAX_PEAK_WINDOWS: usize = 5;

/// The three personalization models a user may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Regression over completion minutes
    Difficulty,
    /// Classification over the 1-5 importance scale
    Importance,
    /// Binary classification, label 1 = high friction
    Friction,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Difficulty, ModelKind::Importance, ModelKind::Friction];

    /// File stem suffix used by the training job.
    pub fn artifact_suffix(&self) -> &'static str {
        match self {
            ModelKind::Difficulty => "difficulty",
            ModelKind::Importance => "importance",
            ModelKind::Friction => "friction",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_suffix())
    }
}

/// Load state of one model.
///
/// `Absent` and `Broken` both degrade to "no personalization" but are kept
/// apart so callers and logs can tell a missing file from a corrupt one.
pub enum ModelSlot<M: ?Sized> {
    Absent,
    Ready(Arc<M>),
    Broken(String),
}

impl<M: ?Sized> ModelSlot<M> {
    pub fn model(&self) -> Option<&M> {
        match self {
            ModelSlot::Ready(model) => Some(model.as_ref()),
            _ => None,
        }
    }

    pub fn status(&self) -> SlotStatus {
        match self {
            ModelSlot::Absent => SlotStatus::Absent,
            ModelSlot::Ready(_) => SlotStatus::Ready,
            ModelSlot::Broken(reason) => SlotStatus::Broken { reason: reason.clone() },
        }
    }
}

impl<M: ?Sized> Clone for ModelSlot<M> {
    fn clone(&self) -> Self {
        match self {
            ModelSlot::Absent => ModelSlot::Absent,
            ModelSlot::Ready(model) => ModelSlot::Ready(Arc::clone(model)),
            ModelSlot::Broken(reason) => ModelSlot::Broken(reason.clone()),
        }
    }
}

impl<M: ?Sized> Default for ModelSlot<M> {
    fn default() -> Self {
        ModelSlot::Absent
    }
}

impl<M: ?Sized> fmt::Debug for ModelSlot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSlot::Absent => f.write_str("Absent"),
            ModelSlot::Ready(_) => f.write_str("Ready"),
            ModelSlot::Broken(reason) => f.debug_tuple("Broken").field(reason).finish(),
        }
    }
}

/// Serializable view of a [`ModelSlot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotStatus {
    Absent,
    Ready,
    Broken { reason: String },
}

/// Historically frequent completion slots, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductivityProfile {
    #[serde(default)]
    pub peak_windows: Vec<String>,
}

impl ProductivityProfile {
    pub fn new(peak_windows: Vec<String>) -> Self {
        Self { peak_windows }
    }

    /// Keep at most `max` windows, preserving rank order.
    pub fn capped(mut self, max: usize) -> Self {
        self.peak_windows.truncate(max);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.peak_windows.is_empty()
    }
}

/// Everything the personalization layer knows about one user.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ModelBundle {
    pub difficulty: ModelSlot<dyn Regressor>,
    pub importance: ModelSlot<dyn Classifier>,
    pub friction: ModelSlot<dyn Classifier>,
    pub profile: ProductivityProfile,
}

impl ModelBundle {
    /// A bundle with no models and an empty profile.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_difficulty(mut self, model: Arc<dyn Regressor>) -> Self {
        self.difficulty = ModelSlot::Ready(model);
        self
    }

    pub fn with_importance(mut self, model: Arc<dyn Classifier>) -> Self {
        self.importance = ModelSlot::Ready(model);
        self
    }

    pub fn with_friction(mut self, model: Arc<dyn Classifier>) -> Self {
        self.friction = ModelSlot::Ready(model);
        self
    }

    pub fn with_profile(mut self, profile: ProductivityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn slot_status(&self, kind: ModelKind) -> SlotStatus {
        match kind {
            ModelKind::Difficulty => self.difficulty.status(),
            ModelKind::Importance => self.importance.status(),
            ModelKind::Friction => self.friction.status(),
        }
    }

    /// Status of every slot, in [`ModelKind::ALL`] order.
    pub fn status(&self) -> BundleStatus {
        BundleStatus {
            difficulty: self.difficulty.status(),
            importance: self.importance.status(),
            friction: self.friction.status(),
            peak_windows: self.profile.peak_windows.clone(),
        }
    }
}

/// Diagnostic summary of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleStatus {
    pub difficulty: SlotStatus,
    pub importance: SlotStatus,
    pub friction: SlotStatus,
    pub peak_windows: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::model::fixtures;

    #[test]
    fn empty_bundle_reports_all_absent() {
        let status = ModelBundle::empty().status();
        assert_eq!(status.difficulty, SlotStatus::Absent);
        assert_eq!(status.importance, SlotStatus::Absent);
        assert_eq!(status.friction, SlotStatus::Absent);
        assert!(status.peak_windows.is_empty());
    }

    #[test]
    fn ready_and_broken_slots_are_distinct() {
        let mut bundle = ModelBundle::empty()
            .with_difficulty(Arc::new(fixtures::regressor(&["essay"], 90.0)));
        bundle.friction = ModelSlot::Broken("bad shape".into());

        assert!(bundle.difficulty.model().is_some());
        assert_eq!(bundle.slot_status(ModelKind::Difficulty), SlotStatus::Ready);
        assert_eq!(
            bundle.slot_status(ModelKind::Friction),
            SlotStatus::Broken { reason: "bad shape".into() }
        );
        assert!(bundle.friction.model().is_none());
    }

    #[test]
    fn profile_cap_keeps_rank_order() {
        let windows = (0..8).map(|h| format!("Monday {h}:00")).collect();
        let profile = ProductivityProfile::new(windows).capped(MAX_PEAK_WINDOWS);
        assert_eq!(profile.peak_windows.len(), 5);
        assert_eq!(profile.peak_windows[0], "Monday 0:00");
        assert_eq!(profile.peak_windows[4], "Monday 4:00");
    }

    #[test]
    fn slot_status_serializes_with_state_tag() {
        let json = serde_json::to_value(SlotStatus::Broken { reason: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "broken", "reason": "x"}));
    }
}
