//! Loading and caching of per-user model bundles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use super::bundle::{ModelBundle, ModelKind, ModelSlot, ProductivityProfile, MAX_PEAK_WINDOWS};
use super::gate::{GateThresholds, PersonalizationGate};
use super::model::{Classifier, LinearRegressor, LogisticClassifier, Regressor};
use crate::error::ModelError;

/// Source of model bundles.
///
/// Loading must be idempotent and side-effect free: the cache may call it
/// more than once for the same user under contention.
pub trait BundleLoader: Send + Sync {
    fn load(&self, user_id: i64) -> ModelBundle;
}

/// Reads `user_<id>_<kind>.json` artifacts from a directory.
#[derive(Debug, Clone)]
pub struct FsBundleLoader {
    model_dir: PathBuf,
    max_peak_windows: usize,
}

impl FsBundleLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            max_peak_windows: MAX_PEAK_WINDOWS,
        }
    }

    pub fn with_max_peak_windows(mut self, max: usize) -> Self {
        self.max_peak_windows = max;
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn artifact_path(&self, user_id: i64, kind: ModelKind) -> PathBuf {
        self.model_dir
            .join(format!("user_{user_id}_{}.json", kind.artifact_suffix()))
    }

    pub fn profile_path(&self, user_id: i64) -> PathBuf {
        self.model_dir.join(format!("user_{user_id}_profile.json"))
    }

    fn load_slot<M, T>(
        &self,
        user_id: i64,
        kind: ModelKind,
        read: impl FnOnce(&Path) -> Result<T, ModelError>,
        erase: impl FnOnce(T) -> Arc<M>,
    ) -> ModelSlot<M>
    where
        M: ?Sized,
    {
        let path = self.artifact_path(user_id, kind);
        if !path.exists() {
            return ModelSlot::Absent;
        }
        match read(&path) {
            Ok(model) => {
                debug!(user_id, model = %kind, path = %path.display(), "loaded model");
                ModelSlot::Ready(erase(model))
            }
            Err(e) => {
                warn!(user_id, model = %kind, error = %e, "could not load model, treating as unavailable");
                ModelSlot::Broken(e.to_string())
            }
        }
    }

    fn load_profile(&self, user_id: i64) -> ProductivityProfile {
        let path = self.profile_path(user_id);
        if !path.exists() {
            return ProductivityProfile::default();
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<ProductivityProfile>(&content).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(profile) => {
                if profile.peak_windows.len() > self.max_peak_windows {
                    warn!(
                        user_id,
                        count = profile.peak_windows.len(),
                        max = self.max_peak_windows,
                        "profile has too many peak windows, truncating"
                    );
                }
                profile.capped(self.max_peak_windows)
            }
            Err(error) => {
                warn!(user_id, %error, "could not load productivity profile");
                ProductivityProfile::default()
            }
        }
    }
}

impl BundleLoader for FsBundleLoader {
    fn load(&self, user_id: i64) -> ModelBundle {
        ModelBundle {
            difficulty: self.load_slot(
                user_id,
                ModelKind::Difficulty,
                LinearRegressor::from_path,
                |m| Arc::new(m) as Arc<dyn Regressor>,
            ),
            importance: self.load_slot(
                user_id,
                ModelKind::Importance,
                LogisticClassifier::from_path,
                |m| Arc::new(m) as Arc<dyn Classifier>,
            ),
            friction: self.load_slot(
                user_id,
                ModelKind::Friction,
                LogisticClassifier::from_path,
                |m| Arc::new(m) as Arc<dyn Classifier>,
            ),
            profile: self.load_profile(user_id),
        }
    }
}

/// Keyed store of loaded bundles.
///
/// Entries are filled on first use. Two threads missing at once may both
/// load; the first insert wins and the other result is dropped.
pub struct ModelCache {
    loader: Arc<dyn BundleLoader>,
    entries: RwLock<HashMap<i64, Arc<ModelBundle>>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_load(&self, user_id: i64) -> Arc<ModelBundle> {
        if let Some(bundle) = self.read_entries().get(&user_id) {
            return Arc::clone(bundle);
        }

        info!(user_id, "no cached models for user, loading");
        let loaded = Arc::new(self.loader.load(user_id));

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(entries.entry(user_id).or_insert(loaded))
    }

    /// Drop a user's bundle so the next lookup reloads it.
    pub fn invalidate(&self, user_id: i64) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&user_id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, Arc<ModelBundle>>> {
        // Bundles are immutable, so a poisoned map is still consistent.
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache").field("entries", &self.len()).finish()
    }
}

/// Hands out gates backed by a shared [`ModelCache`].
#[derive(Debug, Clone)]
pub struct PersonalizationService {
    cache: Arc<ModelCache>,
    thresholds: GateThresholds,
}

impl PersonalizationService {
    pub fn new(cache: Arc<ModelCache>, thresholds: GateThresholds) -> Self {
        Self { cache, thresholds }
    }

    pub fn for_user(&self, user_id: i64) -> PersonalizationGate {
        PersonalizationGate::new(user_id, self.cache.get_or_load(user_id), self.thresholds)
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::bundle::SlotStatus;
    use crate::personalization::model::fixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl BundleLoader for CountingLoader {
        fn load(&self, _user_id: i64) -> ModelBundle {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ModelBundle::empty()
        }
    }

    fn write_json(path: &Path, value: &impl serde::Serialize) {
        std::fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn cache_loads_once_per_user() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
        let cache = ModelCache::new(loader.clone());

        let a = cache.get_or_load(1);
        let b = cache.get_or_load(1);
        cache.get_or_load(2);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_forces_reload() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
        let cache = ModelCache::new(loader.clone());

        cache.get_or_load(7);
        assert!(cache.invalidate(7));
        assert!(!cache.invalidate(7));
        cache.get_or_load(7);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_first_use_settles_on_one_bundle() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
        let cache = Arc::new(ModelCache::new(loader));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_load(3))
            })
            .collect();
        let bundles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let first = cache.get_or_load(3);
        assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &first)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fs_loader_distinguishes_absent_ready_and_broken() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsBundleLoader::new(dir.path());

        write_json(
            &loader.artifact_path(4, ModelKind::Difficulty),
            &fixtures::regressor(&["essay"], 120.0),
        );
        std::fs::write(loader.artifact_path(4, ModelKind::Friction), "{\"vocabulary\":").unwrap();

        let bundle = loader.load(4);
        assert_eq!(bundle.difficulty.status(), SlotStatus::Ready);
        assert_eq!(bundle.importance.status(), SlotStatus::Absent);
        assert!(matches!(bundle.friction.status(), SlotStatus::Broken { .. }));
    }

    #[test]
    fn fs_loader_marks_misshapen_artifact_broken() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsBundleLoader::new(dir.path());
        let mut model = fixtures::regressor(&["essay", "draft"], 10.0);
        model.coefficients.pop();
        write_json(&loader.artifact_path(5, ModelKind::Difficulty), &model);

        assert!(matches!(loader.load(5).difficulty, ModelSlot::Broken(_)));
    }

    #[test]
    fn fs_loader_caps_profile() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsBundleLoader::new(dir.path()).with_max_peak_windows(2);
        write_json(
            &loader.profile_path(6),
            &ProductivityProfile::new(vec![
                "Monday 9:00".into(),
                "Tuesday 10:00".into(),
                "Friday 15:00".into(),
            ]),
        );

        let profile = loader.load(6).profile;
        assert_eq!(profile.peak_windows, vec!["Monday 9:00", "Tuesday 10:00"]);
    }

    #[test]
    fn fs_loader_survives_corrupt_profile() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsBundleLoader::new(dir.path());
        std::fs::write(loader.profile_path(8), "[1, 2").unwrap();
        assert!(loader.load(8).profile.is_empty());
    }

    #[test]
    fn service_hands_out_gates_for_cached_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsBundleLoader::new(dir.path());
        write_json(
            &loader.artifact_path(9, ModelKind::Difficulty),
            &fixtures::regressor(&["thesis", "chapter"], 180.0),
        );
        let service = PersonalizationService::new(
            Arc::new(ModelCache::new(Arc::new(loader))),
            GateThresholds::default(),
        );

        let gate = service.for_user(9);
        assert_eq!(gate.user_id(), 9);
        assert_eq!(gate.get_personalization("thesis chapter").difficulty_boost, 20.0);
        assert_eq!(service.cache().len(), 1);
    }
}
