//! Model version registry and A/B test routing.
//!
//! Tracks versions of the sequence regressor and the policy agent, their
//! offline/online metrics, and traffic-split A/B tests. Assignment is a
//! deterministic hash of the user id, so the same user always lands on
//! the same model for a given test.

use crate::application::ml::{DecisionAgent, PricePredictor};
use crate::domain::errors::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    SequenceRegressor,
    PolicyAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Training,
    Testing,
    Active,
    Retired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub model_type: ModelType,
    pub trained_at: DateTime<Utc>,
    pub performance: PerformanceMetrics,
    pub status: VersionStatus,
    pub deployed_at: Option<DateTime<Utc>>,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTest {
    pub id: String,
    pub model_a: String,
    pub model_b: String,
    /// Percentage of users routed to model A.
    pub traffic_split: u8,
    pub status: TestStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    versions: HashMap<String, ModelVersion>,
    tests: HashMap<String, ABTest>,
}

pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    predictor: Arc<RwLock<PricePredictor>>,
    agent: Arc<RwLock<DecisionAgent>>,
    state_path: Option<PathBuf>,
}

impl ModelRegistry {
    pub fn new(
        predictor: Arc<RwLock<PricePredictor>>,
        agent: Arc<RwLock<DecisionAgent>>,
        state_path: Option<PathBuf>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            predictor,
            agent,
            state_path,
        }
    }

    /// Registers a freshly trained model version.
    pub async fn register_version(
        &self,
        model_type: ModelType,
        artifact_path: PathBuf,
    ) -> ModelVersion {
        let version = ModelVersion {
            version: Uuid::new_v4().to_string(),
            model_type,
            trained_at: Utc::now(),
            performance: PerformanceMetrics::default(),
            status: VersionStatus::Training,
            deployed_at: None,
            artifact_path,
        };

        self.state
            .write()
            .await
            .versions
            .insert(version.version.clone(), version.clone());
        info!(
            "ModelRegistry: registered version {} ({:?})",
            version.version, model_type
        );
        self.persist().await;
        version
    }

    /// Upserts performance figures for monitoring.
    pub async fn update_model_metrics(
        &self,
        version: &str,
        performance: PerformanceMetrics,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let entry = state
            .versions
            .get_mut(version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                version: version.to_string(),
            })?;
        entry.performance = performance;
        drop(state);
        self.persist().await;
        Ok(())
    }

    /// Activates a version and retires the previously active version of
    /// the same model type.
    pub async fn activate_version(&self, version: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let model_type = state
            .versions
            .get(version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                version: version.to_string(),
            })?
            .model_type;

        for v in state.versions.values_mut() {
            if v.model_type == model_type && v.status == VersionStatus::Active {
                v.status = VersionStatus::Retired;
            }
        }

        if let Some(v) = state.versions.get_mut(version) {
            v.status = VersionStatus::Active;
            v.deployed_at = Some(Utc::now());
        }
        drop(state);
        info!("ModelRegistry: activated version {}", version);
        self.persist().await;
        Ok(())
    }

    pub async fn get_version(&self, version: &str) -> Option<ModelVersion> {
        self.state.read().await.versions.get(version).cloned()
    }

    /// Loads the artifact behind a version and installs it into the
    /// matching model. Missing versions or unreadable artifacts are
    /// logged and reported as `false`, never fatal.
    pub async fn load_versioned_model(&self, version: &str) -> bool {
        let metadata = match self.get_version(version).await {
            Some(m) => m,
            None => {
                warn!("ModelRegistry: version '{}' not found", version);
                return false;
            }
        };

        let loaded = match metadata.model_type {
            ModelType::SequenceRegressor => self
                .predictor
                .write()
                .await
                .load(&metadata.artifact_path),
            ModelType::PolicyAgent => self.agent.write().await.load(&metadata.artifact_path),
        };

        if loaded {
            info!(
                "ModelRegistry: loaded version {} from {:?}",
                version, metadata.artifact_path
            );
        } else {
            warn!(
                "ModelRegistry: failed to load artifact for version {}",
                version
            );
        }
        loaded
    }

    pub async fn create_ab_test(
        &self,
        model_a: String,
        model_b: String,
        traffic_split: u8,
    ) -> ABTest {
        let test = ABTest {
            id: Uuid::new_v4().to_string(),
            model_a,
            model_b,
            traffic_split: traffic_split.min(100),
            status: TestStatus::Active,
        };
        self.state
            .write()
            .await
            .tests
            .insert(test.id.clone(), test.clone());
        info!(
            "ModelRegistry: created A/B test {} (split {}%)",
            test.id, test.traffic_split
        );
        self.persist().await;
        test
    }

    pub async fn end_ab_test(&self, test_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let test = state
            .tests
            .get_mut(test_id)
            .ok_or_else(|| RegistryError::TestNotFound {
                test_id: test_id.to_string(),
            })?;
        test.status = TestStatus::Inactive;
        drop(state);
        self.persist().await;
        Ok(())
    }

    /// Resolves the model a user belongs to under an active test and
    /// loads it. Assignment is reproducible: the same `(test, user)` pair
    /// always resolves to the same model.
    pub async fn switch_to_ab_test_model(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> Result<String, RegistryError> {
        let test = {
            let state = self.state.read().await;
            state
                .tests
                .get(test_id)
                .cloned()
                .ok_or_else(|| RegistryError::TestNotFound {
                    test_id: test_id.to_string(),
                })?
        };

        if test.status != TestStatus::Active {
            return Err(RegistryError::TestInactive {
                test_id: test_id.to_string(),
            });
        }

        let bucket = stable_user_bucket(user_id);
        let chosen = if bucket < test.traffic_split as u64 {
            test.model_a.clone()
        } else {
            test.model_b.clone()
        };

        self.load_versioned_model(&chosen).await;
        Ok(chosen)
    }

    pub async fn save_state(&self, path: &Path) -> anyhow::Result<()> {
        let state = self.state.read().await;
        let json = serde_json::to_vec_pretty(&*state)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub async fn load_state(&self, path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<RegistryState>(&bytes) {
                Ok(loaded) => {
                    *self.state.write().await = loaded;
                    info!("ModelRegistry: restored state from {:?}", path);
                    true
                }
                Err(e) => {
                    warn!("ModelRegistry: failed to parse state {:?}: {}", path, e);
                    false
                }
            },
            Err(_) => false,
        }
    }

    async fn persist(&self) {
        if let Some(path) = self.state_path.clone() {
            if let Err(e) = self.save_state(&path).await {
                warn!("ModelRegistry: failed to persist state: {}", e);
            }
        }
    }
}

/// Stable bucket in [0, 100): first 8 bytes of Sha256(user_id) as a
/// big-endian integer, modulo 100. Platform-independent.
fn stable_user_bucket(user_id: &str) -> u64 {
    let digest = Sha256::digest(user_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 100
}
