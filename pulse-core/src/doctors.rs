//! Doctor lookup by specialization with fuzzy name matching.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::{DirectoryConfig, DirectorySource, DoctorEntry};

/// Base specialization name and the spellings that count as the same thing.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("cardiology", &["cardiologist", "cardiac", "heart specialist", "heart"]),
    (
        "neurology",
        &["neurologist", "neuro", "neurological", "brain specialist", "brain"],
    ),
    ("dermatology", &["dermatologist", "derm", "skin specialist", "skin"]),
    (
        "general",
        &["general practice", "general practitioner", "gp", "family medicine"],
    ),
    ("orthopedics", &["orthopedic", "ortho", "orthopedist"]),
    ("psychiatry", &["psychiatrist", "mental health"]),
    ("pediatrics", &["pediatrician", "child specialist"]),
];

/// Case-insensitive match: exact, substring either way, then synonym table.
pub fn specialization_matches(doctor_spec: &str, requested: &str) -> bool {
    let doctor = doctor_spec.trim().to_lowercase();
    let requested = requested.trim().to_lowercase();
    if doctor.is_empty() || requested.is_empty() {
        return false;
    }
    if doctor == requested || doctor.contains(&requested) || requested.contains(&doctor) {
        return true;
    }

    let mentions = |text: &str, base: &str, synonyms: &[&str]| {
        text.contains(base) || synonyms.iter().any(|s| text.contains(s))
    };
    SYNONYMS
        .iter()
        .any(|(base, synonyms)| {
            mentions(&requested, base, synonyms) && mentions(&doctor, base, synonyms)
        })
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory API error ({code})")]
    Api { code: u16 },

    #[error("Doctor directory is not configured")]
    NotConfigured,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn all_doctors(&self) -> Result<Arc<Vec<DoctorEntry>>, DirectoryError>;

    fn name(&self) -> &str;

    /// Up to `max_results` doctors whose specialization matches `specialization`.
    async fn find_doctors(
        &self,
        specialization: &str,
        max_results: usize,
    ) -> Result<Vec<DoctorEntry>, DirectoryError> {
        let all = self.all_doctors().await?;
        let matching: Vec<DoctorEntry> = all
            .iter()
            .filter(|d| specialization_matches(&d.specialization, specialization))
            .take(max_results)
            .cloned()
            .collect();
        tracing::debug!(
            directory = self.name(),
            specialization = %specialization,
            matched = matching.len(),
            total = all.len(),
            "Doctor lookup"
        );
        Ok(matching)
    }
}

pub fn create_directory(config: &DirectoryConfig) -> Arc<dyn DoctorDirectory> {
    match (config.source, config.url.as_deref()) {
        (DirectorySource::Static, _) => Arc::new(StaticDirectory::new(config.entries.clone())),
        (DirectorySource::Http, Some(url)) if !url.trim().is_empty() => {
            match HttpDirectory::new(url) {
                Ok(directory) => Arc::new(directory),
                Err(e) => {
                    tracing::warn!(error = %e, "Doctor directory unavailable");
                    Arc::new(DisabledDirectory)
                }
            }
        }
        (DirectorySource::Http, _) => {
            tracing::warn!("Doctor directory source is http but no url is set");
            Arc::new(DisabledDirectory)
        }
        (DirectorySource::Disabled, _) => Arc::new(DisabledDirectory),
    }
}

// ============================================================================
// Static and disabled directories
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Arc<Vec<DoctorEntry>>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<DoctorEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

#[async_trait]
impl DoctorDirectory for StaticDirectory {
    async fn all_doctors(&self) -> Result<Arc<Vec<DoctorEntry>>, DirectoryError> {
        Ok(Arc::clone(&self.entries))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDirectory;

#[async_trait]
impl DoctorDirectory for DisabledDirectory {
    async fn all_doctors(&self) -> Result<Arc<Vec<DoctorEntry>>, DirectoryError> {
        Err(DirectoryError::NotConfigured)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// HttpDirectory
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectoryPayload {
    List(Vec<DoctorEntry>),
    Wrapped { doctors: Vec<DoctorEntry> },
}

/// Fetches the doctor list from a JSON endpoint once and caches it until
/// [`HttpDirectory::invalidate_cache`] is called.
#[derive(Debug)]
pub struct HttpDirectory {
    client: Client,
    url: String,
    max_retries: usize,
    cache: RwLock<Option<Arc<Vec<DoctorEntry>>>>,
}

impl HttpDirectory {
    pub fn new(url: &str) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            max_retries: 2,
            cache: RwLock::new(None),
        })
    }

    pub async fn invalidate_cache(&self) {
        *self.cache.write().await = None;
        tracing::info!("Doctor directory cache invalidated");
    }

    async fn fetch_once(&self) -> Result<Vec<DoctorEntry>, DirectoryError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Api {
                code: status.as_u16(),
            });
        }
        Ok(match response.json::<DirectoryPayload>().await? {
            DirectoryPayload::List(doctors) | DirectoryPayload::Wrapped { doctors } => doctors,
        })
    }
}

#[async_trait]
impl DoctorDirectory for HttpDirectory {
    async fn all_doctors(&self) -> Result<Arc<Vec<DoctorEntry>>, DirectoryError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries);
        let doctors = Retry::spawn(retry_strategy, || self.fetch_once())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.url, "Doctor directory fetch failed");
                DirectoryError::RetryExhausted {
                    attempts: self.max_retries,
                }
            })?;

        let doctors = Arc::new(doctors);
        *self.cache.write().await = Some(Arc::clone(&doctors));
        tracing::info!(count = doctors.len(), "Loaded doctor directory");
        Ok(doctors)
    }

    fn name(&self) -> &str {
        "http"
    }
}
