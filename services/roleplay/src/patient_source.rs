//! Sources of patient records for building role-play scenarios.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mneme_core::patient::PatientDetail;
use std::{collections::HashMap, path::PathBuf};
use tracing::info;

/// Defines the contract for anything that can supply a patient-detail record.
///
/// The EMR's storage layer lives elsewhere; the role-play runtime only needs
/// demographics and the three clinical rosters for one patient.
#[async_trait]
pub trait PatientSource: Send + Sync {
    async fn load(&self, patient_id: &str) -> Result<PatientDetail>;
}

/// Reads `<dir>/<patient_id>.json` exports of the EMR's patient-detail payload.
pub struct JsonFilePatientSource {
    dir: PathBuf,
}

impl JsonFilePatientSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PatientSource for JsonFilePatientSource {
    async fn load(&self, patient_id: &str) -> Result<PatientDetail> {
        if patient_id.is_empty() || patient_id.contains(['/', '\\']) || patient_id.contains("..") {
            anyhow::bail!("Invalid patient id: '{}'", patient_id);
        }
        let path = self.dir.join(format!("{}.json", patient_id));
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read patient record {}", path.display()))?;
        let detail: PatientDetail = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed patient record {}", path.display()))?;
        info!(patient_id, "Loaded patient record.");
        Ok(detail)
    }
}

/// A fixed set of records held in memory, for development and tests.
#[derive(Default)]
pub struct InMemoryPatientSource {
    records: HashMap<String, PatientDetail>,
}

impl InMemoryPatientSource {
    pub fn with_record(mut self, detail: PatientDetail) -> Self {
        self.records.insert(detail.patient.id.clone(), detail);
        self
    }
}

#[async_trait]
impl PatientSource for InMemoryPatientSource {
    async fn load(&self, patient_id: &str) -> Result<PatientDetail> {
        self.records
            .get(patient_id)
            .cloned()
            .with_context(|| format!("Patient '{}' not found", patient_id))
    }
}
