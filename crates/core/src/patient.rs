//! Patient Record Models
//!
//! The subset of the EMR's patient-detail record that a role-play scenario is
//! built from. Field names follow the EMR's JSON so a detail payload can be
//! deserialized directly; anything the scenario does not need is ignored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Demographics for a single patient.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: String,
    pub given_names: Vec<String>,
    pub family_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub sex_at_birth: Option<String>,
}

impl Patient {
    /// Given names joined with the family name, e.g. "Ava Rose Martinez".
    pub fn full_name(&self) -> String {
        let mut parts: Vec<&str> = self.given_names.iter().map(String::as_str).collect();
        parts.push(&self.family_name);
        parts.join(" ")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AllergyReaction {
    pub manifestation: String,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Allergy {
    pub display_name: String,
    #[serde(default = "default_criticality")]
    pub criticality: String,
    #[serde(default)]
    pub reactions: Option<Vec<AllergyReaction>>,
    #[serde(default = "default_active")]
    pub clinical_status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Medication {
    pub display_name: String,
    #[serde(default = "default_active")]
    pub status: String,
    #[serde(default)]
    pub dose_quantity: Option<String>,
    #[serde(default)]
    pub dose_unit: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub display_name: String,
    #[serde(default = "default_active")]
    pub clinical_status: String,
    #[serde(default)]
    pub severity: Option<String>,
}

/// A patient together with the three clinical rosters a scenario draws from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PatientDetail {
    pub patient: Patient,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub allergies: Vec<Allergy>,
}

fn default_active() -> String {
    "active".to_string()
}

fn default_criticality() -> String {
    "low".to_string()
}
