//! Scenario Builder
//!
//! Turns a patient record, the presenting complaint, and a persona tag into the
//! case brief handed to the counterpart when a role-play session starts. The
//! builder is a pure function of its inputs; the only clock it consults is the
//! `today` date used for the age calculation.

use crate::patient::{Allergy, Condition, Medication, PatientDetail};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const NO_ALLERGIES: &str = "None known";
const NO_MEDICATIONS: &str = "None";
const NO_CONDITIONS: &str = "None";
const UNKNOWN_SEX: &str = "unknown";

/// Behavioral style the counterpart adopts for the whole session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersonaStyle {
    Cooperative,
    Anxious,
    Frustrated,
    Skeptical,
    Talkative,
    Reserved,
}

impl PersonaStyle {
    pub const ALL: [PersonaStyle; 6] = [
        PersonaStyle::Cooperative,
        PersonaStyle::Anxious,
        PersonaStyle::Frustrated,
        PersonaStyle::Skeptical,
        PersonaStyle::Talkative,
        PersonaStyle::Reserved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaStyle::Cooperative => "cooperative",
            PersonaStyle::Anxious => "anxious",
            PersonaStyle::Frustrated => "frustrated",
            PersonaStyle::Skeptical => "skeptical",
            PersonaStyle::Talkative => "talkative",
            PersonaStyle::Reserved => "reserved",
        }
    }
}

impl fmt::Display for PersonaStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Unknown persona tag: {0}")]
pub struct UnknownPersona(pub String);

impl FromStr for PersonaStyle {
    type Err = UnknownPersona;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        PersonaStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == tag)
            .ok_or_else(|| UnknownPersona(s.to_string()))
    }
}

/// The patient as the counterpart should portray them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subject {
    pub name: String,
    /// Human-readable, unit-qualified age such as "7 months" or "1 year".
    pub age: String,
    pub sex: String,
    pub allergies: Vec<String>,
    pub medications: Vec<String>,
    pub chronic_conditions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Counterpart {
    pub style: PersonaStyle,
}

/// Normalized case brief, built once per session.
///
/// Every roster in `subject` is non-empty: missing entries are replaced with a
/// placeholder so the counterpart never receives an empty list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioDescriptor {
    pub description: String,
    pub subject: Subject,
    pub counterpart: Counterpart,
    pub topic: String,
}

/// Builds a scenario using the local calendar date for the age calculation.
pub fn build_scenario(
    detail: &PatientDetail,
    chief_complaint: &str,
    persona: PersonaStyle,
) -> ScenarioDescriptor {
    build_scenario_on(detail, chief_complaint, persona, Local::now().date_naive())
}

/// Builds a scenario as of `today`.
pub fn build_scenario_on(
    detail: &PatientDetail,
    chief_complaint: &str,
    persona: PersonaStyle,
    today: NaiveDate,
) -> ScenarioDescriptor {
    let patient = &detail.patient;
    let name = patient.full_name();
    let age = format_age(patient.date_of_birth, today);
    let sex = patient
        .sex_at_birth
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SEX)
        .to_string();

    let description = format!(
        "{}, a {} old {}, presenting with: {}",
        name,
        age,
        subject_noun(&sex),
        chief_complaint
    );

    ScenarioDescriptor {
        description,
        subject: Subject {
            name,
            age,
            sex,
            allergies: or_placeholder(active_allergies(&detail.allergies), NO_ALLERGIES),
            medications: or_placeholder(active_medications(&detail.medications), NO_MEDICATIONS),
            chronic_conditions: or_placeholder(
                active_conditions(&detail.conditions),
                NO_CONDITIONS,
            ),
        },
        counterpart: Counterpart { style: persona },
        topic: chief_complaint.to_string(),
    }
}

/// Renders an age as whole months under one year, whole years otherwise.
pub fn format_age(date_of_birth: NaiveDate, today: NaiveDate) -> String {
    let years = whole_years(date_of_birth, today);
    if years < 1 {
        let months = (today - date_of_birth).num_days().max(0) / 30;
        pluralize(months, "month")
    } else {
        pluralize(years, "year")
    }
}

fn whole_years(date_of_birth: NaiveDate, today: NaiveDate) -> i64 {
    let birthday_pending =
        (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day());
    i64::from(today.year() - date_of_birth.year()) - i64::from(birthday_pending)
}

fn pluralize(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

fn subject_noun(sex: &str) -> &'static str {
    match sex.to_lowercase().as_str() {
        "male" | "m" => "boy",
        "female" | "f" => "girl",
        _ => "child",
    }
}

fn active_allergies(allergies: &[Allergy]) -> Vec<String> {
    allergies
        .iter()
        .filter(|a| !a.display_name.trim().is_empty())
        .map(|a| {
            let reaction = a
                .reactions
                .as_ref()
                .and_then(|r| r.first())
                .map(|r| r.manifestation.trim())
                .filter(|m| !m.is_empty());
            match reaction {
                Some(manifestation) => format!("{} ({})", a.display_name, manifestation),
                None => a.display_name.clone(),
            }
        })
        .collect()
}

fn active_medications(medications: &[Medication]) -> Vec<String> {
    medications
        .iter()
        .filter(|m| m.status == "active")
        .map(|m| m.display_name.clone())
        .collect()
}

fn active_conditions(conditions: &[Condition]) -> Vec<String> {
    conditions
        .iter()
        .filter(|c| c.clinical_status == "active")
        .map(|c| c.display_name.clone())
        .collect()
}

fn or_placeholder(items: Vec<String>, placeholder: &str) -> Vec<String> {
    if items.is_empty() {
        vec![placeholder.to_string()]
    } else {
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{AllergyReaction, Patient};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn detail(dob: NaiveDate, sex: Option<&str>) -> PatientDetail {
        PatientDetail {
            patient: Patient {
                id: "p-1".to_string(),
                given_names: vec!["Mia".to_string()],
                family_name: "Chen".to_string(),
                date_of_birth: dob,
                sex_at_birth: sex.map(str::to_string),
            },
            conditions: vec![],
            medications: vec![],
            allergies: vec![],
        }
    }

    fn medication(name: &str, status: &str) -> Medication {
        Medication {
            display_name: name.to_string(),
            status: status.to_string(),
            dose_quantity: None,
            dose_unit: None,
            frequency: None,
        }
    }

    fn condition(name: &str, status: &str) -> Condition {
        Condition {
            display_name: name.to_string(),
            clinical_status: status.to_string(),
            severity: None,
        }
    }

    #[test]
    fn test_infant_age_renders_in_months() {
        let today = date(2024, 6, 1);
        assert_eq!(format_age(date(2024, 5, 1), today), "1 month");
        assert_eq!(format_age(date(2023, 12, 1), today), "6 months");
        assert_eq!(format_age(date(2024, 5, 20), today), "0 months");
    }

    #[test]
    fn test_age_never_renders_zero_years() {
        let today = date(2024, 6, 1);
        // One day short of the first birthday.
        let age = format_age(date(2023, 6, 2), today);
        assert!(age.ends_with("months"), "got {age}");
        assert_eq!(age, "12 months");
    }

    #[test]
    fn test_year_ages_pluralize() {
        let today = date(2024, 6, 1);
        assert_eq!(format_age(date(2023, 6, 1), today), "1 year");
        assert_eq!(format_age(date(2022, 6, 2), today), "1 year");
        assert_eq!(format_age(date(2022, 6, 1), today), "2 years");
        assert_eq!(format_age(date(2010, 1, 15), today), "14 years");
    }

    #[test]
    fn test_empty_rosters_get_placeholders() {
        let scenario = build_scenario_on(
            &detail(date(2018, 3, 3), Some("female")),
            "cough",
            PersonaStyle::Anxious,
            date(2024, 6, 1),
        );

        assert_eq!(scenario.subject.allergies, vec!["None known"]);
        assert_eq!(scenario.subject.medications, vec!["None"]);
        assert_eq!(scenario.subject.chronic_conditions, vec!["None"]);
    }

    #[test]
    fn test_inactive_entries_are_filtered_out() {
        let mut record = detail(date(2015, 1, 1), Some("male"));
        record.medications = vec![
            medication("Amoxicillin", "completed"),
            medication("Albuterol", "active"),
            medication("Cetirizine", "stopped"),
        ];
        record.conditions = vec![
            condition("Asthma", "active"),
            condition("Otitis media", "resolved"),
        ];

        let scenario =
            build_scenario_on(&record, "wheezing", PersonaStyle::Cooperative, date(2024, 6, 1));

        assert_eq!(scenario.subject.medications, vec!["Albuterol"]);
        assert_eq!(scenario.subject.chronic_conditions, vec!["Asthma"]);
    }

    #[test]
    fn test_all_inactive_falls_back_to_placeholder() {
        let mut record = detail(date(2015, 1, 1), None);
        record.medications = vec![medication("Amoxicillin", "completed")];
        record.conditions = vec![condition("Otitis media", "resolved")];

        let scenario =
            build_scenario_on(&record, "ear pain", PersonaStyle::Reserved, date(2024, 6, 1));

        assert_eq!(scenario.subject.medications, vec!["None"]);
        assert_eq!(scenario.subject.chronic_conditions, vec!["None"]);
    }

    #[test]
    fn test_allergies_carry_first_reaction() {
        let mut record = detail(date(2015, 1, 1), None);
        record.allergies = vec![
            Allergy {
                display_name: "Peanut".to_string(),
                criticality: "high".to_string(),
                reactions: Some(vec![
                    AllergyReaction {
                        manifestation: "Hives".to_string(),
                        severity: None,
                    },
                    AllergyReaction {
                        manifestation: "Anaphylaxis".to_string(),
                        severity: Some("severe".to_string()),
                    },
                ]),
                clinical_status: "active".to_string(),
            },
            Allergy {
                display_name: "  ".to_string(),
                criticality: "low".to_string(),
                reactions: None,
                clinical_status: "active".to_string(),
            },
            Allergy {
                display_name: "Penicillin".to_string(),
                criticality: "low".to_string(),
                reactions: Some(vec![]),
                clinical_status: "active".to_string(),
            },
        ];

        let scenario =
            build_scenario_on(&record, "rash", PersonaStyle::Talkative, date(2024, 6, 1));

        assert_eq!(
            scenario.subject.allergies,
            vec!["Peanut (Hives)", "Penicillin"]
        );
    }

    #[test]
    fn test_missing_sex_degrades_to_neutral_defaults() {
        let scenario = build_scenario_on(
            &detail(date(2021, 2, 10), None),
            "fever for two days",
            PersonaStyle::Skeptical,
            date(2024, 6, 1),
        );

        assert_eq!(scenario.subject.sex, "unknown");
        assert_eq!(
            scenario.description,
            "Mia Chen, a 3 years old child, presenting with: fever for two days"
        );
        assert_eq!(scenario.topic, "fever for two days");
        assert_eq!(scenario.counterpart.style, PersonaStyle::Skeptical);
    }

    #[test]
    fn test_sex_selects_noun() {
        let scenario = build_scenario_on(
            &detail(date(2024, 1, 1), Some("Female")),
            "poor feeding",
            PersonaStyle::Anxious,
            date(2024, 6, 1),
        );
        assert_eq!(
            scenario.description,
            "Mia Chen, a 5 months old girl, presenting with: poor feeding"
        );
    }

    #[test]
    fn test_persona_parsing() {
        assert_eq!("Anxious".parse::<PersonaStyle>(), Ok(PersonaStyle::Anxious));
        assert_eq!(" skeptical ".parse::<PersonaStyle>(), Ok(PersonaStyle::Skeptical));
        assert_eq!(
            "hostile".parse::<PersonaStyle>(),
            Err(UnknownPersona("hostile".to_string()))
        );
        for style in PersonaStyle::ALL {
            assert_eq!(style.to_string().parse::<PersonaStyle>(), Ok(style));
        }
    }

    #[test]
    fn test_scenario_serializes_with_lowercase_persona() {
        let scenario = build_scenario_on(
            &detail(date(2020, 1, 1), Some("male")),
            "fever",
            PersonaStyle::Frustrated,
            date(2024, 6, 1),
        );
        let value = serde_json::to_value(&scenario).unwrap();
        assert_eq!(value["counterpart"]["style"], "frustrated");
        assert_eq!(value["subject"]["chronic_conditions"][0], "None");
        assert_eq!(value["subject"]["age"], "4 years");
    }
}
