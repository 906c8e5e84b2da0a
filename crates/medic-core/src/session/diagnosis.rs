//! Diagnosis record types.
//!
//! The structured final output of a consultation. A full record arrives
//! from the REST API once the final prompt has been answered; partial
//! records arrive as `DiagnosisUpdate` chunks over the event channel while
//! the service is still generating.
//!
//! Every field carries a serde default: the service may omit fields in any
//! payload, and a missing field must never be fatal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A recommended medicine within a diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Medicine {
    pub name: String,
    pub purpose: String,
    pub how_it_works: String,
    /// Dosage keyed by age group, e.g. "Adult (20+)" -> "20-30 mg".
    pub dosage: HashMap<String, String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub when_not_to_take: Vec<String>,
    pub age_restriction: String,
}

/// The structured diagnosis produced for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Diagnosis {
    pub disease_name: String,
    pub disease_summary: String,
    pub why_you_have_this: String,
    pub what_to_do_first: String,
    pub danger_signs: Vec<String>,
    pub lifestyle_changes: Vec<String>,
    pub medicines: Vec<Medicine>,
}

impl Diagnosis {
    /// Returns true if no field has been populated yet.
    pub fn is_empty(&self) -> bool {
        self.disease_name.is_empty()
            && self.disease_summary.is_empty()
            && self.why_you_have_this.is_empty()
            && self.what_to_do_first.is_empty()
            && self.danger_signs.is_empty()
            && self.lifestyle_changes.is_empty()
            && self.medicines.is_empty()
    }

    /// Merges a partial update into this record.
    ///
    /// Only the fields present in the update are overwritten; fields the
    /// update omits keep their previously received values. Payloads are
    /// never assumed to carry the full record mid-stream.
    pub fn apply(&mut self, update: DiagnosisUpdate) {
        if let Some(v) = update.disease_name {
            self.disease_name = v;
        }
        if let Some(v) = update.disease_summary {
            self.disease_summary = v;
        }
        if let Some(v) = update.why_you_have_this {
            self.why_you_have_this = v;
        }
        if let Some(v) = update.what_to_do_first {
            self.what_to_do_first = v;
        }
        if let Some(v) = update.danger_signs {
            self.danger_signs = v;
        }
        if let Some(v) = update.lifestyle_changes {
            self.lifestyle_changes = v;
        }
        if let Some(v) = update.medicines {
            self.medicines = v;
        }
    }
}

/// A partial diagnosis record, as delivered by one streamed chunk.
///
/// Fields appear and disappear across chunks, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosisUpdate {
    pub disease_name: Option<String>,
    pub disease_summary: Option<String>,
    pub why_you_have_this: Option<String>,
    pub what_to_do_first: Option<String>,
    pub danger_signs: Option<Vec<String>>,
    pub lifestyle_changes: Option<Vec<String>>,
    pub medicines: Option<Vec<Medicine>>,
}
