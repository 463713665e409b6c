use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Number of records a retrieval returns at most
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// A single professor review record
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProfessorRecord {
    #[serde(rename = "professor")]
    pub name: String,
    pub subject: String,
    #[serde(rename = "stars")]
    pub rating: f32,
    #[serde(rename = "review")]
    pub review_text: String,
}

#[derive(Deserialize)]
struct ReviewFile {
    reviews: Vec<ProfessorRecord>,
}

/// Read-only store of professor records, loaded once at startup.
///
/// An empty store is valid: every search simply finds nothing, which lets
/// the rest of the pipeline keep working when the dataset failed to load.
#[derive(Debug, Default)]
pub struct ProfessorDb {
    records: Vec<ProfessorRecord>,
}

impl ProfessorDb {
    /// Build a store from records already in memory, validating each one.
    pub fn from_records(records: Vec<ProfessorRecord>) -> Result<Self, ChatError> {
        validate(&records)?;
        Ok(Self { records })
    }

    /// Load the review dataset from a JSON file shaped as
    /// `{"reviews": [{"professor", "subject", "stars", "review"}, ...]}`.
    pub async fn load_from_json(path: &str) -> Result<Self, ChatError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ChatError::DataUnavailable(format!("could not read {}: {}", path, e))
        })?;

        let file: ReviewFile = serde_json::from_str(&content).map_err(|e| {
            ChatError::DataUnavailable(format!("could not parse {}: {}", path, e))
        })?;

        let db = Self::from_records(file.reviews)?;
        info!("loaded {} professor records from {}", db.len(), path);
        Ok(db)
    }

    /// Retrieve the records relevant to a query, best rated first.
    ///
    /// A record matches when the lowercased query contains its subject or
    /// its professor name as a substring. Ties in rating keep dataset order,
    /// and at most `limit` records come back.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ProfessorRecord> {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<&ProfessorRecord> = self
            .records
            .iter()
            .filter(|record| {
                let subject = record.subject.to_lowercase();
                let name = record.name.to_lowercase();
                query_lower.contains(&subject) || query_lower.contains(&name)
            })
            .collect();

        // Stable sort, so equal ratings stay in dataset order
        matches.sort_by(|a, b| b.rating.total_cmp(&a.rating));

        debug!(
            "query matched {} of {} records",
            matches.len(),
            self.records.len()
        );

        matches.into_iter().take(limit).cloned().collect()
    }

    pub fn records(&self) -> &[ProfessorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn validate(records: &[ProfessorRecord]) -> Result<(), ChatError> {
    for (index, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() || record.subject.trim().is_empty() {
            return Err(ChatError::DataUnavailable(format!(
                "record {} has an empty professor or subject field",
                index
            )));
        }
        if !(0.0..=5.0).contains(&record.rating) {
            return Err(ChatError::DataUnavailable(format!(
                "record {} has rating {} outside 0-5",
                index, record.rating
            )));
        }
    }
    Ok(())
}
