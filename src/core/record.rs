//! Records held by the store: companies (match candidates) and incentives
//! (batch records).

use serde::{Deserialize, Serialize};

/// A company row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Primary key.
    pub id: i64,
    /// Registered name.
    pub company_name: String,
    /// Primary economic activity (CAE) label.
    #[serde(default)]
    pub cae_primary_label: Option<String>,
    /// Free-text description of the trade, in the source language.
    #[serde(default)]
    pub trade_description_native: Option<String>,
    /// Company website.
    #[serde(default)]
    pub website: Option<String>,
    /// Row creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Row update timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A company returned by the candidate search, with its text-relevance score.
///
/// Higher scores are more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCompany {
    /// The matched company.
    #[serde(flatten)]
    pub company: Company,
    /// Full-text relevance score (higher is better).
    pub relevance_score: f64,
}

impl ScoredCompany {
    /// Returns the company identifier.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.company.id
    }
}

/// An incentive (funding programme) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incentive {
    /// Primary key.
    pub incentive_id: i64,
    /// Programme title.
    #[serde(default)]
    pub title: Option<String>,
    /// Official description.
    #[serde(default)]
    pub description: Option<String>,
    /// Machine-generated summary of the programme.
    #[serde(default)]
    pub ai_description: Option<String>,
    /// Links to supporting documents.
    #[serde(default)]
    pub document_urls: Option<String>,
    /// Publication timestamp.
    #[serde(default)]
    pub publication_date: Option<String>,
    /// Application window start.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Application window end.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Total budget, when known.
    #[serde(default)]
    pub total_budget: Option<f64>,
    /// Where the programme was published.
    #[serde(default)]
    pub source_link: Option<String>,
}

impl Incentive {
    /// Display label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}
