//! Core data models.
//!
//! These types flow through the whole pipeline: documents are stored per
//! [`CollectionKey`], alerts are parsed into an [`AlertQuery`], and every
//! match operation yields an ordered list of [`MatchResult`]s.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace of one document collection: a single agent owned by a single tenant.
///
/// Collections never cross this boundary; every store operation takes a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey {
    pub tenant_id: u64,
    pub agent_id: u64,
}

impl CollectionKey {
    pub fn new(tenant_id: u64, agent_id: u64) -> Self {
        Self {
            tenant_id,
            agent_id,
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.agent_id)
    }
}

/// One ingested knowledge-base entry.
///
/// Immutable once stored. Re-adding a document with the same `id` replaces
/// the previous entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Unique within its collection.
    pub id: String,
    /// Full plain-text content.
    pub text: String,
    pub filename: String,
    pub file_type: String,
    /// RFC 3339 timestamp.
    pub uploaded_at: String,
}

/// Which matcher tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    FirstLine,
    FullText,
    Semantic,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::FirstLine => "first_line",
            MatchType::FullText => "full_text",
            MatchType::Semantic => "semantic",
        }
    }

    /// Exact tiers are deterministic string matches; semantic is embedding-based.
    pub fn is_exact(&self) -> bool {
        !matches!(self, MatchType::Semantic)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub document_id: String,
    pub filename: String,
    pub file_type: String,
    pub uploaded_at: String,
    pub match_type: MatchType,
}

/// Outcome of one matching operation for a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub text: String,
    pub metadata: MatchMetadata,
    /// `0.0` for exact matches, embedding distance for semantic ones.
    pub distance: f32,
    /// The document's first non-empty line.
    pub first_line: String,
    pub has_first_line_match: bool,
    /// The candidate that produced an exact match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_candidate: Option<String>,
}

impl MatchResult {
    /// Builds an exact-tier result for `doc`.
    pub fn exact(doc: &StoredDocument, match_type: MatchType, candidate: &str) -> Self {
        Self {
            text: doc.text.clone(),
            metadata: MatchMetadata {
                document_id: doc.id.clone(),
                filename: doc.filename.clone(),
                file_type: doc.file_type.clone(),
                uploaded_at: doc.uploaded_at.clone(),
                match_type,
            },
            distance: 0.0,
            first_line: crate::keywords::first_line(&doc.text).to_string(),
            has_first_line_match: match_type == MatchType::FirstLine,
            matched_candidate: Some(candidate.to_string()),
        }
    }

    /// Builds a semantic-tier result for `doc` at `distance`.
    ///
    /// `has_first_line_match` starts out false; the matcher recomputes it.
    pub fn semantic(doc: &StoredDocument, distance: f32) -> Self {
        Self {
            text: doc.text.clone(),
            metadata: MatchMetadata {
                document_id: doc.id.clone(),
                filename: doc.filename.clone(),
                file_type: doc.file_type.clone(),
                uploaded_at: doc.uploaded_at.clone(),
                match_type: MatchType::Semantic,
            },
            distance,
            first_line: crate::keywords::first_line(&doc.text).to_string(),
            has_first_line_match: false,
            matched_candidate: None,
        }
    }

    pub fn match_type(&self) -> MatchType {
        self.metadata.match_type
    }
}

/// The extracted intent of one incoming alert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertQuery {
    /// Verbatim alert message.
    pub raw_text: String,
    /// Alert names captured from headers, in extraction order, deduplicated.
    pub candidate_names: Vec<String>,
    /// Standalone alert codes (`z735`, `c217`), lower-cased, in extraction order.
    pub codes: Vec<String>,
    /// Lower-cased keyword union used for first-line promotion.
    pub keywords: BTreeSet<String>,
}

impl AlertQuery {
    /// Candidates tried by the exact-match tiers: names first, then codes.
    pub fn exact_candidates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.candidate_names.len() + self.codes.len());
        for c in self.candidate_names.iter().chain(self.codes.iter()) {
            if !out.iter().any(|seen| seen.eq_ignore_ascii_case(c)) {
                out.push(c.as_str());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.candidate_names.is_empty() && self.codes.is_empty()
    }
}
