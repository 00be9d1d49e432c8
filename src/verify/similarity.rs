//! Plain-text similarity and theft classification
//!
//! Both documents are reduced to visible text (markup, style/script blocks,
//! comments and zero-width markers removed) and compared with a
//! character-bigram Sørensen–Dice coefficient. Paraphrased copies that only
//! swap a few words keep nearly all bigrams and still score high, while
//! the comparison stays linear in document length.

use super::extract_fingerprint;
use crate::fingerprint::Fingerprint;
use crate::stego;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default percentage above which a suspect is a theft candidate.
pub const DEFAULT_THEFT_THRESHOLD: f64 = 80.0;

static BLOCK_ELEMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(style|script)\b[^>]*>.*?</(style|script)\s*>").unwrap());
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduce a markup document to its visible text.
pub fn strip_markup(content: &str) -> String {
    let text = BLOCK_ELEMENTS.replace_all(content, " ");
    let text = COMMENTS.replace_all(&text, " ");
    let text = TAGS.replace_all(&text, " ");
    let text = stego::strip(&text);
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Similarity of two plain texts as a percentage (0–100).
pub fn text_similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b) * 100.0
}

/// Outcome of comparing an original against a suspect document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheftReport {
    /// Plain-text similarity percentage
    pub similarity: f64,
    pub is_theft: bool,
    pub threshold: f64,
    pub original_fingerprint: Option<Fingerprint>,
    pub suspect_fingerprint: Option<Fingerprint>,
}

impl TheftReport {
    /// Both sides carry the same fingerprint.
    pub fn same_provenance(&self) -> bool {
        matches!(
            (&self.original_fingerprint, &self.suspect_fingerprint),
            (Some(a), Some(b)) if a == b
        )
    }
}

impl std::fmt::Display for TheftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.1}% similar ({}), original={}, suspect={}",
            self.similarity,
            if self.is_theft { "THEFT CANDIDATE" } else { "below threshold" },
            self.original_fingerprint
                .as_ref()
                .map(|fp| fp.short())
                .unwrap_or("none"),
            self.suspect_fingerprint
                .as_ref()
                .map(|fp| fp.short())
                .unwrap_or("none"),
        )
    }
}

/// A suspect ranked against one original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub label: String,
    pub report: TheftReport,
}

/// Theft classifier with a configurable threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityDetector {
    threshold: f64,
}

impl Default for SimilarityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THEFT_THRESHOLD)
    }
}

impl SimilarityDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare two documents and classify the suspect.
    pub fn compare(&self, original: &str, suspect: &str) -> TheftReport {
        self.compare_stripped(original, &strip_markup(original), suspect)
    }

    fn compare_stripped(&self, original: &str, original_text: &str, suspect: &str) -> TheftReport {
        let similarity = text_similarity(original_text, &strip_markup(suspect));
        TheftReport {
            similarity,
            is_theft: similarity > self.threshold,
            threshold: self.threshold,
            original_fingerprint: extract_fingerprint(original).fingerprint(),
            suspect_fingerprint: extract_fingerprint(suspect).fingerprint(),
        }
    }

    /// Score many suspects against one original in parallel, most similar
    /// first.
    pub fn rank_candidates(&self, original: &str, suspects: &[(String, String)]) -> Vec<RankedCandidate> {
        let original_text = strip_markup(original);
        let mut ranked: Vec<RankedCandidate> = suspects
            .par_iter()
            .map(|(label, content)| RankedCandidate {
                label: label.clone(),
                report: self.compare_stripped(original, &original_text, content),
            })
            .collect();

        ranked.sort_by(|a, b| b.report.similarity.total_cmp(&a.report.similarity));
        ranked
    }
}
