//! Preference-driven recommender: scores the catalog against a user's rated
//! notes and accords.

use std::collections::HashSet;
use std::sync::Arc;

use super::{Catalog, Explanation, Recommendation, RecommendError, quality, top_n};

const NOTE_WEIGHT: f64 = 0.45;
const ACCORD_WEIGHT: f64 = 0.30;
const QUALITY_WEIGHT: f64 = 0.20;
const POPULARITY_WEIGHT: f64 = 0.05;

const NOTE_RARITY_FACTOR: f64 = 0.5;
const NOTE_COVERAGE_BONUS: f64 = 0.2;
const ACCORD_RARITY_FACTOR: f64 = 0.3;
const ACCORD_COVERAGE_BONUS: f64 = 0.25;

/// A rated note or accord. Names are expected trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePreference {
    pub name: String,
    pub importance: u8,
}

impl NotePreference {
    pub fn new(name: impl Into<String>, importance: u8) -> Self {
        Self { name: name.into(), importance }
    }
}

pub struct NoteBasedRecommender {
    catalog: Arc<Catalog>,
}

impl NoteBasedRecommender {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        tracing::info!(fragrances = catalog.len(), "note-based recommender initialized");
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Top `limit` fragrances for the given preferences.
    ///
    /// # Errors
    ///
    /// Returns `NoPreferences` when both lists are empty.
    pub fn get_recommendations(
        &self,
        notes: &[NotePreference],
        accords: &[NotePreference],
        limit: usize,
    ) -> Result<Vec<Recommendation<'_>>, RecommendError> {
        if notes.is_empty() && accords.is_empty() {
            return Err(RecommendError::NoPreferences);
        }

        let candidates = self
            .catalog
            .iter()
            .map(|fragrance| {
                let note_match = preference_match(
                    &fragrance.notes,
                    notes,
                    |name| self.catalog.note_rarity(name),
                    NOTE_RARITY_FACTOR,
                    NOTE_COVERAGE_BONUS,
                );
                let accord_match = preference_match(
                    &fragrance.accords,
                    accords,
                    |name| self.catalog.accord_rarity(name),
                    ACCORD_RARITY_FACTOR,
                    ACCORD_COVERAGE_BONUS,
                );
                let quality_score = quality(fragrance.avg_rating, fragrance.num_ratings);
                let popularity_score = self.catalog.popularity(fragrance.num_ratings);

                let score = note_match * NOTE_WEIGHT
                    + accord_match * ACCORD_WEIGHT
                    + quality_score * QUALITY_WEIGHT
                    + popularity_score * POPULARITY_WEIGHT;

                let explanation = Explanation::from([
                    ("note_preference_match", note_match),
                    ("accord_preference_match", accord_match),
                    ("quality_score", quality_score),
                    ("popularity_score", popularity_score),
                    ("final_score", score),
                ]);
                Recommendation { fragrance, score, explanation }
            })
            .collect();

        let results = top_n(candidates, limit);
        if let Some(best) = results.first() {
            tracing::debug!(top = %best.fragrance.name, score = best.score, returned = results.len(), "note-based recommendations");
        }
        Ok(results)
    }
}

/// Importance-weighted share of preferences present in `terms`, each boosted
/// by `1 + rarity * rarity_factor`, plus a coverage bonus. Capped at 1.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn preference_match(
    terms: &[String],
    preferences: &[NotePreference],
    rarity: impl Fn(&str) -> f64,
    rarity_factor: f64,
    coverage_bonus: f64,
) -> f64 {
    if preferences.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let present: HashSet<&str> = terms.iter().map(String::as_str).collect();

    let mut total_weight = 0.0;
    let mut matched_weight = 0.0;
    let mut matched = 0_u32;
    for pref in preferences {
        let importance = f64::from(pref.importance);
        total_weight += importance;
        if present.contains(pref.name.as_str()) {
            matched_weight += importance * (1.0 + rarity(&pref.name) * rarity_factor);
            matched += 1;
        }
    }
    if total_weight <= 0.0 {
        return 0.0;
    }

    let coverage = f64::from(matched) / preferences.len() as f64;
    (matched_weight / total_weight + coverage * coverage_bonus).min(1.0)
}

#[cfg(test)]
#[path = "note_based_test.rs"]
mod tests;
