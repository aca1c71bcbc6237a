//! Similarity recommender: fragrances like one target, or like a collection
//! of targets.
//!
//! DESIGN
//! ======
//! A single target is compared note-by-note, with a bonus when a shared note
//! sits in the same pyramid position in both fragrances. Several targets are
//! first folded into a weighted note/accord profile (better-rated targets
//! weigh more) and candidates are scored against that profile, with a small
//! bonus for accords the collection under-represents.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::{Catalog, CatalogFragrance, Explanation, Recommendation, RecommendError, quality, top_n};

const NOTE_WEIGHT: f64 = 0.40;
const ACCORD_WEIGHT: f64 = 0.25;
const QUALITY_WEIGHT: f64 = 0.25;
const POPULARITY_WEIGHT: f64 = 0.08;
const DIVERSITY_WEIGHT: f64 = 0.02;

const TOP_POSITION: f64 = 0.25;
const MIDDLE_POSITION: f64 = 0.40;
const BASE_POSITION: f64 = 0.35;
const POSITION_BONUS_CAP: f64 = 2.0;
const COLLECTION_POSITION_BONUS_CAP: f64 = 1.8;

const MIN_TARGET_WEIGHT: f64 = 0.6;
const UNDERREPRESENTED: f64 = 0.3;
const DIVERSITY_CAP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Single,
    Collection,
}

#[derive(Debug)]
pub struct SimilarityResult<'a> {
    pub analysis: AnalysisType,
    pub targets: Vec<&'a CatalogFragrance>,
    pub recommendations: Vec<Recommendation<'a>>,
}

pub struct SimilarityRecommender {
    catalog: Arc<Catalog>,
}

impl SimilarityRecommender {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        tracing::info!(fragrances = catalog.len(), "similarity recommender initialized");
        Self { catalog }
    }

    /// Fragrances similar to `target_ids`. Repeated IDs are collapsed; one
    /// distinct target selects single mode, more select collection mode.
    ///
    /// # Errors
    ///
    /// Returns `NoTargets` for an empty list or `UnknownFragrance` for the
    /// first ID missing from the catalog.
    pub fn get_recommendations(&self, target_ids: &[Uuid], limit: usize) -> Result<SimilarityResult<'_>, RecommendError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for id in target_ids {
            if !seen.insert(*id) {
                continue;
            }
            let fragrance = self.catalog.get(*id).ok_or(RecommendError::UnknownFragrance(*id))?;
            targets.push(fragrance);
        }

        let (analysis, recommendations) = match targets.as_slice() {
            [] => return Err(RecommendError::NoTargets),
            [single] => (AnalysisType::Single, self.single(single, limit)),
            several => (AnalysisType::Collection, self.collection(several, limit)),
        };
        Ok(SimilarityResult { analysis, targets, recommendations })
    }

    fn single(&self, target: &CatalogFragrance, limit: usize) -> Vec<Recommendation<'_>> {
        let candidates = self
            .catalog
            .iter()
            .filter(|candidate| candidate.id != target.id)
            .map(|candidate| {
                let note_similarity = self.note_similarity(target, candidate);
                let accord_similarity = self.accord_similarity(&target.accords, &candidate.accords);
                let quality_score = quality(candidate.avg_rating, candidate.num_ratings);
                let popularity_score = self.catalog.popularity(candidate.num_ratings);

                let score = note_similarity * NOTE_WEIGHT
                    + accord_similarity * ACCORD_WEIGHT
                    + quality_score * QUALITY_WEIGHT
                    + popularity_score * POPULARITY_WEIGHT;

                let explanation = Explanation::from([
                    ("note_similarity", note_similarity),
                    ("accord_similarity", accord_similarity),
                    ("quality_score", quality_score),
                    ("popularity_score", popularity_score),
                    ("final_score", score),
                ]);
                Recommendation { fragrance: candidate, score, explanation }
            })
            .collect();
        top_n(candidates, limit)
    }

    fn collection(&self, targets: &[&CatalogFragrance], limit: usize) -> Vec<Recommendation<'_>> {
        let profile = CollectionProfile::build(targets);
        let target_ids: HashSet<Uuid> = targets.iter().map(|t| t.id).collect();

        let candidates = self
            .catalog
            .iter()
            .filter(|candidate| !target_ids.contains(&candidate.id))
            .map(|candidate| {
                let note_similarity = self.collection_note_similarity(&profile, candidate);
                let accord_similarity = self.collection_accord_similarity(&profile, candidate);
                let quality_score = quality(candidate.avg_rating, candidate.num_ratings);
                let popularity_score = self.catalog.popularity(candidate.num_ratings);
                let diversity_bonus = diversity_bonus(&profile, candidate, targets.len());

                let score = note_similarity * NOTE_WEIGHT
                    + accord_similarity * ACCORD_WEIGHT
                    + quality_score * QUALITY_WEIGHT
                    + popularity_score * POPULARITY_WEIGHT
                    + diversity_bonus * DIVERSITY_WEIGHT;

                let explanation = Explanation::from([
                    ("note_similarity", note_similarity),
                    ("accord_similarity", accord_similarity),
                    ("quality_score", quality_score),
                    ("popularity_score", popularity_score),
                    ("diversity_bonus", diversity_bonus),
                    ("final_score", score),
                ]);
                Recommendation { fragrance: candidate, score, explanation }
            })
            .collect();
        top_n(candidates, limit)
    }

    // =========================================================================
    // SINGLE-TARGET COMPONENTS
    // =========================================================================

    #[allow(clippy::cast_precision_loss)]
    fn note_similarity(&self, target: &CatalogFragrance, candidate: &CatalogFragrance) -> f64 {
        if target.notes.is_empty() || candidate.notes.is_empty() {
            return 0.0;
        }
        let target_set: HashSet<&str> = target.notes.iter().map(String::as_str).collect();
        let candidate_set: HashSet<&str> = candidate.notes.iter().map(String::as_str).collect();
        let shared: Vec<&str> = target_set.intersection(&candidate_set).copied().collect();
        if shared.is_empty() {
            return 0.0;
        }
        let union = target_set.union(&candidate_set).count() as f64;

        let weighted: f64 = shared
            .iter()
            .map(|note| self.catalog.note_rarity(note) * position_bonus(note, target, candidate))
            .sum();
        let jaccard = shared.len() as f64 / union;
        (jaccard * 0.4 + (weighted / union).min(1.0) * 0.6).min(1.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn accord_similarity(&self, target: &[String], candidate: &[String]) -> f64 {
        if target.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();
        let candidate_set: HashSet<&str> = candidate.iter().map(String::as_str).collect();
        let shared: Vec<&str> = target_set.intersection(&candidate_set).copied().collect();
        if shared.is_empty() {
            return 0.0;
        }
        let union = target_set.union(&candidate_set).count() as f64;

        let weighted: f64 = shared.iter().map(|accord| self.catalog.accord_rarity(accord)).sum();
        let jaccard = shared.len() as f64 / union;
        (jaccard * 0.3 + (weighted / union).min(1.0) * 0.7).min(1.0)
    }

    // =========================================================================
    // COLLECTION COMPONENTS
    // =========================================================================

    #[allow(clippy::cast_precision_loss)]
    fn collection_note_similarity(&self, profile: &CollectionProfile, candidate: &CatalogFragrance) -> f64 {
        if profile.notes.is_empty() || candidate.notes.is_empty() {
            return 0.0;
        }
        let candidate_set: HashSet<&str> = candidate.notes.iter().map(String::as_str).collect();
        let total = profile.note_total();

        let mut weighted = 0.0;
        let mut shared = 0_usize;
        for note in &candidate_set {
            if let Some(weight) = profile.notes.get(*note) {
                weighted += weight / total * self.catalog.note_rarity(note) * collection_position_bonus(note, candidate);
                shared += 1;
            }
        }
        let coverage = shared as f64 / candidate_set.len() as f64;
        (weighted * 0.8 + coverage * 0.2).min(1.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn collection_accord_similarity(&self, profile: &CollectionProfile, candidate: &CatalogFragrance) -> f64 {
        if profile.accords.is_empty() || candidate.accords.is_empty() {
            return 0.0;
        }
        let candidate_set: HashSet<&str> = candidate.accords.iter().map(String::as_str).collect();
        let total = profile.accord_total();

        let mut weighted = 0.0;
        let mut shared = 0_usize;
        for accord in &candidate_set {
            if let Some(weight) = profile.accords.get(*accord) {
                weighted += weight / total * self.catalog.accord_rarity(accord);
                shared += 1;
            }
        }
        let coverage = shared as f64 / candidate_set.len() as f64;
        (weighted * 0.7 + coverage * 0.3).min(1.0)
    }
}

/// 1 plus a bonus for each pyramid position the note holds in both fragrances.
fn position_bonus(note: &str, target: &CatalogFragrance, candidate: &CatalogFragrance) -> f64 {
    let both = |a: &[String], b: &[String]| a.iter().any(|n| n == note) && b.iter().any(|n| n == note);
    let mut bonus = 1.0;
    if both(&target.top_notes, &candidate.top_notes) {
        bonus += TOP_POSITION;
    }
    if both(&target.middle_notes, &candidate.middle_notes) {
        bonus += MIDDLE_POSITION;
    }
    if both(&target.base_notes, &candidate.base_notes) {
        bonus += BASE_POSITION;
    }
    f64::min(bonus, POSITION_BONUS_CAP)
}

/// Position bonus for the candidate alone; heart and base notes count most.
fn collection_position_bonus(note: &str, candidate: &CatalogFragrance) -> f64 {
    let holds = |notes: &[String]| notes.iter().any(|n| n == note);
    let mut bonus = 1.0;
    if holds(&candidate.middle_notes) {
        bonus += MIDDLE_POSITION * 0.8;
    }
    if holds(&candidate.base_notes) {
        bonus += BASE_POSITION * 0.9;
    }
    if holds(&candidate.top_notes) {
        bonus += TOP_POSITION * 0.6;
    }
    f64::min(bonus, COLLECTION_POSITION_BONUS_CAP)
}

/// Sum of `0.3 - share` over candidate accords the collection holds at under
/// 30%, capped at 0.5. Zero for fewer than two targets.
fn diversity_bonus(profile: &CollectionProfile, candidate: &CatalogFragrance, target_count: usize) -> f64 {
    if target_count < 2 {
        return 0.0;
    }
    let total = profile.accord_total();
    if total <= 0.0 {
        return 0.0;
    }
    let candidate_set: HashSet<&str> = candidate.accords.iter().map(String::as_str).collect();
    let score: f64 = candidate_set
        .iter()
        .map(|accord| profile.accords.get(*accord).copied().unwrap_or(0.0) / total)
        .filter(|share| *share < UNDERREPRESENTED)
        .map(|share| UNDERREPRESENTED - share)
        .sum();
    score.min(DIVERSITY_CAP)
}

// =============================================================================
// COLLECTION PROFILE
// =============================================================================

/// Note and accord weights summed over the targets. Each occurrence adds the
/// target's weight `max(avg_rating / 5, 0.6)`.
#[derive(Debug, Default)]
pub(crate) struct CollectionProfile {
    pub notes: HashMap<String, f64>,
    pub accords: HashMap<String, f64>,
}

impl CollectionProfile {
    pub(crate) fn build(targets: &[&CatalogFragrance]) -> Self {
        let mut profile = Self::default();
        for target in targets {
            let weight = (target.avg_rating / 5.0).max(MIN_TARGET_WEIGHT);
            for note in &target.notes {
                *profile.notes.entry(note.clone()).or_default() += weight;
            }
            for accord in &target.accords {
                *profile.accords.entry(accord.clone()).or_default() += weight;
            }
        }
        profile
    }

    fn note_total(&self) -> f64 {
        self.notes.values().sum()
    }

    fn accord_total(&self) -> f64 {
        self.accords.values().sum()
    }
}

#[cfg(test)]
#[path = "similarity_test.rs"]
mod tests;
