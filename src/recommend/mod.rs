//! In-memory recommendation engines.
//!
//! ARCHITECTURE
//! ============
//! `Catalog` is an immutable snapshot of the `fragrances` table with cleaned
//! note lists and corpus statistics (document frequency per note/accord and
//! the largest rating count). Both recommenders score every catalog entry
//! against the request and return the top `limit` by score.
//!
//! `Engines` pairs the two recommenders over one shared catalog. App state
//! holds an optional `Arc<Engines>` that is swapped wholesale on rebuild, so
//! in-flight requests keep scoring against the snapshot they started with.

pub mod note_based;
pub mod similarity;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::services::fragrance::FragranceRow;

pub use note_based::{NoteBasedRecommender, NotePreference};
pub use similarity::{AnalysisType, SimilarityRecommender, SimilarityResult};

const WILSON_Z: f64 = 1.96;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecommendError {
    #[error("Must provide either preferred notes or preferred accords")]
    NoPreferences,
    #[error("At least one fragrance ID required")]
    NoTargets,
    #[error("Fragrance with ID {0} not found")]
    UnknownFragrance(Uuid),
}

/// A catalog entry with cleaned, lowercased note and accord lists.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFragrance {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    /// `top_notes ++ middle_notes ++ base_notes`.
    pub notes: Vec<String>,
    pub top_notes: Vec<String>,
    pub middle_notes: Vec<String>,
    pub base_notes: Vec<String>,
    pub accords: Vec<String>,
    pub avg_rating: f64,
    pub num_ratings: i32,
}

impl CatalogFragrance {
    #[must_use]
    pub fn from_row(row: FragranceRow) -> Self {
        let top_notes = clean_list(row.top_notes);
        let middle_notes = clean_list(row.middle_notes);
        let base_notes = clean_list(row.base_notes);
        let notes = top_notes
            .iter()
            .chain(&middle_notes)
            .chain(&base_notes)
            .cloned()
            .collect();
        Self {
            id: row.id,
            name: row.name,
            brand: row.brand_name,
            notes,
            top_notes,
            middle_notes,
            base_notes,
            accords: clean_list(row.main_accords),
            avg_rating: row.average_rating,
            num_ratings: row.total_ratings,
        }
    }
}

/// Trim, lowercase, and drop empty entries.
#[must_use]
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

// =============================================================================
// CATALOG
// =============================================================================

pub struct Catalog {
    fragrances: Vec<CatalogFragrance>,
    by_id: HashMap<Uuid, usize>,
    note_frequencies: HashMap<String, u32>,
    accord_frequencies: HashMap<String, u32>,
    max_ratings: i32,
}

impl Catalog {
    #[must_use]
    pub fn new(fragrances: Vec<CatalogFragrance>) -> Self {
        let by_id = fragrances.iter().enumerate().map(|(idx, f)| (f.id, idx)).collect();
        let mut note_frequencies: HashMap<String, u32> = HashMap::new();
        let mut accord_frequencies: HashMap<String, u32> = HashMap::new();
        for fragrance in &fragrances {
            for note in &fragrance.notes {
                *note_frequencies.entry(note.clone()).or_default() += 1;
            }
            for accord in &fragrance.accords {
                *accord_frequencies.entry(accord.clone()).or_default() += 1;
            }
        }
        let max_ratings = fragrances.iter().map(|f| f.num_ratings).max().unwrap_or(1);
        Self { fragrances, by_id, note_frequencies, accord_frequencies, max_ratings }
    }

    #[must_use]
    pub fn from_rows(rows: Vec<FragranceRow>) -> Self {
        Self::new(rows.into_iter().map(CatalogFragrance::from_row).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fragrances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragrances.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&CatalogFragrance> {
        self.by_id.get(&id).map(|idx| &self.fragrances[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogFragrance> {
        self.fragrances.iter()
    }

    /// `1 / ln(f + 1)` over note document frequency; unknown notes count as 1.
    #[must_use]
    pub fn note_rarity(&self, note: &str) -> f64 {
        rarity(self.note_frequencies.get(note).copied().unwrap_or(1))
    }

    /// `1 / ln(f + 1)` over accord document frequency; unknown accords count as 1.
    #[must_use]
    pub fn accord_rarity(&self, accord: &str) -> f64 {
        rarity(self.accord_frequencies.get(accord).copied().unwrap_or(1))
    }

    /// Log-scaled rating count relative to the most-rated fragrance.
    #[must_use]
    pub fn popularity(&self, num_ratings: i32) -> f64 {
        if num_ratings <= 0 || self.max_ratings <= 0 {
            return 0.0;
        }
        let normalized = f64::from(num_ratings).ln_1p() / f64::from(self.max_ratings).ln_1p();
        normalized.min(1.0)
    }
}

fn rarity(frequency: u32) -> f64 {
    1.0 / f64::from(frequency).ln_1p()
}

/// Wilson lower bound on the share of "positive" ratings, where an average
/// of 2.5 maps to 0 and 5.0 maps to 1.
#[must_use]
pub fn quality(avg_rating: f64, num_ratings: i32) -> f64 {
    if num_ratings <= 0 || avg_rating <= 0.0 {
        return 0.0;
    }
    let p = ((avg_rating - 2.5) / 2.5).max(0.0);
    let n = f64::from(num_ratings);
    let z2 = WILSON_Z * WILSON_Z;
    let denominator = 1.0 + z2 / n;
    let numerator = p + z2 / (2.0 * n) - WILSON_Z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    (numerator / denominator).max(0.0)
}

// =============================================================================
// RESULTS
// =============================================================================

/// Component scores keyed by name, always including `final_score`.
pub type Explanation = BTreeMap<&'static str, f64>;

#[derive(Debug, Clone)]
pub struct Recommendation<'a> {
    pub fragrance: &'a CatalogFragrance,
    pub score: f64,
    pub explanation: Explanation,
}

/// Sort by score descending (ties by name, then ID) and keep `limit`.
pub(crate) fn top_n(mut candidates: Vec<Recommendation<'_>>, limit: usize) -> Vec<Recommendation<'_>> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.fragrance.name.cmp(&b.fragrance.name))
            .then_with(|| a.fragrance.id.cmp(&b.fragrance.id))
    });
    candidates.truncate(limit);
    candidates
}

// =============================================================================
// ENGINES
// =============================================================================

/// Both recommenders over one catalog snapshot.
pub struct Engines {
    pub note_based: NoteBasedRecommender,
    pub similarity: SimilarityRecommender,
}

impl Engines {
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            note_based: NoteBasedRecommender::new(Arc::clone(&catalog)),
            similarity: SimilarityRecommender::new(catalog),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.note_based.catalog()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
