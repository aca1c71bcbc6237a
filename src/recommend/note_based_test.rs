use super::*;
use crate::recommend::tests::fragrance;

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::new(vec![
        fragrance("vanilla bomb", &["vanilla"], &["tonka"], &["amber"], &["sweet", "warm spicy"], 4.2, 800),
        fragrance("citrus splash", &["bergamot", "lemon"], &["neroli"], &["musk"], &["citrus", "fresh"], 3.9, 1200),
        fragrance("rose garden", &["rose"], &["jasmine"], &["musk"], &["floral"], 4.0, 300),
        fragrance("cedar smoke", &["pepper"], &["cedar"], &["vanilla", "vetiver"], &["woody", "sweet"], 4.4, 50),
    ]))
}

#[test]
fn empty_preferences_are_rejected() {
    let recommender = NoteBasedRecommender::new(catalog());
    assert_eq!(
        recommender.get_recommendations(&[], &[], 5).unwrap_err(),
        RecommendError::NoPreferences
    );
}

#[test]
fn preferred_notes_rank_matching_fragrances_first() {
    let recommender = NoteBasedRecommender::new(catalog());
    let notes = [NotePreference::new("vanilla", 9), NotePreference::new("tonka", 8)];
    let results = recommender.get_recommendations(&notes, &[], 4).unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].fragrance.name, "vanilla bomb");
    assert_eq!(results[1].fragrance.name, "cedar smoke");
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn explanation_carries_all_components() {
    let recommender = NoteBasedRecommender::new(catalog());
    let accords = [NotePreference::new("floral", 10)];
    let results = recommender.get_recommendations(&[], &accords, 1).unwrap();
    let top = &results[0];

    assert_eq!(top.fragrance.name, "rose garden");
    let keys: Vec<_> = top.explanation.keys().copied().collect();
    assert_eq!(
        keys,
        ["accord_preference_match", "final_score", "note_preference_match", "popularity_score", "quality_score"]
    );
    assert!(top.explanation["note_preference_match"].abs() < f64::EPSILON);
    assert!((top.explanation["accord_preference_match"] - 1.0).abs() < f64::EPSILON);
    assert!((top.explanation["final_score"] - top.score).abs() < f64::EPSILON);
}

#[test]
fn limit_truncates_results() {
    let recommender = NoteBasedRecommender::new(catalog());
    let notes = [NotePreference::new("musk", 5)];
    assert_eq!(recommender.get_recommendations(&notes, &[], 2).unwrap().len(), 2);
}

// =============================================================================
// preference_match
// =============================================================================

fn terms(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn preference_match_weights_by_importance_rarity_and_coverage() {
    let prefs = [NotePreference::new("vanilla", 8), NotePreference::new("rose", 2)];
    let rarity = |_: &str| 1.0;
    let score = preference_match(&terms(&["vanilla", "amber"]), &prefs, rarity, 0.5, 0.2);
    // matched 8 * 1.5 = 12 of 10 total, coverage 1/2 * 0.2 -> capped
    assert!((score - 1.0).abs() < f64::EPSILON);

    let prefs = [NotePreference::new("vanilla", 2), NotePreference::new("rose", 8)];
    let score = preference_match(&terms(&["vanilla"]), &prefs, rarity, 0.5, 0.2);
    // 2 * 1.5 / 10 + 0.5 * 0.2
    assert!((score - 0.4).abs() < 1e-12);
}

#[test]
fn preference_match_is_zero_without_inputs() {
    let prefs = [NotePreference::new("vanilla", 8)];
    assert!(preference_match(&[], &prefs, |_| 1.0, 0.5, 0.2).abs() < f64::EPSILON);
    assert!(preference_match(&terms(&["vanilla"]), &[], |_| 1.0, 0.5, 0.2).abs() < f64::EPSILON);
    assert!(preference_match(&terms(&["amber"]), &prefs, |_| 1.0, 0.5, 0.2).abs() < f64::EPSILON);
}
