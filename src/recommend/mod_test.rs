use super::*;

/// Catalog entry with explicit pyramid and rating fields.
pub(crate) fn fragrance(
    name: &str,
    top: &[&str],
    middle: &[&str],
    base: &[&str],
    accords: &[&str],
    avg_rating: f64,
    num_ratings: i32,
) -> CatalogFragrance {
    let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
    CatalogFragrance::from_row(FragranceRow {
        id: Uuid::new_v4(),
        name: name.into(),
        brand_name: "house".into(),
        top_notes: owned(top),
        middle_notes: owned(middle),
        base_notes: owned(base),
        main_accords: owned(accords),
        average_rating: avg_rating,
        total_ratings: num_ratings,
    })
}

#[test]
fn from_row_cleans_and_concatenates_notes() {
    let f = fragrance("x", &[" Bergamot ", ""], &["ROSE"], &["musk", "  "], &["Woody "], 4.0, 10);
    assert_eq!(f.top_notes, vec!["bergamot"]);
    assert_eq!(f.middle_notes, vec!["rose"]);
    assert_eq!(f.base_notes, vec!["musk"]);
    assert_eq!(f.notes, vec!["bergamot", "rose", "musk"]);
    assert_eq!(f.accords, vec!["woody"]);
}

#[test]
fn frequencies_count_every_occurrence() {
    let catalog = Catalog::new(vec![
        fragrance("a", &["rose"], &["rose"], &[], &["floral"], 4.0, 10),
        fragrance("b", &["rose"], &[], &[], &["floral"], 4.0, 10),
    ]);
    // rose appears three times across the corpus
    assert!((catalog.note_rarity("rose") - 1.0 / 4_f64.ln()).abs() < 1e-12);
    assert!((catalog.accord_rarity("floral") - 1.0 / 3_f64.ln()).abs() < 1e-12);
    assert!((catalog.note_rarity("unknown") - 1.0 / 2_f64.ln()).abs() < 1e-12);
}

#[test]
fn popularity_is_log_scaled_against_max() {
    let catalog = Catalog::new(vec![
        fragrance("a", &[], &[], &[], &[], 4.0, 999),
        fragrance("b", &[], &[], &[], &[], 4.0, 9),
    ]);
    assert!((catalog.popularity(999) - 1.0).abs() < 1e-12);
    assert!((catalog.popularity(9) - 10_f64.ln() / 1000_f64.ln()).abs() < 1e-12);
    assert!(catalog.popularity(0).abs() < f64::EPSILON);
}

#[test]
fn quality_is_wilson_lower_bound() {
    assert!(quality(4.5, 0).abs() < f64::EPSILON);
    assert!(quality(0.0, 100).abs() < f64::EPSILON);
    assert!(quality(2.0, 100).abs() < f64::EPSILON, "below 2.5 has no positive share");

    let high = quality(4.5, 1000);
    let few = quality(4.5, 10);
    assert!(high > few, "more ratings tighten the bound");
    assert!(high < 0.8 && high > 0.75, "p = 0.8 gives a bound just under 0.8: {high}");
}

#[test]
fn top_n_orders_by_score_then_name() {
    let a = fragrance("b-name", &[], &[], &[], &[], 0.0, 0);
    let b = fragrance("a-name", &[], &[], &[], &[], 0.0, 0);
    let c = fragrance("c-name", &[], &[], &[], &[], 0.0, 0);
    let rec = |f, score| Recommendation { fragrance: f, score, explanation: Explanation::new() };
    let ranked = top_n(vec![rec(&a, 0.5), rec(&b, 0.5), rec(&c, 0.9)], 2);
    let names: Vec<_> = ranked.iter().map(|r| r.fragrance.name.as_str()).collect();
    assert_eq!(names, ["c-name", "a-name"]);
}

#[test]
fn engines_share_one_catalog() {
    let engines = Engines::new(Catalog::new(vec![fragrance("a", &[], &[], &[], &[], 4.0, 1)]));
    assert_eq!(engines.catalog().len(), 1);
    assert!(!engines.catalog().is_empty());
}
