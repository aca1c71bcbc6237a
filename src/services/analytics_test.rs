use super::*;
use crate::services::scent_profile::Ratings;
use sqlx::types::Json;
use time::Duration;
use time::macros::datetime;

const NOW: OffsetDateTime = datetime!(2026-10-19 12:00 UTC);

fn user() -> UserRow {
    UserRow {
        id: Uuid::new_v4(),
        email: "ana.silva@example.com".into(),
        hashed_password: String::new(),
        display_name: None,
        first_name: None,
        last_name: None,
        bio: None,
        avatar_url: None,
        is_active: true,
        is_verified: false,
        is_superuser: false,
        failed_login_attempts: 0,
        last_failed_login: None,
        last_login: None,
        created_at: datetime!(2026-03-02 09:00 UTC),
        updated_at: datetime!(2026-03-02 09:00 UTC),
    }
}

fn fragrance(name: &str, notes: &[&str], accords: &[&str]) -> FragranceRow {
    FragranceRow {
        id: Uuid::new_v4(),
        name: name.into(),
        brand_name: "test-brand".into(),
        top_notes: notes.iter().map(|s| (*s).to_owned()).collect(),
        middle_notes: Vec::new(),
        base_notes: Vec::new(),
        main_accords: accords.iter().map(|s| (*s).to_owned()).collect(),
        average_rating: 4.0,
        total_ratings: 100,
    }
}

fn owned(fragrance: FragranceRow, added_at: OffsetDateTime) -> OwnedFragrance {
    OwnedFragrance { fragrance, added_at }
}

fn profile(notes: &[(&str, i32)], accords: &[(&str, i32)]) -> ScentProfileRow {
    let ratings = |pairs: &[(&str, i32)]| pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect::<Ratings>();
    ScentProfileRow {
        user_id: Uuid::new_v4(),
        liked_notes: Json(ratings(notes)),
        liked_accords: Json(ratings(accords)),
        onboarding_complete: true,
        onboarding_complete_at: Some(NOW - Duration::days(3)),
    }
}

// =============================================================================
// formatting helpers
// =============================================================================

#[test]
fn initials_variants() {
    assert_eq!(initials("Sarah Mitchell"), "SM");
    assert_eq!(initials("sarah jane mitchell"), "SJ");
    assert_eq!(initials("ana.silva@example.com"), "AN");
    assert_eq!(initials("x"), "X");
    assert_eq!(initials("   "), "?");
}

#[test]
fn time_ago_buckets() {
    assert_eq!(format_time_ago(None, NOW), "Recently");
    assert_eq!(format_time_ago(Some(NOW - Duration::seconds(30)), NOW), "Just now");
    assert_eq!(format_time_ago(Some(NOW - Duration::minutes(1)), NOW), "1 minute ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::minutes(59)), NOW), "59 minutes ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::hours(1)), NOW), "1 hour ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::hours(23)), NOW), "23 hours ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::days(3)), NOW), "3 days ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::days(365)), NOW), "365 days ago");
    assert_eq!(format_time_ago(Some(NOW - Duration::days(800)), NOW), "2 years ago");
}

#[test]
fn emoji_prefers_accords_then_notes() {
    assert_eq!(emoji_for(&fragrance("a", &["vanilla"], &["woody"])), "🌲");
    assert_eq!(emoji_for(&fragrance("a", &[], &["Marine"])), "🌊");
    assert_eq!(emoji_for(&fragrance("a", &[], &["warm spicy"])), "🔥");
    assert_eq!(emoji_for(&fragrance("a", &["Tonka"], &["musky"])), "🍦");
    assert_eq!(emoji_for(&fragrance("a", &["leather"], &[])), "🎩");
    assert_eq!(emoji_for(&fragrance("a", &["oud"], &["animalic"])), "💙");
}

// =============================================================================
// charts
// =============================================================================

#[test]
fn top_share_ranks_and_normalizes() {
    let scores = HashMap::from([
        ("vanilla".to_owned(), 6.0),
        ("rose".to_owned(), 2.0),
        ("amber".to_owned(), 2.0),
    ]);
    let items = top_share(scores);
    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Vanilla", "Amber", "Rose"]);
    assert!((items[0].value - 60.0).abs() < 1e-9);
    assert!((items[1].value - 20.0).abs() < 1e-9);
    assert_eq!(items[0].color, GRADIENT_COLORS[0]);
    assert_eq!(items[2].color, GRADIENT_COLORS[2]);
}

#[test]
fn top_share_keeps_five() {
    let scores = (0..8).map(|i| (format!("n{i}"), f64::from(i))).collect();
    assert_eq!(top_share(scores).len(), 5);
}

#[test]
fn empty_inputs_yield_empty_charts_and_default_radar() {
    let response = build_profile(&user(), None, &[], NOW);
    assert!(response.note_breakdown.is_empty());
    assert!(response.accord_profile.is_empty());
    assert_eq!(response.radar_data.len(), 6);
    assert!(response.radar_data.iter().all(|r| (r.value - 5.0).abs() < f64::EPSILON));
    assert_eq!(response.radar_data[0].category, "Woody");
    assert_eq!(response.insights, DEFAULT_INSIGHTS.map(str::to_owned).to_vec());
    assert!(response.recent_activity.is_empty());
}

#[test]
fn note_breakdown_blends_quiz_and_collection() {
    let p = profile(&[("vanilla", 10)], &[]);
    let items = [owned(fragrance("a", &["vanilla", "rose"], &[]), NOW)];
    let response = build_profile(&user(), Some(&p), &items, NOW);
    // vanilla: 10 * 0.6 + 0.4 = 6.4, rose: 0.4
    let vanilla = &response.note_breakdown[0];
    assert_eq!(vanilla.name, "Vanilla");
    assert!((vanilla.value - 94.1).abs() < 1e-9);
    assert!((response.note_breakdown[1].value - 5.9).abs() < 1e-9);
    assert_eq!(response.stats.notes_explored, 1);
}

// =============================================================================
// full profile
// =============================================================================

#[test]
fn completed_profile_has_insights_activity_and_showcase() {
    let mut u = user();
    u.display_name = Some("Ana Silva".into());
    u.last_login = Some(NOW - Duration::hours(2));
    let p = profile(&[("bergamot", 8)], &[("woody", 9), ("floral", 4)]);
    let items: Vec<_> = (0..7)
        .map(|i| owned(fragrance(&format!("oud-wood_{i}"), &["oud"], &["woody"]), NOW - Duration::days(i)))
        .collect();

    let response = build_profile(&u, Some(&p), &items, NOW);

    assert_eq!(response.user.name, "Ana Silva");
    assert_eq!(response.user.avatar, "AS");
    assert_eq!(response.user.member_since, "March 2026");
    assert!(response.user.quiz_completed);

    assert_eq!(response.stats.fragrances_owned, 7);
    assert_eq!(response.stats.total_explorations, 70);
    assert!((response.stats.avg_match_score - 85.0).abs() < f64::EPSILON);

    assert_eq!(response.fragrances.len(), 6);
    assert_eq!(response.fragrances[0].name, "Oud Wood 0");
    assert_eq!(response.fragrances[0].brand, "Test Brand");
    assert_eq!(response.fragrances[0].match_score, 95);
    assert_eq!(response.fragrances[5].match_score, 85);
    assert_eq!(response.fragrances[0].emoji, "🌲");

    // woody: 9 * 0.5 + 7 * 0.5 = 8.0, floral: 2.0
    assert_eq!(
        response.insights,
        vec![
            "You have a strong preference for woody fragrances (80%)".to_owned(),
            "Your collection leans toward evening/formal scents".to_owned(),
            "Consider exploring more citrus notes to balance your profile".to_owned(),
        ]
    );
    let woody = response.radar_data.iter().find(|r| r.category == "Woody").unwrap();
    assert!((woody.value - 80.0).abs() < 1e-9);

    let actions: Vec<_> = response.recent_activity.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, ["Completed fragrance quiz", "Added oud-wood_0 to collection", "Last login"]);
    assert_eq!(response.recent_activity[0].time, "3 days ago");
    assert_eq!(response.recent_activity[1].time, "Just now");
    assert_eq!(response.recent_activity[2].time, "2 hours ago");
}

#[test]
fn collection_insight_thresholds() {
    let p = profile(&[], &[("citrus", 5), ("floral", 5), ("spicy", 5)]);
    let none = build_profile(&user(), Some(&p), &[], NOW);
    assert_eq!(none.insights[1], "Start adding fragrances to your collection to build your profile");
    assert_eq!(none.insights.len(), 2, "no gap when citrus, floral and spicy are present");

    let one = [owned(fragrance("a", &[], &[]), NOW)];
    let some = build_profile(&user(), Some(&p), &one, NOW);
    assert_eq!(some.insights[1], "You're building a versatile fragrance wardrobe");
}

#[test]
fn incomplete_quiz_uses_default_insights() {
    let mut p = profile(&[("vanilla", 9)], &[("woody", 9)]);
    p.onboarding_complete = false;
    let response = build_profile(&user(), Some(&p), &[], NOW);
    assert_eq!(response.insights.len(), 3);
    assert_eq!(response.insights[0], DEFAULT_INSIGHTS[0]);
    assert!(!response.user.quiz_completed);
}

#[test]
fn activity_timestamp_serializes_rfc3339() {
    let item = ActivityItem { action: "Last login".into(), time: "Just now".into(), timestamp: NOW };
    let value = serde_json::to_value(&item).unwrap();
    assert_eq!(value["timestamp"], "2026-10-19T12:00:00Z");
}
