//! Profile analytics: chart data, insights, and activity derived from a
//! user's quiz ratings and owned fragrances.
//!
//! DESIGN
//! ======
//! Everything here is a pure function of already-loaded rows plus `now`, so
//! the profile route does all I/O up front and a missing scent profile or
//! empty collection simply yields empty charts and default text.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

use crate::services::fragrance::{FragranceRow, title_case};
use crate::services::scent_profile::{OwnedFragrance, ScentProfileRow};
use crate::services::user::{UserRow, email_local_part};

pub const GRADIENT_COLORS: [&str; 5] = ["#ff9ab3", "#ffb8a3", "#ffd09e", "#ffe4b8", "#fff0d6"];

pub const DEFAULT_INSIGHTS: [&str; 3] = [
    "Start by completing your fragrance quiz to get personalized insights",
    "Add fragrances to your collection to see your scent profile",
    "Explore different fragrance families to discover your signature scent",
];

const RADAR_FAMILIES: [&str; 6] = ["woody", "fresh", "floral", "oriental", "citrus", "spicy"];
const RADAR_DEFAULT: f64 = 5.0;
const TOP_ITEMS: usize = 5;
const SHOWCASE_LIMIT: usize = 6;
const PLACEHOLDER_MATCH_SCORE: f64 = 85.0;

const QUIZ_NOTE_WEIGHT: f64 = 0.6;
const OWNED_NOTE_WEIGHT: f64 = 0.4;
const QUIZ_ACCORD_WEIGHT: f64 = 0.5;
const OWNED_ACCORD_WEIGHT: f64 = 0.5;

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub user: UserInfo,
    pub stats: QuickStats,
    pub note_breakdown: Vec<ChartItem>,
    pub accord_profile: Vec<ChartItem>,
    pub radar_data: Vec<RadarItem>,
    pub fragrances: Vec<FragranceItem>,
    pub insights: Vec<String>,
    pub recent_activity: Vec<ActivityItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub email: String,
    pub member_since: String,
    pub avatar: String,
    pub quiz_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickStats {
    pub fragrances_owned: usize,
    pub avg_match_score: f64,
    pub notes_explored: usize,
    pub total_explorations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartItem {
    pub name: String,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarItem {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragranceItem {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    #[serde(rename = "match")]
    pub match_score: u32,
    pub emoji: &'static str,
    pub top_notes: Vec<String>,
    pub middle_notes: Vec<String>,
    pub base_notes: Vec<String>,
    pub accords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityItem {
    pub action: String,
    pub time: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Assemble the full profile view.
#[must_use]
pub fn build_profile(
    user: &UserRow,
    profile: Option<&ScentProfileRow>,
    owned: &[OwnedFragrance],
    now: OffsetDateTime,
) -> ProfileResponse {
    let fragrances: Vec<&FragranceRow> = owned.iter().map(|o| &o.fragrance).collect();
    let note_breakdown = note_breakdown(profile, &fragrances);
    let accord_profile = accord_profile(profile, &fragrances);
    let radar_data = radar_data(&accord_profile);
    let insights = insights(&accord_profile, fragrances.len(), profile);

    ProfileResponse {
        user: user_info(user, profile),
        stats: QuickStats {
            fragrances_owned: owned.len(),
            avg_match_score: PLACEHOLDER_MATCH_SCORE,
            notes_explored: profile.map_or(0, |p| p.liked_notes.0.len()),
            total_explorations: owned.len().saturating_mul(10),
        },
        note_breakdown,
        accord_profile,
        radar_data,
        fragrances: showcase(&fragrances),
        insights,
        recent_activity: recent_activity(user, profile, owned, now),
    }
}

// =============================================================================
// USER
// =============================================================================

fn user_info(user: &UserRow, profile: Option<&ScentProfileRow>) -> UserInfo {
    let member_since = user
        .created_at
        .format(format_description!("[month repr:long] [year]"))
        .unwrap_or_else(|_| "Recently".to_owned());
    UserInfo {
        name: user
            .display_name
            .clone()
            .unwrap_or_else(|| email_local_part(&user.email).to_owned()),
        email: user.email.clone(),
        member_since,
        avatar: initials(user.display_name.as_deref().unwrap_or(&user.email)),
        quiz_completed: profile.is_some_and(|p| p.onboarding_complete),
    }
}

/// First letters of the first two words, or the first two characters of a
/// single word, uppercased. `?` when there is nothing to use.
#[must_use]
pub fn initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.as_slice() {
        [] => "?".to_owned(),
        [single] => single.chars().take(2).collect::<String>().to_uppercase(),
        [first, second, ..] => first
            .chars()
            .take(1)
            .chain(second.chars().take(1))
            .collect::<String>()
            .to_uppercase(),
    }
}

/// "3 days ago" style relative time. `None` reads as "Recently".
#[must_use]
pub fn format_time_ago(at: Option<OffsetDateTime>, now: OffsetDateTime) -> String {
    let Some(at) = at else {
        return "Recently".to_owned();
    };
    let elapsed = now - at;
    let days = elapsed.whole_days();
    let seconds_in_day = elapsed.whole_seconds() - days * 86_400;

    let (amount, unit) = if days > 365 {
        (days / 365, "year")
    } else if days > 0 {
        (days, "day")
    } else if seconds_in_day >= 3600 {
        (seconds_in_day / 3600, "hour")
    } else if seconds_in_day >= 60 {
        (seconds_in_day / 60, "minute")
    } else {
        return "Just now".to_owned();
    };
    let plural = if amount > 1 { "s" } else { "" };
    format!("{amount} {unit}{plural} ago")
}

// =============================================================================
// CHARTS
// =============================================================================

fn note_breakdown(profile: Option<&ScentProfileRow>, owned: &[&FragranceRow]) -> Vec<ChartItem> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    if let Some(profile) = profile {
        for (note, importance) in &profile.liked_notes.0 {
            *scores.entry(note.to_lowercase()).or_default() += f64::from(*importance) * QUIZ_NOTE_WEIGHT;
        }
    }
    for fragrance in owned {
        for note in fragrance
            .top_notes
            .iter()
            .chain(&fragrance.middle_notes)
            .chain(&fragrance.base_notes)
        {
            *scores.entry(note.to_lowercase()).or_default() += OWNED_NOTE_WEIGHT;
        }
    }
    top_share(scores)
}

fn accord_profile(profile: Option<&ScentProfileRow>, owned: &[&FragranceRow]) -> Vec<ChartItem> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    if let Some(profile) = profile {
        for (accord, importance) in &profile.liked_accords.0 {
            *scores.entry(accord.to_lowercase()).or_default() += f64::from(*importance) * QUIZ_ACCORD_WEIGHT;
        }
    }
    for fragrance in owned {
        for accord in &fragrance.main_accords {
            *scores.entry(accord.to_lowercase()).or_default() += OWNED_ACCORD_WEIGHT;
        }
    }
    top_share(scores)
}

/// Top entries by score (ties by name), each as a percentage of the top total.
pub(crate) fn top_share(scores: HashMap<String, f64>) -> Vec<ChartItem> {
    let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_ITEMS);

    let total: f64 = ranked.iter().map(|(_, score)| score).sum();
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (name, score))| ChartItem {
            name: capitalize(&name),
            value: if total > 0.0 { round1(score / total * 100.0) } else { 0.0 },
            color: GRADIENT_COLORS[idx % GRADIENT_COLORS.len()],
        })
        .collect()
}

fn radar_data(accord_profile: &[ChartItem]) -> Vec<RadarItem> {
    RADAR_FAMILIES
        .iter()
        .map(|family| RadarItem {
            category: capitalize(family),
            value: accord_profile
                .iter()
                .find(|item| item.name.to_lowercase() == *family)
                .map_or(RADAR_DEFAULT, |item| item.value),
        })
        .collect()
}

// =============================================================================
// INSIGHTS
// =============================================================================

fn insights(accord_profile: &[ChartItem], owned_count: usize, profile: Option<&ScentProfileRow>) -> Vec<String> {
    if !profile.is_some_and(|p| p.onboarding_complete) {
        return DEFAULT_INSIGHTS.iter().map(|s| (*s).to_owned()).collect();
    }

    let mut insights = Vec::new();
    if let Some(top) = accord_profile.first() {
        insights.push(format!(
            "You have a strong preference for {} fragrances ({:.0}%)",
            top.name.to_lowercase(),
            top.value
        ));
    }

    insights.push(
        match owned_count {
            0 => "Start adding fragrances to your collection to build your profile",
            1..5 => "You're building a versatile fragrance wardrobe",
            _ => "Your collection leans toward evening/formal scents",
        }
        .to_owned(),
    );

    if let Some(gap) = gap_suggestion(accord_profile) {
        insights.push(format!("Consider exploring more {gap} notes to balance your profile"));
    }
    insights
}

fn gap_suggestion(accord_profile: &[ChartItem]) -> Option<&'static str> {
    if accord_profile.is_empty() {
        return None;
    }
    let present: Vec<String> = accord_profile.iter().map(|item| item.name.to_lowercase()).collect();
    let has = |accord: &str| present.iter().any(|p| p == accord);

    if !has("citrus") && !has("fresh") {
        Some("citrus")
    } else if !has("floral") {
        Some("floral")
    } else if !has("spicy") && !has("oriental") {
        Some("spicy")
    } else {
        None
    }
}

// =============================================================================
// COLLECTION
// =============================================================================

fn showcase(owned: &[&FragranceRow]) -> Vec<FragranceItem> {
    owned
        .iter()
        .take(SHOWCASE_LIMIT)
        .zip(0_u32..)
        .map(|(fragrance, idx)| FragranceItem {
            id: fragrance.id,
            name: title_case(&fragrance.name.replace(['-', '_'], " ")),
            brand: title_case(&fragrance.brand_name.replace(['-', '_'], " ")),
            match_score: 95 - idx * 2,
            emoji: emoji_for(fragrance),
            top_notes: fragrance.top_notes.clone(),
            middle_notes: fragrance.middle_notes.clone(),
            base_notes: fragrance.base_notes.clone(),
            accords: fragrance.main_accords.clone(),
        })
        .collect()
}

/// Representative emoji: accords first, then notes.
#[must_use]
pub fn emoji_for(fragrance: &FragranceRow) -> &'static str {
    const BY_ACCORD: [(&[&str], &str); 6] = [
        (&["woody", "earthy"], "🌲"),
        (&["fresh", "aquatic", "marine"], "🌊"),
        (&["floral", "powdery"], "🌸"),
        (&["citrus"], "🍋"),
        (&["oriental", "amber", "warm spicy"], "🔥"),
        (&["sweet", "gourmand"], "🍰"),
    ];
    const BY_NOTE: [(&[&str], &str); 3] = [
        (&["vanilla", "tonka"], "🍦"),
        (&["rose", "jasmine"], "🌹"),
        (&["leather", "tobacco"], "🎩"),
    ];

    let accords: Vec<String> = fragrance.main_accords.iter().map(|a| a.to_lowercase()).collect();
    let notes: Vec<String> = fragrance
        .top_notes
        .iter()
        .chain(&fragrance.middle_notes)
        .chain(&fragrance.base_notes)
        .map(|n| n.to_lowercase())
        .collect();

    let lookup = |table: &[(&[&str], &'static str)], terms: &[String]| {
        table
            .iter()
            .find(|(keys, _)| keys.iter().any(|key| terms.iter().any(|t| t == key)))
            .map(|(_, emoji)| *emoji)
    };
    lookup(&BY_ACCORD, &accords)
        .or_else(|| lookup(&BY_NOTE, &notes))
        .unwrap_or("💙")
}

fn recent_activity(
    user: &UserRow,
    profile: Option<&ScentProfileRow>,
    owned: &[OwnedFragrance],
    now: OffsetDateTime,
) -> Vec<ActivityItem> {
    let mut activity = Vec::new();
    if let Some(at) = profile.and_then(|p| p.onboarding_complete_at) {
        activity.push(ActivityItem {
            action: "Completed fragrance quiz".to_owned(),
            time: format_time_ago(Some(at), now),
            timestamp: at,
        });
    }
    if let Some(latest) = owned.iter().max_by_key(|o| o.added_at) {
        activity.push(ActivityItem {
            action: format!("Added {} to collection", latest.fragrance.name),
            time: format_time_ago(Some(latest.added_at), now),
            timestamp: latest.added_at,
        });
    }
    if let Some(at) = user.last_login {
        activity.push(ActivityItem {
            action: "Last login".to_owned(),
            time: format_time_ago(Some(at), now),
            timestamp: at,
        });
    }
    activity
}

// =============================================================================
// HELPERS
// =============================================================================

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[path = "analytics_test.rs"]
mod tests;
