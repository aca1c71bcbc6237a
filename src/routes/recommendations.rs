//! Recommendation, search, and onboarding-persistence routes.
//!
//! SYSTEM CONTEXT
//! ==============
//! Scoring runs against the engine snapshot in `AppState`. Handlers clone the
//! `Arc<Engines>` up front, so a concurrent rebuild never changes the catalog
//! halfway through a request. Search, autocomplete, and popular go straight to
//! Postgres and work even before the engines are built.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::recommend::{
    AnalysisType, CatalogFragrance, NotePreference, RecommendError, Recommendation,
};
use crate::routes::extract::{ApiJson, ApiQuery, AuthUser};
use crate::services::fragrance::{self, FragranceError, ImportSummary, SearchResult};
use crate::services::scent_profile::{self, FragranceSource, Ratings, ScentProfileError};
use crate::state::{AppState, EngineBuildError};

pub const MAX_NOTES: usize = 20;
pub const MAX_ACCORDS: usize = 15;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_RECOMMENDATIONS: i64 = 50;
pub const DEFAULT_RECOMMENDATIONS: i64 = 10;
pub const MAX_TARGETS: usize = 10;
pub const MAX_OWNED_PER_REQUEST: usize = 50;
pub const MAX_QUERY_LEN: usize = 100;

/// Importance at or above which a preference counts as "liked" in explanations.
const SHARED_MIN_IMPORTANCE: u8 = 6;
const HIGHLY_RATED_MIN_AVG: f64 = 4.0;
const HIGHLY_RATED_MIN_COUNT: i32 = 100;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceInput {
    pub name: String,
    pub importance: i64,
}

#[derive(Deserialize)]
pub struct NoteBasedRequest {
    #[serde(default)]
    pub preferred_notes: Vec<PreferenceInput>,
    #[serde(default)]
    pub preferred_accords: Vec<PreferenceInput>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// One ID or a list of IDs.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum TargetIds {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
pub struct SimilarityRequest {
    pub target_fragrance_ids: TargetIds,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Deserialize)]
pub struct SaveQuizRequest {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub preferred_notes: Vec<PreferenceInput>,
    #[serde(default)]
    pub preferred_accords: Vec<PreferenceInput>,
}

#[derive(Deserialize)]
pub struct SaveOwnedRequest {
    pub user_id: Option<Uuid>,
    pub fragrance_ids: Vec<Uuid>,
    #[serde(default)]
    pub source: FragranceSource,
}

#[derive(Deserialize)]
pub struct ImportRequest {
    pub jsonl: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FragranceOut {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub top_notes: Vec<String>,
    pub middle_notes: Vec<String>,
    pub base_notes: Vec<String>,
    pub accords: Vec<String>,
    pub avg_rating: f64,
    pub num_ratings: i32,
}

impl From<&CatalogFragrance> for FragranceOut {
    fn from(f: &CatalogFragrance) -> Self {
        Self {
            id: f.id,
            name: f.name.clone(),
            brand: f.brand.clone(),
            top_notes: f.top_notes.clone(),
            middle_notes: f.middle_notes.clone(),
            base_notes: f.base_notes.clone(),
            accords: f.accords.clone(),
            avg_rating: f.avg_rating,
            num_ratings: f.num_ratings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExplanationOut {
    pub primary_reason: String,
    pub shared_notes: Vec<String>,
    pub shared_accords: Vec<String>,
    pub quality_note: Option<String>,
    pub similarity_score: f64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationOut {
    pub fragrance: FragranceOut,
    pub score: f64,
    pub explanation: ExplanationOut,
    pub rank: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct UserProfileOut {
    pub loved_notes: Vec<String>,
    pub liked_notes: Vec<String>,
    pub disliked_notes: Vec<String>,
    pub loved_accords: Vec<String>,
    pub liked_accords: Vec<String>,
    pub disliked_accords: Vec<String>,
    pub total_preferences: usize,
}

#[derive(Debug, Serialize)]
pub struct NoteBasedResponse {
    pub request_id: String,
    pub user_profile: UserProfileOut,
    pub recommendations: Vec<RecommendationOut>,
    pub processing_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct TargetOut {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
}

#[derive(Debug, Serialize)]
pub struct SimilarityResponse {
    pub request_id: String,
    pub target_fragrances: Vec<TargetOut>,
    pub analysis_type: AnalysisType,
    pub recommendations: Vec<RecommendationOut>,
    pub processing_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: &'static str,
    pub message: String,
    pub items_saved: usize,
}

fn default_limit() -> i64 {
    DEFAULT_RECOMMENDATIONS
}

// =============================================================================
// SCORING HANDLERS
// =============================================================================

/// `POST /api/v1/recommendations/note-based`
pub async fn note_based(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NoteBasedRequest>,
) -> Result<Json<NoteBasedResponse>, ApiError> {
    let started = Instant::now();
    let notes = validate_preferences(&body.preferred_notes, "preferred_notes", MAX_NOTES)?;
    let accords = validate_preferences(&body.preferred_accords, "preferred_accords", MAX_ACCORDS)?;
    let limit = validate_limit(body.limit, MAX_RECOMMENDATIONS)?;

    let engines = require_engines(&state).await?;
    let results = engines
        .note_based
        .get_recommendations(&notes, &accords, limit)
        .map_err(recommend_error)?;

    let liked_notes = liked_names(&notes);
    let liked_accords = liked_names(&accords);
    let recommendations = results
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let shared_notes = shared(&rec.fragrance.notes, &liked_notes);
            let shared_accords = shared(&rec.fragrance.accords, &liked_accords);
            let primary_reason = preference_reason(&shared_notes, &shared_accords);
            render(rec, i, primary_reason, shared_notes, shared_accords)
        })
        .collect();

    let response = NoteBasedResponse {
        request_id: Uuid::new_v4().to_string(),
        user_profile: user_profile(&notes, &accords),
        recommendations,
        processing_time_ms: elapsed_ms(started),
    };
    tracing::info!(
        notes = notes.len(),
        accords = accords.len(),
        returned = response.recommendations.len(),
        processing_time_ms = response.processing_time_ms,
        "note-based recommendations served"
    );
    Ok(Json(response))
}

/// `POST /api/v1/recommendations/similarity`
pub async fn similarity(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SimilarityRequest>,
) -> Result<Json<SimilarityResponse>, ApiError> {
    let started = Instant::now();
    let target_ids = parse_target_ids(body.target_fragrance_ids)?;
    let limit = validate_limit(body.limit, MAX_RECOMMENDATIONS)?;

    let engines = require_engines(&state).await?;
    let result = engines
        .similarity
        .get_recommendations(&target_ids, limit)
        .map_err(recommend_error)?;

    let target_names: Vec<&str> = result.targets.iter().map(|t| t.name.as_str()).collect();
    let primary_reason = similarity_reason(&target_names);
    let target_notes: HashSet<&str> = result.targets.iter().flat_map(|t| t.notes.iter().map(String::as_str)).collect();
    let target_accords: HashSet<&str> = result.targets.iter().flat_map(|t| t.accords.iter().map(String::as_str)).collect();

    let recommendations = result
        .recommendations
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let shared_notes = shared(&rec.fragrance.notes, &target_notes);
            let shared_accords = shared(&rec.fragrance.accords, &target_accords);
            render(rec, i, primary_reason.clone(), shared_notes, shared_accords)
        })
        .collect();

    let response = SimilarityResponse {
        request_id: Uuid::new_v4().to_string(),
        target_fragrances: result
            .targets
            .iter()
            .map(|t| TargetOut { id: t.id, name: t.name.clone(), brand: t.brand.clone() })
            .collect(),
        analysis_type: result.analysis,
        recommendations,
        processing_time_ms: elapsed_ms(started),
    };
    tracing::info!(
        targets = response.target_fragrances.len(),
        analysis = ?response.analysis_type,
        returned = response.recommendations.len(),
        "similarity recommendations served"
    );
    Ok(Json(response))
}

// =============================================================================
// CATALOG LOOKUPS
// =============================================================================

/// `GET /api/v1/recommendations/search?q=&limit=`
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let query = validate_query(params.q.as_deref(), 2)?;
    let limit = validate_limit(params.limit.unwrap_or(20), 50)?;
    let rows = fragrance::search(&state.pool, &query, 0, to_i64(limit))
        .await
        .map_err(fragrance_error)?;
    Ok(Json(rows.iter().map(SearchResult::display).collect()))
}

/// `GET /api/v1/recommendations/autocomplete?q=&limit=`
pub async fn autocomplete(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let query = validate_query(params.q.as_deref(), 1)?;
    let limit = validate_limit(params.limit.unwrap_or(8), 20)?;
    let rows = fragrance::autocomplete(&state.pool, &query, to_i64(limit))
        .await
        .map_err(fragrance_error)?;
    Ok(Json(rows.iter().map(SearchResult::display).collect()))
}

/// `GET /api/v1/recommendations/popular?limit=`
pub async fn popular(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let limit = validate_limit(params.limit.unwrap_or(DEFAULT_RECOMMENDATIONS), MAX_RECOMMENDATIONS)?;
    let rows = fragrance::popular(&state.pool, to_i64(limit)).await.map_err(fragrance_error)?;
    Ok(Json(rows.iter().map(SearchResult::raw).collect()))
}

// =============================================================================
// ONBOARDING PERSISTENCE
// =============================================================================

/// `POST /api/v1/recommendations/save-quiz-profile`
pub async fn save_quiz_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<SaveQuizRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    ensure_same_user(body.user_id, &auth)?;
    let notes = validate_preferences(&body.preferred_notes, "preferred_notes", MAX_NOTES)?;
    let accords = validate_preferences(&body.preferred_accords, "preferred_accords", MAX_ACCORDS)?;
    if notes.is_empty() && accords.is_empty() {
        return Err(ApiError::validation(RecommendError::NoPreferences.to_string()));
    }

    let note_ratings = to_ratings(&notes);
    let accord_ratings = to_ratings(&accords);
    scent_profile::save_quiz(&state.pool, auth.user.id, &note_ratings, &accord_ratings)
        .await
        .map_err(scent_profile_error)?;

    let items_saved = note_ratings.len() + accord_ratings.len();
    Ok(Json(SaveResponse {
        status: "success",
        message: "Quiz profile saved successfully".into(),
        items_saved,
    }))
}

/// `POST /api/v1/recommendations/save-owned-fragrances`
pub async fn save_owned_fragrances(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<SaveOwnedRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    ensure_same_user(body.user_id, &auth)?;
    if body.fragrance_ids.is_empty() || body.fragrance_ids.len() > MAX_OWNED_PER_REQUEST {
        return Err(ApiError::field(
            "fragrance_ids",
            format!("Provide between 1 and {MAX_OWNED_PER_REQUEST} fragrance IDs"),
        ));
    }

    let inserted = scent_profile::save_owned(&state.pool, auth.user.id, &body.fragrance_ids, body.source)
        .await
        .map_err(scent_profile_error)?;
    Ok(Json(SaveResponse {
        status: "success",
        message: format!("Saved {inserted} new fragrances to your collection"),
        items_saved: inserted,
    }))
}

// =============================================================================
// ENGINE ADMINISTRATION
// =============================================================================

/// `POST /api/v1/recommendations/debug/initialize`: rebuild the engines.
/// Always 200; failures are reported in the body.
pub async fn debug_initialize(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.rebuild_engines().await {
        Ok(count) => Json(serde_json::json!({
            "status": "success",
            "message": "Recommenders initialized",
            "fragrances": count,
        })),
        Err(e) => {
            tracing::error!(error = %e, "recommender initialization failed");
            let kind = match e {
                EngineBuildError::EmptyCatalog => "EmptyCatalog",
                EngineBuildError::Catalog(_) => "DatabaseError",
            };
            Json(serde_json::json!({
                "status": "error",
                "message": "Failed to initialize recommenders",
                "type": kind,
            }))
        }
    }
}

/// `GET /api/v1/recommendations/health`
pub async fn health(State(state): State<AppState>) -> Response {
    if state.engines().await.is_none() {
        return ApiError::Unavailable("Recommendation engines not loaded".into()).into_response();
    }
    Json(serde_json::json!({
        "status": "healthy",
        "note_based_recommender": "loaded",
        "similarity_recommender": "loaded",
        "timestamp": crate::routes::health::now_rfc3339(),
    }))
    .into_response()
}

/// `POST /api/v1/recommendations/catalog/import`: superuser JSONL upsert.
pub async fn import_catalog(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ImportRequest>,
) -> Result<Json<ImportSummary>, ApiError> {
    if !auth.user.is_superuser {
        return Err(ApiError::Forbidden("Superuser privileges required".into()));
    }
    let summary = fragrance::import_jsonl(&state.pool, &body.jsonl)
        .await
        .map_err(fragrance_error)?;
    if summary.imported > 0 {
        if let Err(e) = state.rebuild_engines().await {
            tracing::error!(error = %e, "engine rebuild after import failed");
        }
    }
    Ok(Json(summary))
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Trim and lowercase names, enforce ranges, and reject duplicates.
pub(crate) fn validate_preferences(
    inputs: &[PreferenceInput],
    field: &str,
    max_items: usize,
) -> Result<Vec<NotePreference>, ApiError> {
    if inputs.len() > max_items {
        return Err(ApiError::field(field, format!("{field} must have at most {max_items} items")));
    }
    let mut seen = HashSet::new();
    let mut prefs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = input.name.trim().to_lowercase();
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_LEN {
            return Err(ApiError::field(field, format!("Names must be 1-{MAX_NAME_LEN} characters")));
        }
        let importance = u8::try_from(input.importance)
            .ok()
            .filter(|i| (1..=10).contains(i))
            .ok_or_else(|| ApiError::field(field, format!("Importance for '{name}' must be between 1 and 10")))?;
        if !seen.insert(name.clone()) {
            return Err(ApiError::field(field, format!("Duplicate names are not allowed in {field}")));
        }
        prefs.push(NotePreference::new(name, importance));
    }
    Ok(prefs)
}

pub(crate) fn validate_limit(limit: i64, max: i64) -> Result<usize, ApiError> {
    if !(1..=max).contains(&limit) {
        return Err(ApiError::field("limit", format!("limit must be between 1 and {max}")));
    }
    Ok(usize::try_from(limit).unwrap_or(1))
}

fn validate_query(q: Option<&str>, min_len: usize) -> Result<String, ApiError> {
    let query = q.unwrap_or_default().trim();
    let len = query.chars().count();
    if len < min_len || len > MAX_QUERY_LEN {
        return Err(ApiError::field("q", format!("q must be {min_len}-{MAX_QUERY_LEN} characters")));
    }
    Ok(query.to_owned())
}

/// Accept one UUID or a list of 1-10.
pub(crate) fn parse_target_ids(ids: TargetIds) -> Result<Vec<Uuid>, ApiError> {
    let raw = match ids {
        TargetIds::One(id) => vec![id],
        TargetIds::Many(ids) => ids,
    };
    if raw.is_empty() || raw.len() > MAX_TARGETS {
        return Err(ApiError::field(
            "target_fragrance_ids",
            format!("Provide between 1 and {MAX_TARGETS} fragrance IDs"),
        ));
    }
    raw.iter()
        .map(|id| {
            Uuid::parse_str(id.trim())
                .map_err(|_| ApiError::field("target_fragrance_ids", format!("Invalid UUID format: {id}")))
        })
        .collect()
}

fn ensure_same_user(requested: Option<Uuid>, auth: &AuthUser) -> Result<(), ApiError> {
    match requested {
        Some(id) if id != auth.user.id => Err(ApiError::Forbidden("Cannot modify another user's data".into())),
        _ => Ok(()),
    }
}

// =============================================================================
// EXPLANATIONS
// =============================================================================

/// Names the user rated at least `SHARED_MIN_IMPORTANCE`.
fn liked_names(prefs: &[NotePreference]) -> HashSet<&str> {
    prefs
        .iter()
        .filter(|p| p.importance >= SHARED_MIN_IMPORTANCE)
        .map(|p| p.name.as_str())
        .collect()
}

/// Sorted, distinct terms of `terms` present in `wanted`.
pub(crate) fn shared(terms: &[String], wanted: &HashSet<&str>) -> Vec<String> {
    terms
        .iter()
        .filter(|t| wanted.contains(t.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn preference_reason(shared_notes: &[String], shared_accords: &[String]) -> String {
    if !shared_accords.is_empty() {
        let names: Vec<&str> = shared_accords.iter().take(2).map(String::as_str).collect();
        return format!("Matches your preferred style: {}", names.join(", "));
    }
    if !shared_notes.is_empty() {
        let names: Vec<&str> = shared_notes.iter().take(3).map(String::as_str).collect();
        return format!("Contains notes you love: {}", names.join(", "));
    }
    "Recommended based on your overall preferences".into()
}

pub(crate) fn similarity_reason(targets: &[&str]) -> String {
    match targets {
        [] => "Similar to your selection".into(),
        [one] => format!("Similar to {one}"),
        [a, b] => format!("Similar to {a} and {b}"),
        [a, b, rest @ ..] => format!("Similar to {a}, {b} and {} others", rest.len()),
    }
}

/// "Highly rated (4.3/5 from 1,234 reviews)" for well-reviewed entries.
pub(crate) fn quality_note(avg_rating: f64, num_ratings: i32) -> Option<String> {
    (avg_rating >= HIGHLY_RATED_MIN_AVG && num_ratings >= HIGHLY_RATED_MIN_COUNT)
        .then(|| format!("Highly rated ({avg_rating:.1}/5 from {} reviews)", thousands(num_ratings)))
}

fn thousands(n: i32) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 { format!("-{out}") } else { out }
}

pub(crate) fn user_profile(notes: &[NotePreference], accords: &[NotePreference]) -> UserProfileOut {
    let bucket = |prefs: &[NotePreference], range: std::ops::RangeInclusive<u8>| -> Vec<String> {
        prefs
            .iter()
            .filter(|p| range.contains(&p.importance))
            .map(|p| p.name.clone())
            .collect()
    };
    UserProfileOut {
        loved_notes: bucket(notes, 8..=10),
        liked_notes: bucket(notes, 6..=7),
        disliked_notes: bucket(notes, 1..=3),
        loved_accords: bucket(accords, 8..=10),
        liked_accords: bucket(accords, 6..=7),
        disliked_accords: bucket(accords, 1..=3),
        total_preferences: notes.len() + accords.len(),
    }
}

fn render(
    rec: &Recommendation<'_>,
    index: usize,
    primary_reason: String,
    shared_notes: Vec<String>,
    shared_accords: Vec<String>,
) -> RecommendationOut {
    RecommendationOut {
        fragrance: rec.fragrance.into(),
        score: round_to(rec.score, 4),
        explanation: ExplanationOut {
            primary_reason,
            shared_notes,
            shared_accords,
            quality_note: quality_note(rec.fragrance.avg_rating, rec.fragrance.num_ratings),
            similarity_score: round_to(rec.score, 4),
        },
        rank: index + 1,
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn require_engines(state: &AppState) -> Result<std::sync::Arc<crate::recommend::Engines>, ApiError> {
    state
        .engines()
        .await
        .ok_or_else(|| ApiError::Unavailable("Recommendation service not initialized".into()))
}

fn to_ratings(prefs: &[NotePreference]) -> Ratings {
    prefs.iter().map(|p| (p.name.clone(), i32::from(p.importance))).collect()
}

fn to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn elapsed_ms(started: Instant) -> f64 {
    round_to(started.elapsed().as_secs_f64() * 1000.0, 2)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

fn recommend_error(err: RecommendError) -> ApiError {
    match err {
        RecommendError::UnknownFragrance(_) => ApiError::NotFound(err.to_string()),
        RecommendError::NoPreferences | RecommendError::NoTargets => ApiError::validation(err.to_string()),
    }
}

fn fragrance_error(err: FragranceError) -> ApiError {
    match err {
        FragranceError::Database(e) => ApiError::Database(e),
    }
}

fn scent_profile_error(err: ScentProfileError) -> ApiError {
    match err {
        ScentProfileError::UnknownFragrances(_) => ApiError::NotFound(err.to_string()),
        ScentProfileError::Database(e) => ApiError::Database(e),
    }
}

#[cfg(test)]
#[path = "recommendations_test.rs"]
mod tests;
