//! Fragrance catalog: loading, search, and JSONL import.
//!
//! DESIGN
//! ======
//! Search normalizes the query (lowercase, `-`/`_` runs to spaces, collapsed
//! whitespace) and matches it plus a dashed variant against normalized
//! name, brand, and "brand name" with `strpos`, so user input never reaches
//! a `LIKE` pattern.
//!
//! Import is line-oriented: each JSONL line is parsed on its own and
//! unparseable or incomplete lines are counted as skipped rather than
//! failing the batch.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Autocomplete only suggests fragrances with at least this many ratings.
pub const AUTOCOMPLETE_MIN_RATINGS: i32 = 5;
/// `/popular` only lists fragrances with at least this many ratings.
pub const POPULAR_MIN_RATINGS: i32 = 100;

pub(crate) const FRAGRANCE_COLUMNS: &str = "id, name, brand_name, top_notes, middle_notes, base_notes, main_accords,
     average_rating::float8 AS average_rating, total_ratings";

const NORMALIZED_MATCH: &str = "EXISTS (
         SELECT 1 FROM unnest($1::text[]) AS v(term)
         WHERE strpos(lower(replace(replace(name, '-', ' '), '_', ' ')), v.term) > 0
            OR strpos(lower(replace(replace(brand_name, '-', ' '), '_', ' ')), v.term) > 0
            OR strpos(lower(replace(replace(brand_name || ' ' || name, '-', ' '), '_', ' ')), v.term) > 0
     )";

#[derive(Debug, thiserror::Error)]
pub enum FragranceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Catalog columns the recommenders and API responses need.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FragranceRow {
    pub id: Uuid,
    pub name: String,
    pub brand_name: String,
    pub top_notes: Vec<String>,
    pub middle_notes: Vec<String>,
    pub base_notes: Vec<String>,
    pub main_accords: Vec<String>,
    pub average_rating: f64,
    pub total_ratings: i32,
}

/// Search / autocomplete / popular result item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub full_name: String,
}

impl SearchResult {
    /// Display form: `-`/`_` shown as spaces, title-cased.
    #[must_use]
    pub fn display(row: &FragranceRow) -> Self {
        let name = title_case(&despace(&row.name));
        let brand = title_case(&despace(&row.brand_name));
        Self { id: row.id, full_name: format!("{brand} {name}"), name, brand }
    }

    /// Raw catalog names.
    #[must_use]
    pub fn raw(row: &FragranceRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            brand: row.brand_name.clone(),
            full_name: format!("{} {}", row.brand_name, row.name),
        }
    }
}

// =============================================================================
// TEXT HELPERS
// =============================================================================

/// Lowercase, trim, turn runs of `-`/`_` into a space, collapse whitespace.
#[must_use]
pub fn normalize_search_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The normalized query plus its dashed form, de-duplicated.
#[must_use]
pub fn search_variants(normalized: &str) -> Vec<String> {
    let mut variants = vec![normalized.to_owned()];
    let dashed = normalized.split_whitespace().collect::<Vec<_>>().join("-");
    if dashed != normalized {
        variants.push(dashed);
    }
    variants
}

fn despace(text: &str) -> String {
    text.replace(['-', '_'], " ")
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
#[must_use]
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(c);
            previous_alpha = false;
        }
    }
    out
}

// =============================================================================
// QUERIES
// =============================================================================

/// Load the full catalog for the recommenders.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn load_catalog(pool: &PgPool) -> Result<Vec<FragranceRow>, FragranceError> {
    let rows = sqlx::query_as::<_, FragranceRow>(&format!("SELECT {FRAGRANCE_COLUMNS} FROM fragrances ORDER BY id"))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Fragrances whose normalized name or brand contains the query, most rated first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn search(
    pool: &PgPool,
    query: &str,
    min_ratings: i32,
    limit: i64,
) -> Result<Vec<FragranceRow>, FragranceError> {
    let variants = search_variants(&normalize_search_text(query));
    let rows = sqlx::query_as::<_, FragranceRow>(&format!(
        "SELECT {FRAGRANCE_COLUMNS} FROM fragrances
         WHERE {NORMALIZED_MATCH} AND total_ratings >= $2
         ORDER BY total_ratings DESC, id
         LIMIT $3"
    ))
    .bind(&variants)
    .bind(min_ratings)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Autocomplete: over-fetch, then keep the first `limit` distinct IDs.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn autocomplete(pool: &PgPool, query: &str, limit: i64) -> Result<Vec<FragranceRow>, FragranceError> {
    let rows = search(pool, query, AUTOCOMPLETE_MIN_RATINGS, limit.saturating_mul(2)).await?;
    Ok(dedupe_by_id(rows, usize::try_from(limit).unwrap_or(0)))
}

pub(crate) fn dedupe_by_id(rows: Vec<FragranceRow>, limit: usize) -> Vec<FragranceRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.id))
        .take(limit)
        .collect()
}

/// Most-rated fragrances above the popularity floor.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn popular(pool: &PgPool, limit: i64) -> Result<Vec<FragranceRow>, FragranceError> {
    let rows = sqlx::query_as::<_, FragranceRow>(&format!(
        "SELECT {FRAGRANCE_COLUMNS} FROM fragrances
         WHERE total_ratings >= $1
         ORDER BY total_ratings DESC, id
         LIMIT $2"
    ))
    .bind(POPULAR_MIN_RATINGS)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// =============================================================================
// IMPORT
// =============================================================================

/// One catalog entry parsed from a JSONL line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFragrance {
    pub name: String,
    pub brand_name: String,
    pub release_year: Option<i32>,
    pub gender: Option<String>,
    pub concentration: Option<String>,
    pub perfumer: Option<String>,
    pub top_notes: Vec<String>,
    pub middle_notes: Vec<String>,
    pub base_notes: Vec<String>,
    pub main_accords: Vec<String>,
    pub average_rating: f64,
    pub total_ratings: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub discontinued: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Character limits of the bounded `fragrances` columns.
const MAX_GENDER_LEN: usize = 20;
const MAX_CONCENTRATION_LEN: usize = 50;
const MAX_IMAGE_URL_LEN: usize = 500;

/// Parse one JSONL line. `Ok(None)` means the line is a JSON value but not a
/// usable fragrance: not an object, missing `name`/`brand_name`, or a bounded
/// column longer than its limit.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_import_line(line: &str) -> Result<Option<NewFragrance>, serde_json::Error> {
    let value = serde_json::from_str::<serde_json::Value>(line)?;
    let Some(map) = value.as_object() else {
        return Ok(None);
    };

    let text = |key: &str| {
        map.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let (Some(name), Some(brand_name)) = (text("name"), text("brand_name")) else {
        return Ok(None);
    };

    let (gender, concentration, image_url) = (text("gender"), text("concentration"), text("image_url"));
    let too_long = |value: Option<&str>, max: usize| value.is_some_and(|v| v.chars().count() > max);
    if too_long(gender.as_deref(), MAX_GENDER_LEN)
        || too_long(concentration.as_deref(), MAX_CONCENTRATION_LEN)
        || too_long(image_url.as_deref(), MAX_IMAGE_URL_LEN)
    {
        return Ok(None);
    }

    let notes = |key: &str| map.get(key).map(parse_note_list).unwrap_or_default();
    let integer = |key: &str| {
        map.get(key)
            .and_then(|value| value.as_i64().or_else(|| number_like(value).map(|f| f.trunc() as i64)))
            .and_then(|value| i32::try_from(value).ok())
    };

    Ok(Some(NewFragrance {
        name,
        brand_name,
        release_year: integer("release_year"),
        gender,
        concentration,
        perfumer: text("perfumer"),
        top_notes: notes("top_notes"),
        middle_notes: notes("middle_notes"),
        base_notes: notes("base_notes"),
        main_accords: notes("main_accords"),
        average_rating: map
            .get("average_rating")
            .and_then(number_like)
            .unwrap_or(0.0)
            .clamp(0.0, 5.0),
        total_ratings: integer("total_ratings").unwrap_or(0).max(0),
        description: text("description"),
        image_url,
        discontinued: map
            .get("discontinued")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
    }))
}

/// Arrays of strings or a single comma-separated string; trimmed, lowercased, non-empty.
fn parse_note_list(value: &serde_json::Value) -> Vec<String> {
    let raw: Vec<&str> = match value {
        serde_json::Value::Array(items) => items.iter().filter_map(serde_json::Value::as_str).collect(),
        serde_json::Value::String(s) => s.split(',').collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|note| note.trim().to_lowercase())
        .filter(|note| !note.is_empty())
        .collect()
}

/// A JSON number, or a string number that may use a decimal comma.
fn number_like(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

/// Parse every line of a JSONL document.
pub(crate) fn parse_import_document(jsonl: &str) -> (Vec<NewFragrance>, usize) {
    let mut fragrances = Vec::new();
    let mut skipped = 0_usize;
    for raw_line in jsonl.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_import_line(line) {
            Ok(Some(fragrance)) => fragrances.push(fragrance),
            Ok(None) | Err(_) => skipped = skipped.saturating_add(1),
        }
    }
    (fragrances, skipped)
}

/// Upsert every parsed line on `(name, brand_name)` in one transaction.
///
/// # Errors
///
/// Returns a database error if any statement fails; nothing is committed then.
pub async fn import_jsonl(pool: &PgPool, jsonl: &str) -> Result<ImportSummary, FragranceError> {
    let (fragrances, skipped) = parse_import_document(jsonl);
    if fragrances.is_empty() {
        return Ok(ImportSummary { imported: 0, skipped });
    }

    let mut tx = pool.begin().await?;
    for f in &fragrances {
        sqlx::query(
            "INSERT INTO fragrances (id, name, brand_name, release_year, gender, concentration, perfumer,
                                     top_notes, middle_notes, base_notes, main_accords,
                                     average_rating, total_ratings, description, image_url, discontinued)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::float8::numeric(3,2), $13, $14, $15, $16)
             ON CONFLICT (name, brand_name) DO UPDATE SET
                 release_year = EXCLUDED.release_year,
                 gender = EXCLUDED.gender,
                 concentration = EXCLUDED.concentration,
                 perfumer = EXCLUDED.perfumer,
                 top_notes = EXCLUDED.top_notes,
                 middle_notes = EXCLUDED.middle_notes,
                 base_notes = EXCLUDED.base_notes,
                 main_accords = EXCLUDED.main_accords,
                 average_rating = EXCLUDED.average_rating,
                 total_ratings = EXCLUDED.total_ratings,
                 description = EXCLUDED.description,
                 image_url = EXCLUDED.image_url,
                 discontinued = EXCLUDED.discontinued,
                 updated_at = now()",
        )
        .bind(Uuid::new_v4())
        .bind(&f.name)
        .bind(&f.brand_name)
        .bind(f.release_year)
        .bind(&f.gender)
        .bind(&f.concentration)
        .bind(&f.perfumer)
        .bind(&f.top_notes)
        .bind(&f.middle_notes)
        .bind(&f.base_notes)
        .bind(&f.main_accords)
        .bind(f.average_rating)
        .bind(f.total_ratings)
        .bind(&f.description)
        .bind(&f.image_url)
        .bind(f.discontinued)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(imported = fragrances.len(), skipped, "catalog import complete");
    Ok(ImportSummary { imported: fragrances.len(), skipped })
}

#[cfg(test)]
#[path = "fragrance_test.rs"]
mod tests;
