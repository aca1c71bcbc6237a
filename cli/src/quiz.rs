//! Preference quiz wizard.
//!
//! Four linear steps: notes, accords, owned fragrances, review. `advance`
//! validates the step being left; nothing is sent until the review step
//! produces a `QuizSubmission`.

use serde_json::{Value, json};
use uuid::Uuid;

pub const MAX_NOTES: usize = 20;
pub const MAX_ACCORDS: usize = 15;
pub const MAX_OWNED: usize = 50;
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("expected NAME=IMPORTANCE, got `{0}`")]
    Format(String),
    #[error("importance for `{name}` must be between 1 and 10, got {importance}")]
    Importance { name: String, importance: i64 },
    #[error("names must be 1-100 characters")]
    NameLength,
    #[error("`{0}` was already added")]
    Duplicate(String),
    #[error("at most {max} {what} may be added")]
    TooMany { what: &'static str, max: usize },
    #[error("add at least one note or accord before reviewing")]
    NoPreferences,
    #[error("{action} is not available on step {step}")]
    WrongStep { action: &'static str, step: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Notes,
    Accords,
    Owned,
    Review,
}

impl Step {
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Notes => 1,
            Self::Accords => 2,
            Self::Owned => 3,
            Self::Review => 4,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Notes => "favorite notes",
            Self::Accords => "preferred accords",
            Self::Owned => "fragrances you own",
            Self::Review => "review and submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    pub name: String,
    pub importance: u8,
}

/// Parse `vanilla=9` into a raw name and importance. Range checks happen
/// when the preference is added.
pub fn parse_preference(raw: &str) -> Result<(String, i64), QuizError> {
    let (name, importance) = raw.rsplit_once('=').ok_or_else(|| QuizError::Format(raw.to_owned()))?;
    let importance = importance
        .trim()
        .parse::<i64>()
        .map_err(|_| QuizError::Format(raw.to_owned()))?;
    Ok((name.to_owned(), importance))
}

// =============================================================================
// WIZARD
// =============================================================================

#[derive(Debug, Clone)]
pub struct QuizWizard {
    step: Step,
    notes: Vec<Preference>,
    accords: Vec<Preference>,
    owned: Vec<Uuid>,
}

impl Default for QuizWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizWizard {
    #[must_use]
    pub fn new() -> Self {
        Self { step: Step::Notes, notes: Vec::new(), accords: Vec::new(), owned: Vec::new() }
    }

    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub fn notes(&self) -> &[Preference] {
        &self.notes
    }

    #[must_use]
    pub fn accords(&self) -> &[Preference] {
        &self.accords
    }

    #[must_use]
    pub fn owned(&self) -> &[Uuid] {
        &self.owned
    }

    pub fn add_note(&mut self, name: &str, importance: i64) -> Result<(), QuizError> {
        self.expect_step(Step::Notes, "adding notes")?;
        push_preference(&mut self.notes, name, importance, "notes", MAX_NOTES)
    }

    pub fn add_accord(&mut self, name: &str, importance: i64) -> Result<(), QuizError> {
        self.expect_step(Step::Accords, "adding accords")?;
        push_preference(&mut self.accords, name, importance, "accords", MAX_ACCORDS)
    }

    /// Owned fragrances are optional; repeats are ignored.
    pub fn add_owned(&mut self, id: Uuid) -> Result<(), QuizError> {
        self.expect_step(Step::Owned, "adding owned fragrances")?;
        if self.owned.contains(&id) {
            return Ok(());
        }
        if self.owned.len() >= MAX_OWNED {
            return Err(QuizError::TooMany { what: "owned fragrances", max: MAX_OWNED });
        }
        self.owned.push(id);
        Ok(())
    }

    /// Move to the next step after validating the current one.
    pub fn advance(&mut self) -> Result<Step, QuizError> {
        self.step = match self.step {
            Step::Notes => Step::Accords,
            Step::Accords => {
                if self.notes.is_empty() && self.accords.is_empty() {
                    return Err(QuizError::NoPreferences);
                }
                Step::Owned
            }
            Step::Owned => Step::Review,
            Step::Review => return Err(QuizError::WrongStep { action: "advancing", step: 4 }),
        };
        Ok(self.step)
    }

    /// The request bodies to send, available on the review step only.
    pub fn submission(&self) -> Result<QuizSubmission, QuizError> {
        self.expect_step(Step::Review, "submitting")?;
        Ok(QuizSubmission { notes: self.notes.clone(), accords: self.accords.clone(), owned: self.owned.clone() })
    }

    fn expect_step(&self, expected: Step, action: &'static str) -> Result<(), QuizError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(QuizError::WrongStep { action, step: self.step.number() })
        }
    }
}

fn push_preference(
    list: &mut Vec<Preference>,
    name: &str,
    importance: i64,
    what: &'static str,
    max: usize,
) -> Result<(), QuizError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(QuizError::NameLength);
    }
    let importance = u8::try_from(importance)
        .ok()
        .filter(|i| (1..=10).contains(i))
        .ok_or_else(|| QuizError::Importance { name: name.clone(), importance })?;
    if list.iter().any(|p| p.name == name) {
        return Err(QuizError::Duplicate(name));
    }
    if list.len() >= max {
        return Err(QuizError::TooMany { what, max });
    }
    list.push(Preference { name, importance });
    Ok(())
}

// =============================================================================
// SUBMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSubmission {
    pub notes: Vec<Preference>,
    pub accords: Vec<Preference>,
    pub owned: Vec<Uuid>,
}

impl QuizSubmission {
    #[must_use]
    pub fn save_quiz_body(&self) -> Value {
        json!({
            "preferred_notes": preference_list(&self.notes),
            "preferred_accords": preference_list(&self.accords),
        })
    }

    /// `None` when no owned fragrances were chosen.
    #[must_use]
    pub fn save_owned_body(&self) -> Option<Value> {
        (!self.owned.is_empty()).then(|| json!({ "fragrance_ids": self.owned, "source": "onboarding" }))
    }

    #[must_use]
    pub fn note_based_body(&self, limit: u32) -> Value {
        let mut body = self.save_quiz_body();
        body["limit"] = json!(limit);
        body
    }
}

fn preference_list(prefs: &[Preference]) -> Vec<Value> {
    prefs
        .iter()
        .map(|p| json!({ "name": p.name, "importance": p.importance }))
        .collect()
}

#[cfg(test)]
#[path = "quiz_test.rs"]
mod tests;
