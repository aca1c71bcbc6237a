//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on request validation and response shaping.

pub mod analytics;
pub mod fragrance;
pub mod password;
pub mod scent_profile;
pub mod token;
pub mod token_store;
pub mod user;
