//! Core data models for the image gallery.
//!
//! Image metadata maps to the `images` table via `sqlx::FromRow`; the JSON
//! views and geographic types serialize via `serde`.

pub mod image;
pub mod location;
