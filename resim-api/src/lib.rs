//! # resim-api
//!
//! The REST collaborator of the experience sync engine.
//!
//! [`ExperienceApi`] is the injectable seam: the sync engine is written
//! against it, [`HttpClient`] implements it over HTTP, and tests implement it
//! in memory.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::ExperienceApi;
pub use error::ApiError;
pub use http::{Connection, HttpClient};
pub use types::{Page, SystemRef, TagRef, TestSuiteRef, UpdateField, UpdateMask};
