//! Harvest Decoder
//!
//! Turns raw answers of the list and content endpoints into records:
//!
//! - [`rules`] - versioned marker set used to recognise challenge, throttle
//!   and stale-session pages
//! - [`classify`] - classification of list responses and content pages
//! - [`decrypt`] - evaluation of obfuscated list payloads into [`ResultRecord`]s
//! - [`case_type`] - case-type label normalization
//! - [`content`] - extraction of case info and body from a content page

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod case_type;
pub mod classify;
pub mod content;
pub mod decrypt;
pub mod error;
pub mod rules;

pub use case_type::normalize_case_type;
pub use classify::{Classification, Classifier, PageClass};
pub use content::{extract_content, DocContent};
pub use decrypt::{decrypt, ListPage, ResultRecord};
pub use error::{DecodeError, Result};
pub use rules::{RuleSet, RULES_VERSION};
