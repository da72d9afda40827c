//! Harvest Query - search descriptors and how to narrow them.
//!
//! The list endpoint never returns more than [`MAX_PAGES`] pages of
//! [`PAGE_SIZE`] records for one query. Queries that match more are split
//! into narrower ones by adding one facet at a time.
//!
//! # Example
//!
//! ```rust
//! use harvest_query::{subdivide, Facet, QueryDescriptor};
//!
//! let query = QueryDescriptor::new().with(Facet::CaseType, "刑事案件").unwrap();
//! let children = subdivide(&query).unwrap();
//! assert_eq!(children.len(), Facet::DocumentType.vocabulary().len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod descriptor;
pub mod error;
pub mod facet;
pub mod paging;
pub mod seed;
pub mod subdivide;

pub use descriptor::QueryDescriptor;
pub use error::{QueryError, Result};
pub use facet::{Facet, SUBDIVISION_ORDER};
pub use paging::{PagePlan, MAX_PAGES, PAGE_SIZE, SUBDIVIDE_THRESHOLD};
pub use seed::{case_seed, case_template};
pub use subdivide::subdivide;
