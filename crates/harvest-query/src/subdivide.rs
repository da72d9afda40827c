//! Narrowing over-broad queries.

use crate::descriptor::QueryDescriptor;
use crate::error::{QueryError, Result};
use crate::facet::{Facet, SUBDIVISION_ORDER};

/// Split `query` into narrower queries on the first facet it lacks.
///
/// A query constrained only by case number is split on document type and on
/// trial procedure side by side, since the case number already fixes court,
/// year and case type.
///
/// # Errors
/// [`QueryError::Exhausted`] when every subdivision facet is already present.
pub fn subdivide(query: &QueryDescriptor) -> Result<Vec<QueryDescriptor>> {
    if query.len() == 1 && query.contains(Facet::CaseNumber) {
        return Ok([Facet::DocumentType, Facet::TrialProcedure]
            .into_iter()
            .flat_map(|facet| children(query, facet))
            .collect());
    }

    match SUBDIVISION_ORDER.into_iter().find(|f| !query.contains(*f)) {
        Some(facet) => {
            tracing::debug!(facet = %facet, query = %query, "subdividing query");
            Ok(children(query, facet).collect())
        }
        None => {
            tracing::warn!("cannot split request params. {}", query);
            Err(QueryError::Exhausted(query.join()))
        }
    }
}

fn children(query: &QueryDescriptor, facet: Facet) -> impl Iterator<Item = QueryDescriptor> + '_ {
    facet
        .vocabulary()
        .iter()
        .map(move |value| query.extended(facet, value))
}
