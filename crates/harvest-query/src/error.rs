use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Every facet the subdivider knows is already constrained.
    #[error("cannot subdivide further: {0}")]
    Exhausted(String),

    #[error("duplicate facet '{0}'")]
    DuplicateFacet(String),

    #[error("malformed facet pair '{0}'")]
    MalformedPair(String),
}
