use thiserror::Error;

/// Infrastructure failures inside the per-page pipeline. Data problems
/// (missing fields, bad dates, duplicates) are review material, not
/// errors; only things that stop the machinery land here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Template error: {0}")]
    Template(#[from] crate::error::TemplateError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Reference cache failure: {0}")]
    Reference(#[from] crate::refdata::ResolveError),
}
