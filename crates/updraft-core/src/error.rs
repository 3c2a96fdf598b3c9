use thiserror::Error;

/// Failures the apply pipeline surfaces to callers as distinct cases.
///
/// These travel inside `anyhow::Error`; use `downcast_ref::<UpdateError>()`
/// to match on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("cannot mix delta and full releases in one update: {0}")]
    InvalidCombination(String),

    #[error("release manifest is unreadable: {0}")]
    ManifestUnreadable(String),

    #[error("delta release '{0}' has no base package to apply onto")]
    MissingBase(String),

    #[error("package file is missing from the package cache: {0}")]
    MissingPackage(String),
}
