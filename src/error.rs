/// Failure classes surfaced by the data layer.
///
/// Shape mismatches in stored records are deliberately not represented
/// here: the normalizer in `shapes` degrades them to empty defaults so
/// that bad historical data can never block grading work.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not complete a get/set/remove round-trip. There is
    /// no automatic retry; callers surface a retry-prompting message.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A required field is missing or invalid. The operation is aborted
    /// before any write is attempted.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RepoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RepoError::Validation(msg.into())
    }
}
