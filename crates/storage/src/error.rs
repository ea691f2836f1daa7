/// All errors that can be returned by a SceneStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No shape with the given id.
    #[error("shape not found: {id}")]
    ShapeNotFound { id: String },

    /// A shape with this id already exists.
    #[error("shape already exists: {id}")]
    AlreadyExists { id: String },

    /// No operation log entry with the given id.
    #[error("operation log entry not found: {id}")]
    EntryNotFound { id: i64 },

    /// No thread record with the given id.
    #[error("thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    /// A shape's geometry does not fit its kind.
    #[error("invalid shape {id}: {source}")]
    InvalidShape {
        id: String,
        #[source]
        source: easel_core::GeometryError,
    },

    /// A log entry violates the create/update/delete snapshot invariant.
    #[error("malformed log entry: {0}")]
    MalformedEntry(String),

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Check the kind/geometry invariant before a shape is stored.
    pub(crate) fn check_shape(shape: &easel_core::Shape) -> Result<(), StorageError> {
        shape.validate().map_err(|source| StorageError::InvalidShape {
            id: shape.id.clone(),
            source,
        })
    }

    pub(crate) fn backend(e: impl std::fmt::Display) -> Self {
        StorageError::Backend(e.to_string())
    }

    /// True for the "no such record" variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ShapeNotFound { .. }
                | StorageError::EntryNotFound { .. }
                | StorageError::ThreadNotFound { .. }
        )
    }
}
