//! Error taxonomy for editor operations.
//!
//! Filter values are clamped and never produce an error. Everything else
//! that can reject an operation maps onto one of these variants, and a
//! rejected operation leaves the document untouched.

use thiserror::Error;

/// Result type alias for editor operations
pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Bad input file (type, size, undecodable bytes) or bad argument
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Crop / resize / transform geometry that cannot be committed
    #[error("Invalid geometry: {0}")]
    Geometry(String),

    /// Pixel surface or encoder unavailable for this operation
    #[error("Resource unavailable: {0}")]
    Resource(String),

    /// A history snapshot could not be restored
    #[error("Restore failed: {0}")]
    Restore(String),

    /// The remote conversion collaborator rejected or failed a request
    #[error("Remote conversion failed ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The operation needs a loaded document
    #[error("No document is loaded")]
    NoDocument,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Serialize(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for EditorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EditorError::Serialize(e.to_string())
    }
}

impl EditorError {
    /// Geometry and validation rejections are expected user-level outcomes;
    /// the rest indicate something failed underneath the editor.
    pub fn is_rejection(&self) -> bool {
        matches!(self, EditorError::Validation(_) | EditorError::Geometry(_))
    }
}
