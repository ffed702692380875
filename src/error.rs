//! Error types for the scene graph
//!
//! Contract violations by the caller surface as `SceneError`. Texture upload
//! failures are `TextureError`; the paint cycle never propagates those, it
//! logs them and skips the affected surface for the frame.

use crate::scene::{ItemId, ViewId};
use thiserror::Error;

/// Errors returned by `Scene` and its views
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("unknown item {0:?}")]
    UnknownItem(ItemId),

    #[error("unknown view {0:?}")]
    UnknownView(ViewId),

    #[error("item {0:?} already has an item view")]
    ItemViewExists(ItemId),

    #[error("item {0:?} is not a surface item")]
    NotASurface(ItemId),

    #[error("view {0:?} is not a {1}")]
    WrongViewKind(ViewId, &'static str),

    #[error("the root item cannot be removed or reparented")]
    RootItem,

    #[error("cannot reparent {item:?} under its own descendant {parent:?}")]
    CyclicParent { item: ItemId, parent: ItemId },

    #[error("{operation} called out of order for view {view:?} (phase: {phase})")]
    OutOfOrder {
        view: ViewId,
        operation: &'static str,
        phase: &'static str,
    },

    #[error("invalid view scale {0}")]
    InvalidScale(f64),

    #[error("surface-to-buffer matrix is not invertible")]
    SingularMatrix,
}

/// Errors creating or updating a surface texture
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextureError {
    #[error("buffer {0} has zero size")]
    ZeroSize(u64),

    #[error("buffer {id} has unsupported format {format}")]
    UnsupportedFormat { id: u64, format: String },

    #[error("buffer {0} carries no pixel data")]
    MissingData(u64),

    #[error("buffer {id} data is too short: expected {expected} bytes, got {actual}")]
    ShortData {
        id: u64,
        expected: usize,
        actual: usize,
    },

    #[error("renderer backend failure: {0}")]
    Backend(String),
}

pub type SceneResult<T> = Result<T, SceneError>;
