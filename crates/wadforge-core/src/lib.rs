//! wadforge Core Library
//!
//! This crate provides the byte buffer, detection vocabulary and error
//! handling shared by every wadforge component.

pub mod buffer;
pub mod error;
pub mod types;

pub use buffer::ByteBuffer;
pub use error::{Error, Result, ResultExt};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::buffer::{read, ByteBuffer};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::types::*;
}
