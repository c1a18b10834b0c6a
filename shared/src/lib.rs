//! pfurl Shared Library
//!
//! Message envelope, transport descriptors, and response interpretation
//! for the pfurl client.

pub mod protocol;
pub mod response;
pub mod error;


pub use error::{Error, Result};
