pub mod error;
pub mod kind;

pub use error::{ValidationError, ValidationReport};
pub use kind::{CommandKind, GradeVariant};
