//! Model catalog consumed by the migration engine.
//!
//! These types describe what an application declares: models, their fields
//! and indexes. The engine reads them from a [`ModelRegistry`] and keeps its
//! own copies as it replays migration history.

mod field;
mod model;
mod registry;
mod types;

pub use field::{DefaultValue, FieldDef};
pub use model::{IndexDef, ModelDef};
pub use registry::{Application, ModelRegistry, Registry};
pub use types::{FieldType, ScalarType};
