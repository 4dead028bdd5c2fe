pub mod field;
pub mod form;

pub use field::{FieldSpec, FieldType};
pub use form::FormSchema;
