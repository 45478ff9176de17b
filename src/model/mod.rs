//! Record-kinds: field types, schemas and the records that travel over the wire.

mod field_type;
mod row;
mod schema;

pub use field_type::FieldType;
pub use row::{LineDecoder, Model, Record, Row, encode_line};
pub use schema::{FieldDef, FieldDefault, ModelSchema};
