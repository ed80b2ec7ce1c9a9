mod column;
mod path;
mod tuple;

pub use column::{ColumnSchema, DataMode, FORMAT_PROP};
pub use path::{PathSegment, SchemaPath, WILDCARD};
pub use tuple::TupleSchema;
