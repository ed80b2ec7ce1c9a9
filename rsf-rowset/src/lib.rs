pub mod cache;
pub mod loader;
pub mod writers;

mod convert;
mod vector;

pub use cache::{shared_cache, SharedVectorCache, VectorCache};
pub use loader::{
    ColumnHandle, LoaderOptions, ProjectionFilter, ResultSetLoader, DEFAULT_BATCH_BYTES,
    MAX_BATCH_ROWS,
};
pub use writers::ValueRef;
