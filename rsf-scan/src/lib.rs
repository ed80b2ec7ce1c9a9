use mimalloc::MiMalloc;

pub mod file_meta;
pub mod negotiator;
pub mod operator;
pub mod options;
pub mod orchestrator;
pub mod projection;
pub mod reader;
pub mod smoother;
pub mod sort_mem;

pub use file_meta::FileMetadata;
pub use negotiator::{SchemaNegotiator, SchemaType};
pub use operator::{BatchAccessor, IterOutcome, ScanOperator};
pub use options::ScanOptions;
pub use orchestrator::ScanOrchestrator;
pub use reader::{ReaderFactory, RowBatchReader, VecReaderFactory};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
