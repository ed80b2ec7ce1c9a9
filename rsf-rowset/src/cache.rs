use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rsf_core::schema::ColumnSchema;
use rsf_core::util::case_map::CaseInsensitiveMap;

/// Per-scan cache of the typed vectors a loader has materialised, keyed by
/// column name. A column that disappears from one reader to the next can be
/// rebuilt as a typed null column as long as its vector is still cached,
/// which keeps the downstream schema stable. Scans are single-threaded, so
/// the shared form is an `Rc`.
#[derive(Default)]
pub struct VectorCache {
    columns: CaseInsensitiveMap<Arc<ColumnSchema>>,
}

pub type SharedVectorCache = Rc<RefCell<VectorCache>>;

pub fn shared_cache() -> SharedVectorCache {
    Rc::new(RefCell::new(VectorCache::default()))
}

impl VectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Arc<ColumnSchema>) {
        self.columns.insert(schema.name().to_string(), schema);
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ColumnSchema>> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
