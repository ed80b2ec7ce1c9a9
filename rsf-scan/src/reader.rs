use rsf_core::errors::Result;
use rsf_rowset::ResultSetLoader;

use crate::negotiator::SchemaNegotiator;

/// A storage-format reader managed by the scan. The scan constructs one
/// reader at a time and closes it before requesting the next.
pub trait RowBatchReader {
    /// Negotiate schema, file identity and batch sizing. Returning false
    /// skips the reader: it has no data and no schema to offer.
    fn open(&mut self, negotiator: &mut SchemaNegotiator<'_>) -> Result<bool>;

    /// Write rows into the loader until it reports full or the input ends.
    /// Returns true while more rows remain after this batch.
    fn next_batch(&mut self, loader: &mut ResultSetLoader) -> Result<bool>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source of readers for one scan, pulled on demand.
pub trait ReaderFactory {
    fn next_reader(&mut self) -> Result<Option<Box<dyn RowBatchReader>>>;

    /// Release whatever backs the factory. The scan calls this exactly once,
    /// on both normal and failure paths.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<F> ReaderFactory for F
where
    F: FnMut() -> Result<Option<Box<dyn RowBatchReader>>>,
{
    fn next_reader(&mut self) -> Result<Option<Box<dyn RowBatchReader>>> {
        self()
    }
}

/// Factory over a fixed list of readers.
pub struct VecReaderFactory {
    readers: std::vec::IntoIter<Box<dyn RowBatchReader>>,
}

impl VecReaderFactory {
    pub fn new(readers: Vec<Box<dyn RowBatchReader>>) -> Self {
        Self {
            readers: readers.into_iter(),
        }
    }
}

impl ReaderFactory for VecReaderFactory {
    fn next_reader(&mut self) -> Result<Option<Box<dyn RowBatchReader>>> {
        Ok(self.readers.next())
    }
}
