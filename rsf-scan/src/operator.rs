//! The scan operator: a state machine that pulls readers from a factory and
//! drives each through the orchestrator, one at a time. A reader's last
//! batch is fully observable before the next reader's first batch.

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;

use rsf_core::errors::Result;
use rsf_core::{internal_err, user_schema_err};

use crate::orchestrator::{ScanBatch, ScanOrchestrator};
use crate::reader::{ReaderFactory, RowBatchReader};

/// What a call to [`ScanOperator::next`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterOutcome {
    /// A batch under a schema the downstream has not seen yet.
    OkNewSchema,
    /// A batch under the schema of the previous one.
    Ok,
    /// No more batches.
    None,
    /// The scan failed or was cancelled; no further batches.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    Reader,
    End,
    Failed,
    Closed,
}

/// Handle on the scan's output container for the downstream operator.
pub struct BatchAccessor {
    batch: RecordBatch,
    schema_version: u64,
    /// Row indirection, when an upstream filter installed one. The scan
    /// itself always emits dense batches.
    selection: Option<Vec<u32>>,
}

impl BatchAccessor {
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn selection_vector(&self) -> Option<&[u32]> {
        self.selection.as_deref()
    }

    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Hand the batch itself to the caller.
    pub fn release(self) -> RecordBatch {
        self.batch
    }
}

pub struct ScanOperator {
    orchestrator: ScanOrchestrator,
    factory: Box<dyn ReaderFactory>,
    state: ScanState,
    current: Option<Box<dyn RowBatchReader>>,
    /// First batch of a late-schema reader, read ahead by build_schema.
    pending: Option<ScanBatch>,
    accessor: Option<BatchAccessor>,
    readers_seen: usize,
    last_emitted_version: Option<u64>,
    factory_closed: bool,
}

impl ScanOperator {
    pub fn new(orchestrator: ScanOrchestrator, factory: Box<dyn ReaderFactory>) -> Self {
        Self {
            orchestrator,
            factory,
            state: ScanState::Start,
            current: None,
            pending: None,
            accessor: None,
            readers_seen: 0,
            last_emitted_version: None,
            factory_closed: false,
        }
    }

    /// Find the first reader that produces a schema. Returns false for an
    /// empty scan when that is allowed, otherwise an empty scan is a user
    /// error.
    pub fn build_schema(&mut self) -> Result<bool> {
        if self.state != ScanState::Start {
            return internal_err!("build_schema on a started scan");
        }
        match self.build_schema_inner() {
            Ok(found) => Ok(found),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn build_schema_inner(&mut self) -> Result<bool> {
        loop {
            let Some(mut reader) = self.factory.next_reader()? else {
                if self.readers_seen == 0 && !self.orchestrator.options().allow_empty_scan() {
                    return user_schema_err!("an empty scan requires at least one reader");
                }
                self.state = ScanState::End;
                return Ok(false);
            };
            self.readers_seen += 1;
            if !self.orchestrator.open_reader(reader.as_mut())? {
                log::debug!("reader opened with no data and no schema, skipping");
                if let Err(e) = reader.close() {
                    log::warn!("failed to close a skipped reader: {}", e);
                }
                continue;
            }
            if self.orchestrator.has_schema() {
                self.current = Some(reader);
                self.state = ScanState::Reader;
                return Ok(true);
            }
            // late schema: the first batch discovers it
            match self.orchestrator.read_batch(reader.as_mut())? {
                Some(scan_batch) => {
                    self.pending = Some(scan_batch);
                    self.current = Some(reader);
                    self.state = ScanState::Reader;
                    return Ok(true);
                }
                None => {
                    self.orchestrator.close_reader(reader.as_mut())?;
                }
            }
        }
    }

    /// Advance to the next batch. The first batch of the scan, and any batch
    /// after the schema version bumps, is `OkNewSchema`.
    pub fn next(&mut self) -> Result<IterOutcome> {
        match self.state {
            ScanState::Start => {
                if !self.build_schema()? {
                    return Ok(IterOutcome::None);
                }
            }
            ScanState::Reader => {}
            ScanState::End => return Ok(IterOutcome::None),
            ScanState::Failed => return Ok(IterOutcome::Stop),
            ScanState::Closed => return internal_err!("next on a closed scan"),
        }
        match self.next_inner() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn next_inner(&mut self) -> Result<IterOutcome> {
        loop {
            if let Some(scan_batch) = self.pending.take() {
                return Ok(self.emit(scan_batch));
            }
            if self.current.is_none() {
                let Some(mut reader) = self.factory.next_reader()? else {
                    self.state = ScanState::End;
                    return Ok(IterOutcome::None);
                };
                self.readers_seen += 1;
                if !self.orchestrator.open_reader(reader.as_mut())? {
                    if let Err(e) = reader.close() {
                        log::warn!("failed to close a skipped reader: {}", e);
                    }
                    continue;
                }
                self.current = Some(reader);
            }
            let Some(reader) = self.current.as_mut() else {
                return internal_err!("no active reader");
            };
            match self.orchestrator.read_batch(reader.as_mut())? {
                Some(scan_batch) => return Ok(self.emit(scan_batch)),
                None => {
                    let Some(mut reader) = self.current.take() else {
                        return internal_err!("no active reader");
                    };
                    self.orchestrator.close_reader(reader.as_mut())?;
                }
            }
        }
    }

    fn emit(&mut self, scan_batch: ScanBatch) -> IterOutcome {
        let outcome = if self.last_emitted_version == Some(scan_batch.schema_version) {
            IterOutcome::Ok
        } else {
            IterOutcome::OkNewSchema
        };
        self.last_emitted_version = Some(scan_batch.schema_version);
        self.accessor = Some(BatchAccessor {
            batch: scan_batch.batch,
            schema_version: scan_batch.schema_version,
            selection: None,
        });
        outcome
    }

    /// The scan's current output container.
    pub fn batch_accessor(&self) -> Option<&BatchAccessor> {
        self.accessor.as_ref()
    }

    /// Take the current output container.
    pub fn take_batch(&mut self) -> Option<BatchAccessor> {
        self.accessor.take()
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.orchestrator
            .output_schema()
            .or_else(|| self.accessor.as_ref().map(|a| a.schema()))
    }

    /// Abandon the scan. Safe between `next` calls; cancelling twice, or
    /// after close, is a no-op.
    pub fn cancel(&mut self) {
        if matches!(self.state, ScanState::Failed | ScanState::Closed) {
            return;
        }
        self.fail();
    }

    /// Idempotent. Runs on both normal and failure paths; close errors from
    /// the reader are suppressed and logged.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ScanState::Closed {
            return Ok(());
        }
        if let Some(mut reader) = self.current.take() {
            if let Err(e) = self.orchestrator.close_reader(reader.as_mut()) {
                log::warn!("reader close failed: {}", e);
            }
        }
        self.close_factory();
        self.pending = None;
        self.accessor = None;
        self.state = ScanState::Closed;
        Ok(())
    }

    fn fail(&mut self) {
        if let Some(mut reader) = self.current.take() {
            if let Err(e) = self.orchestrator.close_reader(reader.as_mut()) {
                log::warn!("reader close failed during scan failure: {}", e);
            }
        }
        self.close_factory();
        self.pending = None;
        self.state = ScanState::Failed;
    }

    /// Close the factory exactly once, suppressing and logging any error.
    fn close_factory(&mut self) {
        if self.factory_closed {
            return;
        }
        self.factory_closed = true;
        if let Err(e) = self.factory.close() {
            log::warn!("reader factory close failed: {}", e);
        }
    }
}
