//! Row stream reader
//!
//! A [`RowStream`] is the consumer end of a bounded channel fed by a reader
//! task. The channel capacity is the number of batches that may be read ahead
//! while the pipeline is still writing an earlier one, so memory stays bounded
//! by `capacity * batch_size` rows no matter how large the table is.

use crate::domain::result::Result;
use crate::domain::row::{Row, RowBatch};
use tokio::sync::mpsc;

/// Producer end of a [`RowStream`]
pub type BatchSender = mpsc::Sender<Result<RowBatch>>;

/// Lazy, finite sequence of row batches from one table
///
/// Not restartable: reading a table again means opening a new stream.
#[derive(Debug)]
pub struct RowStream {
    receiver: mpsc::Receiver<Result<RowBatch>>,
    finished: bool,
}

impl RowStream {
    /// Creates a connected sender/stream pair
    ///
    /// `prefetch` is clamped to at least one batch.
    pub fn channel(prefetch: usize) -> (BatchSender, RowStream) {
        let (sender, receiver) = mpsc::channel(prefetch.max(1));
        (
            sender,
            RowStream {
                receiver,
                finished: false,
            },
        )
    }

    /// Next batch, `None` once the reader is exhausted
    ///
    /// After an error the stream yields `None`.
    pub async fn next_batch(&mut self) -> Option<Result<RowBatch>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(Ok(batch)) => Some(Ok(batch)),
            Some(Err(e)) => {
                self.finished = true;
                self.receiver.close();
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Numbers batches and tracks their offsets for a reader
#[derive(Debug, Default)]
pub struct BatchAssembler {
    next_index: usize,
    offset: u64,
}

impl BatchAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `rows` as the next batch
    pub fn assemble(&mut self, rows: Vec<Row>) -> RowBatch {
        let batch = RowBatch {
            batch_index: self.next_index,
            offset: self.offset,
            rows,
        };
        self.next_index += 1;
        self.offset += batch.rows.len() as u64;
        batch
    }

    /// Rows handed out so far
    pub fn rows_emitted(&self) -> u64 {
        self.offset
    }
}
