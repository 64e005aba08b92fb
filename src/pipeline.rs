//! Row delivery for the build and probe phases.
//!
//! With a non-zero `prefetch_rows`, decoding runs on a scoped reader thread
//! that feeds a bounded channel, so parsing overlaps with hashing. The
//! reader stops as soon as the consumer returns, fails, or the run is
//! cancelled.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
    },
    thread,
};

use log::debug;

use crate::{
    error::{DiffError, Result},
    source::{Row, RowSource},
};

/// Cloneable flag shared between a caller and a running comparison.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DiffError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Feeds every row of `source` to `consume`, in order, checking `cancel`
/// before each row.
pub fn for_each_row<S, F>(
    source: &mut S,
    prefetch_rows: usize,
    cancel: &CancelToken,
    mut consume: F,
) -> Result<()>
where
    S: RowSource + ?Sized,
    F: FnMut(Row) -> Result<()>,
{
    if prefetch_rows == 0 {
        loop {
            cancel.check()?;
            match source.next_row()? {
                Some(row) => consume(row)?,
                None => return Ok(()),
            }
        }
    }

    debug!(
        "Prefetching up to {} row(s) from {}",
        prefetch_rows,
        source.name()
    );
    thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<Result<Row>>(prefetch_rows);
        let reader_cancel = cancel.clone();
        let reader = scope.spawn(move || {
            while !reader_cancel.is_cancelled() {
                let item = match source.next_row() {
                    Ok(Some(row)) => Ok(row),
                    Ok(None) => break,
                    Err(err) => Err(err),
                };
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });
        let outcome = drain(rx, cancel, &mut consume);
        if let Err(payload) = reader.join() {
            std::panic::resume_unwind(payload);
        }
        outcome
    })
}

fn drain<F>(rx: Receiver<Result<Row>>, cancel: &CancelToken, consume: &mut F) -> Result<()>
where
    F: FnMut(Row) -> Result<()>,
{
    for item in rx {
        cancel.check()?;
        consume(item?)?;
    }
    cancel.check()
}
