//! Adapting fallible record sources to the plain iterators the engine uses.
//!
//! The merge, downsampling and sharding stages pull `Iterator<Item = R>`.
//! A reader yields `Result<R>`, so [`CheckedSource`] ends its stream at the
//! first error and parks that error in an [`ErrorSlot`] the caller checks
//! once the pipeline has drained.

use std::sync::{Arc, Mutex};

use crate::error::{Result, TraversalError};

/// Shared holder for the first error raised by any attached source.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<TraversalError>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an error unless one is already held.
    pub fn record(&self, error: TraversalError) {
        if let Ok(mut slot) = self.inner.lock() {
            if slot.is_none() {
                *slot = Some(error);
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().map(|slot| slot.is_some()).unwrap_or(true)
    }

    /// Remove and return the held error.
    pub fn take(&self) -> Option<TraversalError> {
        self.inner.lock().ok().and_then(|mut slot| slot.take())
    }

    /// `Err` with the held error, if any.
    pub fn check(&self) -> Result<()> {
        match self.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Ends a `Result` stream at its first error, handing the error to an [`ErrorSlot`].
pub struct CheckedSource<I> {
    inner: I,
    slot: ErrorSlot,
    done: bool,
}

impl<I, T, E> CheckedSource<I>
where
    I: Iterator<Item = std::result::Result<T, E>>,
    E: Into<TraversalError>,
{
    pub fn new(inner: I, slot: ErrorSlot) -> Self {
        Self {
            inner,
            slot,
            done: false,
        }
    }
}

impl<I, T, E> Iterator for CheckedSource<I>
where
    I: Iterator<Item = std::result::Result<T, E>>,
    E: Into<TraversalError>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Ok(item) => Some(item),
            Err(e) => {
                self.done = true;
                self.slot.record(e.into());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_checked_source_passes_values() {
        let slot = ErrorSlot::new();
        let input: Vec<Result<u32>> = vec![Ok(1), Ok(2), Ok(3)];
        let values: Vec<_> = CheckedSource::new(input.into_iter(), slot.clone()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(!slot.is_set());
        assert!(slot.check().is_ok());
    }

    #[test]
    fn test_checked_source_stops_at_error() {
        let slot = ErrorSlot::new();
        let input: Vec<std::result::Result<u32, io::Error>> = vec![
            Ok(1),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad line")),
            Ok(3),
        ];
        let values: Vec<_> = CheckedSource::new(input.into_iter(), slot.clone()).collect();
        assert_eq!(values, vec![1]);
        assert!(slot.is_set());
        assert!(matches!(slot.check(), Err(TraversalError::Io(_))));
        assert!(!slot.is_set());
    }

    #[test]
    fn test_slot_keeps_first_error() {
        let slot = ErrorSlot::new();
        slot.record(TraversalError::Config("first".to_string()));
        slot.record(TraversalError::Config("second".to_string()));
        let err = slot.take().unwrap();
        assert!(err.to_string().contains("first"));
    }
}
