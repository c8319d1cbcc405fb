use std::any::Any;

/// Error type for a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl WorkError {
    pub fn failed(message: impl Into<String>) -> Self {
        WorkError::Failed(message.into())
    }

    /// Convert a `catch_unwind` payload into an error carrying the panic message.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        WorkError::Panicked(message)
    }
}

/// The per-unit callback of a batch.
///
/// `execute` is called exactly once for every `index` in `[0, total)` of a
/// batch that runs to completion, possibly concurrently from several workers.
/// No engine lock is held while it runs, so implementations may submit further
/// batches through a [`SubmitHandle`](crate::SubmitHandle).
pub trait Runnable: Send + Sync {
    fn execute(&self, index: usize, total: usize) -> Result<(), WorkError>;
}

impl<F> Runnable for F
where
    F: Fn(usize, usize) -> Result<(), WorkError> + Send + Sync,
{
    fn execute(&self, index: usize, total: usize) -> Result<(), WorkError> {
        self(index, total)
    }
}

/// Pin a closure to the [`Runnable`] signature so its argument and error
/// types are inferred at the call site.
///
/// ```ignore
/// engine.run_sync(from_fn(|i, n| { render_row(i, n); Ok(()) }), rows)?;
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(usize, usize) -> Result<(), WorkError> + Send + Sync + 'static,
{
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Runnable for Counter {
        fn execute(&self, _index: usize, _total: usize) -> Result<(), WorkError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn closures_are_runnable() {
        let work = |index: usize, total: usize| {
            if index < total { Ok(()) } else { Err(WorkError::failed("out of range")) }
        };
        assert!(work.execute(0, 1).is_ok());
        assert_eq!(work.execute(1, 1), Err(WorkError::Failed("out of range".into())));
    }

    #[test]
    fn structs_are_runnable() {
        let counter = Counter(AtomicUsize::new(0));
        counter.execute(0, 2).unwrap();
        counter.execute(1, 2).unwrap();
        assert_eq!(counter.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(WorkError::from_panic(payload), WorkError::Panicked("boom 7".into()));

        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(WorkError::from_panic(payload), WorkError::Panicked("static".into()));
    }
}
