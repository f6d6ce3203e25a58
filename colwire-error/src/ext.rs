use crate::{ColwireResult, ErrString};

/// Extension trait for ColwireResult
pub trait ResultExt<T>: private::Sealed {
    /// Wrap the error, if any, with a lazily built description of what was being done.
    fn with_context<M, F>(self, f: F) -> ColwireResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M;
}

mod private {
    use crate::ColwireResult;

    pub trait Sealed {}

    impl<T> Sealed for ColwireResult<T> {}
}

impl<T> ResultExt<T> for ColwireResult<T> {
    fn with_context<M, F>(self, f: F) -> ColwireResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
