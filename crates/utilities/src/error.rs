use core::error::Error;
use core::fmt::Debug;
use core::fmt::Display;

/// The catch-all error type of the sketch crates. Any type implementing
/// [`Error`] (and string literals) converts into it, so it is used with `?` at
/// the boundaries where the precise error type no longer matters, such as I/O
/// and the command line tools. Captures a backtrace on creation.
pub struct SketchError {
    inner: Box<InnerSketchError>,
}

impl SketchError {
    /// Attempts to downcast the underlying error to the given type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.error.downcast_ref::<E>()
    }

    /// Returns true iff the underlying error has the given type.
    pub fn is<E: Error + 'static>(&self) -> bool {
        self.inner.error.is::<E>()
    }
}

/// Keeps [`SketchError`] a thin pointer, errors are a cold path so the
/// extra indirection is irrelevant.
struct InnerSketchError {
    error: Box<dyn Error + Send + Sync + 'static>,
    backtrace: std::backtrace::Backtrace,
}

// Written this way to also obtain From<&str> and From<String>.
impl<E> From<E> for SketchError
where
    Box<dyn Error + Send + Sync + 'static>: From<E>,
{
    #[cold]
    fn from(error: E) -> Self {
        SketchError {
            inner: Box::new(InnerSketchError {
                error: error.into(),
                backtrace: std::backtrace::Backtrace::capture(),
            }),
        }
    }
}

impl Display for SketchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.inner.error)
    }
}

impl Debug for SketchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{:?}", self.inner.error)?;

        let backtrace = &self.inner.backtrace;
        if let std::backtrace::BacktraceStatus::Captured = backtrace.status() {
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct OracleDown;

    impl Display for OracleDown {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "oracle down")
        }
    }

    impl Error for OracleDown {}

    #[test]
    fn test_sketch_error_downcast() {
        let error: SketchError = OracleDown.into();
        assert!(error.is::<OracleDown>());
        assert!(error.downcast_ref::<OracleDown>().is_some());
        assert_eq!(error.to_string(), "oracle down");

        let error: SketchError = "plain message".into();
        assert!(!error.is::<OracleDown>());
        assert_eq!(error.to_string(), "plain message");
    }
}
