use std::{any::Any, fmt, ops::Range};

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    /// A single failure captured outside of any chunk, e.g. from a deferred
    /// sequential run.
    pub fn failed(algorithm: impl Into<String>, failure: Failure) -> Error {
        Error(
            ErrorKind::Failed {
                algorithm: algorithm.into(),
                failure,
            }
            .into(),
        )
    }

    pub fn aggregate(algorithm: impl Into<String>, failures: Vec<Failure>) -> Error {
        Error(ErrorKind::Aggregate(AggregateFailure::new(algorithm, failures)).into())
    }

    pub fn broken_promise() -> Error {
        Error(ErrorKind::BrokenPromise.into())
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind(), ErrorKind::Aggregate(_))
    }

    /// The captured callback failures carried by this error, if any.
    pub fn failures(&self) -> &[Failure] {
        match self.kind() {
            ErrorKind::Failed { failure, .. } => std::slice::from_ref(failure),
            ErrorKind::Aggregate(aggregate) => aggregate.failures(),
            _ => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("{algorithm} failed: {failure}")]
    Failed { algorithm: String, failure: Failure },

    #[error(transparent)]
    Aggregate(AggregateFailure),

    #[error("deferred result was abandoned before a value was produced")]
    BrokenPromise,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<AggregateFailure> for Error {
    fn from(aggregate: AggregateFailure) -> Self {
        ErrorKind::Aggregate(aggregate).into()
    }
}

/// A failure raised by a user callback and captured at a chunk boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
    range: Option<Range<usize>>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Failure {
        Failure {
            message: message.into(),
            range: None,
        }
    }

    /// Converts a panic payload into a failure, keeping the panic message when
    /// the payload is a string.
    pub fn from_panic(payload: Box<dyn Any + Send>, range: Option<Range<usize>>) -> Failure {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "callback panicked with a non-string payload".to_string()
        };
        Failure { message, range }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Positions of the chunk that raised the failure, relative to the start
    /// of the affected range.
    pub fn range(&self) -> Option<&Range<usize>> {
        self.range.as_ref()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} (positions {}..{})", self.message, range.start, range.end),
            None => f.write_str(&self.message),
        }
    }
}

/// All failures raised by the chunks of one algorithm invocation.
///
/// The order of the entries reflects the order in which the chunks settled,
/// which is not deterministic for parallel runs.
#[derive(Debug, Clone, Error)]
pub struct AggregateFailure {
    algorithm: String,
    failures: Vec<Failure>,
}

impl AggregateFailure {
    pub fn new(algorithm: impl Into<String>, failures: Vec<Failure>) -> AggregateFailure {
        AggregateFailure {
            algorithm: algorithm.into(),
            failures,
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.failures.iter()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} chunk(s) failed",
            self.algorithm,
            self.failures.len()
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, ", first: {first}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_panic_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        let failure = Failure::from_panic(payload, Some(3..9));
        assert_eq!(failure.message(), "boom 7");
        assert_eq!(failure.range(), Some(&(3..9)));
        assert_eq!(failure.to_string(), "boom 7 (positions 3..9)");

        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(Failure::from_panic(payload, None).message(), "static");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert!(Failure::from_panic(payload, None).message().contains("non-string"));
    }

    #[test]
    fn test_error_failures() {
        let err = Error::aggregate("generate", vec![Failure::new("a"), Failure::new("b")]);
        assert!(err.is_aggregate());
        assert_eq!(err.failures().len(), 2);
        assert_eq!(err.to_string(), "generate: 2 chunk(s) failed, first: a");

        let err = Error::failed("generate_n", Failure::new("single"));
        assert!(!err.is_aggregate());
        assert_eq!(err.failures(), &[Failure::new("single")]);

        let err = Error::invalid_arg("count", "too large");
        assert!(err.failures().is_empty());
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }
}
