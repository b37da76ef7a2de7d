//! Per-invocation collection of failures raised by concurrently running chunks.

use std::{
    ops::Range,
    panic::AssertUnwindSafe,
    sync::{Mutex, OnceLock, PoisonError},
};

use parex_common::{Error, ErrorKind, Failure, Result};

/// Append-only, thread-safe list of chunk failures.
///
/// Storage is allocated on the first captured failure. Entries appear in the order
/// the failing chunks settled.
#[derive(Debug, Default)]
pub struct ExceptionList {
    failures: OnceLock<Mutex<Vec<Failure>>>,
}

impl ExceptionList {
    pub fn new() -> ExceptionList {
        ExceptionList::default()
    }

    pub fn push(&self, failure: Failure) {
        self.failures
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }

    /// Runs one chunk. A panic escaping `f` is recorded with the chunk's `range` instead
    /// of unwinding into the executor, and `None` is returned.
    pub fn capture<R, F: FnOnce() -> R>(&self, range: Range<usize>, f: F) -> Option<R> {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(res) => Some(res),
            Err(payload) => {
                log::trace!("chunk {range:?} failed");
                self.push(Failure::from_panic(payload, Some(range)));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.failures.get().map_or(0, |failures| {
            failures.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the list once every chunk has settled: `Ok` when nothing failed,
    /// otherwise an aggregate error carrying every captured failure.
    pub fn into_result(self, algorithm: &str) -> Result<()> {
        let failures = self
            .failures
            .into_inner()
            .map(|failures| failures.into_inner().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_default();
        if failures.is_empty() {
            return Ok(());
        }
        log::warn!("{algorithm}: {} chunk(s) failed", failures.len());
        Err(Error::aggregate(algorithm, failures))
    }
}

/// Folds the outcomes of independently dispatched parts (segments) of one invocation.
///
/// Callback failures from all parts are concatenated into a single aggregate. Any other
/// error takes precedence, the first one in part order winning.
pub fn merge_results<T>(algorithm: &str, results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    let mut other = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => match e.into_kind() {
                ErrorKind::Aggregate(aggregate) => failures.extend(aggregate.into_failures()),
                ErrorKind::Failed { failure, .. } => failures.push(failure),
                kind => {
                    other.get_or_insert(Error::from(kind));
                }
            },
        }
    }
    if let Some(e) = other {
        return Err(e);
    }
    if !failures.is_empty() {
        return Err(Error::aggregate(algorithm, failures));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use parex_common::{Error, ErrorKind, Failure};

    use super::{ExceptionList, merge_results};

    #[test]
    fn test_empty_list_is_ok() {
        let list = ExceptionList::new();
        assert_eq!(list.capture(0..4, || 5), Some(5));
        assert!(list.is_empty());
        assert!(list.into_result("generate").is_ok());
    }

    #[test]
    fn test_concurrent_capture() {
        let list = ExceptionList::new();
        std::thread::scope(|s| {
            for i in 0..8usize {
                let list = &list;
                s.spawn(move || {
                    list.capture(i * 10..i * 10 + 10, || {
                        if i % 2 == 1 {
                            panic!("chunk {i}");
                        }
                    })
                });
            }
        });
        assert_eq!(list.len(), 4);
        let err = list.into_result("generate").unwrap_err();
        let mut ranges = err
            .failures()
            .iter()
            .map(|f| f.range().cloned().unwrap())
            .collect::<Vec<_>>();
        ranges.sort_by_key(|r| r.start);
        assert_eq!(ranges, vec![10..20, 30..40, 50..60, 70..80]);
    }

    #[test]
    fn test_merge_concatenates_aggregates() {
        let merged = merge_results::<usize>(
            "generate",
            vec![
                Err(Error::aggregate("generate", vec![Failure::new("a")])),
                Ok(3),
                Err(Error::aggregate(
                    "generate",
                    vec![Failure::new("b"), Failure::new("c")],
                )),
            ],
        );
        let err = merged.unwrap_err();
        let messages = err.failures().iter().map(|f| f.message()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_other_error_wins() {
        let merged = merge_results::<usize>(
            "generate",
            vec![
                Err(Error::aggregate("generate", vec![Failure::new("a")])),
                Err(Error::invalid_operation("decompose")),
            ],
        );
        assert!(matches!(
            merged.unwrap_err().kind(),
            ErrorKind::InvalidOperation { .. }
        ));
        assert_eq!(merge_results("generate", vec![Ok(1), Ok(2)]).unwrap(), vec![1, 2]);
    }
}
