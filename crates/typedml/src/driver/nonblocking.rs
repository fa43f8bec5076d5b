use super::{DriverError, KeyRetrieval, ResultRow};
use crate::query_builder::Arg;
use futures_core::Stream;
use std::future::Future;

/// A connection that prepares statements asynchronously.
pub trait AsyncDriver: Send {
    type Prepared<'a>: AsyncPreparedStatement + Send
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> impl Future<Output = Result<Self::Prepared<'a>, DriverError>> + Send;
}

/// Async counterpart of [`PreparedStatement`](super::PreparedStatement).
///
/// Binding is synchronous; execution and key retrieval are suspension points.
/// Dropping the handle (including dropping an in-flight future) releases it.
pub trait AsyncPreparedStatement: Send {
    type Cursor: Stream<Item = Result<ResultRow, DriverError>> + Send + Unpin;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError>;

    fn add_batch(&mut self) -> Result<(), DriverError>;

    fn execute_update(&mut self) -> impl Future<Output = Result<u64, DriverError>> + Send;

    fn execute_batch(&mut self) -> impl Future<Output = Result<Vec<u64>, DriverError>> + Send;

    fn execute_query(self) -> impl Future<Output = Result<Self::Cursor, DriverError>> + Send;

    fn generated_keys(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<ResultRow>>, DriverError>> + Send;
}
