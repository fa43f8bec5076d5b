//! Forward-only cursors over RETURNING rows.
//!
//! Both cursors own the driver cursor and release it exactly once: when the
//! last row has been read, when a driver error ends the stream, on
//! [`close`](RowCursor::close), or on drop.

use crate::context::StatementContext;
use crate::driver::{DriverError, ResultRow};
use crate::error::{StmtError, StmtResult};
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

fn row_error(ctx: &StatementContext, source: DriverError) -> StmtError {
    StmtError::Database {
        source,
        contexts: vec![ctx.clone()],
    }
}

fn released(ctx: &StatementContext, rows: usize, dropped: bool) {
    tracing::trace!(
        target: "typedml.exec",
        kind = %ctx.kind,
        rows,
        dropped,
        "cursor released"
    );
}

/// Blocking cursor: an [`Iterator`] of rows.
pub struct RowCursor<C> {
    inner: Option<C>,
    ctx: StatementContext,
    rows: usize,
}

impl<C> RowCursor<C>
where
    C: Iterator<Item = Result<ResultRow, DriverError>>,
{
    pub(crate) fn new(inner: C, ctx: StatementContext) -> Self {
        Self {
            inner: Some(inner),
            ctx,
            rows: 0,
        }
    }

    /// The statement this cursor reads from.
    pub fn context(&self) -> &StatementContext {
        &self.ctx
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the driver cursor without reading the remaining rows.
    pub fn close(&mut self) {
        self.release(true);
    }

    /// Read every remaining row.
    pub fn collect_rows(mut self) -> StmtResult<Vec<ResultRow>> {
        let mut rows = Vec::new();
        for row in &mut self {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn release(&mut self, dropped: bool) {
        if self.inner.take().is_some() {
            released(&self.ctx, self.rows, dropped);
        }
    }
}

impl<C> Iterator for RowCursor<C>
where
    C: Iterator<Item = Result<ResultRow, DriverError>>,
{
    type Item = StmtResult<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next();
        match item {
            Some(Ok(row)) => {
                self.rows += 1;
                Some(Ok(row))
            }
            Some(Err(e)) => {
                self.release(false);
                Some(Err(row_error(&self.ctx, e)))
            }
            None => {
                self.release(false);
                None
            }
        }
    }
}

impl<C> Drop for RowCursor<C> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            released(&self.ctx, self.rows, true);
        }
    }
}

/// Async cursor: a [`Stream`] of rows.
pub struct RowStream<S> {
    inner: Option<S>,
    ctx: StatementContext,
    rows: usize,
}

impl<S> RowStream<S>
where
    S: Stream<Item = Result<ResultRow, DriverError>> + Unpin,
{
    pub(crate) fn new(inner: S, ctx: StatementContext) -> Self {
        Self {
            inner: Some(inner),
            ctx,
            rows: 0,
        }
    }

    pub fn context(&self) -> &StatementContext {
        &self.ctx
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the driver cursor without reading the remaining rows.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            released(&self.ctx, self.rows, true);
        }
    }
}

impl<S> Stream for RowStream<S>
where
    S: Stream<Item = Result<ResultRow, DriverError>> + Unpin,
{
    type Item = StmtResult<ResultRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => {
                this.rows += 1;
                Poll::Ready(Some(Ok(row)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.inner = None;
                released(&this.ctx, this.rows, false);
                Poll::Ready(Some(Err(row_error(&this.ctx, e))))
            }
            Poll::Ready(None) => {
                this.inner = None;
                released(&this.ctx, this.rows, false);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for RowStream<S> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            released(&self.ctx, self.rows, true);
        }
    }
}
