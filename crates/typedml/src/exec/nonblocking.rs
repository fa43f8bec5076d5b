use super::{ExecutionPlan, Pipeline, Tally, query_context, query_tally};
use crate::cursor::RowStream;
use crate::driver::{AsyncDriver, AsyncPreparedStatement, DriverError};
use crate::error::{StmtError, StmtResult};
use crate::query_builder::Arg;
use crate::statement::{MutationStatement, RawOutcome, SqlStatement};
use std::future::Future;
use std::time::{Duration, Instant};

async fn run<D: AsyncDriver>(driver: &mut D, plan: &ExecutionPlan) -> Result<RawOutcome, DriverError> {
    let mut outcome = RawOutcome::default();
    for rounds in plan.templates() {
        let mut prepared = driver.prepare(&rounds[0].sql, &plan.key_retrieval).await?;
        if plan.batch {
            for ctx in rounds {
                prepared.fill_parameters(&ctx.args)?;
                prepared.add_batch()?;
            }
            outcome.counts.extend(prepared.execute_batch().await?);
        } else {
            prepared.fill_parameters(&rounds[0].args)?;
            outcome.counts.push(prepared.execute_update().await?);
        }
        if plan.key_retrieval.is_requested() {
            outcome.push_keys(prepared.generated_keys().await?);
        }
    }
    Ok(outcome)
}

/// Run `work`, giving up after `limit`. Dropping `work` releases whatever
/// driver handle it holds.
async fn with_timeout<F: Future>(limit: Option<Duration>, work: F) -> StmtResult<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| StmtError::Timeout(limit)),
        None => Ok(work.await),
    }
}

pub(crate) async fn execute<D, S>(
    pipeline: &Pipeline<'_>,
    driver: &mut D,
    stmt: &mut S,
) -> StmtResult<S::Output>
where
    D: AsyncDriver,
    S: MutationStatement + ?Sized,
{
    let plan = pipeline.start(stmt, true)?;
    let started = Instant::now();
    let work = async {
        let outcome = run(driver, &plan)
            .await
            .map_err(|e| pipeline.database_error(&plan, e))?;
        let tally = Tally::of(&outcome);
        let output = stmt.interpret(outcome, pipeline.dialect)?;
        Ok((output, tally))
    };
    let result = with_timeout(pipeline.config.statement_timeout, work)
        .await
        .and_then(|r| r);
    pipeline.finish(&plan, started, result)
}

async fn open<'d, D: AsyncDriver>(
    driver: &'d mut D,
    plan: &ExecutionPlan,
    args: &[Arg],
) -> Result<<D::Prepared<'d> as AsyncPreparedStatement>::Cursor, DriverError> {
    let mut prepared = driver.prepare(&plan.sql, &plan.key_retrieval).await?;
    prepared.fill_parameters(args)?;
    prepared.execute_query().await
}

pub(crate) async fn query<'d, D, S>(
    pipeline: &Pipeline<'_>,
    driver: &'d mut D,
    stmt: &mut S,
) -> StmtResult<RowStream<<D::Prepared<'d> as AsyncPreparedStatement>::Cursor>>
where
    D: AsyncDriver,
    S: SqlStatement + ?Sized,
{
    let plan = pipeline.start(stmt, false)?;
    let started = Instant::now();
    let result = match query_context(&plan) {
        Ok(ctx) => {
            let opened = with_timeout(
                pipeline.config.statement_timeout,
                open(driver, &plan, &ctx.args),
            )
            .await;
            match opened {
                Ok(Ok(cursor)) => Ok((RowStream::new(cursor, ctx.clone()), query_tally())),
                Ok(Err(e)) => Err(pipeline.database_error(&plan, e)),
                Err(timeout) => Err(timeout),
            }
        }
        Err(e) => Err(e),
    };
    pipeline.finish(&plan, started, result)
}
