use super::{ExecutionPlan, Pipeline, Tally, query_context, query_tally};
use crate::cursor::RowCursor;
use crate::driver::{Driver, DriverError, PreparedStatement};
use crate::error::StmtResult;
use crate::query_builder::Arg;
use crate::statement::{MutationStatement, RawOutcome, SqlStatement};
use std::time::Instant;

/// Prepare each template, bind its rounds, execute and fetch keys.
fn run<D: Driver>(driver: &mut D, plan: &ExecutionPlan) -> Result<RawOutcome, DriverError> {
    let mut outcome = RawOutcome::default();
    for rounds in plan.templates() {
        let mut prepared = driver.prepare(&rounds[0].sql, &plan.key_retrieval)?;
        if plan.batch {
            for ctx in rounds {
                prepared.fill_parameters(&ctx.args)?;
                prepared.add_batch()?;
            }
            outcome.counts.extend(prepared.execute_batch()?);
        } else {
            prepared.fill_parameters(&rounds[0].args)?;
            outcome.counts.push(prepared.execute_update()?);
        }
        if plan.key_retrieval.is_requested() {
            outcome.push_keys(prepared.generated_keys()?);
        }
    }
    Ok(outcome)
}

pub(crate) fn execute<D, S>(
    pipeline: &Pipeline<'_>,
    driver: &mut D,
    stmt: &mut S,
) -> StmtResult<S::Output>
where
    D: Driver,
    S: MutationStatement + ?Sized,
{
    let plan = pipeline.start(stmt, true)?;
    let started = Instant::now();
    let result = run(driver, &plan)
        .map_err(|e| pipeline.database_error(&plan, e))
        .and_then(|outcome| {
            let tally = Tally::of(&outcome);
            let output = stmt.interpret(outcome, pipeline.dialect)?;
            Ok((output, tally))
        });
    pipeline.finish(&plan, started, result)
}

fn open<'d, D: Driver>(
    driver: &'d mut D,
    plan: &ExecutionPlan,
    args: &[Arg],
) -> Result<<D::Prepared<'d> as PreparedStatement>::Cursor, DriverError> {
    let mut prepared = driver.prepare(&plan.sql, &plan.key_retrieval)?;
    prepared.fill_parameters(args)?;
    prepared.execute_query()
}

pub(crate) fn query<'d, D, S>(
    pipeline: &Pipeline<'_>,
    driver: &'d mut D,
    stmt: &mut S,
) -> StmtResult<RowCursor<<D::Prepared<'d> as PreparedStatement>::Cursor>>
where
    D: Driver,
    S: SqlStatement + ?Sized,
{
    let plan = pipeline.start(stmt, false)?;
    let started = Instant::now();
    let result = match query_context(&plan) {
        Ok(ctx) => match open(driver, &plan, &ctx.args) {
            Ok(cursor) => Ok((RowCursor::new(cursor, ctx.clone()), query_tally())),
            Err(e) => Err(pipeline.database_error(&plan, e)),
        },
        Err(e) => Err(e),
    };
    pipeline.finish(&plan, started, result)
}
