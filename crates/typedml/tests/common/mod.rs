#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use typedml::{
    Arg, ColumnDef, ColumnType, Driver, DriverError, KeyRetrieval, PreparedStatement, ResultRow,
    Table, Value,
};

/// `users(id bigint auto-increment pk, name varchar(50), note text null)`
pub fn users() -> Arc<Table> {
    Table::builder("users")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(ColumnDef::new("name", ColumnType::Varchar(Some(50))))
        .column(ColumnDef::new("note", ColumnType::Text).nullable())
        .primary_key(&["id"])
        .build()
        .expect("valid table")
}

/// One prepared execution as seen by [`MemoryDriver`].
#[derive(Debug, Clone, Default)]
pub struct Executed {
    pub sql: String,
    pub keys: KeyRetrieval,
    pub rounds: Vec<Vec<Arg>>,
}

/// Blocking driver that keeps every execution in memory and hands out
/// sequential ids as generated keys.
///
/// A single-round execution of a multi-row `VALUES` list counts one row per
/// tuple.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    executed: Arc<Mutex<Vec<Executed>>>,
    next_id: Arc<Mutex<i64>>,
    last_key_only: bool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            executed: Arc::default(),
            next_id: Arc::new(Mutex::new(1)),
            last_key_only: false,
        }
    }

    /// Report only the key of the last inserted row, like vendors that can't
    /// return several generated keys.
    pub fn last_key_only(mut self) -> Self {
        self.last_key_only = true;
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().expect("log lock").clone()
    }
}

pub struct MemoryPrepared<'a> {
    driver: &'a MemoryDriver,
    current: Executed,
    binding: Vec<Arg>,
    last_rows: usize,
}

impl Driver for MemoryDriver {
    type Prepared<'a>
        = MemoryPrepared<'a>
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> Result<MemoryPrepared<'a>, DriverError> {
        Ok(MemoryPrepared {
            driver: self,
            current: Executed {
                sql: sql.to_string(),
                keys: keys.clone(),
                rounds: Vec::new(),
            },
            binding: Vec::new(),
            last_rows: 0,
        })
    }
}

impl MemoryPrepared<'_> {
    /// Record the execution; returns the affected count of every round.
    fn flush(&mut self) -> Vec<u64> {
        let executed = Executed {
            sql: self.current.sql.clone(),
            keys: self.current.keys.clone(),
            rounds: std::mem::take(&mut self.current.rounds),
        };
        let per_round = (executed.sql.matches("), (").count() + 1) as u64;
        let counts = vec![per_round; executed.rounds.len()];
        self.last_rows = counts.iter().sum::<u64>() as usize;
        self.driver.executed.lock().expect("log lock").push(executed);
        counts
    }
}

impl PreparedStatement for MemoryPrepared<'_> {
    type Cursor = std::vec::IntoIter<Result<ResultRow, DriverError>>;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError> {
        self.binding = args.to_vec();
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.current.rounds.push(std::mem::take(&mut self.binding));
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64, DriverError> {
        let binding = std::mem::take(&mut self.binding);
        self.current.rounds.push(binding);
        Ok(self.flush().iter().sum())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        Ok(self.flush())
    }

    fn execute_query(mut self) -> Result<Self::Cursor, DriverError> {
        let binding = std::mem::take(&mut self.binding);
        self.current.rounds.push(binding);
        self.flush();
        Ok(Vec::new().into_iter())
    }

    fn generated_keys(&mut self) -> Result<Option<Vec<ResultRow>>, DriverError> {
        if !self.current.keys.is_requested() {
            return Ok(None);
        }
        let mut next = self.driver.next_id.lock().expect("id lock");
        let first = *next;
        *next += self.last_rows as i64;
        let ids = first..*next;
        let rows = if self.driver.last_key_only {
            ids.last()
                .map(|id| vec![ResultRow::new().with("id", Value::BigInt(id))])
                .unwrap_or_default()
        } else {
            ids.map(|id| ResultRow::new().with("id", Value::BigInt(id)))
                .collect()
        };
        Ok(Some(rows))
    }
}
