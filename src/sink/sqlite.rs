//! SQLite destination backed by `sqlx`.
//!
//! The sink worker is a plain thread, so the destination carries its own
//! current-thread runtime and blocks on every database call.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection as _;
use tokio::runtime::{Builder, Runtime};

use super::{Connection, Destination, Statement, Value};
use crate::Error;

pub struct SqliteDestination {
    runtime: Runtime,
    options: SqliteConnectOptions,
    bootstrap: Vec<String>,
}

impl SqliteDestination {
    /// `url` looks like `sqlite://path/to/file.db`. The file is created on
    /// first connect if it does not exist.
    pub fn new(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            runtime,
            options,
            bootstrap: Vec::new(),
        })
    }

    /// Statements run on every new connection before any record is
    /// written, typically `CREATE TABLE IF NOT EXISTS ...`.
    pub fn with_bootstrap<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap.extend(statements.into_iter().map(Into::into));
        self
    }
}

impl Destination for SqliteDestination {
    fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error> {
        let runtime = &self.runtime;
        let mut conn = runtime.block_on(SqliteConnection::connect_with(&self.options))?;

        for sql in &self.bootstrap {
            runtime.block_on(sqlx::query(sql.as_str()).execute(&mut conn))?;
        }

        Ok(Box::new(SqliteHandle { runtime, conn }))
    }
}

struct SqliteHandle<'a> {
    runtime: &'a Runtime,
    conn: SqliteConnection,
}

impl Connection for SqliteHandle<'_> {
    fn execute(&mut self, statement: &Statement<'_>) -> Result<u64, Error> {
        let mut query = sqlx::query(statement.sql());
        for value in statement.values()? {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Integer(n) => query.bind(*n),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Timestamp(ts) => query.bind(*ts),
                Value::LocalTime(ts) => query.bind(*ts),
            };
        }

        let result = self.runtime.block_on(query.execute(&mut self.conn))?;
        Ok(result.rows_affected())
    }

    fn close(self: Box<Self>) -> Result<(), Error> {
        let SqliteHandle { runtime, conn } = *self;
        runtime.block_on(conn.close())?;
        Ok(())
    }
}
