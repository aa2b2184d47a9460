use super::Statement;
use crate::Error;

/// An open connection to wherever records end up.
pub trait Connection {
    /// Run one statement, returning the number of affected rows.
    fn execute(&mut self, statement: &Statement<'_>) -> Result<u64, Error>;

    fn close(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }
}

/// Opens connections for the sink worker. The sink opens one connection
/// per batch and closes it when the batch is done.
pub trait Destination: Send + 'static {
    fn connect(&mut self) -> Result<Box<dyn Connection + '_>, Error>;
}
