use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::Error;

/// Names a kind of record. Records of the same kind share one cached
/// insert template.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKind(&'static str);

impl RecordKind {
    pub const fn new(name: &'static str) -> Self {
        RecordKind(name)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Wall clock time without a zone, e.g. a device's local clock
    LocalTime(NaiveDateTime),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::LocalTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A parameterized insert statement. Placeholders in `sql` are positional
/// (`?`) and `params` names them in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    sql: String,
    params: Vec<&'static str>,
}

impl Template {
    pub fn new(sql: impl Into<String>, params: &[&'static str]) -> Self {
        Self {
            sql: sql.into(),
            params: params.to_vec(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[&'static str] {
        &self.params
    }
}

/// A template with values bound to (some of) its parameters.
#[derive(Debug)]
pub struct Statement<'t> {
    template: &'t Template,
    values: Vec<Option<Value>>,
}

impl<'t> Statement<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self {
            template,
            values: vec![None; template.params.len()],
        }
    }

    /// Bind `value` to the parameter called `name`, replacing any earlier
    /// value.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        let idx = self
            .template
            .params
            .iter()
            .position(|param| *param == name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;

        self.values[idx] = Some(value.into());
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.template.sql
    }

    /// All values in parameter order. Fails if any parameter is unbound.
    pub fn values(&self) -> Result<Vec<&Value>, Error> {
        self.values
            .iter()
            .zip(&self.template.params)
            .map(|(value, param)| value.as_ref().ok_or(Error::UnboundParameter(*param)))
            .collect()
    }
}

/// Something the sink can write.
///
/// `insert_template` is called once per [`RecordKind`] and the result is
/// reused for every later record of that kind, so it must not depend on
/// the record's values.
pub trait Record: Send + 'static {
    fn kind(&self) -> RecordKind;

    fn insert_template(&self) -> Template;

    fn bind(&self, statement: &mut Statement<'_>) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind() {
        let template = Template::new("INSERT INTO t (a, b) VALUES (?, ?)", &["a", "b"]);
        let mut statement = Statement::new(&template);

        assert!(matches!(
            statement.values(),
            Err(Error::UnboundParameter("a"))
        ));

        statement.bind("b", "text").unwrap().bind("a", 7).unwrap();
        assert_eq!(
            statement.values().unwrap(),
            vec![&Value::Integer(7), &Value::Text("text".into())]
        );

        statement.bind("a", None::<i64>).unwrap();
        assert_eq!(statement.values().unwrap()[0], &Value::Null);
    }

    #[test]
    fn unknown_parameter() {
        let template = Template::new("INSERT INTO t (a) VALUES (?)", &["a"]);
        let mut statement = Statement::new(&template);

        let err = statement.bind("c", 1).unwrap_err();
        assert!(matches!(err, Error::UnknownParameter(name) if name == "c"));
    }
}
