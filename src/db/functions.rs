use crate::types::Value;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqliteValue;
use rusqlite::Connection;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type ScalarImpl = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// An administrator-supplied SQL scalar function, attached to every connection
#[derive(Clone)]
pub struct ScalarFunction {
    name: String,
    num_args: i32,
    func: Arc<ScalarImpl>,
}

impl ScalarFunction {
    /// `num_args` of -1 accepts any number of arguments
    pub fn new<F>(name: impl Into<String>, num_args: i32, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            num_args,
            func: Arc::new(func),
        }
    }

    fn register(&self, conn: &Connection) -> rusqlite::Result<()> {
        let func = AssertUnwindSafe(Arc::clone(&self.func));
        conn.create_scalar_function(
            self.name.as_str(),
            self.num_args,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                // Borrow the wrapper as a whole so the closure stays unwind-safe
                let func = &func;
                let args: Vec<Value> = (0..ctx.len()).map(|i| Value::from(ctx.get_raw(i))).collect();
                (func.0)(&args)
                    .map(SqliteValue::from)
                    .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
            },
        )
    }
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("num_args", &self.num_args)
            .finish()
    }
}

/// Attach every configured function to a freshly opened connection
pub fn register_functions(conn: &Connection, functions: &[ScalarFunction]) -> rusqlite::Result<()> {
    for function in functions {
        function.register(conn)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_function_is_callable() {
        let conn = Connection::open_in_memory().unwrap();
        let double = ScalarFunction::new("double", 1, |args| match args.first() {
            Some(Value::Integer(i)) => Ok(Value::Integer(i * 2)),
            _ => Err("double() expects an integer".to_string()),
        });
        register_functions(&conn, &[double]).unwrap();

        let doubled: i64 = conn.query_row("select double(21)", [], |row| row.get(0)).unwrap();
        assert_eq!(doubled, 42);

        let err = conn
            .query_row("select double('x')", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(err.to_string().contains("expects an integer"));
    }
}
