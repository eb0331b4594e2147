pub mod params;
pub mod query;
pub mod table;

pub use params::Params;
pub use query::{QueryResult, Value};
pub use table::{
    DatabaseCatalog, DatabaseInfo, ForeignKeyInfo, ForeignKeys, TableColumns, TableInfo,
    TableSchema,
};
