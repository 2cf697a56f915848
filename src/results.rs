mod query_result;
mod row;

pub use query_result::{FieldInfo, QueryResult};
pub use row::Row;
