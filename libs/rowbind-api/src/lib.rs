pub mod error;
pub mod metadata;
pub mod naming;
pub mod row;
pub mod value;

pub use metadata::{ColumnDeserializer, DeclaredFactories, RowMapped};
pub use row::Row;
pub use rowbind_api_derive::{RowMapped, row_factories};
pub use value::Value;
