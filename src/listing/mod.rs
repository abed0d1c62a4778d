pub mod parser;
pub mod record;

pub use parser::ListParser;
pub use record::{ObjectRecord, ObjectType};
