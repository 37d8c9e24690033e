pub mod connections;
pub mod relationship;
pub mod schema;
pub mod table_model;
