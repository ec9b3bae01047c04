pub mod context;
pub mod filter;
pub mod knowledge;
pub mod result;
pub mod schema;
pub mod visual;
