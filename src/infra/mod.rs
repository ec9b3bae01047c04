pub mod config;
pub mod oracle;
pub mod rows;
pub mod store;
#[cfg(test)]
pub mod testing;
