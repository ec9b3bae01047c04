pub mod fuzzy;
pub mod parsing;
pub mod prompts;
pub mod repair_loop;
pub mod sandbox;
pub mod sql_guard;
