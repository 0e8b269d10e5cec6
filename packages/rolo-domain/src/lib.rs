pub mod language;
pub mod query_text;
pub mod static_expansions;
