pub mod backoff;
pub mod formatting;
