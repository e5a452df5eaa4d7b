pub mod retry_tracker;
pub mod token_cache;
