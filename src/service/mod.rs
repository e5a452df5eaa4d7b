pub mod housekeeping;
pub mod orchestrator;

pub use orchestrator::TokenService;
