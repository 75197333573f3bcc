pub mod evaluation;
pub mod evaluator;
pub mod handlers;
pub mod lock;
pub mod prompts;
pub mod session;
pub mod store;
pub mod turns;
