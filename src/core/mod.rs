mod orchestrator;

pub use orchestrator::{build_generator, Orchestrator};
