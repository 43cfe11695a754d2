pub mod history;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod playback;
pub mod requests;
pub mod script;
pub mod segment;
pub mod setup;
pub mod speech;
pub mod timing;
pub mod workflow;
