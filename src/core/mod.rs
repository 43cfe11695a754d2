pub mod cancel;
pub mod config;
pub mod io;
pub mod language;
pub mod state;
