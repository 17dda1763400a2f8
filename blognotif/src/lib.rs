// Library interface for blognotif modules
// This allows tests and the binary to import modules

pub mod fetcher;
pub mod notifier;
pub mod recipe;
pub mod repository;
pub mod run;
