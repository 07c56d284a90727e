// Extractor module - runs the headless container reader and catalogs its output

pub mod config;
pub mod inventory;
pub mod runner;

pub use config::{ExtractorConfig, ExtractorKind};
pub use inventory::collect_scripts;
pub use runner::ExtractorRunner;
