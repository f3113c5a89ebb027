mod clean;
pub mod compdb;
pub mod compiler;
mod core;
pub mod depfile;
mod feedback;
pub mod files;
pub mod logger;
pub mod preprocess;
pub mod process;
pub mod recipe;
pub mod scheduler;
pub mod staleness;

pub use clean::clean;
pub use core::{
    BuildOptions, BuildSummary, DiscoveryReport, build_project, build_with, discover_project,
    discover_with, libraries_dirs, load_catalog,
};
pub use feedback::FeedbackAnalyzer;
