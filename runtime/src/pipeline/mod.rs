pub mod error_reporter;
pub mod extraction;
pub mod job_tracker;
pub mod linking;
pub mod scheduler;
pub mod similarity;
pub mod source_files;
pub mod types;

pub mod utils;

pub use error_reporter::ErrorReporter;
pub use extraction::{ExtractionConfig, ExtractionOrchestrator};
pub use job_tracker::{JobProgress, JobTracker, project_staleness};
pub use linking::{BatchCursor, LinkingConfig, LinkingOrchestrator};
pub use scheduler::{Task, TaskScheduler, Workers};
pub use source_files::{FileRepository, FsFileRepository, SourceFiles, UploadsDirectory};
