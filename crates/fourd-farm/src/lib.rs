// crates/fourd-farm/src/lib.rs
//
// Entity persistence and render-farm submission: the document store behind
// Project/Shot/Job, the submission-sheet builder and job-graph walker, and
// the per-job task-state poller.

pub mod database;
pub mod error;
pub mod poller;
pub mod store;
pub mod submission;

pub use database::ProjectDatabase;
pub use error::{FarmError, Result};
pub use poller::{JobPoller, TaskStatePoll};
pub use store::{EntityStore, StoreEntity};
pub use submission::{
    archive_calibration, build_job_graph, build_sheet, farm_driver_from_env, write_sheet, CommandLineFarmDriver, FarmDriver, NoFarmDriver, StageJobInfo,
};
