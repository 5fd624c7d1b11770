pub mod chef_job_runner;
pub mod chef_jobs;
pub mod job;
pub mod job_runner;
pub mod run_policy;

pub use chef_job_runner::ChefJobRunner;
pub use chef_jobs::{DownloadChefJob, InstallChefJob, RunChefJob};
pub use job::{Job, JobRun, ProgressReporter};
pub use job_runner::JobRunner;
pub use run_policy::RunPolicy;
