pub mod config;
pub mod gateway;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod supervisor;
pub mod timezone;
pub mod worker;

pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, bind_listener, build_app, upstream_routes};
pub use supervisor::{
    ProcessLauncher, SupervisorHandle, WorkerLauncher, WorkerState, WorkerSupervisor,
};
