/// Monitoring engine module - schedules and executes service checks
///
/// One task per configured service probes its target on a fixed interval,
/// persists each result and hands it to an optional observer.
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;


pub use checker::{CheckType, Checker, CheckerError, CheckerFactory, DefaultCheckerFactory};
pub use executor::{MonitoringExecutor, ResultCallback};
pub use scheduler::MonitoringScheduler;
pub use types::{CheckResult, Status};
