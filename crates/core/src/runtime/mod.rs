//! Connection state machine, poll task, and the session actor.

mod controller;
mod monitor;
mod poller;
mod shutdown;

pub use controller::{ControllerUpdate, PollingController};
pub use monitor::{Command, DashboardStatus, Monitor};
pub use poller::{PollEvent, PollHandle, PollSchedule};
pub use shutdown::ShutdownGuard;
