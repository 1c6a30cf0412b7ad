pub mod forwarder;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod supervisor;

pub use forwarder::{Operation, RequestForwarder};
pub use scheduler::ScheduledTask;
pub use state::{ConnectionState, ConnectionStatus, SupervisorEvent};
pub use supervisor::{ConnectionSupervisor, LinkHandle};
