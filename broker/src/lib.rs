#![cfg(target_os = "linux")]

mod brokered_syscalls;
mod error;
mod host;
mod thread;

pub use error::BrokerError;
pub use host::{BrokerHost, RequestStatus};
pub use thread::{spawn_broker, spawn_broker_thread};

// Re-exported types from sub-crates
pub use sysbroker_ipc::IpcChannel;
pub use sysbroker_policy::{BrokerPolicy, Policy};
