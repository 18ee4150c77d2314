//! Process lifecycle: signals and orderly teardown

mod shutdown;

pub use shutdown::ShutdownSignal;
