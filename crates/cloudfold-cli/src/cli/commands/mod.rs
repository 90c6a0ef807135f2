pub mod browse;
pub mod context;
pub mod dispatch;
pub mod edit;
pub mod transfer;

pub use dispatch::dispatch;
