pub mod controller;
pub mod fetcher;
pub mod limiter;
pub mod scheduler;
pub mod session;
pub mod task;
