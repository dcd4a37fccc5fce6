pub mod classify;
pub mod lowprio;
pub mod snapshot;
pub mod users;
