pub mod attendance;
pub mod cash;
pub mod employee;
pub mod log;
pub mod project;
pub mod role;
pub mod user;
