pub mod activity_logs;
pub mod attendance;
pub mod cash;
pub mod dashboard;
pub mod employee;
pub mod error_logs;
pub mod import;
pub mod projects;
pub mod users;
