pub mod audit;
pub mod db_utils;
pub mod username_cache;
pub mod username_filter;
pub mod photo;
pub mod error_capture;
