pub mod access_log;
pub mod client_ip;
pub mod config;
pub mod guard;
pub mod limiter;
pub mod models;
pub mod redirect;
pub mod storage;
