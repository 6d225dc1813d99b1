pub mod config;
pub mod sysproxy;
