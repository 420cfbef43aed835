pub mod analysis;
pub mod batch;
pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod media;
pub mod paths;
pub mod permissions;
pub mod report;
pub mod screen;
pub mod session;
