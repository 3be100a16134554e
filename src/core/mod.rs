//! Core functionality: configuration, loaded files and the viewer session

pub mod config;
pub mod document;
pub mod session;
