pub mod actions;
pub mod adb;
pub mod commands;
pub mod config;
pub mod dialogs;
pub mod error;
pub mod logging;
pub mod models;
pub mod outcome;
pub mod staging;
pub mod state;
pub mod tasks;
