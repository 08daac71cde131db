pub mod activation;
pub mod activity;
pub mod commands;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod manager;
pub mod paths;
pub mod profiles;
pub mod scripts;
pub mod settings;
pub mod ui;
pub mod watcher;

#[cfg(test)]
pub mod test_utils;
