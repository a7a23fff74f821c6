pub mod config_cmd;
pub mod doctor;
pub mod query;
pub mod tools;
