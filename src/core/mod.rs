pub mod backend;
pub mod catalog;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod follow_up;
pub mod generator;
pub mod mentor;
pub mod message;
pub mod practice;
pub mod prompts;
pub mod quiz;
pub mod session;
pub mod storage;
pub mod structured;
