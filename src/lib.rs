pub mod api;
pub mod command;
pub mod config;
pub mod format;
pub mod history;
pub mod logging;
pub mod playback;
pub mod ranking;
pub mod realtime;
pub mod row;
pub mod session;
pub mod tui;
