pub mod audio;
pub mod element;
pub mod library;
pub mod remote;
pub mod session;
pub mod timers;
pub mod widget;
pub mod ytdlp_widget;
