pub mod app;
pub mod input;
pub mod reconciler;
pub mod tabs;
