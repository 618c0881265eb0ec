pub mod panic_handler;
pub mod pdf;
pub mod settings;
pub mod snapshot;

pub use pdf::{Command, DisplayState, DocumentSource, RenderService, ServiceConfig, ViewEvent};
pub use settings::Settings;
