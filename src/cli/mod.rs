pub mod commands;
pub mod progress;
pub mod ui;
pub mod util;

pub use progress::ConsoleRenderer;
pub use ui::Output;
pub use util::{load_blueprint, load_runtime, save_blueprint};
