//! Built-in event sources.

pub mod directory;
pub mod dispatch;
pub mod lines;

pub use directory::{DirectoryConfig, DirectorySource};
pub use dispatch::{invoke_admitted, Dispatcher};
pub use lines::LineSource;
