pub mod comment;
pub mod defaults;
pub mod error;
pub mod executor;
pub mod ignore;
pub mod io;
pub mod paths;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod scaffold;
pub mod shell;
pub mod signals;
pub mod task;
pub mod todo;
pub mod vcs;

pub use error::{EkError, Result};
