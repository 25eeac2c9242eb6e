pub mod comment;
pub mod ignore;
pub mod plugins;
pub mod project;
pub mod run;
pub mod setup;
pub mod shell;
pub mod todo;
pub mod ws;
