// Session engine and terminal glue. Rendering stays in the binary.
pub mod app;
pub mod app_dirs;
pub mod bank;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod question;
pub mod result;
pub mod runtime;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod store;
pub mod util;
