pub mod cli;
pub mod clipboard;
pub mod credentials;
pub mod error;
pub mod handoff;
pub mod mfa;
pub mod profiles;
pub mod prompt;
pub mod settings;
pub mod shell;
pub mod sts;
pub mod switcher;

pub use error::Error;
