#![forbid(unsafe_code)]

pub mod assemble;
pub mod build;
pub mod chapters;
pub mod cli;
pub mod error;
pub mod export;
pub mod fetch;
pub mod formats;
pub mod layout;
pub mod logging;
pub mod normalize;
pub mod profile;
