pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod fleet;
pub(crate) mod lockfile;
pub(crate) mod materialize;
pub(crate) mod merger;
pub(crate) mod outcome;
pub(crate) mod pipeline;
pub(crate) mod process;
pub(crate) mod report;
pub(crate) mod resolver;
pub(crate) mod transfer;
