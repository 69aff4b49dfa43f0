//! Command-line front end for the research service.
//!
//! The binary folds engine events through [`research_core::update`] and
//! prints what changed; everything touching the terminal, disk or network
//! lives under [`platform`].
pub mod cli;
pub mod platform;
