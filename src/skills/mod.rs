//! The six specialist skills built on the skill runtime. Each owns one
//! workspace directory under the workspace root and exposes a closed
//! `command` enum to the LM.

pub(crate) mod architect;
pub(crate) mod atc;
pub(crate) mod chief;
pub(crate) mod coach;
pub(crate) mod monitor;
pub(crate) mod research;
