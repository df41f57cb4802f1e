//! File front end of the `weights` engine: path descriptors, station, window and
//! CMTSOLUTION readers, weight and log writers, and the window counter.

pub mod cmt;
pub mod count;
pub mod inputs;
pub mod outputs;
pub mod weigh;
