//! Graph serialization formats (spec §4.7).

pub mod bgzf;
pub mod bxnet;
pub mod xnet;

pub use bxnet::{read_bxnet, write_bxnet, BxnetWriteOptions};
pub use xnet::{read_xnet, write_xnet, XnetWriteOptions};
