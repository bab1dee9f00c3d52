//! Per-request debug info: which listener epoch, transport and endpoints a
//! query was observed on, rendered as a single `key=value` line.

pub mod pair;
pub mod source;

pub use pair::{render, Pair, PairList};
pub use source::{InfoSource, InfoSrc};
