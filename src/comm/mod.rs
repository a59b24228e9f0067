//! Communication primitives
//!
//! Message queue, data queue and fixed-block memory pool. All storage is
//! caller-supplied; the kernel only keeps the bookkeeping.

pub mod dataq;
pub mod mempool;
pub mod msgq;
