//! Synchronization primitives
//!
//! Semaphores, mutexes with priority inheritance, and event flags.

pub mod flag;
pub mod mutex;
pub mod sem;
