//! Background loops.

pub mod retention_loop;
