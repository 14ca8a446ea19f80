//! SQL access, one module per area. Functions take a borrowed connection (or
//! `&mut Connection` when they need a transaction) and never lock anything.

pub mod attendance;
pub mod messages;
pub mod payments;
pub mod scheduling;
pub mod users;

#[cfg(test)]
pub(crate) mod fixtures;
