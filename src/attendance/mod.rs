//! Daily check-in and photo retention.
//!
//! A check-in is accepted at most once per employee per calendar day. The
//! photo goes to the object store first and the record is written with an
//! atomic insert-if-absent on `(employee_id, check_in_day)`; if the write
//! does not land, the upload is compensated. The retention sweeper later
//! deletes expired photos and marks their records reclaimed.

pub mod checkin;
pub mod error;
pub mod gate;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub mod testing;

pub use checkin::{CheckInRequest, CheckInService};
pub use error::CheckInError;
pub use sweeper::{RetentionSweeper, SweepReport};
