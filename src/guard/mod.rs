//! Corruption detection
//!
//! Both checks report through [`Corruption`](crate::error::Corruption) and
//! leave the heap untouched.

pub(crate) mod integrity;
pub(crate) mod poison;
