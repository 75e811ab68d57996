//! Readers turning trace files into a [`Trace`](crate::model::Trace).

pub mod native;
