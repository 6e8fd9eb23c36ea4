//! Test-support crate for the Tarn workspace.

pub mod helpers;
