//! Integration tests for the linkdyn crates.
//!
//! These tests drive the full pipeline through [`linkdyn_core::Simulator`]:
//! - Free fall under both integrators
//! - Contacts, friction cones, handlers and extra joints
//! - Actuation modes and their classification
//! - Kinematic walking
//! - Forced pose override, including from another thread
//! - Configuration archive round trips
//! - Lifecycle and error reporting

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    missing_docs
)]

pub mod actuation;
pub mod common;
pub mod config_roundtrip;
pub mod contact;
pub mod forced_pose;
pub mod free_fall;
pub mod lifecycle;
pub mod walking;
