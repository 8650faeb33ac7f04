// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Core of the box isolation monitor.
//!
//! The monitor partitions a single microcontroller into mutually distrusting
//! execution compartments ("boxes") that share one address space. Every box
//! owns a set of access control entries (ACLs) which are stored in one region
//! table per protection domain (peripheral bridge and general memory). When
//! control moves from one box to another the [`vmpu::Vmpu`] switches both
//! tables together, and when the hardware signals a protection fault the
//! [`fault::FaultDispatcher`] decides whether the access was a permitted one
//! that can be emulated, or a violation that halts the system.
//!
//! This crate only contains the portable decision logic. Architecture and chip
//! crates implement the traits in [`platform`] for real hardware.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod acl;
pub mod boot;
pub mod capabilities;
pub mod config;
pub mod emulate;
pub mod errorcode;
pub mod fault;
pub mod halt;
pub mod layout;
pub mod memory_map;
pub mod platform;
pub mod region_table;
pub mod utilities;
pub mod vmpu;

#[cfg(test)]
mod testing;

pub use crate::acl::{AclEntry, AclFlags, AclKind, BoxId};
pub use crate::errorcode::ErrorCode;
pub use crate::halt::{Halt, HaltKind, VmpuError};
