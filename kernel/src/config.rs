// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Data structure for storing compile-time configuration options in the
//! kernel.
//!
//! The layout constants describe what the protection hardware and the box
//! descriptor can express. The `CONFIG` value holds the debugging switches,
//! which are set through Cargo features of this crate.

/// Number of boxes the monitor can host, including the main box 0.
pub const MAX_BOXES: usize = 5;

/// Capacity of a single region table.
pub const MAX_ACLS: usize = 16;

/// Minimum alignment and size unit of a protection region.
pub const REGION_GRANULARITY: usize = 32;

/// Width of the unmapped band placed after every box stack and context.
pub const STACK_BAND_SIZE: usize = 128;

/// Smallest stack a box is given, whatever it asks for.
pub const MIN_STACK_SIZE: usize = 1024;

/// A struct containing all of the configuration options for the kernel.
pub(crate) struct Config {
    /// Whether every box switch is traced through the logger.
    pub(crate) trace_switches: bool,

    /// Whether every ACL registration is printed with its memory map name.
    pub(crate) debug_acls: bool,
}

/// A unique instance of `Config` where compile-time configuration options are
/// defined.
pub(crate) const CONFIG: Config = Config {
    trace_switches: cfg!(feature = "trace_switches"),
    debug_acls: cfg!(feature = "debug_acls"),
};
