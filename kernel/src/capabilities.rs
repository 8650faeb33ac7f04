// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Special restricted capabilities.
//!
//! Rust provides a mechanism for restricting certain operations to only be
//! used by trusted code through the `unsafe` keyword. Capabilities carry that
//! restriction beyond a single call: only code allowed to write `unsafe` can
//! create an object implementing one of these traits, and the monitor
//! functions that need the capability take such an object as an argument.
//!
//! Boards create capabilities with [`create_capability!`](crate::create_capability).

/// The `MemoryProtectionCapability` allows the holder to bring up the
/// protection hardware: enable fault reporting, reset the region tables and
/// hand out the box memory arena.
pub unsafe trait MemoryProtectionCapability {}
