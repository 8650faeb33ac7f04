// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Standard errors returned by region tables.

use core::fmt;

/// Reasons a region table refuses an operation.
///
/// A table never partially applies an operation that returns one of these.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorCode {
    /// The same range is already registered for this box, or the range
    /// overlaps a range owned by a different box.
    AlreadyExists,
    /// Every slot of the table is in use.
    CapacityExceeded,
    /// Base address or size is not a multiple of the region granularity.
    Unaligned,
    /// The range is outside every memory area this table handles.
    UnhandledArea,
    /// The table was used before `init()`.
    Uninitialized,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::AlreadyExists => "already exists",
            ErrorCode::CapacityExceeded => "capacity exceeded",
            ErrorCode::Unaligned => "unaligned",
            ErrorCode::UnhandledArea => "unhandled area",
            ErrorCode::Uninitialized => "uninitialized",
        };
        f.write_str(name)
    }
}
