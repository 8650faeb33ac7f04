// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Named memory areas.
//!
//! Chips describe their address space as a static list of areas. Region tables
//! use such a list to decide which ranges they are responsible for, and the
//! ACL debug output uses it to print a human-readable name next to an address.

/// A half-open range `[start, end)` of the address space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemoryArea {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
}

impl MemoryArea {
    pub const fn new(name: &'static str, start: usize, end: usize) -> MemoryArea {
        MemoryArea { name, start, end }
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.end
    }

    /// Whether `[start, start + size)` lies inside the area.
    pub fn contains_range(&self, start: usize, size: usize) -> bool {
        match start.checked_add(size) {
            Some(end) => start >= self.start && end <= self.end,
            None => false,
        }
    }
}

/// The area containing `address`, if any.
pub fn find(map: &[MemoryArea], address: usize) -> Option<&MemoryArea> {
    map.iter().find(|area| area.contains(address))
}

/// Name to print next to `address` in diagnostics.
pub fn name_of(map: &[MemoryArea], address: usize) -> &'static str {
    find(map, address).map_or("unknown", |area| area.name)
}
