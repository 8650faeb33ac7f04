// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Access control entries: who may touch which memory range, and how.

use core::fmt;

use bitflags::bitflags;

use crate::config::{MAX_BOXES, MIN_STACK_SIZE, REGION_GRANULARITY};

/// Identity of a box, always in `[0, MAX_BOXES)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct BoxId(u8);

impl BoxId {
    /// The privileged main box.
    pub const MAIN: BoxId = BoxId(0);

    /// Returns `None` if `raw` does not name a configured box.
    pub const fn new(raw: usize) -> Option<BoxId> {
        if raw < MAX_BOXES {
            Some(BoxId(raw as u8))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Permission and policy bits attached to an ACL.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct AclFlags: u16 {
        const UREAD = 1 << 0;
        const UWRITE = 1 << 1;
        const UEXECUTE = 1 << 2;
        const SREAD = 1 << 3;
        const SWRITE = 1 << 4;
        const SEXECUTE = 1 << 5;
        /// The range is peripheral address space.
        const PERIPHERAL = 1 << 6;
        /// The range may be used by more than one box.
        const SHARED = 1 << 7;
        /// Round the size up to the region granularity before registering.
        const SIZE_ROUND_UP = 1 << 8;
        /// Round the size down to the region granularity before registering.
        const SIZE_ROUND_DOWN = 1 << 9;

        const URW = Self::UREAD.bits() | Self::UWRITE.bits();
        const SRW = Self::SREAD.bits() | Self::SWRITE.bits();
        const UXSR = Self::UREAD.bits() | Self::UEXECUTE.bits() | Self::SREAD.bits();

        /// Box stacks.
        const STACK = Self::URW.bits() | Self::SRW.bits() | Self::SIZE_ROUND_UP.bits();
        /// Box private context.
        const DATA = Self::STACK.bits();
        /// Peripheral registers a box may read and write.
        const PERIPH = Self::PERIPHERAL.bits() | Self::URW.bits() | Self::SRW.bits();
    }
}

/// The kind of memory an ACL protects, i.e. which region table owns it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AclKind {
    Peripheral,
    General,
}

/// Direction of a memory access made by box code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl AclFlags {
    pub fn kind(self) -> AclKind {
        if self.contains(AclFlags::PERIPHERAL) {
            AclKind::Peripheral
        } else {
            AclKind::General
        }
    }

    /// Whether unprivileged box code may perform `access`.
    pub fn allows(self, access: Access) -> bool {
        match access {
            Access::Read => self.contains(AclFlags::UREAD),
            Access::Write => self.contains(AclFlags::UWRITE),
            Access::Execute => self.contains(AclFlags::UEXECUTE),
        }
    }
}

pub const fn is_aligned(address: usize) -> bool {
    address % REGION_GRANULARITY == 0
}

/// Smallest granularity multiple that is at least `size`, or `None` on
/// overflow.
pub const fn round_up(size: usize) -> Option<usize> {
    match size.checked_add(REGION_GRANULARITY - 1) {
        Some(s) => Some(s & !(REGION_GRANULARITY - 1)),
        None => None,
    }
}

/// Largest granularity multiple that is at most `size`.
pub const fn round_down(size: usize) -> usize {
    size & !(REGION_GRANULARITY - 1)
}

/// Applies the stack floor.
pub const fn min_stack(size: usize) -> usize {
    if size < MIN_STACK_SIZE {
        MIN_STACK_SIZE
    } else {
        size
    }
}

/// Box that owns an entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Owner {
    /// Default entry, enforced whichever box is active.
    AllBoxes,
    Box(BoxId),
}

impl Owner {
    /// Whether the entry is enforced while `box_id` is active.
    pub fn applies_to(self, box_id: BoxId) -> bool {
        match self {
            Owner::AllBoxes => true,
            Owner::Box(owner) => owner == box_id,
        }
    }
}

/// One protected memory range. Immutable once created.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AclEntry {
    owner: Owner,
    start: usize,
    size: usize,
    flags: AclFlags,
}

impl AclEntry {
    /// Placeholder for staging buffers; never stored in a table.
    pub const EMPTY: AclEntry = AclEntry {
        owner: Owner::AllBoxes,
        start: 0,
        size: 0,
        flags: AclFlags::empty(),
    };

    /// An entry every box sees, for chip default tables.
    ///
    /// Panics if the range wraps around the address space, so a bad
    /// constant fails to compile.
    pub const fn for_all_boxes(start: usize, size: usize, flags: AclFlags) -> AclEntry {
        match start.checked_add(size) {
            Some(_) => AclEntry {
                owner: Owner::AllBoxes,
                start,
                size,
                flags,
            },
            None => panic!("default ACL wraps around the address space"),
        }
    }

    /// Returns `None` if the range wraps around the address space.
    pub fn new(owner: Owner, start: usize, size: usize, flags: AclFlags) -> Option<AclEntry> {
        start.checked_add(size)?;
        Some(AclEntry {
            owner,
            start,
            size,
            flags,
        })
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> usize {
        self.start + self.size
    }

    pub fn flags(&self) -> AclFlags {
        self.flags
    }

    pub fn kind(&self) -> AclKind {
        self.flags.kind()
    }

    /// Whether `[address, address + len)` lies entirely inside the entry.
    pub fn contains(&self, address: usize, len: usize) -> bool {
        match address.checked_add(len) {
            Some(end) => address >= self.start && end <= self.end(),
            None => false,
        }
    }

    pub fn overlaps(&self, other: &AclEntry) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Whether box code may perform `access` on `[address, address + len)`.
    pub fn permits(&self, address: usize, len: usize, access: Access) -> bool {
        self.contains(address, len) && self.flags.allows(access)
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#010X}:{:#010X}], length: {} bytes, acl {:#06X}",
            self.start,
            self.end(),
            self.size,
            self.flags.bits(),
        )?;
        match self.owner {
            Owner::AllBoxes => write!(f, ", all boxes"),
            Owner::Box(id) => write!(f, ", box {}", id),
        }
    }
}
