// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Per-domain store of access control entries.
//!
//! There is one table per protection domain (peripheral bridge, general
//! memory). Entries of every box live in one flat array of fixed capacity;
//! each owner additionally has a singly linked chain through that array so
//! that activating a box only walks the entries that box owns.
//!
//! The hardware behind a table usually has fewer slots than a box has
//! entries. Activation programs the default entries first, then as many of the
//! box's entries as fit. Entries that did not fit are still part of the box's
//! ACL: accesses to them fault, and the fault dispatcher uses
//! [`RegionTable::lookup`] to decide that they may be emulated.

use core::cell::Cell;
use core::fmt;
use core::iter::Chain;

use crate::acl::{self, Access, AclEntry, AclFlags, BoxId, Owner};
use crate::config::{MAX_ACLS, MAX_BOXES};
use crate::errorcode::ErrorCode;
use crate::memory_map::MemoryArea;
use crate::platform::mpu::MPU;

/// Operations the monitor needs from a region table.
pub trait RegionTable {
    /// Clear the table and install the default always-on entries.
    fn init(&self) -> Result<(), ErrorCode>;

    /// Register `[start, start + size)` for `box_id`. Either the entry is
    /// added or nothing changes.
    fn add(&self, box_id: BoxId, start: usize, size: usize, flags: AclFlags)
        -> Result<(), ErrorCode>;

    /// Make the hardware enforce exactly the entries of `box_id` plus the
    /// defaults. Activating the active box again changes nothing.
    fn activate(&self, box_id: BoxId) -> Result<(), ErrorCode>;

    /// Box whose entries are currently enforced.
    fn active_box(&self) -> Option<BoxId>;

    /// Program no entry at all, so box code reaches nothing in this domain.
    fn deactivate(&self);

    /// Position to go back to with [`RegionTable::truncate`].
    fn mark(&self) -> usize;

    /// Drop every entry added after `mark` was taken.
    fn truncate(&self, mark: usize);

    /// Whether `address` belongs to a memory area this table is responsible
    /// for.
    fn handles(&self, address: usize) -> bool;

    /// The entry of `box_id` (or a default entry) that grants `access` to
    /// `[address, address + len)`.
    fn lookup(&self, box_id: BoxId, address: usize, len: usize, access: Access)
        -> Option<AclEntry>;

    /// Whether the backend flagged the last bus fault as an access violation.
    fn security_violation(&self) -> bool;

    fn clear_security_violation(&self);
}

/// Chain used for entries owned by all boxes.
const DEFAULT_CHAIN: usize = MAX_BOXES;

fn chain_of(owner: Owner) -> usize {
    match owner {
        Owner::AllBoxes => DEFAULT_CHAIN,
        Owner::Box(id) => id.index(),
    }
}

/// Region table over one protection unit.
pub struct AclTable<'a, M: MPU, const CAPACITY: usize = MAX_ACLS> {
    mpu: &'a M,
    /// Memory areas this table is responsible for.
    areas: &'a [MemoryArea],
    /// Entries installed for every box by `init()`.
    defaults: &'a [AclEntry],
    entries: [Cell<Option<AclEntry>>; CAPACITY],
    /// Next entry with the same owner.
    next: [Cell<Option<usize>>; CAPACITY],
    heads: [Cell<Option<usize>>; MAX_BOXES + 1],
    tails: [Cell<Option<usize>>; MAX_BOXES + 1],
    len: Cell<usize>,
    initialized: Cell<bool>,
    /// Box the hardware is configured for.
    active: Cell<Option<BoxId>>,
    /// An entry visible to the active box was added after activation.
    /// Otherwise switching to the same box does not reprogram the hardware.
    stale: Cell<bool>,
}

impl<'a, M: MPU, const CAPACITY: usize> AclTable<'a, M, CAPACITY> {
    pub fn new(mpu: &'a M, areas: &'a [MemoryArea], defaults: &'a [AclEntry]) -> Self {
        Self {
            mpu,
            areas,
            defaults,
            entries: [const { Cell::new(None) }; CAPACITY],
            next: [const { Cell::new(None) }; CAPACITY],
            heads: [const { Cell::new(None) }; MAX_BOXES + 1],
            tails: [const { Cell::new(None) }; MAX_BOXES + 1],
            len: Cell::new(0),
            initialized: Cell::new(false),
            active: Cell::new(None),
            stale: Cell::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Number of live entries, defaults included.
    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    /// Entries owned by `owner`, in registration order.
    pub fn entries(&self, owner: Owner) -> Entries<'_, 'a, M, CAPACITY> {
        Entries {
            table: self,
            cursor: self.heads[chain_of(owner)].get(),
        }
    }

    /// Entries enforced while `box_id` is active: defaults, then the box's own.
    fn visible(
        &self,
        box_id: BoxId,
    ) -> Chain<Entries<'_, 'a, M, CAPACITY>, Entries<'_, 'a, M, CAPACITY>> {
        self.entries(Owner::AllBoxes)
            .chain(self.entries(Owner::Box(box_id)))
    }

    fn clear(&self) {
        for (entry, next) in self.entries.iter().zip(self.next.iter()) {
            entry.set(None);
            next.set(None);
        }
        for (head, tail) in self.heads.iter().zip(self.tails.iter()) {
            head.set(None);
            tail.set(None);
        }
        self.len.set(0);
        self.active.set(None);
        self.stale.set(false);
    }

    fn link(&self, index: usize, owner: Owner) {
        let chain = chain_of(owner);
        match self.tails[chain].get() {
            Some(tail) => self.next[tail].set(Some(index)),
            None => self.heads[chain].set(Some(index)),
        }
        self.tails[chain].set(Some(index));
    }

    fn check(&self, entry: &AclEntry) -> Result<(), ErrorCode> {
        if !acl::is_aligned(entry.start()) || entry.size() == 0 || !acl::is_aligned(entry.size())
        {
            return Err(ErrorCode::Unaligned);
        }
        if !self
            .areas
            .iter()
            .any(|area| area.contains_range(entry.start(), entry.size()))
        {
            return Err(ErrorCode::UnhandledArea);
        }
        for existing in self.entries.iter().filter_map(Cell::get) {
            let duplicate = existing.owner() == entry.owner()
                && existing.start() == entry.start()
                && existing.size() == entry.size();
            let foreign = match (existing.owner(), entry.owner()) {
                (Owner::Box(a), Owner::Box(b)) => a != b,
                _ => false,
            };
            let shared = existing.flags().contains(AclFlags::SHARED)
                && entry.flags().contains(AclFlags::SHARED);
            if duplicate || (foreign && !shared && existing.overlaps(entry)) {
                return Err(ErrorCode::AlreadyExists);
            }
        }
        if self.len.get() >= CAPACITY {
            return Err(ErrorCode::CapacityExceeded);
        }
        Ok(())
    }

    fn insert(&self, entry: AclEntry) -> Result<(), ErrorCode> {
        self.check(&entry)?;

        // Entries are never removed individually, so the first free slot is
        // always at `len`.
        let index = self.len.get();
        self.entries[index].set(Some(entry));
        self.next[index].set(None);
        self.link(index, entry.owner());
        self.len.set(index + 1);

        if let Some(active) = self.active.get() {
            if entry.owner().applies_to(active) {
                self.stale.set(true);
            }
        }
        Ok(())
    }
}

impl<M: MPU, const CAPACITY: usize> RegionTable for AclTable<'_, M, CAPACITY> {
    fn init(&self) -> Result<(), ErrorCode> {
        self.clear();
        self.initialized.set(true);
        for default in self.defaults {
            let entry = AclEntry::new(
                Owner::AllBoxes,
                default.start(),
                default.size(),
                default.flags(),
            )
            .ok_or(ErrorCode::UnhandledArea)?;
            self.insert(entry)?;
        }
        self.mpu.enable_app_mpu();
        Ok(())
    }

    fn add(
        &self,
        box_id: BoxId,
        start: usize,
        size: usize,
        flags: AclFlags,
    ) -> Result<(), ErrorCode> {
        if !self.initialized.get() {
            return Err(ErrorCode::Uninitialized);
        }
        let entry = AclEntry::new(Owner::Box(box_id), start, size, flags)
            .ok_or(ErrorCode::UnhandledArea)?;
        self.insert(entry)
    }

    fn activate(&self, box_id: BoxId) -> Result<(), ErrorCode> {
        if !self.initialized.get() {
            return Err(ErrorCode::Uninitialized);
        }
        if self.active.get() == Some(box_id) && !self.stale.get() {
            return Ok(());
        }

        let slots = core::cmp::min(self.mpu.number_total_regions(), CAPACITY);
        let mut staged = [AclEntry::EMPTY; CAPACITY];
        let mut programmed = 0;
        let mut emulated = 0;
        for entry in self.visible(box_id) {
            if programmed < slots {
                staged[programmed] = entry;
                programmed += 1;
            } else {
                emulated += 1;
            }
        }

        self.mpu.configure_mpu(&staged[..programmed]);
        self.active.set(Some(box_id));
        self.stale.set(false);

        if emulated > 0 {
            log::debug!(
                "box {}: {} entries programmed, {} left to fault emulation",
                box_id,
                programmed,
                emulated
            );
        }
        Ok(())
    }

    fn active_box(&self) -> Option<BoxId> {
        self.active.get()
    }

    fn deactivate(&self) {
        self.mpu.configure_mpu(&[]);
        self.active.set(None);
        self.stale.set(false);
    }

    fn mark(&self) -> usize {
        self.len.get()
    }

    fn truncate(&self, mark: usize) {
        let len = self.len.get();
        if mark >= len {
            return;
        }
        let mut dropped_active = false;
        for slot in &self.entries[mark..len] {
            if let (Some(entry), Some(active)) = (slot.get(), self.active.get()) {
                dropped_active |= entry.owner().applies_to(active);
            }
            slot.set(None);
        }

        // Chains only ever grow at the tail, so relink what is left.
        for next in self.next.iter() {
            next.set(None);
        }
        for (head, tail) in self.heads.iter().zip(self.tails.iter()) {
            head.set(None);
            tail.set(None);
        }
        for (index, slot) in self.entries[..mark].iter().enumerate() {
            if let Some(entry) = slot.get() {
                self.link(index, entry.owner());
            }
        }
        self.len.set(mark);
        if dropped_active {
            self.stale.set(true);
        }
    }

    fn handles(&self, address: usize) -> bool {
        self.areas.iter().any(|area| area.contains(address))
    }

    fn lookup(
        &self,
        box_id: BoxId,
        address: usize,
        len: usize,
        access: Access,
    ) -> Option<AclEntry> {
        self.visible(box_id)
            .find(|entry| entry.permits(address, len, access))
    }

    fn security_violation(&self) -> bool {
        self.mpu.security_violation()
    }

    fn clear_security_violation(&self) {
        self.mpu.clear_security_violation();
    }
}

impl<M: MPU, const CAPACITY: usize> fmt::Display for AclTable<'_, M, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\r\n ACL table ({}/{})", self.len.get(), CAPACITY)?;
        for entry in self.entries.iter().filter_map(Cell::get) {
            write!(f, "\r\n  {}", entry)?;
        }
        write!(f, "\r\n")
    }
}

/// Iterator over the chain of one owner.
pub struct Entries<'t, 'a, M: MPU, const CAPACITY: usize> {
    table: &'t AclTable<'a, M, CAPACITY>,
    cursor: Option<usize>,
}

impl<M: MPU, const CAPACITY: usize> Iterator for Entries<'_, '_, M, CAPACITY> {
    type Item = AclEntry;

    fn next(&mut self) -> Option<AclEntry> {
        let index = self.cursor?;
        self.cursor = self.table.next[index].get();
        self.table.entries[index].get()
    }
}
