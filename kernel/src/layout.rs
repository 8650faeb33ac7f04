// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Stack and context placement for boxes.
//!
//! Secondary boxes get their stack and context carved out of one arena that
//! starts just past the monitor's reserved memory. Each carve-out is followed
//! by a guard band of [`STACK_BAND_SIZE`] bytes that no box owns, so a stack
//! overflow in one box faults instead of corrupting its neighbor:
//!
//! ```text
//!  reserved_end  band  stack(1)  band  ctx(1)  band  stack(2)  band ...
//! ─────────────┼──────┼────────┼──────┼──────┼──────┼────────┼──────┼──▶
//!                     ^ cursor grows monotonically
//! ```
//!
//! The main box keeps running on the stack it booted with and has no context.

use core::fmt;

use crate::acl::{self, AclFlags, BoxId};
use crate::config::{MAX_BOXES, STACK_BAND_SIZE};
use crate::halt::{self, Halt, VmpuError};
use crate::platform::system::SystemControl;
use crate::region_table::RegionTable;
use crate::vmpu::Vmpu;

/// Memory the monitor keeps for itself, as reported by the linker.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoxConfig {
    pub reserved_start: usize,
    pub reserved_end: usize,
}

/// Where a box's stack and context ended up.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoxContext {
    /// Initial stack pointer (one past the top of the stack).
    pub stack_pointer: usize,
    /// Start of the context block, `None` if the box has no context.
    pub context: Option<usize>,
    pub stack_size: usize,
    pub context_size: usize,
}

/// Bump allocator for box stacks and contexts.
///
/// Created by [`crate::boot::init`]. Only setup code holds it, and it is
/// consumed by [`BoxLayoutAllocator::finish`] once every box is placed.
pub struct BoxLayoutAllocator {
    cursor: usize,
    boxes: [Option<BoxContext>; MAX_BOXES],
}

impl BoxLayoutAllocator {
    pub(crate) fn new(base: usize) -> BoxLayoutAllocator {
        BoxLayoutAllocator {
            cursor: base,
            boxes: [None; MAX_BOXES],
        }
    }

    /// Next free address of the arena.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn context(&self, box_id: BoxId) -> Option<&BoxContext> {
        self.boxes[box_id.index()].as_ref()
    }

    /// Place the stack and context of `box_id`, halting on failure.
    pub fn setup_stack_and_context<P, G, S, H>(
        &mut self,
        vmpu: &Vmpu<'_, P, G, S, H>,
        box_id: u8,
        context_size: usize,
        stack_size: usize,
    ) -> BoxContext
    where
        P: RegionTable,
        G: RegionTable,
        S: SystemControl,
        H: Halt,
    {
        match self.try_setup_stack_and_context(vmpu, box_id, context_size, stack_size) {
            Ok(context) => context,
            Err(err) => halt::halt_on(vmpu.halt(), err),
        }
    }

    /// Place the stack and context of `box_id` and register the ACLs that
    /// let the box use them.
    ///
    /// Box 0 must ask for nothing and gets the current process stack pointer.
    /// Every other box may be set up once. Either both the cursor and the ACLs
    /// reflect the whole request, or neither changes.
    pub fn try_setup_stack_and_context<P, G, S, H>(
        &mut self,
        vmpu: &Vmpu<'_, P, G, S, H>,
        box_id: u8,
        context_size: usize,
        stack_size: usize,
    ) -> Result<BoxContext, VmpuError>
    where
        P: RegionTable,
        G: RegionTable,
        S: SystemControl,
        H: Halt,
    {
        let id = BoxId::new(usize::from(box_id))
            .ok_or(VmpuError::BoxOutOfRange(usize::from(box_id)))?;
        if self.boxes[id.index()].is_some() {
            return Err(VmpuError::BoxAlreadySetUp(id));
        }

        let placed = if id.is_main() {
            if context_size != 0 || stack_size != 0 {
                return Err(VmpuError::MainBoxAllocation {
                    context: context_size,
                    stack: stack_size,
                });
            }
            BoxContext {
                stack_pointer: vmpu.system().process_stack_pointer(),
                context: None,
                stack_size: 0,
                context_size: 0,
            }
        } else {
            let (placed, cursor) = self.carve(vmpu, box_id, context_size, stack_size)?;
            self.cursor = cursor;
            placed
        };

        self.boxes[id.index()] = Some(placed);
        Ok(placed)
    }

    fn carve<P, G, S, H>(
        &self,
        vmpu: &Vmpu<'_, P, G, S, H>,
        box_id: u8,
        context_size: usize,
        stack_size: usize,
    ) -> Result<(BoxContext, usize), VmpuError>
    where
        P: RegionTable,
        G: RegionTable,
        S: SystemControl,
        H: Halt,
    {
        let stack_size =
            acl::round_up(acl::min_stack(stack_size)).ok_or(VmpuError::ArenaExhausted)?;
        let stack_start = self.cursor;
        let stack_pointer = stack_start
            .checked_add(stack_size)
            .ok_or(VmpuError::ArenaExhausted)?;
        let mut cursor = stack_pointer
            .checked_add(STACK_BAND_SIZE)
            .ok_or(VmpuError::ArenaExhausted)?;

        let (context, context_size) = if context_size == 0 {
            (None, 0)
        } else {
            let context_size = acl::round_up(context_size).ok_or(VmpuError::ArenaExhausted)?;
            let context_start = cursor;
            cursor = context_start
                .checked_add(context_size)
                .and_then(|end| end.checked_add(STACK_BAND_SIZE))
                .ok_or(VmpuError::ArenaExhausted)?;
            (Some(context_start), context_size)
        };

        let mark = vmpu.mark();
        let registered = vmpu
            .try_acl_add(box_id, stack_start, stack_size, AclFlags::STACK)
            .and_then(|()| match context {
                Some(context_start) => {
                    vmpu.try_acl_add(box_id, context_start, context_size, AclFlags::DATA)
                }
                None => Ok(()),
            });
        if let Err(err) = registered {
            vmpu.rollback(mark);
            return Err(err);
        }

        Ok((
            BoxContext {
                stack_pointer,
                context,
                stack_size,
                context_size,
            },
            cursor,
        ))
    }

    /// Freeze the layout once all boxes are placed.
    pub fn finish(self) -> BoxLayout {
        BoxLayout {
            arena_end: self.cursor,
            boxes: self.boxes,
        }
    }
}

/// Read-only view of the final box layout.
#[derive(Clone, Copy, Debug)]
pub struct BoxLayout {
    arena_end: usize,
    boxes: [Option<BoxContext>; MAX_BOXES],
}

impl BoxLayout {
    pub fn context(&self, box_id: BoxId) -> Option<&BoxContext> {
        self.boxes[box_id.index()].as_ref()
    }

    /// First address past every box stack and context.
    pub fn arena_end(&self) -> usize {
        self.arena_end
    }
}

impl fmt::Display for BoxLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, placed) in self.boxes.iter().enumerate() {
            if let Some(placed) = placed {
                write!(f, "box {}: sp={:#010X}", i, placed.stack_pointer)?;
                if let Some(context) = placed.context {
                    write!(f, " ctx={:#010X}+{}", context, placed.context_size)?;
                }
                writeln!(f)?;
            }
        }
        write!(f, "arena end {:#010X}", self.arena_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Owner;
    use crate::config::MIN_STACK_SIZE;
    use crate::errorcode::ErrorCode;
    use crate::region_table::AclTable;
    use crate::testing::*;

    const BASE: usize = 0x2000_1000;

    macro_rules! setup {
        ($mpu:ident, $system:ident, $general:ident, $vmpu:ident) => {
            let $mpu = SimMpu::new(8);
            let $system = SimSystem::new();
            let periph = peripheral_table(&$mpu);
            let $general = general_table(&$mpu);
            periph.init().unwrap();
            $general.init().unwrap();
            let $vmpu = Vmpu::new(&periph, &$general, &$system, &PanicHalt, &MEMORY_MAP);
        };
    }

    fn id(raw: usize) -> BoxId {
        BoxId::new(raw).unwrap()
    }

    #[test]
    fn main_box_uses_current_stack() {
        setup!(mpu, system, general, vmpu);
        system.psp.set(0x2000_0F00);
        let mut layout = BoxLayoutAllocator::new(BASE);
        let main = layout.try_setup_stack_and_context(&vmpu, 0, 0, 0).unwrap();
        assert_eq!(main.stack_pointer, 0x2000_0F00);
        assert_eq!(main.context, None);
        assert_eq!(layout.cursor(), BASE);
        assert!(general.is_empty());
    }

    #[test]
    fn main_box_cannot_request_memory() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        assert_eq!(
            layout.try_setup_stack_and_context(&vmpu, 0, 64, 0),
            Err(VmpuError::MainBoxAllocation {
                context: 64,
                stack: 0
            })
        );
        assert_eq!(layout.cursor(), BASE);
        assert!(layout.context(BoxId::MAIN).is_none());
    }

    #[test]
    fn stack_then_band_then_context() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        let placed = layout
            .try_setup_stack_and_context(&vmpu, 1, 100, 2000)
            .unwrap();

        // 2000 rounds up to 2016, 100 to 128.
        assert_eq!(placed.stack_size, 2016);
        assert_eq!(placed.stack_pointer, BASE + 2016);
        assert_eq!(placed.context, Some(BASE + 2016 + STACK_BAND_SIZE));
        assert_eq!(placed.context_size, 128);
        assert_eq!(
            layout.cursor(),
            BASE + 2016 + STACK_BAND_SIZE + 128 + STACK_BAND_SIZE
        );

        let acls: std::vec::Vec<_> = general.entries(Owner::Box(id(1))).collect();
        assert_eq!(acls.len(), 2);
        assert_eq!((acls[0].start(), acls[0].size()), (BASE, 2016));
        assert_eq!(acls[0].flags(), AclFlags::STACK);
        assert_eq!(
            (acls[1].start(), acls[1].size()),
            (BASE + 2016 + STACK_BAND_SIZE, 128)
        );
    }

    #[test]
    fn small_stacks_get_the_floor() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        let placed = layout.try_setup_stack_and_context(&vmpu, 2, 0, 16).unwrap();
        assert_eq!(placed.stack_size, MIN_STACK_SIZE);
        assert_eq!(placed.context, None);
        assert_eq!(layout.cursor(), BASE + MIN_STACK_SIZE + STACK_BAND_SIZE);
        assert_eq!(general.entries(Owner::Box(id(2))).count(), 1);
    }

    #[test]
    fn carve_outs_are_monotonic_and_disjoint() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        let mut previous_end = BASE;
        for (box_id, context, stack) in [(1u8, 40, 1024), (2, 0, 3000), (3, 500, 0), (4, 33, 1)] {
            let before = layout.cursor();
            let placed = layout
                .try_setup_stack_and_context(&vmpu, box_id, context, stack)
                .unwrap();
            let stack_start = placed.stack_pointer - placed.stack_size;
            assert!(stack_start >= previous_end);
            assert_eq!(stack_start, before);
            assert!(layout.cursor() > before);
            if let Some(ctx) = placed.context {
                assert_eq!(ctx, placed.stack_pointer + STACK_BAND_SIZE);
            }
            previous_end = layout.cursor();
        }
        assert_eq!(general.len(), 4 + 3);
    }

    #[test]
    fn each_box_is_set_up_once() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        layout.try_setup_stack_and_context(&vmpu, 1, 0, 0).unwrap();
        let cursor = layout.cursor();
        assert_eq!(
            layout.try_setup_stack_and_context(&vmpu, 1, 0, 0),
            Err(VmpuError::BoxAlreadySetUp(id(1)))
        );
        assert_eq!(
            layout.try_setup_stack_and_context(&vmpu, 9, 0, 0),
            Err(VmpuError::BoxOutOfRange(9))
        );
        assert_eq!(layout.cursor(), cursor);
        assert_eq!(general.len(), 1);
    }

    #[test]
    fn rejected_acl_leaves_cursor_alone() {
        setup!(mpu, system, general, vmpu);
        // Arena past the end of SRAM.
        let mut layout = BoxLayoutAllocator::new(0x2003_0000);
        let err = layout
            .try_setup_stack_and_context(&vmpu, 1, 0, 0)
            .unwrap_err();
        assert_eq!(err, VmpuError::UnhandledArea);
        assert_eq!(layout.cursor(), 0x2003_0000);
        assert!(layout.context(id(1)).is_none());
        assert!(general.is_empty());
    }

    #[test]
    fn context_rejection_drops_the_stack_acl() {
        let mpu = SimMpu::new(8);
        let system = SimSystem::new();
        let periph = peripheral_table(&mpu);
        let general: AclTable<'_, SimMpu, 1> = AclTable::new(&mpu, &GENERAL_AREAS, &[]);
        periph.init().unwrap();
        general.init().unwrap();
        let vmpu = Vmpu::new(&periph, &general, &system, &PanicHalt, &MEMORY_MAP);
        let mut layout = BoxLayoutAllocator::new(BASE);

        assert_eq!(
            layout.try_setup_stack_and_context(&vmpu, 1, 64, 0),
            Err(VmpuError::Rejected(ErrorCode::CapacityExceeded))
        );
        assert_eq!(layout.cursor(), BASE);
        assert!(layout.context(id(1)).is_none());
        assert!(general.is_empty());

        // Without a context the same box fits.
        let placed = layout.try_setup_stack_and_context(&vmpu, 1, 0, 0).unwrap();
        assert_eq!(placed.stack_pointer, BASE + MIN_STACK_SIZE);
        assert_eq!(general.len(), 1);
    }

    #[test]
    #[should_panic(expected = "halt SanityCheckFailed")]
    fn halting_form_stops_on_main_box_request() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        layout.setup_stack_and_context(&vmpu, 0, 0, 256);
    }

    #[test]
    fn finished_layout_reports_placement() {
        setup!(mpu, system, general, vmpu);
        let mut layout = BoxLayoutAllocator::new(BASE);
        layout.try_setup_stack_and_context(&vmpu, 0, 0, 0).unwrap();
        let placed = layout.try_setup_stack_and_context(&vmpu, 1, 64, 0).unwrap();
        let cursor = layout.cursor();
        let frozen = layout.finish();
        assert_eq!(frozen.arena_end(), cursor);
        assert_eq!(frozen.context(id(1)), Some(&placed));
        assert!(frozen.context(id(2)).is_none());
    }
}
