// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! System exception multiplexer.
//!
//! Every fault exception is routed to [`FaultDispatcher::sys_mux_handler`].
//! Memory management, usage, hard and debug faults always stop the system. A
//! bus fault is resumable only if it was caused by a load that the running
//! box is allowed to perform; such a load is replayed with monitor privileges
//! and the box continues after the faulting instruction. Anything else raised
//! on this vector is not a system exception and is refused.

use core::fmt;

use crate::acl::{Access, BoxId};
use crate::emulate;
use crate::halt::{Halt, HaltKind};
use crate::platform::frame::{ExceptionFrame, FrameValidator};
use crate::platform::system::{BusFaultStatus, PrivilegedBus, SystemControl};
use crate::region_table::RegionTable;
use crate::vmpu::Vmpu;

/// Exception numbers in the IRQn convention: system exceptions are negative,
/// external interrupts start at 0.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExceptionKind {
    ThreadMode,
    NonMaskableInt,
    HardFault,
    MemoryManagement,
    BusFault,
    UsageFault,
    SVCall,
    DebugMonitor,
    PendSV,
    SysTick,
    Reserved(i32),
    Interrupt(u16),
}

/// What the dispatcher does about an exception kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FaultClass {
    Fatal(HaltKind),
    ValidateBusAccess,
    Unexpected,
}

impl ExceptionKind {
    /// Decode the exception number held in the low bits of IPSR.
    pub fn from_ipsr(ipsr: u32) -> ExceptionKind {
        let irqn = (ipsr & 0x1FF) as i32 - 16;
        match irqn {
            -16 => ExceptionKind::ThreadMode,
            -14 => ExceptionKind::NonMaskableInt,
            -13 => ExceptionKind::HardFault,
            -12 => ExceptionKind::MemoryManagement,
            -11 => ExceptionKind::BusFault,
            -10 => ExceptionKind::UsageFault,
            -5 => ExceptionKind::SVCall,
            -4 => ExceptionKind::DebugMonitor,
            -2 => ExceptionKind::PendSV,
            -1 => ExceptionKind::SysTick,
            n if n >= 0 => ExceptionKind::Interrupt(n as u16),
            n => ExceptionKind::Reserved(n),
        }
    }

    pub fn irqn(self) -> i32 {
        match self {
            ExceptionKind::ThreadMode => -16,
            ExceptionKind::NonMaskableInt => -14,
            ExceptionKind::HardFault => -13,
            ExceptionKind::MemoryManagement => -12,
            ExceptionKind::BusFault => -11,
            ExceptionKind::UsageFault => -10,
            ExceptionKind::SVCall => -5,
            ExceptionKind::DebugMonitor => -4,
            ExceptionKind::PendSV => -2,
            ExceptionKind::SysTick => -1,
            ExceptionKind::Reserved(n) => n,
            ExceptionKind::Interrupt(n) => i32::from(n),
        }
    }

    pub fn class(self) -> FaultClass {
        match self {
            ExceptionKind::MemoryManagement => FaultClass::Fatal(HaltKind::FaultMemManage),
            ExceptionKind::BusFault => FaultClass::ValidateBusAccess,
            ExceptionKind::UsageFault => FaultClass::Fatal(HaltKind::FaultUsage),
            ExceptionKind::HardFault => FaultClass::Fatal(HaltKind::FaultHard),
            ExceptionKind::DebugMonitor => FaultClass::Fatal(HaltKind::FaultDebug),
            _ => FaultClass::Unexpected,
        }
    }
}

/// Diagnostic state captured for a fatal fault.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FaultRecord {
    pub kind: ExceptionKind,
    pub exc_return: u32,
    pub frame: Option<ExceptionFrame>,
    pub bus: Option<BusFaultStatus>,
    pub box_id: Option<BoxId>,
    pub reason: &'static str,
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} (IRQn {}) lr={:#010X}: {}",
            self.kind,
            self.kind.irqn(),
            self.exc_return,
            self.reason
        )?;
        if let Some(box_id) = self.box_id {
            write!(f, "\r\n  box: {}", box_id)?;
        }
        if let Some(bus) = self.bus {
            write!(f, "\r\n  precise: {}", bus.precise)?;
            if let Some(address) = bus.address {
                write!(f, " address: {:#010X}", address)?;
            }
        }
        if let Some(frame) = self.frame {
            write!(f, "{}", frame)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FaultAction {
    /// Return to the interrupted box code.
    Resume,
    Halt(HaltKind, FaultRecord),
}

pub struct FaultDispatcher<'a, P, G, S, H, F, B>
where
    P: RegionTable,
    G: RegionTable,
    S: SystemControl,
    H: Halt,
    F: FrameValidator,
    B: PrivilegedBus,
{
    vmpu: &'a Vmpu<'a, P, G, S, H>,
    validator: &'a F,
    bus: &'a B,
}

impl<'a, P, G, S, H, F, B> FaultDispatcher<'a, P, G, S, H, F, B>
where
    P: RegionTable,
    G: RegionTable,
    S: SystemControl,
    H: Halt,
    F: FrameValidator,
    B: PrivilegedBus,
{
    pub fn new(vmpu: &'a Vmpu<'a, P, G, S, H>, validator: &'a F, bus: &'a B) -> Self {
        Self {
            vmpu,
            validator,
            bus,
        }
    }

    /// Entry point of the fault vectors. Returns only if the faulting code
    /// may resume.
    pub fn sys_mux_handler(&self, exc_return: u32) {
        match self.dispatch(exc_return) {
            FaultAction::Resume => {}
            FaultAction::Halt(kind, record) => {
                log::error!("{}", record);
                self.vmpu.halt().halt(kind, format_args!("{}", record))
            }
        }
    }

    /// Decide what to do about the active exception without acting on it.
    pub fn dispatch(&self, exc_return: u32) -> FaultAction {
        let kind = ExceptionKind::from_ipsr(self.vmpu.system().active_exception());
        let record = FaultRecord {
            kind,
            exc_return,
            frame: None,
            bus: None,
            box_id: self.vmpu.active_box(),
            reason: "fault",
        };

        match kind.class() {
            FaultClass::Fatal(halt) => FaultAction::Halt(halt, record),
            FaultClass::Unexpected => FaultAction::Halt(
                HaltKind::NotAllowed,
                FaultRecord {
                    reason: "not a system interrupt",
                    ..record
                },
            ),
            FaultClass::ValidateBusAccess => self.bus_fault(record),
        }
    }

    fn bus_fault(&self, record: FaultRecord) -> FaultAction {
        let system = self.vmpu.system();
        let status = system.bus_fault_status();
        let record = FaultRecord {
            bus: Some(status),
            ..record
        };

        let psp = system.process_stack_pointer();
        let mut frame = match self.validator.validate_frame(record.exc_return, psp) {
            Some(frame) => frame,
            None => {
                return FaultAction::Halt(
                    HaltKind::NotAllowed,
                    FaultRecord {
                        reason: "untrusted exception frame",
                        ..record
                    },
                )
            }
        };
        // SAFETY: the validator hands out a valid frame that nothing else
        // touches until the exception returns.
        let frame = unsafe { frame.as_mut() };

        match self.emulate_load(frame, &status, record.box_id) {
            Ok(()) => {
                system.clear_bus_fault_status();
                // The replayed access was permitted, so whatever the protection
                // unit latched for it must not classify the next fault.
                self.vmpu.clear_security_violation();
                FaultAction::Resume
            }
            Err(reason) => {
                // A protection unit rejection is a violation, anything else a
                // genuine bus error.
                let halt = if self.vmpu.security_violation() {
                    HaltKind::NotAllowed
                } else {
                    HaltKind::FaultBus
                };
                FaultAction::Halt(
                    halt,
                    FaultRecord {
                        frame: Some(*frame),
                        reason,
                        ..record
                    },
                )
            }
        }
    }

    /// Replay the faulting load if the active box may perform it.
    fn emulate_load(
        &self,
        frame: &mut ExceptionFrame,
        status: &BusFaultStatus,
        box_id: Option<BoxId>,
    ) -> Result<(), &'static str> {
        if !status.precise {
            return Err("imprecise bus fault");
        }
        let address = status.address.ok_or("no fault address")?;
        if frame.in_it_block() {
            return Err("load inside IT block");
        }
        let box_id = box_id.ok_or("no active box")?;

        // SAFETY: the stacked PC of a precise fault points at the faulting
        // instruction.
        let load = unsafe { emulate::fetch(self.bus, frame.pc as usize) }
            .ok_or("not an emulated load")?;
        if frame.register(load.rt).is_none() {
            return Err("destination register not stacked");
        }
        let len = load.width.bytes();
        if address % len != 0 {
            return Err("unaligned load");
        }
        self.vmpu
            .lookup(box_id, address, len, Access::Read)
            .ok_or("access denied")?;

        // SAFETY: the active box holds an ACL granting this read and the
        // address is aligned for the width.
        let raw = unsafe { self.bus.read(address, load.width) };
        frame.set_register(load.rt, emulate::extend(raw, load.width, load.signed));
        frame.pc = frame.pc.wrapping_add(load.length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::AclFlags;
    use crate::testing::*;

    const EXC_RETURN_PSP: u32 = 0xFFFF_FFFD;
    const CODE: usize = 0x0000_4000;
    const PERIPH: usize = 0x4003_8000;

    fn ipsr(kind: ExceptionKind) -> u32 {
        (kind.irqn() + 16) as u32
    }

    struct Hw {
        periph_mpu: SimMpu,
        general_mpu: SimMpu,
        system: SimSystem,
        validator: SimValidator,
        bus: SimBus,
    }

    impl Hw {
        fn new() -> Hw {
            let hw = Hw {
                periph_mpu: SimMpu::new(4),
                general_mpu: SimMpu::new(4),
                system: SimSystem::new(),
                validator: SimValidator::new(),
                bus: SimBus::new(),
            };
            hw.system.ipsr.set(ipsr(ExceptionKind::BusFault));
            hw
        }

        fn bus_fault_at(&self, address: usize) {
            self.system.bus_fault.set(BusFaultStatus {
                precise: true,
                address: Some(address),
            });
        }
    }

    macro_rules! setup {
        ($hw:ident, $vmpu:ident, $dispatcher:ident) => {
            let $hw = Hw::new();
            let periph = peripheral_table(&$hw.periph_mpu);
            let general = general_table(&$hw.general_mpu);
            periph.init().unwrap();
            general.init().unwrap();
            let $vmpu = Vmpu::new(&periph, &general, &$hw.system, &PanicHalt, &MEMORY_MAP);
            $vmpu
                .try_acl_add(1, PERIPH, 0x1000, AclFlags::PERIPH)
                .unwrap();
            $vmpu
                .try_acl_add(2, PERIPH + 0x1000, 0x1000, AclFlags::PERIPH)
                .unwrap();
            $vmpu.try_switch(BoxId::MAIN, id(1)).unwrap();
            let $dispatcher = FaultDispatcher::new(&$vmpu, &$hw.validator, &$hw.bus);
        };
    }

    fn id(raw: usize) -> BoxId {
        BoxId::new(raw).unwrap()
    }

    fn frame_at(pc: usize) -> ExceptionFrame {
        ExceptionFrame {
            r0: 0x1111_1111,
            pc: pc as u32,
            xpsr: 0x0100_0000,
            ..ExceptionFrame::default()
        }
    }

    #[test]
    fn exception_numbers() {
        assert_eq!(ExceptionKind::from_ipsr(0), ExceptionKind::ThreadMode);
        assert_eq!(ExceptionKind::from_ipsr(3), ExceptionKind::HardFault);
        assert_eq!(ExceptionKind::from_ipsr(4), ExceptionKind::MemoryManagement);
        assert_eq!(ExceptionKind::from_ipsr(5), ExceptionKind::BusFault);
        assert_eq!(ExceptionKind::from_ipsr(12), ExceptionKind::DebugMonitor);
        assert_eq!(ExceptionKind::from_ipsr(8), ExceptionKind::Reserved(-8));
        assert_eq!(ExceptionKind::from_ipsr(16 + 37), ExceptionKind::Interrupt(37));
        // Bits above the exception number are ignored.
        assert_eq!(ExceptionKind::from_ipsr(0x0100_0006), ExceptionKind::UsageFault);
        assert_eq!(ExceptionKind::Interrupt(37).irqn(), 37);
        assert_eq!(ExceptionKind::SysTick.irqn(), -1);
    }

    #[test]
    fn fatal_faults_map_to_their_halt_kind() {
        setup!(hw, vmpu, dispatcher);
        for (kind, halt) in [
            (ExceptionKind::MemoryManagement, HaltKind::FaultMemManage),
            (ExceptionKind::UsageFault, HaltKind::FaultUsage),
            (ExceptionKind::HardFault, HaltKind::FaultHard),
            (ExceptionKind::DebugMonitor, HaltKind::FaultDebug),
        ] {
            hw.system.ipsr.set(ipsr(kind));
            match dispatcher.dispatch(EXC_RETURN_PSP) {
                FaultAction::Halt(got, record) => {
                    assert_eq!(got, halt);
                    assert_eq!(record.kind, kind);
                    assert_eq!(record.box_id, Some(id(1)));
                }
                FaultAction::Resume => panic!("{:?} resumed", kind),
            }
        }
    }

    #[test]
    fn other_exceptions_are_refused() {
        setup!(hw, vmpu, dispatcher);
        for kind in [
            ExceptionKind::Interrupt(3),
            ExceptionKind::SVCall,
            ExceptionKind::ThreadMode,
        ] {
            hw.system.ipsr.set(ipsr(kind));
            match dispatcher.dispatch(EXC_RETURN_PSP) {
                FaultAction::Halt(HaltKind::NotAllowed, record) => {
                    assert_eq!(record.reason, "not a system interrupt")
                }
                other => panic!("{:?}", other),
            }
        }
    }

    #[test]
    fn permitted_load_is_replayed() {
        setup!(hw, vmpu, dispatcher);
        // ldr r0, [r1, #4]
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus.write_u32(PERIPH + 4, 0xDEAD_BEEF);
        hw.bus_fault_at(PERIPH + 4);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);

        assert_eq!(dispatcher.dispatch(EXC_RETURN_PSP), FaultAction::Resume);
        assert_eq!(frame.r0, 0xDEAD_BEEF);
        assert_eq!(frame.pc, (CODE + 2) as u32);
        assert!(hw.system.bus_fault_cleared.get());
        assert_eq!(
            hw.validator.seen.get(),
            Some((EXC_RETURN_PSP, hw.system.psp.get()))
        );
    }

    #[test]
    fn replay_clears_the_violation_latch() {
        setup!(hw, vmpu, dispatcher);
        // ldr r0, [r1, #4]
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus_fault_at(PERIPH + 4);
        hw.periph_mpu.set_violation(true);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);
        assert_eq!(dispatcher.dispatch(EXC_RETURN_PSP), FaultAction::Resume);
        assert!(!vmpu.security_violation());

        // A later genuine bus error is reported as such.
        hw.bus_fault_at(0x2000_0000);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);
        match dispatcher.dispatch(EXC_RETURN_PSP) {
            FaultAction::Halt(kind, _) => assert_eq!(kind, HaltKind::FaultBus),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn wide_signed_load_is_replayed() {
        setup!(hw, vmpu, dispatcher);
        // ldrsb.w r12, [r3, #16]
        hw.bus.write_u16(CODE, 0xF993);
        hw.bus.write_u16(CODE + 2, 0xC010);
        hw.bus.write(PERIPH + 0x10, &[0xF0]);
        hw.bus_fault_at(PERIPH + 0x10);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);

        assert_eq!(dispatcher.dispatch(EXC_RETURN_PSP), FaultAction::Resume);
        assert_eq!(frame.r12, 0xFFFF_FFF0);
        assert_eq!(frame.pc, (CODE + 4) as u32);
    }

    #[test]
    fn other_box_memory_is_a_violation() {
        setup!(hw, vmpu, dispatcher);
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus_fault_at(PERIPH + 0x1004);
        hw.periph_mpu.set_violation(true);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);

        match dispatcher.dispatch(EXC_RETURN_PSP) {
            FaultAction::Halt(HaltKind::NotAllowed, record) => {
                assert_eq!(record.reason, "access denied");
                assert_eq!(record.frame, Some(frame_at(CODE)));
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(frame.r0, 0x1111_1111);
        assert!(!hw.system.bus_fault_cleared.get());
    }

    #[test]
    fn bus_error_without_violation_is_a_bus_fault() {
        setup!(hw, vmpu, dispatcher);
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus_fault_at(0x6000_0000);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);

        assert!(matches!(
            dispatcher.dispatch(EXC_RETURN_PSP),
            FaultAction::Halt(HaltKind::FaultBus, _)
        ));
    }

    #[test]
    fn only_precise_stacked_loads_are_replayed() {
        setup!(hw, vmpu, dispatcher);
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus.write_u16(CODE + 2, 0x6048);
        hw.bus.write_u16(CODE + 4, 0x684C);

        let cases: [(usize, BusFaultStatus, u32, &str); 5] = [
            (
                CODE,
                BusFaultStatus {
                    precise: false,
                    address: Some(PERIPH),
                },
                0x0100_0000,
                "imprecise bus fault",
            ),
            (
                CODE,
                BusFaultStatus {
                    precise: true,
                    address: None,
                },
                0x0100_0000,
                "no fault address",
            ),
            (
                CODE,
                BusFaultStatus {
                    precise: true,
                    address: Some(PERIPH),
                },
                0x0100_0C00,
                "load inside IT block",
            ),
            (
                CODE + 2,
                BusFaultStatus {
                    precise: true,
                    address: Some(PERIPH),
                },
                0x0100_0000,
                "not an emulated load",
            ),
            (
                // ldr r4, [r1, #4]
                CODE + 4,
                BusFaultStatus {
                    precise: true,
                    address: Some(PERIPH),
                },
                0x0100_0000,
                "destination register not stacked",
            ),
        ];

        for (pc, status, xpsr, reason) in cases {
            hw.system.bus_fault.set(status);
            let mut frame = frame_at(pc);
            frame.xpsr = xpsr;
            hw.validator.trust(&mut frame);
            match dispatcher.dispatch(EXC_RETURN_PSP) {
                FaultAction::Halt(HaltKind::FaultBus, record) => assert_eq!(record.reason, reason),
                other => panic!("{}: {:?}", reason, other),
            }
        }
    }

    #[test]
    fn untrusted_frame_is_refused() {
        setup!(hw, vmpu, dispatcher);
        hw.bus_fault_at(PERIPH);
        match dispatcher.dispatch(0xFFFF_FFF9) {
            FaultAction::Halt(HaltKind::NotAllowed, record) => {
                assert_eq!(record.reason, "untrusted exception frame");
                assert_eq!(record.frame, None);
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(hw.bus.reads(), 0);
    }

    #[test]
    fn handler_returns_after_replay() {
        setup!(hw, vmpu, dispatcher);
        hw.bus.write_u16(CODE, 0x6848);
        hw.bus_fault_at(PERIPH + 4);
        let mut frame = frame_at(CODE);
        hw.validator.trust(&mut frame);
        dispatcher.sys_mux_handler(EXC_RETURN_PSP);
        assert_eq!(frame.r0, 0);
    }

    #[test]
    #[should_panic(expected = "halt FaultMemManage")]
    fn handler_halts_on_memory_management_fault() {
        setup!(hw, vmpu, dispatcher);
        hw.system.ipsr.set(ipsr(ExceptionKind::MemoryManagement));
        dispatcher.sys_mux_handler(EXC_RETURN_PSP);
    }
}
