// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Decoding of Thumb load instructions.
//!
//! When a box performs a load that its ACLs permit but the protection unit
//! cannot express (for example because the box has more ACLs than the unit
//! has slots), the access raises a bus fault. The fault dispatcher then
//! performs the load on the box's behalf. This module recognizes the loads
//! it can replay: a single destination register, no base writeback and no
//! side effect besides the read itself.

use crate::platform::system::{AccessWidth, PrivilegedBus};

/// A load that can be replayed with monitor privileges.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LoadInstruction {
    /// Destination register.
    pub rt: u8,
    pub width: AccessWidth,
    /// Sign-extend the loaded value to 32 bits.
    pub signed: bool,
    /// Instruction length in bytes.
    pub length: u32,
}

/// Whether `first` is the first halfword of a 32-bit Thumb-2 instruction.
pub const fn is_32bit(first: u16) -> bool {
    (first >> 11) >= 0b11101
}

/// Decode the load at the given halfwords. `second` is ignored for 16-bit
/// encodings.
pub fn decode(first: u16, second: u16) -> Option<LoadInstruction> {
    if is_32bit(first) {
        decode_32(first, second)
    } else {
        decode_16(first)
    }
}

fn load(rt: u16, width: AccessWidth, signed: bool, length: u32) -> Option<LoadInstruction> {
    Some(LoadInstruction {
        rt: rt as u8,
        width,
        signed,
        length,
    })
}

fn decode_16(first: u16) -> Option<LoadInstruction> {
    let low_rt = first & 0x7;
    let high_rt = (first >> 8) & 0x7;

    match first & 0xF800 {
        // LDR/LDRB/LDRH (immediate)
        0x6800 => return load(low_rt, AccessWidth::Word, false, 2),
        0x7800 => return load(low_rt, AccessWidth::Byte, false, 2),
        0x8800 => return load(low_rt, AccessWidth::Halfword, false, 2),
        // LDR (SP relative), LDR (literal)
        0x9800 | 0x4800 => return load(high_rt, AccessWidth::Word, false, 2),
        _ => {}
    }

    // Register offset forms.
    match first & 0xFE00 {
        0x5800 => load(low_rt, AccessWidth::Word, false, 2),
        0x5A00 => load(low_rt, AccessWidth::Halfword, false, 2),
        0x5C00 => load(low_rt, AccessWidth::Byte, false, 2),
        0x5600 => load(low_rt, AccessWidth::Byte, true, 2),
        0x5E00 => load(low_rt, AccessWidth::Halfword, true, 2),
        _ => None,
    }
}

fn decode_32(first: u16, second: u16) -> Option<LoadInstruction> {
    let rt = second >> 12;
    // SP is not a data register and PC as destination is a branch or a hint.
    if rt == 13 || rt == 15 {
        return None;
    }
    let rn = first & 0xF;

    let (width, signed, imm12) = match first & 0xFFF0 {
        0xF8D0 => (AccessWidth::Word, false, true),
        0xF890 => (AccessWidth::Byte, false, true),
        0xF8B0 => (AccessWidth::Halfword, false, true),
        0xF990 => (AccessWidth::Byte, true, true),
        0xF9B0 => (AccessWidth::Halfword, true, true),
        0xF850 => (AccessWidth::Word, false, false),
        0xF810 => (AccessWidth::Byte, false, false),
        0xF830 => (AccessWidth::Halfword, false, false),
        0xF910 => (AccessWidth::Byte, true, false),
        0xF930 => (AccessWidth::Halfword, true, false),
        _ => return None,
    };

    // With Rn = PC every form is a literal load with a 12-bit offset.
    if imm12 || rn == 15 {
        return load(rt, width, signed, 4);
    }

    if second & 0x0800 != 0 {
        // imm8 form: only P = 1, W = 0 leaves the base register untouched.
        if second & 0x0500 == 0x0400 {
            load(rt, width, signed, 4)
        } else {
            None
        }
    } else if second & 0x0FC0 == 0 {
        load(rt, width, signed, 4)
    } else {
        None
    }
}

/// Extend a raw zero-extended read the way the load would have.
pub fn extend(raw: u32, width: AccessWidth, signed: bool) -> u32 {
    match (width, signed) {
        (AccessWidth::Byte, true) => raw as u8 as i8 as i32 as u32,
        (AccessWidth::Halfword, true) => raw as u16 as i16 as i32 as u32,
        (AccessWidth::Byte, false) => raw & 0xFF,
        (AccessWidth::Halfword, false) => raw & 0xFFFF,
        (AccessWidth::Word, _) => raw,
    }
}

/// Fetch and decode the instruction at `pc`.
///
/// ## Safety
///
/// `pc` must be the stacked program counter of the faulting box code, i.e.
/// point into readable code memory.
pub unsafe fn fetch<B: PrivilegedBus + ?Sized>(bus: &B, pc: usize) -> Option<LoadInstruction> {
    if pc & 1 != 0 {
        return None;
    }
    let first = bus.read(pc, AccessWidth::Halfword) as u16;
    let second = if is_32bit(first) {
        bus.read(pc.checked_add(2)?, AccessWidth::Halfword) as u16
    } else {
        0
    };
    decode(first, second)
}
