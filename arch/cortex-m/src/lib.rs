// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Generic support for ARMv7-M Cortex-M cores: system control, exception
//! frames and the architectural MPU.

#![no_std]

pub mod frame;
pub mod mpu;
pub mod scb;
pub mod support;

pub use crate::frame::ExcReturnValidator;
pub use crate::scb::CortexM;
