// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interfaces the monitor needs from the hardware.

pub mod frame;
pub mod mpu;
pub mod system;
