// This file is part of ocflash, a tool to program FPGA configuration flash and reload FPGA images over PCIe configuration space.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// ocflash is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// ocflash is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.


use crate::common::context;
use crate::common::sim_card::{IDCODE, SimCard};
use googletest::prelude::*;
use ocflash::device::CardIdentity;
use ocflash::error::FlashError;
use ocflash::registers::{icap, qspi};
use ocflash::status::read_card_status;

#[gtest]
fn status_collects_identity_registers_and_idcode() {
    let mut card = SimCard::default();
    card.icap.capacity = 63;
    let mut ctx = context(card);

    let status = read_card_status(&mut ctx).unwrap();

    expect_that!(
        status.identity,
        eq(CardIdentity {
            vendor: 0x1014,
            device: 0x062B,
            subsystem: 0x060F
        })
    );
    expect_that!(status.idcode, eq(IDCODE));
    expect_that!(status.qspi.values.len(), eq(qspi::MAP.len()));
    expect_that!(status.icap.get("WFV"), eq(Some(63)));
    expect_that!(status.icap.get("SR"), eq(Some(icap::SR_ICAPEN_EOS)));

    let text = status.to_string();
    expect_that!(text, contains_substring("vendor 0x1014 device 0x062b subsystem 0x060f"));
    expect_that!(text, contains_substring("FPGA IDCODE: 0x04b31093"));
    expect_that!(text, contains_substring("ICAP WFV      = 0x0000003f"));
}

#[gtest]
fn idcode_readback_leaves_the_configuration_desynchronized() {
    let mut ctx = context(SimCard::default());

    read_card_status(&mut ctx).unwrap();

    let icap = &ctx.access_mut().icap;
    expect_that!(icap.commits, eq(2));
    expect_that!(icap.committed.get(1), eq(Some(&0xAA99_5566)));
    expect_that!(icap.committed.get(7), eq(Some(&0x0000_000D)));
}

#[gtest]
fn foreign_card_is_refused_before_any_icap_access() {
    let card = SimCard {
        vendor: 0x10EE,
        ..SimCard::default()
    };
    let mut ctx = context(card);

    let r = read_card_status(&mut ctx);

    assert!(matches!(
        r,
        Err(FlashError::UnsupportedCard {
            vendor: 0x10EE,
            device: 0x062B
        })
    ));
    let icap = &ctx.access_mut().icap;
    expect_that!(icap.keyhole_writes, eq(0));
    expect_that!(icap.commits, eq(0));
}
