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


use crate::common::sim_card::SimCard;
use crate::common::{context, image_file, pattern};
use googletest::prelude::*;
use ocflash::device::SUBSYSTEM_ZYNQMP;
use ocflash::image::{CountRule, FlashImage};
use ocflash::registers::cfg;
use ocflash::zynqmp::load_zynqmp;
use rstest::*;

#[gtest]
#[rstest]
#[case::legacy(CountRule::Legacy, 4)]
#[case::exact(CountRule::Exact, 4)]
fn blocks_are_handed_over_one_acknowledgement_at_a_time(
    #[case] rule: CountRule,
    #[case] blocks: usize,
) {
    let data = pattern(1000);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut card = SimCard::with_subsystem(SUBSYSTEM_ZYNQMP);
    card.zynq.busy_reads = 2;
    let mut ctx = context(card).with_count_rule(rule);

    let report = load_zynqmp(&mut ctx, &mut image).unwrap();

    expect_that!(report.blocks, eq(blocks as u64));
    let zynq = &ctx.access_mut().zynq;
    expect_that!(zynq.blocks, eq(blocks));
    expect_that!(zynq.done, eq(true));
    expect_that!(
        zynq.control,
        elements_are![eq(&cfg::ZYNQ_CTRL_RUN), eq(&cfg::ZYNQ_CTRL_IDLE)]
    );
    expect_that!(zynq.received[..1000].to_vec(), eq(&data));
    expect_that!(zynq.received[1000..].iter().all(|b| *b == 0), eq(true));
}

#[gtest]
fn an_exact_multiple_sends_a_trailing_padding_block() {
    let data = pattern(512);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut ctx = context(SimCard::with_subsystem(SUBSYSTEM_ZYNQMP));

    let report = load_zynqmp(&mut ctx, &mut image).unwrap();

    expect_that!(report.blocks, eq(3));
    let zynq = &ctx.access_mut().zynq;
    expect_that!(zynq.received.len(), eq(768));
    expect_that!(zynq.received[..512].to_vec(), eq(&data));
}
