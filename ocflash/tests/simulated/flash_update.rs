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
use ocflash::flash::{self, DeviceSelect, cmd};
use ocflash::image::{CountRule, FlashImage};
use ocflash::qspi::setup_qspi;
use ocflash::update::update_image;
use rstest::*;

fn prepared(card: SimCard) -> ocflash::context::FlashContext<SimCard> {
    let mut ctx = context(card);
    setup_qspi(&mut ctx).unwrap();
    flash::setup(&mut ctx, DeviceSelect::Primary).unwrap();
    ctx
}

#[gtest]
#[rstest]
#[case::legacy_uneven(CountRule::Legacy, 70_000, 2, 274)]
#[case::legacy_exact_multiple(CountRule::Legacy, 65_536, 2, 257)]
#[case::exact_uneven(CountRule::Exact, 70_000, 2, 274)]
#[case::exact_multiple(CountRule::Exact, 65_536, 1, 256)]
#[case::exact_empty(CountRule::Exact, 0, 0, 0)]
fn image_is_erased_programmed_and_verified(
    #[case] rule: CountRule,
    #[case] size: usize,
    #[case] sectors: usize,
    #[case] pages: usize,
) {
    let data = pattern(size);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut ctx = prepared(SimCard::default()).with_count_rule(rule);

    let report = update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0).unwrap();

    expect_that!(report.geometry.sectors, eq(sectors as u64));
    expect_that!(report.geometry.pages, eq(pages as u64));
    expect_that!(report.bytes_verified, eq((pages * 256) as u64));
    expect_that!(report.mismatches, is_empty());
    expect_that!(ctx.errors(), is_empty());
    let card = ctx.into_access();
    let part = &card.flash[0];
    expect_that!(part.count(cmd::SECTOR_ERASE_64K), eq(sectors));
    expect_that!(part.count(cmd::PAGE_PROGRAM), eq(pages));
    expect_that!(part.count(cmd::READ), eq(pages));
    expect_that!(part.rejected, eq(0));
    expect_that!(part.bytes(0, size), eq(&data));
    expect_that!(card.flash[1].log, is_empty());
}

#[gtest]
fn every_write_waits_for_the_part() {
    let data = pattern(1024);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut card = SimCard::default();
    card.flash[1].busy_reads = 3;
    let mut ctx = context(card).with_count_rule(CountRule::Exact);
    setup_qspi(&mut ctx).unwrap();
    flash::setup(&mut ctx, DeviceSelect::Secondary).unwrap();

    update_image(&mut ctx, DeviceSelect::Secondary, &mut image, 0x0002_0000).unwrap();

    let part = &ctx.access_mut().flash[1];
    // 1 erase and 4 programs, each polled until 3 busy reads went by.
    expect_that!(part.count(cmd::READ_STATUS), eq(5 * 4));
    expect_that!(part.bytes(0x0002_0000, 1024), eq(&data));
    expect_that!(part.byte(0x0002_0400), eq(0xFF));
}

#[gtest]
fn image_crossing_a_16mib_segment_moves_the_ear() {
    let data = pattern(70_000);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut ctx = prepared(SimCard::default());
    let start = 0x00FF_0000;

    let report = update_image(&mut ctx, DeviceSelect::Primary, &mut image, start).unwrap();

    expect_that!(report.verified_ok(), eq(true));
    let part = &ctx.access_mut().flash[0];
    expect_that!(part.rejected, eq(0));
    expect_that!(part.ear, eq(0x01));
    let erased: Vec<Option<u32>> = part
        .log
        .iter()
        .filter(|c| c.opcode == cmd::SECTOR_ERASE_64K)
        .map(|c| c.address)
        .collect();
    expect_that!(erased, elements_are![eq(&Some(0x00FF_0000)), eq(&Some(0x0100_0000))]);
    expect_that!(part.bytes(start, data.len()), eq(&data));
}

#[gtest]
fn reprogramming_over_an_old_image_starts_from_erased_flash() {
    let old = vec![0x0Fu8; 4096];
    let new = pattern(4096);
    let mut ctx = prepared(SimCard::default());
    for contents in [&old, &new] {
        let file = image_file(contents);
        let mut image = FlashImage::open(file.path()).unwrap();
        let report = update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0).unwrap();
        expect_that!(report.mismatches, is_empty());
    }
    expect_that!(ctx.access_mut().flash[0].bytes(0, 4096), eq(&new));
}

#[gtest]
fn bad_bytes_are_reported_and_verification_continues() {
    let data = pattern(2048);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut card = SimCard::default();
    card.flash[0].corrupt.insert(0x0010, 0x01);
    card.flash[0].corrupt.insert(0x0700, 0x80);
    let mut ctx = prepared(card).with_count_rule(CountRule::Exact);

    let report = update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0).unwrap();

    expect_that!(report.mismatches.len(), eq(2));
    expect_that!(report.mismatches[0].address, eq(0x0010));
    expect_that!(report.mismatches[0].expected, eq(data[0x10]));
    expect_that!(report.mismatches[0].actual, eq(data[0x10] ^ 0x01));
    expect_that!(report.mismatches[1].page, eq(7));
    expect_that!(report.mismatches[1].byte, eq(0));
    expect_that!(ctx.errors().len(), eq(2));
    expect_that!(ctx.check_accumulated_errors(), eq(2));
    // Every page was still read back.
    expect_that!(ctx.access_mut().flash[0].count(cmd::READ), eq(8));
}

#[gtest]
fn small_fifo_splits_page_programs_into_bursts() {
    let data = pattern(300);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let card = SimCard {
        fifo_depth: 16,
        ..SimCard::default()
    };
    let mut ctx = prepared(card).with_qspi_fifo_depth(16);

    let report = update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0x100).unwrap();

    expect_that!(report.verified_ok(), eq(true));
    expect_that!(ctx.access_mut().flash[0].bytes(0x100, 300), eq(&data));
}

#[gtest]
fn misaligned_start_address_touches_nothing() {
    let file = image_file(&pattern(100));
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut ctx = prepared(SimCard::default());
    let before = ctx.access_mut().flash[0].log.len();

    let r = update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0x80);

    expect_that!(r, err(displays_as(contains_substring("not aligned"))));
    expect_that!(ctx.access_mut().flash[0].log.len(), eq(before));
}

#[gtest]
fn subsector_erase_clears_only_its_4k() {
    let data = pattern(3 * 4096);
    let file = image_file(&data);
    let mut image = FlashImage::open(file.path()).unwrap();
    let mut ctx = prepared(SimCard::default()).with_count_rule(CountRule::Exact);
    update_image(&mut ctx, DeviceSelect::Primary, &mut image, 0).unwrap();

    flash::write_enable(&mut ctx, DeviceSelect::Primary).unwrap();
    flash::subsector_erase_4k(&mut ctx, DeviceSelect::Primary, 0x1234).unwrap();
    flash::wait_write_in_progress_clear(&mut ctx, DeviceSelect::Primary).unwrap();

    let part = &ctx.access_mut().flash[0];
    expect_that!(part.count(cmd::SUBSECTOR_ERASE_4K), eq(1));
    expect_that!(part.bytes(0, 0x1000), eq(&data[..0x1000]));
    expect_that!(part.bytes(0x1000, 0x1000), eq(&vec![0xFFu8; 0x1000]));
    expect_that!(part.bytes(0x2000, 0x1000), eq(&data[0x2000..]));
}
