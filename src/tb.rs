// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::bitboard::popcount;
use crate::position::Position;
use crate::types::*;

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};

pub const WDL_LOSS: i32 = -2;
pub const WDL_BLESSED_LOSS: i32 = -1;
pub const WDL_DRAW: i32 = 0;
pub const WDL_CURSED_WIN: i32 = 1;
pub const WDL_WIN: i32 = 2;

// Endgame tablebase oracle. The engine only depends on this interface:
// whether a position is in range, a WDL verdict, a distance-to-zeroing
// count and a ranked root move. Probe decompression itself is an external
// concern; a probe that cannot be answered reports None and the search
// carries on as if no tablebases were present.
pub struct Tablebase {
    max_pieces: AtomicU32,
}

impl Tablebase {
    pub fn new() -> Tablebase {
        Tablebase {
            max_pieces: AtomicU32::new(0),
        }
    }

    // Scans a directory for .rtbw files and records the largest piece
    // count they cover ("KQvK" covers three pieces). An unreadable or
    // empty directory leaves the oracle disabled.
    pub fn init(&self, path: &str) {
        let mut max = 0u32;
        if let Ok(dir) = fs::read_dir(path) {
            for entry in dir.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(stem) = name.strip_suffix(".rtbw") {
                    let pieces =
                        stem.chars().filter(|c| c.is_ascii_uppercase()).count();
                    max = max.max(pieces as u32);
                }
            }
        }
        self.max_pieces.store(max, Ordering::Relaxed);
    }

    pub fn max_cardinality(&self) -> u32 {
        self.max_pieces.load(Ordering::Relaxed)
    }

    // Tablebases know nothing about castling, so a position with any
    // castling right left is out of range regardless of piece count.
    pub fn can_probe(&self, pos: &Position) -> bool {
        let max = self.max_cardinality();
        max > 0 && popcount(pos.occupied()) <= max && !pos.castling().any()
    }

    pub fn probe_wdl(&self, pos: &Position) -> Option<i32> {
        if !self.can_probe(pos) {
            return None;
        }
        None
    }

    pub fn probe_dtz(&self, pos: &Position) -> Option<i32> {
        if !self.can_probe(pos) {
            return None;
        }
        None
    }

    // The WDL-optimal root move, when the tables can produce one.
    pub fn probe_root(&self, pos: &Position) -> Option<Move> {
        if !self.can_probe(pos) {
            return None;
        }
        None
    }

    pub fn wdl_to_score(&self, wdl: i32, ply: i32) -> Value {
        match wdl {
            WDL_WIN => mate_in(ply + 1),
            WDL_LOSS => mated_in(ply + 1),
            WDL_CURSED_WIN => Value(1),
            WDL_BLESSED_LOSS => Value(-1),
            _ => Value::DRAW,
        }
    }
}
