// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::types::*;

use memmap::MmapOptions;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Mutex;

pub const LEARNING_TABLE_SIZE: usize = 1 << 20;

// Persistent per-position score adjustment. Each slot accumulates game
// results for positions hashing to it; probe() turns that into a small
// clamped centipawn bias added onto the evaluation. The table is indexed
// by the low bits of the zobrist key and persisted as a flat array of
// (i32 total, u32 count) little-endian pairs.
struct Slot {
    total: AtomicI32,
    count: AtomicU32,
}

pub struct LearningStore {
    slots: Vec<Slot>,
    enabled: AtomicBool,
    rate: AtomicI32,
    max_adjust: AtomicI32,
    filename: Mutex<String>,
}

impl LearningStore {
    pub fn new() -> LearningStore {
        let mut slots = Vec::with_capacity(LEARNING_TABLE_SIZE);
        for _ in 0..LEARNING_TABLE_SIZE {
            slots.push(Slot {
                total: AtomicI32::new(0),
                count: AtomicU32::new(0),
            });
        }
        LearningStore {
            slots,
            enabled: AtomicBool::new(false),
            rate: AtomicI32::new(100),
            max_adjust: AtomicI32::new(50),
            filename: Mutex::new(String::new()),
        }
    }

    fn index(key: Key) -> usize {
        key.0 as usize & (LEARNING_TABLE_SIZE - 1)
    }

    pub fn set_enabled(&self, v: bool) {
        self.enabled.store(v, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_rate(&self, v: i32) {
        self.rate.store(v, Ordering::Relaxed);
    }

    pub fn set_max_adjust(&self, v: i32) {
        self.max_adjust.store(v, Ordering::Relaxed);
    }

    pub fn set_filename(&self, name: &str) {
        *self.filename.lock().unwrap() = String::from(name);
    }

    pub fn clear(&self) {
        for s in &self.slots {
            s.total.store(0, Ordering::Relaxed);
            s.count.store(0, Ordering::Relaxed);
        }
    }

    // Bias for a position, in centipawns from the side to move's view.
    pub fn probe(&self, key: Key) -> Value {
        if !self.enabled() {
            return Value::ZERO;
        }
        let slot = &self.slots[Self::index(key)];
        let count = slot.count.load(Ordering::Relaxed);
        if count == 0 {
            return Value::ZERO;
        }
        let total = slot.total.load(Ordering::Relaxed);
        let rate = self.rate.load(Ordering::Relaxed);
        let cap = self.max_adjust.load(Ordering::Relaxed);
        let adj = (total.saturating_mul(rate)) / count as i32;
        Value(adj.clamp(-cap, cap))
    }

    // Records a game result (+1 win, 0 draw, -1 loss from white's view)
    // for a position, flipped to the side to move there.
    pub fn update(&self, key: Key, result: i32, stm: Color) {
        if !self.enabled() {
            return;
        }
        let signed = if stm == WHITE { result } else { -result };
        let slot = &self.slots[Self::index(key)];
        slot.total.fetch_add(signed, Ordering::Relaxed);
        slot.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load(&self) -> bool {
        let name = self.filename.lock().unwrap().clone();
        if name.is_empty() {
            return false;
        }
        let file = match File::open(&name) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let map = match unsafe { MmapOptions::new().map(&file) } {
            Ok(m) => m,
            Err(_) => return false,
        };
        if map.len() < LEARNING_TABLE_SIZE * 8 {
            return false;
        }
        for (i, slot) in self.slots.iter().enumerate() {
            let off = i * 8;
            let total =
                i32::from_le_bytes(map[off..off + 4].try_into().unwrap());
            let count =
                u32::from_le_bytes(map[off + 4..off + 8].try_into().unwrap());
            slot.total.store(total, Ordering::Relaxed);
            slot.count.store(count, Ordering::Relaxed);
        }
        true
    }

    pub fn save(&self) -> bool {
        let name = self.filename.lock().unwrap().clone();
        if name.is_empty() || !self.enabled() {
            return false;
        }
        let mut bytes = Vec::with_capacity(LEARNING_TABLE_SIZE * 8);
        for slot in &self.slots {
            bytes.extend_from_slice(
                &slot.total.load(Ordering::Relaxed).to_le_bytes(),
            );
            bytes.extend_from_slice(
                &slot.count.load(Ordering::Relaxed).to_le_bytes(),
            );
        }
        let mut file = match File::create(&name) {
            Ok(f) => f,
            Err(_) => return false,
        };
        file.write_all(&bytes).is_ok()
    }
}
