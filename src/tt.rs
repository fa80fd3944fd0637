// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::types::*;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

// One slot per position. An entry is two u64 words: the data word packs
// move, score, depth, bound, generation and tablebase distance; the key
// word is the zobrist key XORed with the data word. A reader accepts an
// entry only when key ^ data reproduces the probe key, so a torn
// read-write race shows up as a key mismatch instead of corrupt data.
//
//   data bits  0-15  move
//              16-31 score (i16, mate scores ply-rescaled by the caller)
//              32-39 depth (i8)
//              40-41 bound
//              42-47 generation
//              48-63 tablebase distance-to-zero (i16, 0 = unknown)

struct Entry {
    key: AtomicU64,
    data: AtomicU64,
}

pub struct EntryData {
    pub mov: Move,
    pub score: Value,
    pub depth: Depth,
    pub bound: Bound,
    pub dtz: i32,
}

pub struct ProbeResult {
    // True when the entry is usable at the requested depth and bounds.
    // The move, score and dtz fields are valid on any key match.
    pub hit: bool,
    pub mov: Move,
    pub score: Value,
    pub depth: Depth,
    pub bound: Bound,
    pub dtz: i32,
}

pub struct TranspositionTable {
    entries: Vec<Entry>,
    generation: AtomicU8,
}

fn pack(m: Move, score: Value, depth: Depth, bound: Bound, gen: u8, dtz: i32) -> u64 {
    debug_assert!(m.0 <= 0xffff);
    let score16 = score.0.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    let depth8 = depth.clamp(i8::MIN as i32, i8::MAX as i32) as i8;
    let dtz16 = dtz.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    (m.0 as u64)
        | ((score16 as u16 as u64) << 16)
        | ((depth8 as u8 as u64) << 32)
        | ((bound.0 as u64) << 40)
        | (((gen & 0x3f) as u64) << 42)
        | ((dtz16 as u16 as u64) << 48)
}

fn unpack(data: u64) -> EntryData {
    EntryData {
        mov: Move((data & 0xffff) as u32),
        score: Value(((data >> 16) as u16 as i16) as i32),
        depth: ((data >> 32) as u8 as i8) as i32,
        bound: Bound(((data >> 40) & 3) as u32),
        dtz: ((data >> 48) as u16 as i16) as i32,
    }
}

impl TranspositionTable {
    pub fn new(mb: usize) -> TranspositionTable {
        let bytes = mb.max(1) * 1024 * 1024;
        let count = bytes / std::mem::size_of::<Entry>();
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(Entry {
                key: AtomicU64::new(0),
                data: AtomicU64::new(0),
            });
        }
        TranspositionTable {
            entries,
            generation: AtomicU8::new(0),
        }
    }

    fn slot(&self, key: Key) -> &Entry {
        // Multiply-high maps the key uniformly onto the table without a
        // modulo.
        let idx = ((key.0 as u128 * self.entries.len() as u128) >> 64) as usize;
        &self.entries[idx]
    }

    pub fn new_search(&self) {
        let g = self.generation.load(Ordering::Relaxed);
        self.generation.store((g + 1) & 0x3f, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        for e in &self.entries {
            e.key.store(0, Ordering::Relaxed);
            e.data.store(0, Ordering::Relaxed);
        }
    }

    // Writes unconditionally unless the slot already holds the same
    // position searched to a strictly greater depth. Mate scores must be
    // rescaled to distance-from-this-node by the caller before storing.
    pub fn store(
        &self,
        key: Key,
        depth: Depth,
        score: Value,
        bound: Bound,
        m: Move,
        dtz: i32,
    ) {
        let e = self.slot(key);
        let old_key = e.key.load(Ordering::Relaxed);
        let old_data = e.data.load(Ordering::Relaxed);
        if old_data != 0 && old_key ^ old_data == key.0 {
            let old = unpack(old_data);
            if old.depth > depth {
                return;
            }
        }
        let data = pack(m, score, depth, bound, self.generation(), dtz);
        e.key.store(key.0 ^ data, Ordering::Relaxed);
        e.data.store(data, Ordering::Relaxed);
    }

    // Returns None when the slot does not hold this position. On a key
    // match the stored move is always exposed for ordering; `hit` is set
    // only when the depth suffices and the bound is usable against the
    // given window.
    pub fn probe(
        &self,
        key: Key,
        depth: Depth,
        alpha: Value,
        beta: Value,
    ) -> Option<ProbeResult> {
        let e = self.slot(key);
        let stored_key = e.key.load(Ordering::Relaxed);
        let data = e.data.load(Ordering::Relaxed);
        if data == 0 || stored_key ^ data != key.0 {
            return None;
        }
        let d = unpack(data);
        let hit = d.depth >= depth
            && match d.bound {
                Bound::EXACT => true,
                Bound::LOWER => d.score >= beta,
                Bound::UPPER => d.score <= alpha,
                _ => false,
            };
        Some(ProbeResult {
            hit,
            mov: d.mov,
            score: d.score,
            depth: d.depth,
            bound: d.bound,
            dtz: d.dtz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_probe_roundtrip() {
        let tt = TranspositionTable::new(1);
        let key = Key(0x9e3779b97f4a7c15);
        let m = Move::make(Square(12), Square(28));
        tt.store(key, 7, Value(42), Bound::EXACT, m, 0);

        let r = tt.probe(key, 7, Value(-100), Value(100)).unwrap();
        assert!(r.hit);
        assert_eq!(r.score, Value(42));
        assert_eq!(r.mov, m);
        assert_eq!(r.depth, 7);
        assert_eq!(r.bound, Bound::EXACT);
    }

    #[test]
    fn depth_gates_the_hit_but_not_the_move() {
        let tt = TranspositionTable::new(1);
        let key = Key(0xdeadbeefcafebabe);
        let m = Move::make(Square(6), Square(21));
        tt.store(key, 3, Value(10), Bound::EXACT, m, 0);

        let r = tt.probe(key, 8, Value(-50), Value(50)).unwrap();
        assert!(!r.hit);
        assert_eq!(r.mov, m);
    }

    #[test]
    fn bounds_gate_the_hit() {
        let tt = TranspositionTable::new(1);
        let key = Key(0x123456789abcdef0);
        tt.store(key, 5, Value(30), Bound::LOWER, Move::NONE, 0);

        // Lower bound of 30 proves a fail-high only when beta <= 30.
        assert!(tt.probe(key, 5, Value(0), Value(25)).unwrap().hit);
        assert!(!tt.probe(key, 5, Value(0), Value(100)).unwrap().hit);

        tt.store(key, 6, Value(-30), Bound::UPPER, Move::NONE, 0);
        assert!(tt.probe(key, 5, Value(-10), Value(10)).unwrap().hit);
        assert!(!tt.probe(key, 5, Value(-50), Value(10)).unwrap().hit);
    }

    #[test]
    fn deeper_entry_survives_shallower_store() {
        let tt = TranspositionTable::new(1);
        let key = Key(0x42);
        let deep = Move::make(Square(1), Square(18));
        tt.store(key, 10, Value(77), Bound::EXACT, deep, 0);
        tt.store(key, 4, Value(-5), Bound::UPPER, Move::NONE, 0);

        let r = tt.probe(key, 4, Value(-100), Value(100)).unwrap();
        assert_eq!(r.score, Value(77));
        assert_eq!(r.mov, deep);
        assert_eq!(r.depth, 10);
    }

    #[test]
    fn equal_depth_overwrites() {
        let tt = TranspositionTable::new(1);
        let key = Key(0x42);
        tt.store(key, 6, Value(1), Bound::UPPER, Move::NONE, 0);
        tt.store(key, 6, Value(2), Bound::EXACT, Move::NONE, 0);
        let r = tt.probe(key, 6, Value(-100), Value(100)).unwrap();
        assert_eq!(r.score, Value(2));
    }

    #[test]
    fn colliding_key_is_rejected() {
        let tt = TranspositionTable::new(1);
        tt.store(Key(0x1111), 5, Value(9), Bound::EXACT, Move::NONE, 0);
        // 0x1112 lands in the same slot (both keys multiply-map to index
        // zero) but the key check must reject it.
        assert!(tt.probe(Key(0x1112), 5, Value(-10), Value(10)).is_none());
        assert!(tt.probe(Key(0x1111), 5, Value(-10), Value(10)).is_some());
    }

    #[test]
    fn dtz_roundtrips() {
        let tt = TranspositionTable::new(1);
        let key = Key(0xabc);
        tt.store(key, 2, Value(0), Bound::NONE, Move::NONE, -17);
        assert_eq!(tt.probe(key, 0, Value(-1), Value(1)).unwrap().dtz, -17);
    }

    #[test]
    fn clear_and_new_search() {
        let tt = TranspositionTable::new(1);
        let key = Key(0x77);
        tt.store(key, 3, Value(5), Bound::EXACT, Move::NONE, 0);
        tt.new_search();
        assert_eq!(tt.generation(), 1);
        tt.clear();
        assert!(tt.probe(key, 0, Value(-1), Value(1)).is_none());
    }
}
