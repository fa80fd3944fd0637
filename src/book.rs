// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::movegen::{generate_legal, MoveList};
use crate::position::Position;
use crate::types::*;

use rand::Rng;
use std::fs;

// Polyglot opening book. Entries are 16 bytes, big-endian:
// key, move, weight, learn. Probed at the root only, for the first move of
// a fresh timed search.
#[derive(Clone, Copy)]
struct BookEntry {
    key: u64,
    mov: u16,
    weight: u16,
}

pub struct Book {
    entries: Vec<BookEntry>,
}

impl Book {
    pub fn empty() -> Book {
        Book {
            entries: Vec::new(),
        }
    }

    pub fn load(path: &str) -> Option<Book> {
        let bytes = fs::read(path).ok()?;
        let mut entries = Vec::with_capacity(bytes.len() / 16);
        for chunk in bytes.chunks_exact(16) {
            entries.push(BookEntry {
                key: u64::from_be_bytes(chunk[0..8].try_into().unwrap()),
                mov: u16::from_be_bytes(chunk[8..10].try_into().unwrap()),
                weight: u16::from_be_bytes(chunk[10..12].try_into().unwrap()),
            });
        }
        Some(Book { entries })
    }

    pub fn is_loaded(&self) -> bool {
        !self.entries.is_empty()
    }

    // Polyglot packs a move as to-file/to-rank/from-file/from-rank/promo
    // triplets of bits. Castling is written king-takes-rook, so a decoded
    // king-onto-own-rook move is matched against our castling encoding.
    fn decode(&self, pos: &mut Position, raw: u16) -> Move {
        let to = Square::make((raw & 7) as u32, ((raw >> 3) & 7) as u32);
        let from = Square::make(((raw >> 6) & 7) as u32, ((raw >> 9) & 7) as u32);
        let promo = match (raw >> 12) & 7 {
            1 => KNIGHT,
            2 => BISHOP,
            3 => ROOK,
            4 => QUEEN,
            _ => NO_PIECE_TYPE,
        };

        let mut list = MoveList::new();
        generate_legal(pos, &mut list);
        for i in 0..list.len() {
            let m = list.get(i);
            if m.is_castling() {
                let us = pos.side_to_move();
                let side =
                    if m.to().file() == FILE_G { KING_SIDE } else { QUEEN_SIDE };
                if m.from() == from && pos.castle_rook(us, side) == to {
                    return m;
                }
                continue;
            }
            if m.from() == from && m.to() == to && m.promotion_type() == promo {
                return m;
            }
        }
        Move::NONE
    }

    // Picks a book move: the heaviest entry when variety is zero, else a
    // random draw with weights skewed by w^(1 + variety/10).
    pub fn probe(&self, pos: &mut Position, variety: i32) -> Move {
        if self.entries.is_empty() {
            return Move::NONE;
        }
        let key = pos.key().0;
        let matches: Vec<BookEntry> = self
            .entries
            .iter()
            .copied()
            .filter(|e| e.key == key && e.weight > 0)
            .collect();
        if matches.is_empty() {
            return Move::NONE;
        }

        if variety == 0 {
            let best = matches.iter().max_by_key(|e| e.weight).unwrap();
            return self.decode(pos, best.mov);
        }

        let exp = 1.0 + variety as f64 / 10.0;
        let weights: Vec<f64> =
            matches.iter().map(|e| (e.weight as f64).powf(exp)).collect();
        let total: f64 = weights.iter().sum();
        let mut r = rand::thread_rng().gen_range(0.0..total);
        for (i, w) in weights.iter().enumerate() {
            r -= w;
            if r <= 0.0 {
                return self.decode(pos, matches[i].mov);
            }
        }
        self.decode(pos, matches[0].mov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes(key: u64, mov: u16, weight: u16) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0..8].copy_from_slice(&key.to_be_bytes());
        b[8..10].copy_from_slice(&mov.to_be_bytes());
        b[10..12].copy_from_slice(&weight.to_be_bytes());
        b
    }

    // to-file | to-rank<<3 | from-file<<6 | from-rank<<9
    fn pg_move(from: Square, to: Square) -> u16 {
        (to.file() as u16)
            | ((to.rank() as u16) << 3)
            | ((from.file() as u16) << 6)
            | ((from.rank() as u16) << 9)
    }

    #[test]
    fn picks_heaviest_entry_for_position() {
        let mut pos = Position::startpos();
        let key = pos.key().0;
        let e2e4 = pg_move(Square(12), Square(28));
        let d2d4 = pg_move(Square(11), Square(27));

        let path = std::env::temp_dir().join("sable_test_book.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&entry_bytes(key, d2d4, 10));
        bytes.extend_from_slice(&entry_bytes(key, e2e4, 200));
        bytes.extend_from_slice(&entry_bytes(0x1234, e2e4, 65535));
        fs::write(&path, &bytes).unwrap();

        let book = Book::load(path.to_str().unwrap()).unwrap();
        let m = book.probe(&mut pos, 0);
        assert_eq!(m, Move::make(Square(12), Square(28)));
    }

    #[test]
    fn unknown_position_returns_none() {
        let mut pos = Position::startpos();
        let path = std::env::temp_dir().join("sable_test_book2.bin");
        fs::write(&path, entry_bytes(0xdead, 0, 1)).unwrap();
        let book = Book::load(path.to_str().unwrap()).unwrap();
        assert_eq!(book.probe(&mut pos, 0), Move::NONE);
    }

    #[test]
    fn variety_draw_still_returns_a_legal_move() {
        let mut pos = Position::startpos();
        let key = pos.key().0;
        let path = std::env::temp_dir().join("sable_test_book3.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&entry_bytes(
            key,
            pg_move(Square(12), Square(28)),
            100,
        ));
        bytes.extend_from_slice(&entry_bytes(
            key,
            pg_move(Square(6), Square(21)),
            50,
        ));
        fs::write(&path, &bytes).unwrap();
        let book = Book::load(path.to_str().unwrap()).unwrap();
        for _ in 0..10 {
            let m = book.probe(&mut pos, 5);
            assert!(
                m == Move::make(Square(12), Square(28))
                    || m == Move::make(Square(6), Square(21))
            );
        }
    }
}
