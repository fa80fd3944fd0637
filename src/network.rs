// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::position::Position;
use crate::types::*;

use memmap::MmapOptions;
use std::fs::File;

// Small incremental network evaluator. The feature transform is HalfKP
// shaped: (own/other, king square, piece square, piece type) -> 256
// accumulators, followed by two dense 32-wide layers and a scalar output.
// Weights come from an external file; without one the engine runs on the
// classical evaluation alone. The network score is blended with the
// classical score at a fixed weight.

pub const FT_INPUTS: usize = 40960; // 2 * 64 * 64 * 5
pub const FT_SIZE: usize = 256;
pub const L1_SIZE: usize = 32;
pub const L2_SIZE: usize = 32;

const MAGIC: u32 = 0x5a5a5a5a;
const VERSION: u32 = 2;

// Fixed blend: final = BLEND_NUM/BLEND_DEN * net + rest * classical.
pub const BLEND_NUM: i32 = 4;
pub const BLEND_DEN: i32 = 5;

pub struct Network {
    ft_weights: Vec<i8>,
    ft_bias: Vec<i16>,
    l1_weights: Vec<i8>,
    l1_bias: Vec<i16>,
    l2_weights: Vec<i8>,
    l2_bias: Vec<i16>,
    out_weights: Vec<i8>,
    out_bias: i16,
}

fn read_u32(buf: &[u8], off: &mut usize) -> Option<u32> {
    let v = u32::from_le_bytes(buf.get(*off..*off + 4)?.try_into().ok()?);
    *off += 4;
    Some(v)
}

fn read_i8s(buf: &[u8], off: &mut usize, n: usize) -> Option<Vec<i8>> {
    let s = buf.get(*off..*off + n)?;
    *off += n;
    Some(s.iter().map(|&b| b as i8).collect())
}

fn read_i16s(buf: &[u8], off: &mut usize, n: usize) -> Option<Vec<i16>> {
    let s = buf.get(*off..*off + 2 * n)?;
    *off += 2 * n;
    Some(
        s.chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect(),
    )
}

impl Network {
    // Maps and parses a weight file. Any mismatch in magic, version or
    // dimensions disables the network rather than producing garbage.
    pub fn load(path: &str) -> Option<Network> {
        let file = File::open(path).ok()?;
        let map = unsafe { MmapOptions::new().map(&file) }.ok()?;
        let buf: &[u8] = &map;
        let mut off = 0usize;

        if read_u32(buf, &mut off)? != MAGIC
            || read_u32(buf, &mut off)? != VERSION
            || read_u32(buf, &mut off)? != FT_INPUTS as u32
            || read_u32(buf, &mut off)? != FT_SIZE as u32
            || read_u32(buf, &mut off)? != L1_SIZE as u32
            || read_u32(buf, &mut off)? != L2_SIZE as u32
            || read_u32(buf, &mut off)? != 1
        {
            return None;
        }

        let ft_weights = read_i8s(buf, &mut off, FT_INPUTS * FT_SIZE)?;
        let ft_bias = read_i16s(buf, &mut off, FT_SIZE)?;
        let l1_weights = read_i8s(buf, &mut off, FT_SIZE * L1_SIZE)?;
        let l1_bias = read_i16s(buf, &mut off, L1_SIZE)?;
        let l2_weights = read_i8s(buf, &mut off, L1_SIZE * L2_SIZE)?;
        let l2_bias = read_i16s(buf, &mut off, L2_SIZE)?;
        let out_weights = read_i8s(buf, &mut off, L2_SIZE)?;
        let out_bias = read_i16s(buf, &mut off, 1)?[0];

        Some(Network {
            ft_weights,
            ft_bias,
            l1_weights,
            l1_bias,
            l2_weights,
            l2_bias,
            out_weights,
            out_bias,
        })
    }

    fn feature_index(
        king_sq: Square,
        piece_color_is_own: bool,
        piece_sq: Square,
        pt: PieceType,
    ) -> Option<usize> {
        if pt == KING {
            return None;
        }
        let side = if piece_color_is_own { 0 } else { 1 };
        Some(
            side * 64 * 64 * 5
                + (king_sq.0 as usize * 64 + piece_sq.0 as usize) * 5
                + (pt.0 as usize - 1),
        )
    }
}

// The white-king-perspective accumulator for one position.
#[derive(Clone)]
pub struct Accumulator {
    values: [i32; FT_SIZE],
    king_sq: Square,
    computed: bool,
}

impl Accumulator {
    fn new() -> Accumulator {
        Accumulator {
            values: [0; FT_SIZE],
            king_sq: Square::NONE,
            computed: false,
        }
    }
}

// Per-thread stack of accumulators, pushed and popped in lockstep with
// make_move/unmake_move so that every search node sees the accumulator of
// its own position.
pub struct AccumulatorStack {
    stack: Vec<Accumulator>,
}

impl AccumulatorStack {
    pub fn new() -> AccumulatorStack {
        AccumulatorStack {
            stack: vec![Accumulator::new()],
        }
    }

    pub fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(Accumulator::new());
    }

    pub fn push(&mut self) {
        let top = self.stack.last().cloned().unwrap_or_else(Accumulator::new);
        self.stack.push(top);
    }

    pub fn pop(&mut self) {
        debug_assert!(self.stack.len() > 1);
        self.stack.pop();
    }

    fn top_mut(&mut self) -> &mut Accumulator {
        self.stack.last_mut().unwrap()
    }

    fn add_feature(&mut self, net: &Network, idx: usize, sign: i32) {
        let acc = self.stack.last_mut().unwrap();
        let w = &net.ft_weights[idx * FT_SIZE..(idx + 1) * FT_SIZE];
        for i in 0..FT_SIZE {
            acc.values[i] += sign * w[i] as i32;
        }
    }

    fn refresh(&mut self, net: &Network, pos: &Position) {
        let king_sq = pos.king_square(WHITE);
        {
            let acc = self.top_mut();
            acc.king_sq = king_sq;
            for i in 0..FT_SIZE {
                acc.values[i] = net.ft_bias[i] as i32;
            }
        }
        for c in [WHITE, BLACK] {
            for pt in [PAWN, KNIGHT, BISHOP, ROOK, QUEEN] {
                for s in pos.pieces(c, pt) {
                    if let Some(idx) =
                        Network::feature_index(king_sq, c == WHITE, s, pt)
                    {
                        self.add_feature(net, idx, 1);
                    }
                }
            }
        }
        self.top_mut().computed = true;
    }

    // Incremental update after `m` was applied; `pos` is the position
    // after the move. A white king move invalidates every feature, so it
    // falls back to a full refresh.
    pub fn apply_move(
        &mut self,
        net: &Network,
        pos: &Position,
        m: Move,
        us: Color,
        moving_pt: PieceType,
        captured_pt: PieceType,
    ) {
        if !self.stack.last().map(|a| a.computed).unwrap_or(false)
            || self.stack.last().unwrap().king_sq != pos.king_square(WHITE)
        {
            self.refresh(net, pos);
            return;
        }

        let king_sq = self.stack.last().unwrap().king_sq;
        let from = m.from();
        let to = m.to();
        let them = !us;

        if m.is_castling() {
            // Castles move two pieces and the rook origin is no longer
            // recoverable from the post-move board alone; they are rare
            // enough that a refresh is the simplest correct answer.
            self.refresh(net, pos);
            return;
        }

        if let Some(idx) =
            Network::feature_index(king_sq, us == WHITE, from, moving_pt)
        {
            self.add_feature(net, idx, -1);
        }
        if captured_pt != NO_PIECE_TYPE {
            let capsq = if m.is_en_passant() {
                to - pawn_push(us)
            } else {
                to
            };
            if let Some(idx) =
                Network::feature_index(king_sq, them == WHITE, capsq, captured_pt)
            {
                self.add_feature(net, idx, -1);
            }
        }
        let final_pt = if m.is_promotion() {
            m.promotion_type()
        } else {
            moving_pt
        };
        if let Some(idx) =
            Network::feature_index(king_sq, us == WHITE, to, final_pt)
        {
            self.add_feature(net, idx, 1);
        }
        self.top_mut().computed = true;
    }

    // Forward pass. Clipped-ReLU layers in plain integer arithmetic.
    pub fn evaluate(&mut self, net: &Network, pos: &Position) -> Value {
        if !self.stack.last().map(|a| a.computed).unwrap_or(false)
            || self.stack.last().unwrap().king_sq != pos.king_square(WHITE)
        {
            self.refresh(net, pos);
        }
        let acc = self.stack.last().unwrap();

        let mut l0 = [0i32; FT_SIZE];
        for i in 0..FT_SIZE {
            l0[i] = acc.values[i].clamp(0, 127);
        }

        let mut l1 = [0i32; L1_SIZE];
        for i in 0..L1_SIZE {
            let mut sum = net.l1_bias[i] as i32;
            for (j, &x) in l0.iter().enumerate() {
                sum += x * net.l1_weights[j * L1_SIZE + i] as i32;
            }
            l1[i] = (sum >> 6).clamp(0, 127);
        }

        let mut l2 = [0i32; L2_SIZE];
        for i in 0..L2_SIZE {
            let mut sum = net.l2_bias[i] as i32;
            for (j, &x) in l1.iter().enumerate() {
                sum += x * net.l2_weights[j * L2_SIZE + i] as i32;
            }
            l2[i] = (sum >> 6).clamp(0, 127);
        }

        let mut out = net.out_bias as i32;
        for (i, &x) in l2.iter().enumerate() {
            out += x * net.out_weights[i] as i32;
        }
        let score = Value(out >> 4);

        if pos.side_to_move() == WHITE {
            score
        } else {
            -score
        }
    }
}

pub fn blend(net_score: Value, classical: Value) -> Value {
    Value((net_score.0 * BLEND_NUM + classical.0 * (BLEND_DEN - BLEND_NUM)) / BLEND_DEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tiny_net_file(path: &std::path::Path) {
        let mut bytes = Vec::new();
        for v in [
            MAGIC,
            VERSION,
            FT_INPUTS as u32,
            FT_SIZE as u32,
            L1_SIZE as u32,
            L2_SIZE as u32,
            1,
        ] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.resize(bytes.len() + FT_INPUTS * FT_SIZE, 0); // ft weights
        bytes.resize(bytes.len() + 2 * FT_SIZE, 0); // ft bias
        bytes.resize(bytes.len() + FT_SIZE * L1_SIZE, 0);
        bytes.resize(bytes.len() + 2 * L1_SIZE, 0);
        bytes.resize(bytes.len() + L1_SIZE * L2_SIZE, 0);
        bytes.resize(bytes.len() + 2 * L2_SIZE, 0);
        bytes.resize(bytes.len() + L2_SIZE, 0);
        bytes.extend_from_slice(&0i16.to_le_bytes());
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&bytes).unwrap();
    }

    #[test]
    fn loads_wellformed_file_and_rejects_garbage() {
        let dir = std::env::temp_dir();
        let good = dir.join("sable_test_net.bin");
        tiny_net_file(&good);
        assert!(Network::load(good.to_str().unwrap()).is_some());

        let bad = dir.join("sable_test_net_bad.bin");
        std::fs::write(&bad, b"not a network").unwrap();
        assert!(Network::load(bad.to_str().unwrap()).is_none());
        assert!(Network::load("/nonexistent/sable.nnue").is_none());
    }

    #[test]
    fn zero_network_evaluates_to_zero_and_stays_incremental() {
        let dir = std::env::temp_dir();
        let path = dir.join("sable_test_net2.bin");
        tiny_net_file(&path);
        let net = Network::load(path.to_str().unwrap()).unwrap();

        let mut pos = Position::startpos();
        let mut stack = AccumulatorStack::new();
        assert_eq!(stack.evaluate(&net, &pos), Value::ZERO);

        let m = Move::make(Square(12), Square(28));
        let moving = pos.piece_on(m.from()).piece_type();
        stack.push();
        let undo = pos.make_move(m);
        stack.apply_move(&net, &pos, m, WHITE, moving, NO_PIECE_TYPE);
        assert_eq!(stack.evaluate(&net, &pos), Value::ZERO);
        pos.unmake_move(m, undo);
        stack.pop();
        assert_eq!(stack.evaluate(&net, &pos), Value::ZERO);
    }

    #[test]
    fn blend_mixes_at_fixed_weight() {
        assert_eq!(blend(Value(100), Value(0)), Value(80));
        assert_eq!(blend(Value(0), Value(100)), Value(20));
        assert_eq!(blend(Value(50), Value(50)), Value(50));
    }
}
