// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::evaluate;
use crate::movegen::{generate, ExtMove, MoveList};
use crate::movepick::*;
use crate::network::{self, AccumulatorStack, Network};
use crate::position::{Position, Undo};
use crate::learn::LearningStore;
use crate::tb::Tablebase;
use crate::threads::SearchControl;
use crate::tt::TranspositionTable;
use crate::types::*;
use crate::uci;

use std::io::stdout;
use std::io::Write;
use std::sync::Arc;

pub const MAX_QSEARCH_DEPTH: i32 = 8;

const ASPIRATION_WINDOW: i32 = 15;
const ASPIRATION_WIDEN: i32 = 50;
const LMR_BASE: i32 = 1;
const LMR_DIV: i32 = 2;
const LOW_ORDER_SCORE: i32 = 200_000;
const NULL_MOVE_R: i32 = 2;
const IID_DEPTH: i32 = 5;
const IID_REDUCTION: i32 = 2;
const SEE_QUIET_MARGIN: i32 = -80;
const SINGULAR_EXTENSION_DEPTH: i32 = 8;
const SINGULAR_MARGIN: i32 = 50;
const PROBCUT_DEPTH: i32 = 5;
const PROBCUT_MARGIN_BASE: i32 = 100;
const PROBCUT_MARGIN_PER_DEPTH: i32 = 20;
const MULTICUT_DEPTH: i32 = 6;
const FUTILITY_MARGIN_FACTOR: i32 = 200;
const STATIC_NULL_MARGIN: i32 = 200;
const LMP_BASE: usize = 3;
const LMP_FACTOR: usize = 2;
const DELTA_MARGIN: i32 = 200;
const STOP_CHECK_INTERVAL: i32 = 256;

// Counted leaf positions after bulk move generation and post-make
// legality filtering. The canonical move generator correctness check.
pub fn perft(pos: &mut Position, depth: Depth) -> u64 {
    if depth <= 0 {
        return 1;
    }
    let mut list = MoveList::new();
    generate(pos, &mut list, false);
    let mut nodes = 0;
    for i in 0..list.len() {
        let m = list.get(i);
        let undo = pos.make_move(m);
        if !pos.mover_in_check() {
            nodes += if depth == 1 { 1 } else { perft(pos, depth - 1) };
        }
        pos.unmake_move(m, undo);
    }
    nodes
}

fn razor_margin(depth: Depth) -> i32 {
    match depth {
        d if d <= 1 => 300,
        2 => 400,
        3 => 600,
        d => 600 + 50 * (d - 3),
    }
}

// Mate scores cross the transposition table as distance-from-this-node and
// come back re-relativized to the probing node's ply. The two conversions
// are exact inverses for any fixed ply.
pub fn value_to_tt(v: Value, ply: i32) -> Value {
    if v.is_mate_score() {
        if v > Value::ZERO {
            v + ply
        } else {
            v - ply
        }
    } else {
        v
    }
}

pub fn value_from_tt(v: Value, ply: i32) -> Value {
    if v.is_mate_score() {
        if v > Value::ZERO {
            v - ply
        } else {
            v + ply
        }
    } else {
        v
    }
}

fn dtz_to_score(dtz: i32, ply: i32) -> Value {
    if dtz > 0 {
        Value(Value::MATE.0 - dtz - ply)
    } else {
        Value(-Value::MATE.0 - dtz + ply)
    }
}

fn reduction(
    improving: bool,
    depth: Depth,
    idx: usize,
    move_score: i32,
    capture: bool,
    check: bool,
) -> i32 {
    if depth < 3 {
        return 0;
    }
    let mut r = LMR_BASE + idx as i32 / LMR_DIV;
    if !improving {
        r += 1;
    }
    if capture {
        r -= 1;
    }
    if check {
        r -= 1;
    }
    if move_score < LOW_ORDER_SCORE {
        r += 1;
    }
    r.clamp(0, depth - 2)
}

#[derive(Clone, Copy)]
pub struct Stack {
    pub killers: [Move; 2],
    pub current_move: Move,
    pub current_piece: Piece,
    pub captured: Piece,
    pub static_eval: Value,
}

impl Stack {
    fn new() -> Stack {
        Stack {
            killers: [Move::NONE; 2],
            current_move: Move::NONE,
            current_piece: NO_PIECE,
            captured: NO_PIECE,
            static_eval: Value::ZERO,
        }
    }
}

#[derive(Clone)]
struct RootMove {
    m: Move,
    ord: i32,
}

// One of these per worker thread. The position is the thread's own clone;
// the history tables are thread-local; the transposition table, tablebase,
// learning store, network weights and control block are shared.
pub struct Searcher {
    pub pos: Position,
    stack: Vec<Stack>,
    hist: Box<HistoryTables>,
    tt: Arc<TranspositionTable>,
    tb: Arc<Tablebase>,
    learn: Arc<LearningStore>,
    network: Option<Arc<Network>>,
    acc: AccumulatorStack,
    ctrl: Arc<SearchControl>,
    thread_id: usize,
    contempt: i32,
    check_counter: i32,
}

impl Searcher {
    pub fn new(
        pos: Position,
        tt: Arc<TranspositionTable>,
        tb: Arc<Tablebase>,
        learn: Arc<LearningStore>,
        network: Option<Arc<Network>>,
        ctrl: Arc<SearchControl>,
        thread_id: usize,
        contempt: i32,
    ) -> Searcher {
        Searcher {
            pos,
            stack: vec![Stack::new(); (MAX_PLY + 2) as usize],
            hist: HistoryTables::new(),
            tt,
            tb,
            learn,
            network,
            acc: AccumulatorStack::new(),
            ctrl,
            thread_id,
            contempt,
            check_counter: STOP_CHECK_INTERVAL,
        }
    }

    fn must_stop(&self) -> bool {
        self.ctrl.stopped()
    }

    fn check_limits(&mut self) {
        self.check_counter -= 1;
        if self.check_counter > 0 {
            return;
        }
        self.check_counter = STOP_CHECK_INTERVAL;
        if self.ctrl.tm.out_of_time() {
            self.ctrl.request_stop();
        }
        if self.ctrl.node_limit > 0 && self.ctrl.nodes() >= self.ctrl.node_limit
        {
            self.ctrl.request_stop();
        }
    }

    // Static evaluation plus the learning-store bias, with the network
    // blended in at its fixed weight when one is loaded.
    fn evaluate_with_bias(&mut self) -> Value {
        let classical = evaluate::evaluate(&self.pos, self.contempt);
        let v = match &self.network {
            Some(net) => {
                let net = net.clone();
                let nn = self.acc.evaluate(&net, &self.pos);
                network::blend(nn, classical)
            }
            None => classical,
        };
        v + self.learn.probe(self.pos.key())
    }

    // Make/unmake wrappers that keep the network accumulator stack in
    // lockstep with the position. Every do_move below is paired with an
    // undo_move on all paths out of the node.
    fn do_move(&mut self, m: Move) -> Undo {
        if let Some(net) = self.network.clone() {
            let us = self.pos.side_to_move();
            let moving = self.pos.piece_on(m.from()).piece_type();
            let captured = if m.is_castling() {
                NO_PIECE_TYPE
            } else if m.is_en_passant() {
                PAWN
            } else {
                self.pos.piece_on(m.to()).piece_type()
            };
            let undo = self.pos.make_move(m);
            self.acc.push();
            self.acc.apply_move(&net, &self.pos, m, us, moving, captured);
            undo
        } else {
            self.pos.make_move(m)
        }
    }

    fn undo_move(&mut self, m: Move, undo: Undo) {
        self.pos.unmake_move(m, undo);
        if self.network.is_some() {
            self.acc.pop();
        }
    }

    fn set_stack(&mut self, ply: usize, m: Move, captured: Piece) {
        let us = self.pos.side_to_move();
        let piece = if m == Move::NULL {
            NO_PIECE
        } else if m.is_promotion() {
            Piece::make(us, m.promotion_type())
        } else {
            self.pos.piece_on(m.from())
        };
        self.stack[ply].current_move = m;
        self.stack[ply].current_piece = piece;
        self.stack[ply].captured = captured;
    }

    fn ordering_context(&self, ply: usize, tt_move: Move) -> OrderingContext {
        let killers = self.stack[ply].killers;
        let (counter, prev) = if ply >= 1 && self.stack[ply - 1].current_move.is_ok()
        {
            let pm = self.stack[ply - 1].current_move;
            (
                self.hist.counter_move(pm),
                Some((self.stack[ply - 1].current_piece, pm.to())),
            )
        } else {
            (Move::NONE, None)
        };
        let follow_up = if ply >= 2 && self.stack[ply - 2].current_move.is_ok() {
            self.hist.follow_up_move(self.stack[ply - 2].current_move)
        } else {
            Move::NONE
        };
        OrderingContext {
            tt_move,
            killers,
            counter,
            follow_up,
            prev,
        }
    }

    // Quiescence search: resolves capture chains (and check evasions) so
    // the evaluation is never taken in the middle of a tactic. Hard-capped
    // in both ply and quiescence depth.
    fn qsearch(
        &mut self,
        mut alpha: Value,
        beta: Value,
        ply: i32,
        qdepth: i32,
    ) -> Value {
        if ply >= MAX_PLY || qdepth >= MAX_QSEARCH_DEPTH {
            return self.evaluate_with_bias();
        }

        self.ctrl.add_node();
        self.check_limits();
        if self.must_stop() {
            return Value::ZERO;
        }

        if self.pos.halfmove_clock() >= 100 || self.pos.is_repetition(2) {
            return Value::DRAW;
        }

        if let Some(dtz) = self.tb.probe_dtz(&self.pos) {
            self.ctrl.add_tb_hit();
            return dtz_to_score(dtz, ply);
        }

        let in_check = self.pos.in_check();
        let stand_pat = self.evaluate_with_bias();

        // Standing pat is only an option when not in check; in check every
        // evasion must be examined.
        if !in_check {
            if stand_pat >= beta {
                return beta;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
        }

        let mut list = MoveList::new();
        generate(&self.pos, &mut list, !in_check);
        sort_by_see(&self.pos, list.moves_mut());

        let mut legal = 0;
        for i in 0..list.len() {
            let m = list.get(i);
            if self.pos.piece_on(m.to()).piece_type() == KING {
                continue;
            }

            // Delta pruning: a capture whose exchange value plus a safety
            // margin cannot lift alpha above the stand-pat is futile.
            if !in_check {
                let see = list.moves()[i].value;
                if stand_pat + see + DELTA_MARGIN < alpha {
                    continue;
                }
            }

            let captured = if m.is_en_passant() {
                Piece::make(!self.pos.side_to_move(), PAWN)
            } else {
                self.pos.piece_on(m.to())
            };
            self.set_stack(ply as usize, m, captured);

            let undo = self.do_move(m);
            if self.pos.mover_in_check() {
                self.undo_move(m, undo);
                continue;
            }
            legal += 1;

            let v = -self.qsearch(-beta, -alpha, ply + 1, qdepth + 1);
            self.undo_move(m, undo);

            if self.must_stop() {
                return Value::ZERO;
            }
            if v >= beta {
                return beta;
            }
            if v > alpha {
                alpha = v;
            }
        }

        if in_check && legal == 0 {
            return mated_in(ply);
        }

        alpha
    }

    // ProbCut: a capture that already wins material gets a reduced-depth
    // verification; if that still lands above beta plus a margin, the node
    // is cut without a full search.
    fn probcut(
        &mut self,
        depth: Depth,
        alpha: Value,
        beta: Value,
        ply: i32,
    ) -> Option<Value> {
        let margin = PROBCUT_MARGIN_BASE + PROBCUT_MARGIN_PER_DEPTH * depth;
        let rbeta = beta + margin;

        let mut list = MoveList::new();
        generate(&self.pos, &mut list, true);

        for i in 0..list.len() {
            let m = list.get(i);
            let victim = self.pos.piece_on(m.to());
            if victim == NO_PIECE || victim.piece_type() == KING {
                continue;
            }
            let attacker = self.pos.piece_on(m.from()).piece_type();
            let gain = piece_value(victim.piece_type()) - piece_value(attacker);
            if gain.0 + margin < alpha.0 {
                continue;
            }

            self.set_stack(ply as usize, m, victim);
            let undo = self.do_move(m);
            if self.pos.mover_in_check() {
                self.undo_move(m, undo);
                continue;
            }
            let mut child_pv = Vec::new();
            let v = -self.search(
                depth - 4,
                -rbeta,
                -rbeta + 1,
                ply + 1,
                false,
                &mut child_pv,
                Move::NONE,
            );
            self.undo_move(m, undo);

            if self.must_stop() {
                return Some(Value::ZERO);
            }
            if v >= rbeta {
                return Some(v);
            }
        }

        None
    }

    // The main negamax search with the full pruning/reduction/extension
    // suite. `excluded` carries the move a singular-extension verification
    // wants left out; during such a verification the transposition table
    // is neither probed nor written.
    pub fn search(
        &mut self,
        mut depth: Depth,
        mut alpha: Value,
        mut beta: Value,
        ply: i32,
        cut_node: bool,
        pv: &mut Vec<Move>,
        excluded: Move,
    ) -> Value {
        pv.clear();

        if ply >= MAX_PLY {
            return self.evaluate_with_bias();
        }

        self.ctrl.add_node();
        self.check_limits();
        if self.must_stop() {
            return Value::ZERO;
        }

        // Repetition and fifty-move draws.
        if self.pos.halfmove_clock() >= 100 || self.pos.is_repetition(2) {
            return Value::DRAW;
        }

        // Tablebase probe at the horizon.
        if depth <= 0 {
            if let Some(wdl) = self.tb.probe_wdl(&self.pos) {
                self.ctrl.add_tb_hit();
                return self.tb.wdl_to_score(wdl, ply);
            }
        }

        // Mate distance pruning: the window cannot exceed the best or
        // worst mate reachable from this ply.
        let pv_node = beta.0 - alpha.0 > 1;
        alpha = std::cmp::max(alpha, mated_in(ply));
        beta = std::cmp::min(beta, mate_in(ply + 1));
        if alpha >= beta {
            return alpha;
        }

        let in_check = self.pos.in_check();
        let key = self.pos.key();

        let mut tt_move = Move::NONE;
        let mut tt_score = Value::ZERO;
        let mut tt_depth = -1;
        let mut tt_bound = Bound::NONE;
        let mut tt_dtz = 0;
        let mut tt_present = false;

        if excluded == Move::NONE {
            if let Some(entry) = self.tt.probe(key, depth, alpha, beta) {
                tt_move = entry.mov;
                tt_score = value_from_tt(entry.score, ply);
                tt_depth = entry.depth;
                tt_bound = entry.bound;
                tt_dtz = entry.dtz;
                tt_present = true;
                // Cut on the stored result at null-window nodes only;
                // principal-variation nodes search on so their PV stays
                // complete.
                if entry.hit && !pv_node {
                    if tt_dtz != 0 {
                        return dtz_to_score(tt_dtz, ply);
                    }
                    return tt_score;
                }
            }
        }

        // Cache a tablebase distance for small positions so later visits
        // can cut on it.
        if depth <= 3 && tt_dtz == 0 && excluded == Move::NONE {
            if let Some(dtz) = self.tb.probe_dtz(&self.pos) {
                self.ctrl.add_tb_hit();
                self.tt
                    .store(key, depth, Value::ZERO, Bound::NONE, Move::NONE, dtz);
                tt_dtz = dtz;
            }
        }
        if tt_dtz > 0 && depth >= tt_dtz {
            return dtz_to_score(tt_dtz, ply);
        }

        if depth <= 0 {
            return self.qsearch(alpha, beta, ply, 0);
        }

        let static_eval = self.evaluate_with_bias();
        self.stack[ply as usize].static_eval = static_eval;
        let improving = ply >= 2
            && static_eval > self.stack[(ply - 2) as usize].static_eval;

        // Singular extension: when the hash move comes from a deep enough
        // search whose score was actually achieved (a lower bound or an
        // exact score — an upper bound is only a fail-low ceiling), verify
        // whether every alternative fails well below it; if so this node
        // hinges on one move and deserves an extra ply.
        if excluded == Move::NONE
            && depth >= SINGULAR_EXTENSION_DEPTH
            && tt_move != Move::NONE
            && tt_present
            && tt_depth >= depth - 3
            && (tt_bound == Bound::LOWER || tt_bound == Bound::EXACT)
            && !in_check
            && !tt_score.is_mate_score()
        {
            let singular_beta = tt_score - SINGULAR_MARGIN;
            let mut dummy = Vec::new();
            let v = self.search(
                depth / 2,
                singular_beta - 1,
                singular_beta,
                ply,
                cut_node,
                &mut dummy,
                tt_move,
            );
            if self.must_stop() {
                return Value::ZERO;
            }
            if v < singular_beta {
                depth += 1;
            }
        }

        // ProbCut.
        if !in_check
            && depth >= PROBCUT_DEPTH
            && excluded == Move::NONE
            && beta.abs() < Value::MATE_BOUND
        {
            if let Some(v) = self.probcut(depth, alpha, beta, ply) {
                return v;
            }
        }

        // Null move pruning: hand over the move and search reduced; if the
        // opponent still cannot reach beta the position is good enough to
        // cut. Requires a non-pawn piece so zugzwang positions are spared.
        if !in_check
            && depth >= 2
            && excluded == Move::NONE
            && (ply < 1 || self.stack[(ply - 1) as usize].current_move != Move::NULL)
            && self.pos.has_non_pawn_material(self.pos.side_to_move())
        {
            let r = NULL_MOVE_R + depth / 6;
            self.set_stack(ply as usize, Move::NULL, NO_PIECE);
            let undo = self.pos.make_null();
            if self.network.is_some() {
                self.acc.push();
            }
            let mut dummy = Vec::new();
            let v = -self.search(
                depth - r - 1,
                -beta,
                -beta + 1,
                ply + 1,
                !cut_node,
                &mut dummy,
                Move::NONE,
            );
            if self.network.is_some() {
                self.acc.pop();
            }
            self.pos.unmake_null(undo);
            if self.must_stop() {
                return Value::ZERO;
            }
            if v >= beta {
                return beta;
            }
        }

        // Razoring: a hopeless static eval drops straight into quiescence
        // at depth three and below; at depths four to six a reduced-depth
        // verification search confirms the fail-low before cutting.
        if !in_check
            && depth <= 6
            && excluded == Move::NONE
            && static_eval + razor_margin(depth) < alpha
        {
            let v = if depth <= 3 {
                self.qsearch(alpha, alpha + 1, ply, 0)
            } else {
                let mut dummy = Vec::new();
                self.search(
                    depth - 4,
                    alpha,
                    alpha + 1,
                    ply,
                    cut_node,
                    &mut dummy,
                    Move::NONE,
                )
            };
            if self.must_stop() {
                return Value::ZERO;
            }
            if v <= alpha {
                return v;
            }
        }

        // Reverse futility: a static eval far enough above beta stands.
        if !in_check && excluded == Move::NONE {
            if depth <= 7
                && static_eval - FUTILITY_MARGIN_FACTOR * depth >= beta
            {
                return static_eval;
            }
            if depth > 7 && static_eval - STATIC_NULL_MARGIN >= beta {
                return static_eval;
            }
        }

        let mut list = MoveList::new();
        generate(&self.pos, &mut list, false);
        if excluded != Move::NONE {
            list.retain(|m| m != excluded);
        }

        let ctx = self.ordering_context(ply as usize, tt_move);
        score_moves(&self.pos, list.moves_mut(), &self.hist, &ctx);
        sort_moves(list.moves_mut());

        // Internal iterative deepening: no hash move at a deep node means
        // bad ordering; a reduced search fills the table, then restart.
        if tt_move == Move::NONE && depth >= IID_DEPTH && excluded == Move::NONE
        {
            let mut dummy = Vec::new();
            self.search(
                depth - IID_REDUCTION,
                alpha,
                beta,
                ply,
                cut_node,
                &mut dummy,
                Move::NONE,
            );
            if self.must_stop() {
                return Value::ZERO;
            }
            if let Some(entry) = self.tt.probe(key, 0, alpha, beta) {
                tt_move = entry.mov;
            }
            if tt_move != Move::NONE {
                let ctx = self.ordering_context(ply as usize, tt_move);
                score_moves(&self.pos, list.moves_mut(), &self.hist, &ctx);
                sort_moves(list.moves_mut());
            }
        }

        // Multi-cut: in a cut-node with a hash move, two of the first
        // three alternatives failing high at reduced depth is proof enough.
        if depth >= MULTICUT_DEPTH
            && cut_node
            && !in_check
            && tt_move != Move::NONE
            && excluded == Move::NONE
        {
            let mut fail_highs = 0;
            let mut tried = 0;
            for i in 0..list.len() {
                if tried >= 3 {
                    break;
                }
                let m = list.get(i);
                if m == tt_move
                    || self.pos.piece_on(m.to()).piece_type() == KING
                {
                    continue;
                }
                let captured = if m.is_en_passant() {
                    Piece::make(!self.pos.side_to_move(), PAWN)
                } else {
                    self.pos.piece_on(m.to())
                };
                self.set_stack(ply as usize, m, captured);
                let undo = self.do_move(m);
                if self.pos.mover_in_check() {
                    self.undo_move(m, undo);
                    continue;
                }
                tried += 1;
                let mut dummy = Vec::new();
                let v = -self.search(
                    depth / 2,
                    -beta,
                    -beta + 1,
                    ply + 1,
                    false,
                    &mut dummy,
                    Move::NONE,
                );
                self.undo_move(m, undo);
                if self.must_stop() {
                    return Value::ZERO;
                }
                if v >= beta {
                    fail_highs += 1;
                    if fail_highs >= 2 {
                        return beta;
                    }
                }
            }
        }

        let orig_alpha = alpha;
        let mut best_score = -Value::INFINITE;
        let mut best_move = Move::NONE;
        let mut move_count = 0;
        let mut quiets_tried: Vec<Move> = Vec::new();
        let mut captures_tried: Vec<Move> = Vec::new();

        for i in 0..list.len() {
            let m = list.get(i);
            let move_score = list.moves()[i].value;

            // Defensive: a king capture must never be searched.
            if self.pos.piece_on(m.to()).piece_type() == KING {
                continue;
            }

            let capture = self.pos.is_capture(m);

            // Futility, per move: shallow quiet moves with poor ordering
            // scores that cannot reach alpha are skipped.
            if depth <= 3
                && !in_check
                && !capture
                && move_count > 0
                && best_score > -Value::MATE_BOUND
            {
                let mut margin = SEE_QUIET_MARGIN + 50 * depth;
                if move_score < GOOD_CAPTURE_SCORE {
                    margin += 4 * depth;
                }
                if static_eval + margin <= alpha {
                    continue;
                }
            }

            // Late-move pruning past a depth-scaled index.
            if !capture
                && !in_check
                && depth <= 7
                && move_count > 0
                && i >= LMP_BASE + depth as usize * LMP_FACTOR
            {
                if !improving {
                    continue;
                }
                if i >= LMP_BASE + depth as usize * LMP_FACTOR * 2 {
                    continue;
                }
            }

            let moving_piece = self.pos.piece_on(m.from());
            let gives_check = self.pos.gives_check(m);
            let passed_push = moving_piece.piece_type() == PAWN
                && evaluate::is_passed_pawn(
                    &self.pos,
                    self.pos.side_to_move(),
                    m.to(),
                );
            let captured = if m.is_en_passant() {
                Piece::make(!self.pos.side_to_move(), PAWN)
            } else if m.is_castling() {
                NO_PIECE
            } else {
                self.pos.piece_on(m.to())
            };

            self.set_stack(ply as usize, m, captured);
            let undo = self.do_move(m);
            if self.pos.mover_in_check() {
                self.undo_move(m, undo);
                continue;
            }
            move_count += 1;

            // New depth: check evasions search a full ply; recaptures,
            // passed-pawn pushes and checking moves extend, capped at two
            // plies beyond the nominal depth.
            let mut new_depth = depth - 1;
            if in_check {
                new_depth += 1;
            }
            let mut extension = 0;
            let recapture = ply >= 1
                && self.stack[(ply - 1) as usize].captured != NO_PIECE
                && m.to() == self.stack[(ply - 1) as usize].current_move.to();
            if recapture || passed_push {
                extension = 1;
            }
            if gives_check {
                extension += 1;
            }
            new_depth = std::cmp::min(new_depth + extension, depth + 2);

            let mut child_pv = Vec::new();
            let value;
            if move_count == 1 {
                value = -self.search(
                    new_depth,
                    -beta,
                    -alpha,
                    ply + 1,
                    false,
                    &mut child_pv,
                    Move::NONE,
                );
            } else {
                // Late-move reduction with a null window, re-searched at
                // full depth and window when it unexpectedly improves
                // alpha without failing high.
                let r = reduction(
                    improving,
                    depth,
                    i,
                    move_score,
                    capture,
                    gives_check,
                );
                let mut v = -self.search(
                    new_depth - r,
                    -alpha - 1,
                    -alpha,
                    ply + 1,
                    true,
                    &mut child_pv,
                    Move::NONE,
                );
                if !self.must_stop() && v > alpha && v < beta {
                    child_pv.clear();
                    v = -self.search(
                        new_depth,
                        -beta,
                        -alpha,
                        ply + 1,
                        false,
                        &mut child_pv,
                        Move::NONE,
                    );
                }
                value = v;
            }
            self.undo_move(m, undo);

            // A stopped search returns unusable scores; bail out before
            // they can reach the table or the best-move bookkeeping.
            if self.must_stop() {
                return Value::ZERO;
            }

            if value > best_score {
                best_score = value;
                best_move = m;
                pv.clear();
                pv.push(m);
                pv.extend_from_slice(&child_pv);
                if value > alpha {
                    alpha = value;
                    if value >= beta {
                        self.update_tables_on_cutoff(
                            m,
                            capture,
                            depth,
                            ply,
                            &quiets_tried,
                            &captures_tried,
                        );
                        break;
                    }
                }
            }

            if capture {
                captures_tried.push(m);
            } else {
                quiets_tried.push(m);
            }
        }

        if move_count == 0 {
            return if excluded != Move::NONE {
                alpha
            } else if in_check {
                mated_in(ply)
            } else {
                Value::DRAW
            };
        }

        if excluded == Move::NONE {
            let bound = if best_score >= beta {
                Bound::LOWER
            } else if best_score > orig_alpha {
                Bound::EXACT
            } else {
                Bound::UPPER
            };
            self.tt.store(
                key,
                depth,
                value_to_tt(best_score, ply),
                bound,
                best_move,
                0,
            );
        }

        best_score
    }

    // Beta cutoff bookkeeping: credit the cutting move, debit every
    // earlier move of the same kind, install killers and the counter /
    // follow-up slots keyed by the one- and two-ply predecessors.
    fn update_tables_on_cutoff(
        &mut self,
        m: Move,
        capture: bool,
        depth: Depth,
        ply: i32,
        quiets: &[Move],
        captures: &[Move],
    ) {
        let ply = ply as usize;
        let us = self.pos.side_to_move();
        let bonus = depth * depth;
        let moving = self.pos.piece_on(m.from());

        if !capture {
            if self.stack[ply].killers[0] != m {
                self.stack[ply].killers[1] = self.stack[ply].killers[0];
                self.stack[ply].killers[0] = m;
            }

            self.hist.update_quiet(us, moving, m, bonus);
            let prev = if ply >= 1 && self.stack[ply - 1].current_move.is_ok() {
                Some((
                    self.stack[ply - 1].current_piece,
                    self.stack[ply - 1].current_move,
                ))
            } else {
                None
            };
            if let Some((prev_pc, prev_m)) = prev {
                self.hist.update_continuation(
                    prev_pc,
                    prev_m.to(),
                    moving,
                    m.to(),
                    bonus,
                );
                self.hist.set_counter_move(prev_m, m);
            }
            if ply >= 2 && self.stack[ply - 2].current_move.is_ok() {
                let prev2 = self.stack[ply - 2].current_move;
                self.hist.set_follow_up_move(prev2, m);
            }

            for &q in quiets {
                let pc = self.pos.piece_on(q.from());
                self.hist.update_quiet(us, pc, q, -bonus);
                if let Some((prev_pc, prev_m)) = prev {
                    self.hist.update_continuation(
                        prev_pc,
                        prev_m.to(),
                        pc,
                        q.to(),
                        -bonus,
                    );
                }
            }
        } else {
            let victim = if m.is_en_passant() {
                PAWN
            } else {
                self.pos.piece_on(m.to()).piece_type()
            };
            self.hist.update_capture(moving, victim, m.to(), bonus);
            for &c in captures {
                let pc = self.pos.piece_on(c.from());
                let v = if c.is_en_passant() {
                    PAWN
                } else {
                    self.pos.piece_on(c.to()).piece_type()
                };
                self.hist.update_capture(pc, v, c.to(), -bonus);
            }
        }
    }

    // Iterative deepening over this thread's slice of the root moves.
    // Aspiration windows from depth five onward; the previous best move
    // is re-searched first at every depth.
    pub fn iterate(&mut self, root_moves: Vec<Move>, max_depth: Depth) {
        let mut my_moves: Vec<RootMove> = root_moves
            .into_iter()
            .map(|m| RootMove { m, ord: 0 })
            .collect();
        if my_moves.is_empty() {
            return;
        }

        let mut best_move = Move::NONE;
        let mut best_score = -Value::INFINITE;
        let mut prev_best = Move::NONE;

        for depth in 1..=max_depth {
            if self.must_stop() {
                break;
            }
            if depth > 1 && !self.ctrl.tm.time_for_depth() {
                break;
            }

            // Re-rank the root moves, seeding last iteration's best with
            // an untouchable priority.
            {
                let mut ext: Vec<ExtMove> = my_moves
                    .iter()
                    .map(|rm| ExtMove { m: rm.m, value: 0 })
                    .collect();
                let ctx = OrderingContext::bare(best_move);
                score_moves(&self.pos, &mut ext, &self.hist, &ctx);
                for em in ext.iter_mut() {
                    if em.m == best_move {
                        em.value = 10_000_000;
                    }
                }
                sort_moves(&mut ext);
                my_moves = ext
                    .iter()
                    .map(|em| RootMove {
                        m: em.m,
                        ord: em.value,
                    })
                    .collect();
            }

            let mut alpha = -Value::INFINITE;
            let mut beta = Value::INFINITE;
            if depth >= 5 && best_score > -Value::INFINITE {
                alpha = best_score - ASPIRATION_WINDOW;
                beta = best_score + ASPIRATION_WINDOW;
            }

            let mut depth_best = Move::NONE;
            let mut depth_score = -Value::INFINITE;
            let mut depth_pv: Vec<Move> = Vec::new();

            // Aspiration loop: widen the failing side and retry until the
            // score fits or the window is unbounded.
            loop {
                let mut round_best = Move::NONE;
                let mut round_score = -Value::INFINITE;
                let mut window_alpha = alpha;

                for i in 0..my_moves.len() {
                    if self.must_stop() {
                        break;
                    }
                    let m = my_moves[i].m;
                    let captured = if m.is_en_passant() {
                        Piece::make(!self.pos.side_to_move(), PAWN)
                    } else if m.is_castling() {
                        NO_PIECE
                    } else {
                        self.pos.piece_on(m.to())
                    };
                    self.set_stack(0, m, captured);
                    let undo = self.do_move(m);
                    debug_assert!(!self.pos.mover_in_check());

                    let mut child_pv = Vec::new();
                    let v = if i == 0 || window_alpha == -Value::INFINITE {
                        -self.search(
                            depth - 1,
                            -beta,
                            -window_alpha,
                            1,
                            false,
                            &mut child_pv,
                            Move::NONE,
                        )
                    } else {
                        let mut v = -self.search(
                            depth - 1,
                            -window_alpha - 1,
                            -window_alpha,
                            1,
                            true,
                            &mut child_pv,
                            Move::NONE,
                        );
                        if !self.must_stop() && v > window_alpha && v < beta {
                            child_pv.clear();
                            v = -self.search(
                                depth - 1,
                                -beta,
                                -window_alpha,
                                1,
                                false,
                                &mut child_pv,
                                Move::NONE,
                            );
                        }
                        v
                    };
                    self.undo_move(m, undo);

                    if self.must_stop() {
                        break;
                    }
                    if v > round_score {
                        round_score = v;
                        round_best = m;
                        depth_pv.clear();
                        depth_pv.push(m);
                        depth_pv.extend_from_slice(&child_pv);
                        self.ctrl.update_root_info(m, v, &depth_pv);
                    }
                    if v > window_alpha {
                        window_alpha = v;
                    }
                }

                if round_best != Move::NONE {
                    depth_best = round_best;
                    depth_score = round_score;
                }
                if self.must_stop() || depth < 5 {
                    break;
                }
                if round_score <= alpha && alpha > -Value::INFINITE {
                    alpha = std::cmp::max(
                        -Value::INFINITE,
                        alpha - ASPIRATION_WIDEN,
                    );
                } else if round_score >= beta && beta < Value::INFINITE {
                    beta =
                        std::cmp::min(Value::INFINITE, beta + ASPIRATION_WIDEN);
                } else {
                    break;
                }
            }

            if !self.must_stop() && depth_best != Move::NONE {
                best_move = depth_best;
                best_score = depth_score;

                if self.thread_id == 0 {
                    let changed = depth_best != prev_best;
                    self.ctrl.tm.update(best_score, changed);
                    prev_best = depth_best;
                    self.print_info(depth, best_score, &depth_pv);
                }
            }
        }

        if best_move != Move::NONE {
            self.ctrl.publish_best(best_move, best_score);
        }
    }

    // One info line per completed depth (one per PV line in MultiPV mode),
    // with every printed PV move validated against a replayed position so
    // no illegal move can reach the controller.
    fn print_info(&self, depth: Depth, score: Value, pv: &[Move]) {
        let elapsed = std::cmp::max(self.ctrl.tm.elapsed(), 1) as u64;
        let nodes = self.ctrl.nodes();
        let nps = nodes * 1000 / elapsed;
        let tb_hits = self.ctrl.tb_hits();

        if self.ctrl.multi_pv <= 1 {
            print!(
                "info depth {} score {} nodes {} nps {} time {} tbhits {} pv",
                depth,
                uci::value_string(score),
                nodes,
                nps,
                elapsed,
                tb_hits
            );
            self.print_pv_moves(pv);
            println!();
        } else {
            let infos = self.ctrl.top_root_infos();
            for (k, info) in infos.iter().enumerate() {
                print!(
                    "info depth {} multipv {} score {} nodes {} nps {} time {} tbhits {} pv",
                    depth,
                    k + 1,
                    uci::value_string(info.score),
                    nodes,
                    nps,
                    elapsed,
                    tb_hits
                );
                self.print_pv_moves(&info.pv);
                println!();
            }
        }
        stdout().flush().unwrap();
    }

    fn print_pv_moves(&self, pv: &[Move]) {
        let mut pos = self.pos.clone();
        for &m in pv {
            let mut list = MoveList::new();
            crate::movegen::generate_legal(&mut pos, &mut list);
            if !list.contains(m) {
                break;
            }
            print!(" {}", uci::move_str(m, &pos));
            pos.make_move(m);
        }
    }
}
