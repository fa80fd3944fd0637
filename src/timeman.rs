// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::types::*;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

// Per-search time budget. A soft limit gates the start of a new
// iteration, a hard limit aborts the search mid-iteration; both are
// scaled by how unstable the best move has been and how far the score
// has dropped. Pondering and infinite searches have no deadline until
// "ponderhit" or "stop" converts them.
pub struct TimeManager {
    start: Mutex<Instant>,
    soft_limit: AtomicI64,
    hard_limit: AtomicI64,
    movetime: AtomicI64,
    move_overhead: i64,
    infinite: AtomicBool,
    pondering: AtomicBool,
    score_drops: AtomicI32,
    stability: AtomicI32,
    prev_score: AtomicI32,
    game_phase: i32,
}

pub struct TimeParams {
    pub wtime: i64,
    pub btime: i64,
    pub winc: i64,
    pub binc: i64,
    pub movestogo: i32,
    pub movetime: i64,
    pub infinite: bool,
    pub ponder: bool,
}

impl TimeManager {
    pub fn new(
        us: Color,
        params: &TimeParams,
        move_overhead: i64,
        game_phase: i32,
    ) -> TimeManager {
        let tm = TimeManager {
            start: Mutex::new(Instant::now()),
            soft_limit: AtomicI64::new(i64::MAX),
            hard_limit: AtomicI64::new(i64::MAX),
            movetime: AtomicI64::new(params.movetime),
            move_overhead,
            infinite: AtomicBool::new(params.infinite),
            pondering: AtomicBool::new(params.ponder),
            score_drops: AtomicI32::new(0),
            stability: AtomicI32::new(0),
            prev_score: AtomicI32::new(0),
            game_phase,
        };

        // The budget is computed even when pondering: out_of_time() stays
        // false until "ponderhit" re-arms the clock, at which point these
        // limits apply.
        if params.movetime > 0 {
            tm.soft_limit.store(params.movetime, Ordering::Relaxed);
            tm.hard_limit.store(params.movetime, Ordering::Relaxed);
        } else if !params.infinite {
            let time_left = if us == WHITE { params.wtime } else { params.btime };
            let inc = if us == WHITE { params.winc } else { params.binc };
            if time_left > 0 {
                let mtg = if params.movestogo > 0 {
                    params.movestogo as i64
                } else {
                    40
                };
                let base = time_left / mtg.max(5) + inc / 2;
                tm.soft_limit.store(base, Ordering::Relaxed);
                tm.hard_limit
                    .store(std::cmp::min(time_left / 2, base * 5), Ordering::Relaxed);
            }
        }

        tm
    }

    pub fn elapsed(&self) -> i64 {
        self.start.lock().unwrap().elapsed().as_millis() as i64
    }

    pub fn is_pondering(&self) -> bool {
        self.pondering.load(Ordering::Relaxed)
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite.load(Ordering::Relaxed)
    }

    // "ponderhit": the pondered move was played, so the budget computed at
    // "go" starts counting from now.
    pub fn ponderhit(&self) {
        *self.start.lock().unwrap() = Instant::now();
        self.pondering.store(false, Ordering::Relaxed);
    }

    // Root-move-count scaling: a forced position deserves little time,
    // a wide one a bit more.
    pub fn scale(&self, factor: f64) {
        let factor = factor.clamp(0.2, 1.5);
        for limit in [&self.soft_limit, &self.hard_limit] {
            let v = limit.load(Ordering::Relaxed);
            if v != i64::MAX {
                limit.store((v as f64 * factor) as i64, Ordering::Relaxed);
            }
        }
    }

    // Called by the main searcher after each completed iteration.
    pub fn update(&self, score: Value, best_move_changed: bool) {
        let prev = self.prev_score.swap(score.0, Ordering::Relaxed);
        if score.0 < prev - 50 {
            self.score_drops.fetch_add(1, Ordering::Relaxed);
        } else {
            let d = self.score_drops.load(Ordering::Relaxed);
            self.score_drops.store((d - 1).max(0), Ordering::Relaxed);
        }
        if best_move_changed {
            self.stability.store(0, Ordering::Relaxed);
        } else {
            self.stability.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Is starting another iteration worthwhile?
    pub fn time_for_depth(&self) -> bool {
        if self.is_infinite() || self.is_pondering() {
            return true;
        }
        let soft = self.soft_limit.load(Ordering::Relaxed);
        if soft == i64::MAX {
            return true;
        }
        let mut factor = 1.0f64;
        if self.stability.load(Ordering::Relaxed) < 3 {
            factor *= 1.5;
        }
        if self.score_drops.load(Ordering::Relaxed) > 2 {
            factor *= 1.3;
        }
        factor *= 1.0 + 0.5 * (1.0 - (self.game_phase - 12).abs() as f64 / 12.0);
        (self.elapsed() as f64) < soft as f64 * factor
    }

    // Hard deadline check, polled inside the search.
    pub fn out_of_time(&self) -> bool {
        if self.is_infinite() || self.is_pondering() {
            return false;
        }
        let movetime = self.movetime.load(Ordering::Relaxed);
        if movetime > 0 {
            return self.elapsed() + self.move_overhead >= movetime;
        }
        let hard = self.hard_limit.load(Ordering::Relaxed);
        hard != i64::MAX && self.elapsed() + self.move_overhead >= hard
    }
}
