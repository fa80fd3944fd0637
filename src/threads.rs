// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::learn::LearningStore;
use crate::movegen::{generate_legal, MoveList};
use crate::network::Network;
use crate::position::Position;
use crate::search::Searcher;
use crate::tb::Tablebase;
use crate::timeman::{TimeManager, TimeParams};
use crate::tt::TranspositionTable;
use crate::types::*;
use crate::uci;

use std::io::stdout;
use std::io::Write as IoWrite;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub const MAX_THREADS: usize = 64;

#[derive(Clone)]
pub struct RootInfo {
    pub m: Move,
    pub score: Value,
    pub pv: Vec<Move>,
}

// Everything one search run shares between its workers and the command
// loop: the stop and ponder flags, node and tablebase-hit counters, the
// time manager and the best-move aggregation slot. One value per "go",
// owned behind an Arc; no global mutable state.
pub struct SearchControl {
    stop: AtomicBool,
    nodes: AtomicU64,
    tb_hits: AtomicU64,
    pub node_limit: u64,
    pub tm: TimeManager,
    pub multi_pv: usize,
    best_move: AtomicU32,
    best_score: AtomicI32,
    root_infos: Mutex<Vec<RootInfo>>,
}

impl SearchControl {
    pub fn new(tm: TimeManager, node_limit: u64, multi_pv: usize) -> SearchControl {
        SearchControl {
            stop: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            tb_hits: AtomicU64::new(0),
            node_limit,
            tm,
            multi_pv,
            best_move: AtomicU32::new(Move::NONE.0),
            best_score: AtomicI32::new(-Value::INFINITE.0),
            root_infos: Mutex::new(Vec::new()),
        }
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn add_node(&self) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn add_tb_hit(&self) {
        self.tb_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tb_hits(&self) -> u64 {
        self.tb_hits.load(Ordering::Relaxed)
    }

    // Lock-free best-move aggregation: a compare-and-set loop accepts the
    // higher score, and the move slot follows the winning score.
    pub fn publish_best(&self, m: Move, score: Value) {
        let mut prev = self.best_score.load(Ordering::Relaxed);
        while score.0 > prev {
            match self.best_score.compare_exchange_weak(
                prev,
                score.0,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => prev = p,
            }
        }
        if score.0 >= self.best_score.load(Ordering::Relaxed) {
            self.best_move.store(m.0, Ordering::Relaxed);
        }
    }

    pub fn best_move(&self) -> Move {
        Move(self.best_move.load(Ordering::Relaxed))
    }

    pub fn best_score(&self) -> Value {
        Value(self.best_score.load(Ordering::Relaxed))
    }

    pub fn seed_root_infos(&self, moves: &[Move]) {
        let mut infos = self.root_infos.lock().unwrap();
        infos.clear();
        for &m in moves {
            infos.push(RootInfo {
                m,
                score: -Value::INFINITE,
                pv: vec![m],
            });
        }
    }

    pub fn update_root_info(&self, m: Move, score: Value, pv: &[Move]) {
        let mut infos = self.root_infos.lock().unwrap();
        if let Some(info) = infos.iter_mut().find(|i| i.m == m) {
            info.score = score;
            info.pv = pv.to_vec();
        }
    }

    // The top MultiPV lines, best first.
    pub fn top_root_infos(&self) -> Vec<RootInfo> {
        let infos = self.root_infos.lock().unwrap();
        let mut sorted: Vec<RootInfo> = infos
            .iter()
            .filter(|i| i.score > -Value::INFINITE)
            .cloned()
            .collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score));
        sorted.truncate(self.multi_pv);
        sorted
    }

    pub fn best_pv(&self) -> Vec<Move> {
        self.top_root_infos()
            .first()
            .map(|i| i.pv.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct SearchLimits {
    pub depth: i32,
    pub nodes: u64,
    pub movetime: i64,
    pub wtime: i64,
    pub btime: i64,
    pub winc: i64,
    pub binc: i64,
    pub movestogo: i32,
    pub infinite: bool,
    pub ponder: bool,
}

// A running search: the shared control block plus the thread that joins
// the workers and prints "bestmove".
pub struct ActiveSearch {
    pub ctrl: Arc<SearchControl>,
    waiter: Option<thread::JoinHandle<()>>,
}

impl ActiveSearch {
    // Sets the stop flag and waits until the bestmove line is out. After
    // this returns nothing more is printed by the search.
    pub fn stop(mut self) -> Arc<SearchControl> {
        self.ctrl.request_stop();
        if let Some(h) = self.waiter.take() {
            let _ = h.join();
        }
        self.ctrl
    }

    pub fn is_finished(&self) -> bool {
        self.waiter
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }
}

pub struct SearchContext {
    pub tt: Arc<TranspositionTable>,
    pub tb: Arc<Tablebase>,
    pub learn: Arc<LearningStore>,
    pub network: Option<Arc<Network>>,
    pub threads: usize,
    pub multi_pv: usize,
    pub contempt: i32,
    pub move_overhead: i64,
}

// Starts a search on its own thread pool and returns immediately so the
// command loop stays responsive. Root moves are filtered to the legal set
// and partitioned across the workers; each worker runs its own iterative
// deepening over its slice. A waiter thread joins the workers and emits
// exactly one "bestmove" line, holding it back while pondering or in an
// infinite search until "stop" or "ponderhit" arrives.
pub fn start_search(
    pos: &Position,
    limits: &SearchLimits,
    ctx: &SearchContext,
) -> Option<ActiveSearch> {
    let mut root = pos.clone();

    let mut list = MoveList::new();
    generate_legal(&mut root, &mut list);
    let root_moves: Vec<Move> = (0..list.len()).map(|i| list.get(i)).collect();

    if root_moves.is_empty() {
        let score = if root.in_check() {
            -Value::MATE
        } else {
            Value::DRAW
        };
        println!("info depth 0 score {}", uci::value_string(score));
        println!("bestmove 0000");
        stdout().flush().unwrap();
        return None;
    }

    let params = TimeParams {
        wtime: limits.wtime,
        btime: limits.btime,
        winc: limits.winc,
        binc: limits.binc,
        movestogo: limits.movestogo,
        movetime: limits.movetime,
        infinite: limits.infinite,
        ponder: limits.ponder,
    };
    let tm = TimeManager::new(
        root.side_to_move(),
        &params,
        ctx.move_overhead,
        root.game_phase(),
    );
    // Few legal moves need little thought, many deserve a bit more.
    tm.scale((0.5 + root_moves.len() as f64 / 64.0).clamp(0.2, 1.5));

    let ctrl = Arc::new(SearchControl::new(tm, limits.nodes, ctx.multi_pv));
    ctrl.seed_root_infos(&root_moves);

    // A position already drawn by rule or repetition scores zero; report
    // it and a legal move without searching.
    if root.halfmove_clock() >= 100 || root.is_repetition(2) {
        ctrl.publish_best(root_moves[0], Value::DRAW);
        println!("info depth 1 score {}", uci::value_string(Value::DRAW));
        println!("bestmove {}", uci::move_str(root_moves[0], &root));
        stdout().flush().unwrap();
        return None;
    }

    let max_depth = if limits.depth > 0 {
        std::cmp::min(limits.depth, MAX_PLY - 1)
    } else {
        MAX_PLY - 1
    };

    let thread_count = ctx.threads.clamp(1, MAX_THREADS).min(root_moves.len());
    let per_thread = (root_moves.len() + thread_count - 1) / thread_count;

    ctx.tt.new_search();

    let mut workers = Vec::new();
    for id in 0..thread_count {
        let start = id * per_thread;
        if start >= root_moves.len() {
            break;
        }
        let end = std::cmp::min(start + per_thread, root_moves.len());
        let slice: Vec<Move> = root_moves[start..end].to_vec();

        let pos = root.clone();
        let tt = ctx.tt.clone();
        let tb = ctx.tb.clone();
        let learn = ctx.learn.clone();
        let network = ctx.network.clone();
        let ctrl = ctrl.clone();
        let contempt = ctx.contempt;

        let builder = thread::Builder::new().stack_size(16 * 1024 * 1024);
        let handle = builder
            .spawn(move || {
                let mut searcher = Searcher::new(
                    pos, tt, tb, learn, network, ctrl, id, contempt,
                );
                searcher.iterate(slice, max_depth);
            })
            .unwrap();
        workers.push(handle);
    }

    let waiter_ctrl = ctrl.clone();
    let fallback = root_moves[0];
    let bestmove_pos = root.clone();
    let waiter = thread::spawn(move || {
        for h in workers {
            let _ = h.join();
        }
        // Pondering and infinite searches hold the bestmove until the
        // controller says stop (or converts the ponder search).
        while !waiter_ctrl.stopped()
            && (waiter_ctrl.tm.is_pondering() || waiter_ctrl.tm.is_infinite())
        {
            thread::sleep(std::time::Duration::from_millis(1));
        }
        let mut best = waiter_ctrl.best_move();
        if best == Move::NONE {
            best = fallback;
        }
        println!("bestmove {}", uci::move_str(best, &bestmove_pos));
        stdout().flush().unwrap();
    });

    Some(ActiveSearch {
        ctrl,
        waiter: Some(waiter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_best_keeps_the_higher_score() {
        let tm = TimeManager::new(
            WHITE,
            &TimeParams {
                wtime: 0,
                btime: 0,
                winc: 0,
                binc: 0,
                movestogo: 0,
                movetime: 0,
                infinite: true,
                ponder: false,
            },
            0,
            12,
        );
        let ctrl = SearchControl::new(tm, 0, 1);
        let a = Move::make(Square(12), Square(28));
        let b = Move::make(Square(11), Square(27));
        ctrl.publish_best(a, Value(50));
        ctrl.publish_best(b, Value(10));
        assert_eq!(ctrl.best_move(), a);
        ctrl.publish_best(b, Value(90));
        assert_eq!(ctrl.best_move(), b);
    }

    #[test]
    fn root_infos_track_best_lines() {
        let tm = TimeManager::new(
            WHITE,
            &TimeParams {
                wtime: 0,
                btime: 0,
                winc: 0,
                binc: 0,
                movestogo: 0,
                movetime: 0,
                infinite: true,
                ponder: false,
            },
            0,
            12,
        );
        let ctrl = SearchControl::new(tm, 0, 2);
        let a = Move::make(Square(12), Square(28));
        let b = Move::make(Square(11), Square(27));
        ctrl.seed_root_infos(&[a, b]);
        ctrl.update_root_info(a, Value(30), &[a]);
        ctrl.update_root_info(b, Value(60), &[b]);
        let top = ctrl.top_root_infos();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].m, b);
        assert_eq!(top[1].m, a);
        assert_eq!(ctrl.best_pv(), vec![b]);
    }
}
