// SPDX-License-Identifier: GPL-3.0-or-later

use sable::learn::LearningStore;
use sable::movegen::{generate_legal, MoveList};
use sable::position::{Position, START_FEN};
use sable::search::Searcher;
use sable::tb::Tablebase;
use sable::threads::{self, SearchContext, SearchControl, SearchLimits};
use sable::timeman::{TimeManager, TimeParams};
use sable::tt::TranspositionTable;
use sable::types::*;
use sable::uci;

use std::sync::Arc;

fn quiet_params() -> TimeParams {
    TimeParams {
        wtime: 0,
        btime: 0,
        winc: 0,
        binc: 0,
        movestogo: 0,
        movetime: 0,
        infinite: false,
        ponder: false,
    }
}

struct SearchResult {
    best: Move,
    score: Value,
    pv: Vec<Move>,
    nodes: u64,
}

// Single-threaded fixed-depth search with a fresh transposition table,
// driven the same way the coordinator drives a worker.
fn run_search(fen: &str, depth: i32) -> SearchResult {
    let mut pos = Position::from_fen(fen, false).unwrap();
    let tm = TimeManager::new(pos.side_to_move(), &quiet_params(), 0, 12);
    let ctrl = Arc::new(SearchControl::new(tm, 0, 1));

    let mut list = MoveList::new();
    generate_legal(&mut pos, &mut list);
    let root_moves: Vec<Move> = (0..list.len()).map(|i| list.get(i)).collect();
    ctrl.seed_root_infos(&root_moves);

    let mut searcher = Searcher::new(
        pos,
        Arc::new(TranspositionTable::new(16)),
        Arc::new(Tablebase::new()),
        Arc::new(LearningStore::new()),
        None,
        ctrl.clone(),
        0,
        0,
    );
    searcher.iterate(root_moves, depth);

    SearchResult {
        best: ctrl.best_move(),
        score: ctrl.best_score(),
        pv: ctrl.best_pv(),
        nodes: ctrl.nodes(),
    }
}

fn is_checkmate(pos: &mut Position) -> bool {
    let mut list = MoveList::new();
    generate_legal(pos, &mut list);
    list.len() == 0 && pos.in_check()
}

// S1: from the starting position a sensible opening move comes out and
// every PV move is legal when replayed.
#[test]
fn startpos_plays_a_main_line_opening() {
    let r = run_search(START_FEN, 6);
    let expected = [
        Move::make(Square(12), Square(28)), // e2e4
        Move::make(Square(11), Square(27)), // d2d4
        Move::make(Square(6), Square(21)),  // g1f3
        Move::make(Square(10), Square(26)), // c2c4
    ];
    assert!(
        expected.contains(&r.best),
        "unexpected opening move {}",
        uci::move_str(r.best, &Position::startpos())
    );

    let mut pos = Position::startpos();
    for &m in &r.pv {
        let mut list = MoveList::new();
        generate_legal(&mut pos, &mut list);
        assert!(list.contains(m), "illegal move in pv");
        pos.make_move(m);
    }
}

// S2: king and pawn versus king is winning and the search knows it.
#[test]
fn kpk_is_winning_for_the_pawn_side() {
    let r = run_search("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1", 12);
    assert!(r.score > Value(100), "KPK scored only {}", r.score.0);
    assert!(r.best != Move::NONE);
}

// S3: mate in one is found with the exact mate score. The queen on g7
// already boxes the king in; any guard-keeping move mates.
#[test]
fn mate_in_one_is_found_and_scored() {
    let fen = "7k/5KQ1/8/8/8/8/8/8 w - - 0 1";
    let r = run_search(fen, 6);
    assert_eq!(r.score, mate_in(1), "score {}", r.score.0);
    assert_eq!(uci::value_string(r.score), "mate 1");

    let mut pos = Position::from_fen(fen, false).unwrap();
    pos.make_move(r.best);
    assert!(is_checkmate(&mut pos), "bestmove does not mate");
}

// Mate in two (three plies): the rook ladder 1.Rb7 followed by 2.Ra8#.
// No mate in one exists, so the score must be exactly MATE - 3 and the
// principal variation must run three plies into a checkmate.
#[test]
fn mate_in_two_scored_exactly() {
    let fen = "6k1/8/8/8/8/8/R7/1R4K1 w - - 0 1";
    let r = run_search(fen, 6);
    assert_eq!(r.score, mate_in(3), "score {}", r.score.0);
    assert_eq!(uci::value_string(r.score), "mate 2");
    assert_eq!(r.pv.len(), 3, "pv {:?}", r.pv.len());

    let mut pos = Position::from_fen(fen, false).unwrap();
    for &m in &r.pv {
        let mut list = MoveList::new();
        generate_legal(&mut pos, &mut list);
        assert!(list.contains(m));
        pos.make_move(m);
    }
    assert!(is_checkmate(&mut pos), "pv does not end in mate");
}

// S8: stalemate reports a zero score and bestmove 0000 without searching.
#[test]
fn stalemate_yields_no_move() {
    let pos =
        Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
    let ctx = SearchContext {
        tt: Arc::new(TranspositionTable::new(1)),
        tb: Arc::new(Tablebase::new()),
        learn: Arc::new(LearningStore::new()),
        network: None,
        threads: 1,
        multi_pv: 1,
        contempt: 0,
        move_overhead: 0,
    };
    let limits = SearchLimits {
        depth: 4,
        ..SearchLimits::default()
    };
    assert!(threads::start_search(&pos, &limits, &ctx).is_none());
}

// Threefold repetition at the root scores zero without a deep search.
#[test]
fn threefold_at_root_is_a_draw() {
    let mut pos = Position::startpos();
    let seq = [
        Move::make(Square(6), Square(21)),
        Move::make(Square(57), Square(42)),
        Move::make(Square(21), Square(6)),
        Move::make(Square(42), Square(57)),
    ];
    for _ in 0..2 {
        for &m in &seq {
            pos.make_move(m);
        }
    }
    assert!(pos.is_repetition(2));

    let ctx = SearchContext {
        tt: Arc::new(TranspositionTable::new(1)),
        tb: Arc::new(Tablebase::new()),
        learn: Arc::new(LearningStore::new()),
        network: None,
        threads: 1,
        multi_pv: 1,
        contempt: 0,
        move_overhead: 0,
    };
    let limits = SearchLimits {
        depth: 6,
        ..SearchLimits::default()
    };
    // The draw is reported inline; no search threads are spun up.
    assert!(threads::start_search(&pos, &limits, &ctx).is_none());
}

// S4: the Ruy Lopez position search is reproducible: the same "go"
// twice returns the same move.
#[test]
fn repeated_search_returns_the_same_move() {
    let mut pos = Position::startpos();
    for token in ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6"] {
        let m = uci::to_move(&mut pos, token);
        assert!(m != Move::NONE, "bad move {}", token);
        pos.make_move(m);
    }
    let fen = pos.fen();

    let r1 = run_search(&fen, 4);
    let r2 = run_search(&fen, 4);
    assert!(r1.best != Move::NONE);
    {
        let mut check = pos.clone();
        let mut list = MoveList::new();
        generate_legal(&mut check, &mut list);
        assert!(list.contains(r1.best));
    }
    assert_eq!(r1.best, r2.best);
}

// Property 10: single-threaded search with a cleared table is fully
// deterministic in node count, best move and principal variation.
#[test]
fn single_threaded_search_is_deterministic() {
    let r1 = run_search(START_FEN, 5);
    let r2 = run_search(START_FEN, 5);
    assert_eq!(r1.nodes, r2.nodes);
    assert_eq!(r1.best, r2.best);
    assert_eq!(r1.pv, r2.pv);
    assert_eq!(r1.score, r2.score);
}

// S6: "go infinite" followed by "stop" produces exactly one bestmove and
// returns promptly.
#[test]
fn infinite_search_stops_on_command() {
    let pos = Position::startpos();
    let ctx = SearchContext {
        tt: Arc::new(TranspositionTable::new(8)),
        tb: Arc::new(Tablebase::new()),
        learn: Arc::new(LearningStore::new()),
        network: None,
        threads: 1,
        multi_pv: 1,
        contempt: 0,
        move_overhead: 0,
    };
    let limits = SearchLimits {
        infinite: true,
        ..SearchLimits::default()
    };
    let active = threads::start_search(&pos, &limits, &ctx).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));
    let started = std::time::Instant::now();
    let ctrl = active.stop();
    assert!(ctrl.stopped());
    assert!(
        started.elapsed() < std::time::Duration::from_secs(10),
        "stop did not join promptly"
    );
}

// Mate-score rescaling across the transposition table is bijective for
// any ply (property 6's mate leg).
#[test]
fn tt_mate_rescaling_roundtrips() {
    use sable::search::{value_from_tt, value_to_tt};
    for ply in 0..64 {
        for v in [
            mate_in(ply + 1),
            mate_in(ply + 20),
            mated_in(ply + 2),
            Value(150),
            Value(-3),
        ] {
            assert_eq!(value_from_tt(value_to_tt(v, ply), ply), v);
        }
    }
}
