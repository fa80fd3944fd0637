// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use crate::book::Book;
use crate::evaluate;
use crate::learn::LearningStore;
use crate::misc;
use crate::movegen::{generate_legal, MoveList};
use crate::network::Network;
use crate::position::Position;
use crate::search;
use crate::tb::Tablebase;
use crate::threads::{self, ActiveSearch, SearchContext, SearchControl, SearchLimits};
use crate::tt::TranspositionTable;
use crate::types::*;
use crate::ucioption::{self, Options};

use std::io::stdout;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

pub fn square_str(s: Square) -> String {
    let mut out = String::new();
    out.push((b'a' + s.file() as u8) as char);
    out.push((b'1' + s.rank() as u8) as char);
    out
}

// Score formatting per the protocol: centipawns, or moves-to-mate once
// the score enters the mate band (negative when the engine is mated).
pub fn value_string(v: Value) -> String {
    if v.abs() <= Value(Value::MATE.0 - 1000) {
        format!("cp {}", v.0)
    } else {
        let dtm = if v > Value::ZERO {
            (Value::MATE.0 - v.0 + 1) / 2
        } else {
            (-Value::MATE.0 - v.0) / 2
        };
        format!("mate {}", dtm)
    }
}

// Move text: from-square, to-square, promotion suffix. Castling prints as
// king-origin to king-destination in standard chess and as king-origin to
// rook-origin in Chess960 mode. Pass the position the move is made from.
pub fn move_str(m: Move, pos: &Position) -> String {
    if m == Move::NONE || m == Move::NULL {
        return String::from("0000");
    }

    let from = m.from();
    let mut to = m.to();

    if m.is_castling() && pos.is_chess960() {
        let us = pos.piece_on(from).color();
        let side = if to.file() == FILE_G { KING_SIDE } else { QUEEN_SIDE };
        let rook = pos.castle_rook(us, side);
        if rook != Square::NONE {
            to = rook;
        }
    }

    let mut out = square_str(from);
    out.push_str(&square_str(to));
    if m.is_promotion() {
        out.push(match m.promotion_type() {
            KNIGHT => 'n',
            BISHOP => 'b',
            ROOK => 'r',
            _ => 'q',
        });
    }
    out
}

// Parses controller move text against the legal moves of the position.
// Both castling forms are accepted (e1g1 and e1h1): a king landing on its
// own rook is unambiguous, since that square is otherwise unreachable.
// Anything that does not match a legal move comes back as Move::NONE.
pub fn to_move(pos: &mut Position, s: &str) -> Move {
    let mut list = MoveList::new();
    generate_legal(pos, &mut list);

    for i in 0..list.len() {
        let m = list.get(i);
        if move_str(m, pos) == s {
            return m;
        }
        if m.is_castling() {
            let from = m.from();
            let us = pos.piece_on(from).color();
            let side =
                if m.to().file() == FILE_G { KING_SIDE } else { QUEEN_SIDE };
            let rook = pos.castle_rook(us, side);
            let king_form = format!("{}{}", square_str(from), square_str(m.to()));
            let rook_form = format!("{}{}", square_str(from), square_str(rook));
            if s == king_form || s == rook_form {
                return m;
            }
        }
    }

    Move::NONE
}

pub struct Engine {
    pos: Position,
    options: Options,
    tt: Arc<TranspositionTable>,
    tb: Arc<Tablebase>,
    learn: Arc<LearningStore>,
    network: Option<Arc<Network>>,
    book: Book,
    active: Option<ActiveSearch>,
    last_ctrl: Option<Arc<SearchControl>>,
}

impl Engine {
    pub fn new() -> Engine {
        let options = Options::default();
        Engine {
            pos: Position::startpos(),
            tt: Arc::new(TranspositionTable::new(options.hash_mb)),
            tb: Arc::new(Tablebase::new()),
            learn: Arc::new(LearningStore::new()),
            network: None,
            book: Book::empty(),
            active: None,
            last_ctrl: None,
            options,
        }
    }

    fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            self.last_ctrl = Some(active.stop());
        }
    }

    // Returns false on "quit".
    pub fn handle_command(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        let (token, args) = match trimmed.find(char::is_whitespace) {
            Some(idx) => {
                let (t, a) = trimmed.split_at(idx);
                (t, a.trim())
            }
            None => (trimmed, ""),
        };

        match token {
            "uci" => {
                println!("id name {}", misc::engine_info(true));
                ucioption::print();
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                self.stop_active();
                self.pos = Position::startpos();
                if self.options.chess960 {
                    self.pos.set_chess960(true);
                }
                self.tt.clear();
            }
            "setoption" => self.cmd_setoption(args),
            "position" => self.cmd_position(args),
            "go" => self.cmd_go(args),
            "stop" => self.stop_active(),
            "ponderhit" => {
                if let Some(active) = &self.active {
                    active.ctrl.tm.ponderhit();
                }
            }
            "learn" => self.cmd_learn(args),
            "d" => self.cmd_display(),
            "perft" => self.cmd_perft(args),
            "quit" => {
                self.stop_active();
                return false;
            }
            _ => {} // Unknown input is ignored; the engine stays responsive.
        }
        stdout().flush().unwrap();
        true
    }

    fn cmd_setoption(&mut self, args: &str) {
        let Some(idx) = args.find("name") else {
            return;
        };
        let rest = &args[idx + 4..];
        let (name, value) = match rest.find("value") {
            Some(v) => (rest[..v].trim(), rest[v + 5..].trim()),
            None => (rest.trim(), ""),
        };

        match name {
            "Hash" => {
                self.stop_active();
                self.options.hash_mb =
                    ucioption::spin(value, 256, 1, 8192) as usize;
                self.tt =
                    Arc::new(TranspositionTable::new(self.options.hash_mb));
            }
            "Threads" => {
                self.options.threads = ucioption::spin(value, 1, 1, 64) as usize;
            }
            "MultiPV" => {
                self.options.multi_pv = ucioption::spin(value, 1, 1, 5) as usize;
            }
            "Ponder" => self.options.ponder = ucioption::check(value, false),
            "OwnBook" => {
                self.options.own_book = ucioption::check(value, false);
                if !self.options.own_book {
                    self.book = Book::empty();
                } else if !self.options.book_file.is_empty() {
                    self.book = Book::load(&self.options.book_file)
                        .unwrap_or_else(Book::empty);
                }
            }
            "BookFile" => {
                self.options.book_file = String::from(value);
                if !value.is_empty() {
                    self.book = Book::load(value).unwrap_or_else(Book::empty);
                }
            }
            "BookVariety" => {
                self.options.book_variety = ucioption::spin(value, 0, 0, 10);
            }
            "SyzygyPath" => {
                self.options.syzygy_path = String::from(value);
                if !value.is_empty() && value != "<empty>" {
                    self.tb.init(value);
                }
            }
            "EvalFile" => {
                self.options.eval_file = String::from(value);
                self.network = Network::load(value).map(Arc::new);
            }
            "Contempt" => {
                self.options.contempt = ucioption::spin(value, 0, -100, 100);
            }
            "Move Overhead" => {
                self.options.move_overhead =
                    ucioption::spin(value, 100, 0, 5000) as i64;
            }
            "UCI_Chess960" => {
                self.options.chess960 = ucioption::check(value, false);
                self.pos.set_chess960(self.options.chess960);
            }
            "UCI_LimitStrength" => {
                self.options.limit_strength = ucioption::check(value, false);
            }
            "UCI_Elo" => {
                self.options.elo = ucioption::spin(value, 1500, 800, 3000);
            }
            "Learning" => {
                self.options.learning = ucioption::check(value, false);
                self.learn.set_enabled(self.options.learning);
                if self.options.learning
                    && !self.options.learning_file.is_empty()
                {
                    self.learn.load();
                }
            }
            "LearningFile" => {
                self.options.learning_file = String::from(value);
                self.learn.set_filename(value);
                if self.options.learning {
                    self.learn.load();
                }
            }
            "LearningRate" => {
                self.options.learning_rate = ucioption::spin(value, 100, 1, 1000);
                self.learn.set_rate(self.options.learning_rate);
            }
            "LearningMaxAdjust" => {
                self.options.learning_max_adjust =
                    ucioption::spin(value, 50, 0, 200);
                self.learn.set_max_adjust(self.options.learning_max_adjust);
            }
            "Clear Hash" => self.tt.clear(),
            "Clear Learning" => self.learn.clear(),
            "Save Learning" => {
                self.learn.save();
            }
            _ => {}
        }
    }

    // "position startpos [moves ...]" / "position fen <fen> [moves ...]".
    // A malformed FEN leaves the current position untouched; an illegal
    // move stops the list there without applying it.
    fn cmd_position(&mut self, args: &str) {
        let moves_idx = args.find("moves");
        let head = match moves_idx {
            Some(idx) => args[..idx].trim(),
            None => args.trim(),
        };

        let new_pos = if head == "startpos" {
            Some(Position::startpos())
        } else if let Some(fen) = head.strip_prefix("fen") {
            Position::from_fen(fen.trim(), self.options.chess960)
        } else {
            None
        };

        let Some(mut pos) = new_pos else {
            return;
        };
        if self.options.chess960 {
            pos.set_chess960(true);
        }

        if let Some(idx) = moves_idx {
            for token in args[idx + 5..].split_whitespace() {
                let m = to_move(&mut pos, token);
                if m == Move::NONE {
                    break;
                }
                pos.make_move(m);
            }
        }

        self.pos = pos;
    }

    fn cmd_go(&mut self, args: &str) {
        self.stop_active();

        fn next_num(it: &mut std::str::SplitWhitespace<'_>) -> i64 {
            it.next().and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
        }

        let mut limits = SearchLimits::default();
        let mut it = args.split_whitespace();
        while let Some(token) = it.next() {
            match token {
                "depth" => limits.depth = next_num(&mut it) as i32,
                "nodes" => limits.nodes = next_num(&mut it).max(0) as u64,
                "movetime" => limits.movetime = next_num(&mut it),
                "wtime" => limits.wtime = next_num(&mut it),
                "btime" => limits.btime = next_num(&mut it),
                "winc" => limits.winc = next_num(&mut it),
                "binc" => limits.binc = next_num(&mut it),
                "movestogo" => limits.movestogo = next_num(&mut it) as i32,
                "infinite" => limits.infinite = true,
                "ponder" => limits.ponder = true,
                _ => {}
            }
        }

        // Without any limit the search runs until "stop".
        if !limits.infinite
            && limits.depth == 0
            && limits.nodes == 0
            && limits.movetime == 0
            && limits.wtime == 0
            && limits.btime == 0
        {
            limits.infinite = true;
        }

        if self.options.limit_strength {
            let elo_depth = (1 + (self.options.elo - 800) / 100).clamp(1, 30);
            limits.depth = if limits.depth > 0 {
                std::cmp::min(limits.depth, elo_depth)
            } else {
                elo_depth
            };
        }

        // Book and tablebase oracles answer at the root before any search
        // is spun up, but never while pondering or analyzing.
        if !limits.ponder && !limits.infinite {
            if self.options.own_book && self.book.is_loaded() {
                let m = self.book.probe(&mut self.pos, self.options.book_variety);
                if m != Move::NONE {
                    println!("bestmove {}", move_str(m, &self.pos));
                    return;
                }
            }
            if let Some(m) = self.tb.probe_root(&self.pos) {
                println!("bestmove {}", move_str(m, &self.pos));
                return;
            }
        }

        let ctx = SearchContext {
            tt: self.tt.clone(),
            tb: self.tb.clone(),
            learn: self.learn.clone(),
            network: self.network.clone(),
            threads: self.options.threads,
            multi_pv: self.options.multi_pv,
            contempt: self.options.contempt,
            move_overhead: self.options.move_overhead,
        };

        self.active = threads::start_search(&self.pos, &limits, &ctx);
    }

    // "learn result win|draw|loss" feeds the last search's principal
    // variation into the learning store; "learn clear" and "learn save"
    // manage the table.
    fn cmd_learn(&mut self, args: &str) {
        let mut it = args.split_whitespace();
        match it.next() {
            Some("result") => {
                let result = match it.next() {
                    Some("win") => 1,
                    Some("loss") => -1,
                    _ => 0,
                };
                let pv = match &self.last_ctrl {
                    Some(ctrl) => ctrl.best_pv(),
                    None => Vec::new(),
                };
                if pv.is_empty() {
                    println!("info string no pv available from last search");
                    return;
                }
                let mut pos = self.pos.clone();
                for m in pv {
                    self.learn.update(pos.key(), result, pos.side_to_move());
                    let mut list = MoveList::new();
                    generate_legal(&mut pos, &mut list);
                    if !list.contains(m) {
                        break;
                    }
                    pos.make_move(m);
                }
            }
            Some("clear") => self.learn.clear(),
            Some("save") => {
                self.learn.save();
            }
            _ => {}
        }
    }

    fn cmd_display(&mut self) {
        println!("\n +---+---+---+---+---+---+---+---+");
        for r in (0..8).rev() {
            print!(" |");
            for f in 0..8 {
                let pc = self.pos.piece_on(Square::make(f, r));
                let ch = if pc == NO_PIECE {
                    ' '
                } else {
                    let c = match pc.piece_type() {
                        PAWN => 'p',
                        KNIGHT => 'n',
                        BISHOP => 'b',
                        ROOK => 'r',
                        QUEEN => 'q',
                        _ => 'k',
                    };
                    if pc.color() == WHITE {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    }
                };
                print!(" {} |", ch);
            }
            println!("\n +---+---+---+---+---+---+---+---+");
        }
        println!("\nFen: {}", self.pos.fen());
        println!("Key: {}", self.pos.key());
        println!(
            "Eval: {}",
            evaluate::evaluate(&self.pos, self.options.contempt).0
        );
    }

    fn cmd_perft(&mut self, args: &str) {
        let depth: Depth = args
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .unwrap_or(1)
            .max(1);

        let now = Instant::now();
        let mut total = 0u64;
        let mut list = MoveList::new();
        generate_legal(&mut self.pos, &mut list);
        for i in 0..list.len() {
            let m = list.get(i);
            let undo = self.pos.make_move(m);
            let cnt = if depth <= 1 {
                1
            } else {
                search::perft(&mut self.pos, depth - 1)
            };
            self.pos.unmake_move(m, undo);
            println!("{}: {}", move_str(m, &self.pos), cnt);
            total += cnt;
        }
        let ms = now.elapsed().as_millis().max(1);
        println!(
            "\nNodes searched: {} time: {}ms nps: {}",
            total,
            ms,
            total as u128 * 1000 / ms
        );
    }
}

// Blocks reading commands from stdin until "quit" or EOF.
pub fn cmd_loop() {
    let mut engine = Engine::new();
    let mut line = String::new();
    loop {
        line.clear();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            engine.handle_command("quit");
            break;
        }
        if !engine.handle_command(&line) {
            break;
        }
    }
}
