// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

// Typed configuration owned by the command loop. The option list printed
// for "uci" lives here next to the values so the two cannot drift apart.

pub struct Options {
    pub hash_mb: usize,
    pub threads: usize,
    pub multi_pv: usize,
    pub ponder: bool,
    pub own_book: bool,
    pub book_file: String,
    pub book_variety: i32,
    pub syzygy_path: String,
    pub eval_file: String,
    pub contempt: i32,
    pub move_overhead: i64,
    pub chess960: bool,
    pub limit_strength: bool,
    pub elo: i32,
    pub learning: bool,
    pub learning_file: String,
    pub learning_rate: i32,
    pub learning_max_adjust: i32,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            hash_mb: 256,
            threads: 1,
            multi_pv: 1,
            ponder: false,
            own_book: false,
            book_file: String::new(),
            book_variety: 0,
            syzygy_path: String::new(),
            eval_file: String::new(),
            contempt: 0,
            move_overhead: 100,
            chess960: false,
            limit_strength: false,
            elo: 1500,
            learning: false,
            learning_file: String::new(),
            learning_rate: 100,
            learning_max_adjust: 50,
        }
    }
}

pub fn print() {
    println!("option name Hash type spin default 256 min 1 max 8192");
    println!("option name Threads type spin default 1 min 1 max 64");
    println!("option name MultiPV type spin default 1 min 1 max 5");
    println!("option name Ponder type check default false");
    println!("option name OwnBook type check default false");
    println!("option name BookFile type string default <empty>");
    println!("option name BookVariety type spin default 0 min 0 max 10");
    println!("option name SyzygyPath type string default <empty>");
    println!("option name EvalFile type string default <empty>");
    println!("option name Contempt type spin default 0 min -100 max 100");
    println!("option name Move Overhead type spin default 100 min 0 max 5000");
    println!("option name UCI_Chess960 type check default false");
    println!("option name UCI_LimitStrength type check default false");
    println!("option name UCI_Elo type spin default 1500 min 800 max 3000");
    println!("option name Learning type check default false");
    println!("option name LearningFile type string default <empty>");
    println!("option name LearningRate type spin default 100 min 1 max 1000");
    println!("option name LearningMaxAdjust type spin default 50 min 0 max 200");
    println!("option name Clear Hash type button");
    println!("option name Clear Learning type button");
    println!("option name Save Learning type button");
}

pub fn spin(value: &str, default: i32, min: i32, max: i32) -> i32 {
    value.parse::<i32>().unwrap_or(default).clamp(min, max)
}

pub fn check(value: &str, default: bool) -> bool {
    match value {
        "true" => true,
        "false" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_clamps_and_survives_garbage() {
        assert_eq!(spin("300", 1, 1, 64), 64);
        assert_eq!(spin("-7", 1, 1, 64), 1);
        assert_eq!(spin("16", 1, 1, 64), 16);
        assert_eq!(spin("junk", 4, 1, 64), 4);
    }

    #[test]
    fn check_parses_strictly() {
        assert!(check("true", false));
        assert!(!check("false", true));
        assert!(check("maybe", true));
    }
}
