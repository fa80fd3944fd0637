// SPDX-License-Identifier: GPL-3.0-or-later

use sable::misc;
use sable::uci;

fn main() {
    println!("{}", misc::engine_info(false));
    uci::cmd_loop();
}
