//! PGN (Portable Game Notation) export.
//!
//! Produces PGN with the Seven Tag Roster and move text with move numbers,
//! wrapped at 80 columns.

use chrono::{Local, NaiveDate};

use crate::engine::game::Game;
use crate::engine::types::{Color, GameStatus};

/// Maximum length of a move-text line.
const LINE_WIDTH: usize = 80;

// =========================================================================
// Headers
// =========================================================================

/// The Seven Tag Roster. Unknown values use the PGN placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PgnHeaders {
    pub event: String,
    pub site: String,
    /// `YYYY.MM.DD`, with `??` for unknown parts.
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    /// Overrides the result derived from the game status when set.
    pub result: Option<String>,
}

impl Default for PgnHeaders {
    fn default() -> Self {
        PgnHeaders {
            event: "?".into(),
            site: "?".into(),
            date: "????.??.??".into(),
            round: "?".into(),
            white: "?".into(),
            black: "?".into(),
            result: None,
        }
    }
}

impl PgnHeaders {
    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = date.format("%Y.%m.%d").to_string();
    }

    /// Default headers dated with the local calendar day.
    pub fn dated_today() -> Self {
        let mut headers = Self::default();
        headers.set_date(Local::now().date_naive());
        headers
    }
}

// =========================================================================
// PGN generation
// =========================================================================

/// PGN result token for a status.
pub fn result_token(status: &GameStatus) -> &'static str {
    match status {
        GameStatus::Checkmate { winner } | GameStatus::Resigned { winner } => match winner {
            Color::White => "1-0",
            Color::Black => "0-1",
        },
        GameStatus::Stalemate | GameStatus::Draw(_) => "1/2-1/2",
        GameStatus::Active | GameStatus::Check => "*",
    }
}

/// Export a game as a PGN string.
pub fn to_pgn(game: &Game) -> String {
    let headers = game.headers();
    let result = headers
        .result
        .clone()
        .unwrap_or_else(|| result_token(game.status()).to_string());

    let mut pgn = String::with_capacity(512);
    for (tag, value) in [
        ("Event", headers.event.as_str()),
        ("Site", headers.site.as_str()),
        ("Date", headers.date.as_str()),
        ("Round", headers.round.as_str()),
        ("White", headers.white.as_str()),
        ("Black", headers.black.as_str()),
        ("Result", result.as_str()),
    ] {
        push_tag(&mut pgn, tag, value);
    }

    // Games not starting from the initial array carry their position.
    if let Some(fen) = game.starting_fen() {
        push_tag(&mut pgn, "SetUp", "1");
        push_tag(&mut pgn, "FEN", fen);
    }
    pgn.push('\n');

    // Move text.
    let mut move_num = u32::from(game.start_fullmove());
    let mut white_turn = game.start_side() == Color::White;
    let mut tokens = Vec::with_capacity(game.history().len() + 1);
    for (i, record) in game.history().iter().enumerate() {
        let token = if white_turn {
            format!("{move_num}. {}", record.san)
        } else if i == 0 {
            // First move by black: use "N... move" notation.
            format!("{move_num}... {}", record.san)
        } else {
            record.san.clone()
        };
        tokens.push(token);

        if !white_turn {
            move_num += 1;
        }
        white_turn = !white_turn;
    }
    tokens.push(result);

    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + token.len() + 1 > LINE_WIDTH {
            pgn.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            pgn.push(' ');
            line_len += 1;
        }
        line_len += token.len();
        pgn.push_str(&token);
    }
    pgn.push('\n');

    pgn
}

fn push_tag(pgn: &mut String, tag: &str, value: &str) {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    pgn.push_str(&format!("[{tag} \"{escaped}\"]\n"));
}

// =========================================================================
// Tests
// =========================================================================
