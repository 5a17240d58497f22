pub mod attacks;
pub mod board;
pub mod fen;
pub mod game;
pub mod movegen;
pub mod pgn;
pub mod san;
pub mod types;
pub mod zobrist;

pub use board::{Board, Square, UndoInfo};
pub use fen::{STARTING_FEN, Setup};
pub use game::{Controller, Game, MoveRecord, Player};
pub use pgn::{PgnHeaders, to_pgn};
pub use types::*;
