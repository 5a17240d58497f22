//! Zobrist hashing for position identification.
//!
//! Each aspect of a position (piece on square, side to move, castling rights,
//! en passant file) gets a random 64-bit key. The position hash is the XOR of
//! all applicable keys, so `Game` can update it incrementally on every move
//! and recompute it from scratch with [`hash_position`] to cross-check.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::engine::board::Board;
use crate::engine::types::{Color, Coord, Piece};

// ---------------------------------------------------------------------------
// Table dimensions
// ---------------------------------------------------------------------------

/// 16 possible castling-rights bitmasks (0..15).
const CASTLING_KEYS: usize = 16;
/// 8 en-passant files (a..h). We only hash the file, not the full square.
const EP_KEYS: usize = 8;
/// Total number of random keys.
#[cfg(test)]
const TOTAL_KEYS: usize = 2 * 6 * 64 + 1 + CASTLING_KEYS + EP_KEYS;

/// Fixed seed so hashes are reproducible across runs (digits of π).
pub const ZOBRIST_SEED: u64 = 0x3243_F6A8_885A_308D;

// ---------------------------------------------------------------------------
// ZobristKeys: immutable singleton
// ---------------------------------------------------------------------------

/// Pre-computed Zobrist random keys (generated once via `OnceLock`).
pub struct ZobristKeys {
    /// piece\[color\]\[piece_type\]\[square\]: random key for a piece on a square.
    pub piece: [[[u64; 64]; 6]; 2],
    /// XOR this when it is Black's turn to move.
    pub side_to_move: u64,
    /// castling\[rights_as_u8\]: one key per possible castling bitmask (0..15).
    pub castling: [u64; CASTLING_KEYS],
    /// en_passant\[file\]: one key per possible en-passant file.
    pub en_passant: [u64; EP_KEYS],
}

static ZOBRIST: OnceLock<ZobristKeys> = OnceLock::new();

/// Get a reference to the global Zobrist keys.
pub fn keys() -> &'static ZobristKeys {
    ZOBRIST.get_or_init(|| ZobristKeys::from_seed(ZOBRIST_SEED))
}

impl ZobristKeys {
    /// Draw every key from a `StdRng` seeded with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut piece = [[[0u64; 64]; 6]; 2];
        for color in &mut piece {
            for pt in color {
                for sq in pt {
                    *sq = rng.next_u64();
                }
            }
        }

        let side_to_move = rng.next_u64();

        let mut castling = [0u64; CASTLING_KEYS];
        for key in &mut castling {
            *key = rng.next_u64();
        }

        let mut en_passant = [0u64; EP_KEYS];
        for key in &mut en_passant {
            *key = rng.next_u64();
        }

        ZobristKeys {
            piece,
            side_to_move,
            castling,
            en_passant,
        }
    }

    // -----------------------------------------------------------------------
    // Convenience accessors
    // -----------------------------------------------------------------------

    /// Key for a piece standing on a square. The has-moved flag is not hashed;
    /// it only matters through castling rights.
    #[inline]
    pub fn piece_key(&self, piece: Piece, sq: Coord) -> u64 {
        self.piece[piece.color.index()][piece.kind.index()][sq.0 as usize]
    }

    /// Key for the en-passant target's file.
    #[inline]
    pub fn ep_key(&self, target: Coord) -> u64 {
        self.en_passant[target.file() as usize]
    }

    /// Key for a specific castling-rights bitmask.
    #[inline]
    pub fn castling_key(&self, rights: u8) -> u64 {
        self.castling[rights as usize]
    }
}

// ---------------------------------------------------------------------------
// Full recompute
// ---------------------------------------------------------------------------

/// Hash a position from scratch: placement, side to move, castling rights
/// (derived from the board) and en-passant target.
pub fn hash_position(board: &Board, side_to_move: Color, en_passant: Option<Coord>) -> u64 {
    let zk = keys();
    let mut hash = 0u64;

    for (sq, piece) in board.pieces() {
        hash ^= zk.piece_key(piece, sq);
    }

    if side_to_move == Color::Black {
        hash ^= zk.side_to_move;
    }

    hash ^= zk.castling_key(board.castling_rights().0);

    if let Some(target) = en_passant {
        hash ^= zk.ep_key(target);
    }

    hash
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
