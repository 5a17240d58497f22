//! Attack detection.
//!
//! A square is attacked by a side when one of its pieces could capture onto
//! it. Knights, kings and sliders reuse their pseudo-legal move rules; pawns
//! get their own diagonal rule, because the square in front of a pawn is
//! somewhere it moves, not somewhere it attacks.

use crate::engine::board::Board;
use crate::engine::movegen;
use crate::engine::types::{ChessError, Color, Coord, PieceType};

/// Is `target` attacked by any piece of colour `by`?
pub fn is_square_attacked(board: &Board, target: Coord, by: Color) -> bool {
    let mut scratch = Vec::with_capacity(32);
    for (from, piece) in board.pieces_of(by) {
        if piece.kind == PieceType::Pawn {
            if pawn_attacks(from, by, target) {
                return true;
            }
            continue;
        }
        scratch.clear();
        movegen::pseudo_legal_moves(board, from, None, &mut scratch);
        if scratch.iter().any(|m| m.to == target) {
            return true;
        }
    }
    false
}

/// Whether a `color` pawn on `from` attacks `target`.
#[inline]
pub fn pawn_attacks(from: Coord, color: Color, target: Coord) -> bool {
    let dir = color.pawn_direction();
    from.offset(-1, dir) == Some(target) || from.offset(1, dir) == Some(target)
}

/// Is `color`'s king currently attacked?
pub fn is_in_check(board: &Board, color: Color) -> Result<bool, ChessError> {
    let king = board.king_square(color)?;
    Ok(is_square_attacked(board, king, !color))
}

// =========================================================================
// Tests
// =========================================================================
