//! Pseudo-legal move generation, one rule set per piece variant.
//!
//! Moves produced here obey each piece's movement and occupancy rules but
//! ignore whether the mover's own king is left in check. `Game` filters them
//! into legal moves and synthesizes castling itself, so the king rules here
//! never need to ask whether a square is attacked.

use crate::engine::board::Board;
use crate::engine::types::{Color, Coord, Move, MoveKind, PieceType};

// =========================================================================
// Direction tables (file delta, rank delta)
// =========================================================================

pub const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

pub const KING_OFFSETS: [(i8, i8); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

pub const ORTHOGONALS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

pub const DIAGONALS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

// =========================================================================
// Public API
// =========================================================================

/// Append the pseudo-legal moves of the piece on `from` to `moves`.
///
/// `en_passant` is the square a pawn may capture onto en passant (the square
/// the enemy pawn skipped), if the previous move was a double push.
/// Nothing is generated for an empty square.
pub fn pseudo_legal_moves(
    board: &Board,
    from: Coord,
    en_passant: Option<Coord>,
    moves: &mut Vec<Move>,
) {
    let Some(piece) = board.piece_at(from) else {
        return;
    };
    let us = piece.color;
    match piece.kind {
        PieceType::Pawn => pawn_moves(board, from, us, en_passant, moves),
        PieceType::Knight => leaper_moves(board, from, us, &KNIGHT_OFFSETS, moves),
        PieceType::King => leaper_moves(board, from, us, &KING_OFFSETS, moves),
        PieceType::Bishop => slider_moves(board, from, us, &DIAGONALS, moves),
        PieceType::Rook => slider_moves(board, from, us, &ORTHOGONALS, moves),
        PieceType::Queen => {
            slider_moves(board, from, us, &ORTHOGONALS, moves);
            slider_moves(board, from, us, &DIAGONALS, moves);
        }
    }
}

/// Pseudo-legal moves for every piece of `color`.
pub fn pseudo_legal_moves_for(
    board: &Board,
    color: Color,
    en_passant: Option<Coord>,
    moves: &mut Vec<Move>,
) {
    for (from, _) in board.pieces_of(color) {
        pseudo_legal_moves(board, from, en_passant, moves);
    }
}

/// The en-passant target left behind by `last`, i.e. the square a double-
/// pushed pawn skipped over. `None` for any other move.
pub fn en_passant_target_after(last: &Move) -> Option<Coord> {
    match last.kind {
        MoveKind::DoublePush => Some(Coord::from_file_rank(
            last.from.file(),
            (last.from.rank() + last.to.rank()) / 2,
        )),
        _ => None,
    }
}

// =========================================================================
// Pawn
// =========================================================================

fn pawn_moves(
    board: &Board,
    from: Coord,
    us: Color,
    en_passant: Option<Coord>,
    moves: &mut Vec<Move>,
) {
    let dir = us.pawn_direction();

    // --- Pushes ---
    if let Some(one) = from.offset(0, dir)
        && board.piece_at(one).is_none()
    {
        push_pawn_move(us, from, one, moves);

        if from.rank() == us.pawn_rank()
            && let Some(two) = from.offset(0, 2 * dir)
            && board.piece_at(two).is_none()
        {
            moves.push(Move::with_kind(from, two, MoveKind::DoublePush));
        }
    }

    // --- Diagonal captures and en passant ---
    for df in [-1, 1] {
        let Some(to) = from.offset(df, dir) else {
            continue;
        };
        match board.piece_at(to) {
            Some(target) if target.color != us => push_pawn_move(us, from, to, moves),
            Some(_) => {}
            None if en_passant == Some(to) => {
                // The passed pawn sits beside us, on our rank.
                let captured = Coord::from_file_rank(to.file(), from.rank());
                if board
                    .piece_at(captured)
                    .is_some_and(|p| p.color != us && p.kind == PieceType::Pawn)
                {
                    moves.push(Move::with_kind(
                        from,
                        to,
                        MoveKind::EnPassant { captured },
                    ));
                }
            }
            None => {}
        }
    }
}

/// A pawn move, expanded into four promotions on the farthest rank.
fn push_pawn_move(us: Color, from: Coord, to: Coord, moves: &mut Vec<Move>) {
    if to.rank() == us.promotion_rank() {
        for promo in PieceType::PROMOTIONS {
            moves.push(Move::with_promotion(from, to, promo));
        }
    } else {
        moves.push(Move::new(from, to));
    }
}

// =========================================================================
// Knight / King
// =========================================================================

fn leaper_moves(
    board: &Board,
    from: Coord,
    us: Color,
    offsets: &[(i8, i8)],
    moves: &mut Vec<Move>,
) {
    for &(df, dr) in offsets {
        let Some(to) = from.offset(df, dr) else {
            continue;
        };
        if !board.square(to).is_occupied_by(us) {
            moves.push(Move::new(from, to));
        }
    }
}

// =========================================================================
// Bishop / Rook / Queen
// =========================================================================

fn slider_moves(
    board: &Board,
    from: Coord,
    us: Color,
    directions: &[(i8, i8)],
    moves: &mut Vec<Move>,
) {
    for &(df, dr) in directions {
        let mut cur = from;
        while let Some(to) = cur.offset(df, dr) {
            match board.piece_at(to) {
                None => moves.push(Move::new(from, to)),
                Some(p) if p.color != us => {
                    moves.push(Move::new(from, to));
                    break;
                }
                Some(_) => break,
            }
            cur = to;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
