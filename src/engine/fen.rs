//! FEN (Forsyth–Edwards Notation) import and export.
//!
//! A [`Setup`] is everything a FEN string carries: the board, side to move,
//! en-passant target and both move counters. Castling availability has no
//! field of its own; it is folded into the has-moved flags of the kings and
//! rooks on the board.

use tracing::warn;

use crate::engine::attacks;
use crate::engine::board::Board;
use crate::engine::types::{CastlingRights, ChessError, Color, Coord, Piece, PieceType};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A position as described by a FEN string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Setup {
    pub board: Board,
    pub side_to_move: Color,
    pub en_passant: Option<Coord>,
    pub halfmove_clock: u16,
    pub fullmove_number: u16,
}

impl Default for Setup {
    fn default() -> Self {
        Self::standard()
    }
}

impl Setup {
    /// Standard starting position.
    pub fn standard() -> Self {
        Setup {
            board: Board::standard(),
            side_to_move: Color::White,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// Parse a FEN string.
    ///
    /// Validates all 6 fields (piece placement, side to move, castling,
    /// en passant, halfmove clock, fullmove number) and ensures exactly one
    /// king per side. Castling letters without an unmoved king and rook on
    /// their home squares are dropped with a warning.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ChessError::InvalidFen(format!(
                "expected 6 fields, got {}",
                fields.len()
            )));
        }

        // ----- Field 1: Piece placement -----
        let mut board = parse_placement(fields[0])?;

        // Validate exactly one king per side.
        for color in [Color::White, Color::Black] {
            let king_count = board.count(color, PieceType::King);
            if king_count != 1 {
                return Err(ChessError::InvalidFen(format!(
                    "{color} has {king_count} kings (expected 1)"
                )));
            }
        }

        // ----- Field 2: Side to move -----
        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(ChessError::InvalidFen(format!(
                    "invalid side to move: '{other}'"
                )));
            }
        };

        // The side that just moved cannot have left its king attacked.
        if attacks::is_in_check(&board, !side_to_move)? {
            return Err(ChessError::InvalidFen(format!(
                "{} is in check but it is {side_to_move}'s turn",
                !side_to_move
            )));
        }

        // ----- Field 3: Castling availability -----
        let rights = CastlingRights::from_fen(fields[2]).ok_or_else(|| {
            ChessError::InvalidFen(format!("invalid castling string: '{}'", fields[2]))
        })?;
        apply_castling_rights(&mut board, rights);

        // ----- Field 4: En passant target square -----
        let en_passant = if fields[3] == "-" {
            None
        } else {
            let ep_sq = Coord::from_algebraic(fields[3]).ok_or_else(|| {
                ChessError::InvalidFen(format!("invalid en passant square: '{}'", fields[3]))
            })?;
            // White to move captures onto rank 6, Black onto rank 3.
            let expected_rank = match side_to_move {
                Color::White => 5,
                Color::Black => 2,
            };
            if ep_sq.rank() != expected_rank {
                return Err(ChessError::InvalidFen(format!(
                    "en passant square {} is not on rank {} for {side_to_move} to move",
                    fields[3],
                    expected_rank + 1
                )));
            }
            Some(ep_sq)
        };

        // ----- Field 5: Halfmove clock -----
        let halfmove_clock = fields[4].parse::<u16>().map_err(|_| {
            ChessError::InvalidFen(format!("invalid halfmove clock: '{}'", fields[4]))
        })?;

        // ----- Field 6: Fullmove number -----
        let fullmove_number = fields[5].parse::<u16>().map_err(|_| {
            ChessError::InvalidFen(format!("invalid fullmove number: '{}'", fields[5]))
        })?;
        if fullmove_number == 0 {
            return Err(ChessError::InvalidFen(
                "fullmove number must be >= 1".to_string(),
            ));
        }

        Ok(Setup {
            board,
            side_to_move,
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Export as a FEN string.
    pub fn to_fen(&self) -> String {
        format_fen(
            &self.board,
            self.side_to_move,
            self.en_passant,
            self.halfmove_clock,
            self.fullmove_number,
        )
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

fn parse_placement(field: &str) -> Result<Board, ChessError> {
    let ranks: Vec<&str> = field.split('/').collect();
    if ranks.len() != 8 {
        return Err(ChessError::InvalidFen(format!(
            "expected 8 ranks, got {}",
            ranks.len()
        )));
    }

    let mut board = Board::empty();
    for (rank_idx, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - rank_idx as u8; // FEN starts from rank 8
        let mut file: u8 = 0;
        for ch in rank_str.chars() {
            if file > 7 {
                return Err(ChessError::InvalidFen(format!(
                    "too many squares in rank {}",
                    rank + 1
                )));
            }
            if let Some(digit) = ch.to_digit(10) {
                if !(1..=8).contains(&digit) {
                    return Err(ChessError::InvalidFen(format!(
                        "invalid empty count '{ch}' in rank {}",
                        rank + 1
                    )));
                }
                file += digit as u8;
            } else if let Some((color, kind)) = PieceType::from_char(ch) {
                let mut piece = Piece::new(color, kind);
                // Kings and rooks are unmoved only when a castling right
                // says so; pawns off their start rank have clearly moved.
                piece.has_moved = match kind {
                    PieceType::King | PieceType::Rook => true,
                    PieceType::Pawn => rank != color.pawn_rank(),
                    _ => false,
                };
                board.set_piece(Coord::from_file_rank(file, rank), Some(piece));
                file += 1;
            } else {
                return Err(ChessError::InvalidFen(format!(
                    "invalid character '{ch}' in piece placement"
                )));
            }
        }
        if file != 8 {
            return Err(ChessError::InvalidFen(format!(
                "rank {} has {} squares instead of 8",
                rank + 1,
                file
            )));
        }
    }
    Ok(board)
}

/// Mark the king and rook behind each castling right as unmoved.
fn apply_castling_rights(board: &mut Board, rights: CastlingRights) {
    for color in [Color::White, Color::Black] {
        let rank = color.back_rank();
        let king_sq = Coord::from_file_rank(4, rank);
        for (flag, rook_file) in [
            (CastlingRights::kingside_flag(color), 7),
            (CastlingRights::queenside_flag(color), 0),
        ] {
            if !rights.has(flag) {
                continue;
            }
            let rook_sq = Coord::from_file_rank(rook_file, rank);
            let king = board
                .piece_at(king_sq)
                .filter(|p| p.color == color && p.kind == PieceType::King);
            let rook = board
                .piece_at(rook_sq)
                .filter(|p| p.color == color && p.kind == PieceType::Rook);
            match (king, rook) {
                (Some(king), Some(rook)) => {
                    board.set_piece(king_sq, Some(Piece { has_moved: false, ..king }));
                    board.set_piece(rook_sq, Some(Piece { has_moved: false, ..rook }));
                }
                _ => warn!(
                    %color,
                    right = %CastlingRights(flag),
                    "castling right without king and rook on home squares; dropped"
                ),
            }
        }
    }
}

/// Piece placement field for `board`.
pub fn placement(board: &Board) -> String {
    let mut out = String::with_capacity(72);
    for rank in (0..8).rev() {
        let mut empty_count = 0u8;
        for file in 0..8 {
            match board.piece_at(Coord::from_file_rank(file, rank)) {
                Some(piece) => {
                    if empty_count > 0 {
                        out.push((b'0' + empty_count) as char);
                        empty_count = 0;
                    }
                    out.push(piece.to_char());
                }
                None => empty_count += 1,
            }
        }
        if empty_count > 0 {
            out.push((b'0' + empty_count) as char);
        }
        if rank > 0 {
            out.push('/');
        }
    }
    out
}

/// Assemble all six FEN fields.
pub fn format_fen(
    board: &Board,
    side_to_move: Color,
    en_passant: Option<Coord>,
    halfmove_clock: u16,
    fullmove_number: u16,
) -> String {
    let side = match side_to_move {
        Color::White => 'w',
        Color::Black => 'b',
    };
    let ep = en_passant.map_or_else(|| "-".to_string(), |sq| sq.to_algebraic());
    format!(
        "{} {side} {} {ep} {halfmove_clock} {fullmove_number}",
        placement(board),
        board.castling_rights().to_fen(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
