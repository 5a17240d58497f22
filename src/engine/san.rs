//! Standard Algebraic Notation: rendering a legal move, and resolving typed
//! SAN (`e4`, `Nbd7`, `exd6`, `O-O-O`, `a1=R+`) back to one.

use crate::engine::board::Board;
use crate::engine::types::{ChessError, Coord, Move, PieceType};

// =========================================================================
// SAN generation
// =========================================================================

/// SAN for `mv`, which must be one of `legal_moves` on `board`.
///
/// Does not append `+` or `#`; `Game::make_move` adds those once the move
/// is applied and the resulting status is known.
pub fn move_to_san(board: &Board, mv: &Move, legal_moves: &[Move]) -> String {
    if mv.is_castling() {
        return if mv.to.file() > mv.from.file() {
            "O-O".into()
        } else {
            "O-O-O".into()
        };
    }

    let Some(piece) = board.piece_at(mv.from) else {
        // Not a move in this position; fall back to coordinates.
        return mv.to_coordinate();
    };
    let is_capture = mv.is_en_passant() || board.piece_at(mv.to).is_some();

    let mut san = String::with_capacity(8);

    if piece.kind == PieceType::Pawn {
        if is_capture {
            // Pawn captures name the origin file.
            san.push(file_char(mv.from));
            san.push('x');
        }
        san.push_str(&mv.to.to_algebraic());

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(piece_letter(promo));
        }
    } else {
        san.push(piece_letter(piece.kind));
        san.push_str(&disambiguation(board, mv, piece.kind, legal_moves));
        if is_capture {
            san.push('x');
        }
        san.push_str(&mv.to.to_algebraic());
    }

    san
}

/// File, rank, or full square of the origin when another piece of the same
/// kind can also reach the destination.
fn disambiguation(board: &Board, mv: &Move, kind: PieceType, legal_moves: &[Move]) -> String {
    let Some(us) = board.piece_at(mv.from).map(|p| p.color) else {
        return String::new();
    };

    let rivals: Vec<&Move> = legal_moves
        .iter()
        .filter(|m| {
            m.to == mv.to
                && m.from != mv.from
                && !m.is_castling()
                && board
                    .piece_at(m.from)
                    .is_some_and(|p| p.color == us && p.kind == kind)
        })
        .collect();

    if rivals.is_empty() {
        return String::new();
    }

    let same_file = rivals.iter().any(|m| m.from.file() == mv.from.file());
    let same_rank = rivals.iter().any(|m| m.from.rank() == mv.from.rank());

    match (same_file, same_rank) {
        (false, _) => file_char(mv.from).to_string(),
        (true, false) => rank_char(mv.from).to_string(),
        (true, true) => mv.from.to_algebraic(),
    }
}

fn file_char(sq: Coord) -> char {
    (b'a' + sq.file()) as char
}

fn rank_char(sq: Coord) -> char {
    (b'1' + sq.rank()) as char
}

fn piece_letter(pt: PieceType) -> char {
    match pt {
        PieceType::Pawn => 'P',
        PieceType::Knight => 'N',
        PieceType::Bishop => 'B',
        PieceType::Rook => 'R',
        PieceType::Queen => 'Q',
        PieceType::King => 'K',
    }
}

// =========================================================================
// SAN parsing
// =========================================================================

fn unmatched(san: &str, reason: impl Into<String>) -> ChessError {
    ChessError::IllegalMove {
        mv: san.to_string(),
        reason: reason.into(),
    }
}

/// Resolve typed SAN to the one legal move it names.
///
/// Castling may use zeros (`0-0`).
/// Check/checkmate suffixes and annotation marks are ignored.
pub fn parse_san(board: &Board, san: &str, legal: &[Move]) -> Result<Move, ChessError> {
    let san = san.trim().trim_end_matches(['+', '#', '!', '?']);

    // Castling.
    if san == "O-O" || san == "0-0" {
        return find_castling(legal, san, true);
    }
    if san == "O-O-O" || san == "0-0-0" {
        return find_castling(legal, san, false);
    }

    let chars: Vec<char> = san.chars().collect();
    if chars.is_empty() {
        return Err(ChessError::MalformedMove("empty SAN string".into()));
    }

    // Detect promotion.
    let (chars, promotion) = if chars.len() >= 2 && chars[chars.len() - 2] == '=' {
        let promo_char = chars[chars.len() - 1];
        let promo = PieceType::from_promotion_char(promo_char)
            .ok_or_else(|| ChessError::InvalidPromotion(promo_char.to_string()))?;
        (&chars[..chars.len() - 2], Some(promo))
    } else {
        (&chars[..], None)
    };

    // Determine piece type.
    let (piece, rest) = match chars.first().copied() {
        Some('N') => (PieceType::Knight, &chars[1..]),
        Some('B') => (PieceType::Bishop, &chars[1..]),
        Some('R') => (PieceType::Rook, &chars[1..]),
        Some('Q') => (PieceType::Queen, &chars[1..]),
        Some('K') => (PieceType::King, &chars[1..]),
        _ => (PieceType::Pawn, chars),
    };

    // Capture markers carry no information here.
    let rest: Vec<char> = rest.iter().copied().filter(|&c| c != 'x').collect();

    // Destination is always the final two characters.
    if rest.len() < 2 {
        return Err(ChessError::MalformedMove(format!("SAN too short: '{san}'")));
    }
    let dest_str: String = rest[rest.len() - 2..].iter().collect();
    let dest =
        Coord::from_algebraic(&dest_str).ok_or_else(|| ChessError::InvalidSquare(dest_str.clone()))?;

    // Whatever precedes it is an origin hint.
    let disambig = &rest[..rest.len() - 2];
    if disambig.len() > 2 {
        return Err(ChessError::MalformedMove(format!("bad SAN '{san}'")));
    }
    let disambig_file: Option<u8> = disambig
        .iter()
        .find(|c| ('a'..='h').contains(*c))
        .map(|&c| c as u8 - b'a');
    let disambig_rank: Option<u8> = disambig
        .iter()
        .find(|c| ('1'..='8').contains(*c))
        .map(|&c| c as u8 - b'1');

    let candidates: Vec<&Move> = legal
        .iter()
        .filter(|m| {
            m.to == dest
                && !m.is_castling()
                && board.piece_at(m.from).is_some_and(|p| p.kind == piece)
                && disambig_file.is_none_or(|f| m.from.file() == f)
                && disambig_rank.is_none_or(|r| m.from.rank() == r)
                && m.promotion == promotion
        })
        .collect();

    match candidates.as_slice() {
        [] => Err(unmatched(san, "no legal move matches")),
        [only] => Ok(**only),
        many => Err(unmatched(
            san,
            format!("ambiguous: {} candidates", many.len()),
        )),
    }
}

fn find_castling(legal: &[Move], san: &str, kingside: bool) -> Result<Move, ChessError> {
    let target_file = if kingside { 6 } else { 2 };
    legal
        .iter()
        .find(|m| m.is_castling() && m.to.file() == target_file)
        .copied()
        .ok_or_else(|| {
            unmatched(
                san,
                format!(
                    "castling {} not legal",
                    if kingside { "kingside" } else { "queenside" }
                ),
            )
        })
}

// =========================================================================
// Tests
// =========================================================================
