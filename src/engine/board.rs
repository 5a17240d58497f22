//! Mailbox board representation.
//!
//! `Board` is an 8×8 grid of [`Square`]s, each holding an optional [`Piece`].
//! It applies and reverses fully-specified moves mechanically and keeps a
//! king-square cache current on every mutation. It never decides whether a
//! move is legal; that is `Game`'s job.

use tracing::error;

use crate::engine::types::{
    CastlingRights, ChessError, Color, Coord, Move, MoveKind, Piece, PieceType,
};

// ---------------------------------------------------------------------------
// Square: one board cell
// ---------------------------------------------------------------------------

/// A board cell. `row` is the rank index (0 = rank 1), `col` the file index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Square {
    row: u8,
    col: u8,
    piece: Option<Piece>,
}

impl Square {
    const fn empty(row: u8, col: u8) -> Self {
        Square {
            row,
            col,
            piece: None,
        }
    }

    #[inline]
    pub fn row(&self) -> u8 {
        self.row
    }

    #[inline]
    pub fn col(&self) -> u8 {
        self.col
    }

    #[inline]
    pub fn coord(&self) -> Coord {
        Coord::from_file_rank(self.col, self.row)
    }

    #[inline]
    pub fn piece(&self) -> Option<Piece> {
        self.piece
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.piece.is_none()
    }

    /// Whether a piece of `color` stands here.
    #[inline]
    pub fn is_occupied_by(&self, color: Color) -> bool {
        self.piece.is_some_and(|p| p.color == color)
    }
}

// ---------------------------------------------------------------------------
// UndoInfo: snapshot for reversing a move
// ---------------------------------------------------------------------------

/// A piece removed by a move, with the square it was actually taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capture {
    pub square: Coord,
    pub piece: Piece,
}

/// Everything `Board::undo_move` needs, captured at application time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UndoInfo {
    /// The mover exactly as it stood before the move (un-promoted, old flag).
    pub moved: Piece,
    pub captured: Option<Capture>,
    /// Castling only: the rook's has-moved flag before it hopped.
    pub rook_had_moved: Option<bool>,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// An 8×8 grid of squares indexed `[row][col]`.
///
/// `Clone` is the deep copy: pieces are plain values, so a cloned board
/// shares nothing with the original.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    squares: [[Square; 8]; 8],
    /// King square per colour; maintained by `set_piece`, `apply_move` and
    /// `undo_move`.
    kings: [Option<Coord>; 2],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

const BACK_RANK: [PieceType; 8] = [
    PieceType::Rook,
    PieceType::Knight,
    PieceType::Bishop,
    PieceType::Queen,
    PieceType::King,
    PieceType::Bishop,
    PieceType::Knight,
    PieceType::Rook,
];

impl Board {
    /// A board with no pieces.
    pub fn empty() -> Self {
        Board {
            squares: std::array::from_fn(|row| {
                std::array::from_fn(|col| Square::empty(row as u8, col as u8))
            }),
            kings: [None; 2],
        }
    }

    /// The standard starting array.
    pub fn standard() -> Self {
        let mut board = Board::empty();
        for color in [Color::White, Color::Black] {
            for (file, &kind) in BACK_RANK.iter().enumerate() {
                let sq = Coord::from_file_rank(file as u8, color.back_rank());
                board.set_piece(sq, Some(Piece::new(color, kind)));
                let pawn_sq = Coord::from_file_rank(file as u8, color.pawn_rank());
                board.set_piece(pawn_sq, Some(Piece::new(color, PieceType::Pawn)));
            }
        }
        board
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[inline]
    pub fn square(&self, sq: Coord) -> &Square {
        &self.squares[sq.rank() as usize][sq.file() as usize]
    }

    #[inline]
    fn square_mut(&mut self, sq: Coord) -> &mut Square {
        &mut self.squares[sq.rank() as usize][sq.file() as usize]
    }

    /// Bounds-checked cell lookup; `None` when off the board.
    pub fn square_at(&self, row: i8, col: i8) -> Option<&Square> {
        if (0..8).contains(&row) && (0..8).contains(&col) {
            Some(&self.squares[row as usize][col as usize])
        } else {
            None
        }
    }

    /// What piece (if any) stands on `sq`?
    #[inline]
    pub fn piece_at(&self, sq: Coord) -> Option<Piece> {
        self.square(sq).piece
    }

    /// Bounds-checked piece lookup; `None` when off the board or empty.
    pub fn piece_at_checked(&self, row: i8, col: i8) -> Option<Piece> {
        self.square_at(row, col).and_then(Square::piece)
    }

    /// Every occupied square, rank 1 first.
    pub fn pieces(&self) -> impl Iterator<Item = (Coord, Piece)> + '_ {
        self.squares
            .iter()
            .flatten()
            .filter_map(|s| s.piece.map(|p| (s.coord(), p)))
    }

    /// Occupied squares of one colour.
    pub fn pieces_of(&self, color: Color) -> impl Iterator<Item = (Coord, Piece)> + '_ {
        self.pieces().filter(move |(_, p)| p.color == color)
    }

    /// Number of pieces of a given colour and type.
    pub fn count(&self, color: Color, kind: PieceType) -> usize {
        self.pieces_of(color).filter(|(_, p)| p.kind == kind).count()
    }

    /// Cached king square for `color`.
    ///
    /// A missing king is an engine defect, never a user error.
    pub fn king_square(&self, color: Color) -> Result<Coord, ChessError> {
        self.kings[color.index()].ok_or_else(|| {
            error!(%color, board = %self.board_string(), "no king on the board");
            ChessError::Invariant(format!("no {color} king on the board"))
        })
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Put `piece` on `sq` (or clear it), returning what was there.
    /// Keeps the king cache in sync.
    pub fn set_piece(&mut self, sq: Coord, piece: Option<Piece>) -> Option<Piece> {
        let old = std::mem::replace(&mut self.square_mut(sq).piece, piece);
        if let Some(p) = old
            && p.kind == PieceType::King
            && self.kings[p.color.index()] == Some(sq)
        {
            self.kings[p.color.index()] = None;
        }
        if let Some(p) = piece
            && p.kind == PieceType::King
        {
            self.kings[p.color.index()] = Some(sq);
        }
        old
    }

    // -----------------------------------------------------------------------
    // Make / Undo move
    // -----------------------------------------------------------------------

    /// Mechanically execute a fully-specified move.
    ///
    /// Removes the mover from its start square, places it (or its promoted
    /// replacement) on the end square, lifts any captured piece from its true
    /// square, and relocates the rook when castling. No legality checks.
    pub fn apply_move(&mut self, mv: &Move) -> Result<UndoInfo, ChessError> {
        let Some(mover) = self.piece_at(mv.from) else {
            error!(%mv, board = %self.board_string(), "apply_move from an empty square");
            return Err(ChessError::Invariant(format!(
                "no piece on {} to apply {mv}",
                mv.from
            )));
        };
        if let MoveKind::Castle { rook_from, .. } = mv.kind
            && self.piece_at(rook_from).map(|p| p.kind) != Some(PieceType::Rook)
        {
            error!(%mv, board = %self.board_string(), "castling without a rook");
            return Err(ChessError::Invariant(format!(
                "no rook on {rook_from} to castle with {mv}"
            )));
        }

        // ---- Capture (possibly off the end square) ----
        let cap_sq = mv.capture_square();
        let captured = self
            .square_mut(cap_sq)
            .piece
            .take()
            .map(|piece| Capture {
                square: cap_sq,
                piece,
            });
        if let Some(cap) = captured
            && cap.piece.kind == PieceType::King
        {
            self.kings[cap.piece.color.index()] = None;
        }

        // ---- Move (or promote) the piece ----
        self.square_mut(mv.from).piece = None;
        let landing = match mv.promotion {
            Some(kind) => Piece::new(mover.color, kind).moved(),
            None => mover.moved(),
        };
        self.square_mut(mv.to).piece = Some(landing);
        if mover.kind == PieceType::King {
            self.kings[mover.color.index()] = Some(mv.to);
        }

        // ---- Castling: hop the rook ----
        let mut rook_had_moved = None;
        if let MoveKind::Castle { rook_from, rook_to } = mv.kind
            && let Some(rook) = self.square_mut(rook_from).piece.take()
        {
            rook_had_moved = Some(rook.has_moved);
            self.square_mut(rook_to).piece = Some(rook.moved());
        }

        Ok(UndoInfo {
            moved: mover,
            captured,
            rook_had_moved,
        })
    }

    /// Reverse a move previously applied with `apply_move`.
    ///
    /// Restores from the snapshot only: a promoted piece goes back as the
    /// recorded pawn, and a castled rook regains its recorded flag.
    pub fn undo_move(&mut self, mv: &Move, undo: &UndoInfo) {
        let us = undo.moved.color;

        // ---- Castling: hop the rook back ----
        if let MoveKind::Castle { rook_from, rook_to } = mv.kind {
            self.square_mut(rook_to).piece = None;
            self.square_mut(rook_from).piece = Some(Piece {
                color: us,
                kind: PieceType::Rook,
                has_moved: undo.rook_had_moved.unwrap_or(false),
            });
        }

        // ---- Put the mover back ----
        self.square_mut(mv.to).piece = None;
        self.square_mut(mv.from).piece = Some(undo.moved);
        if undo.moved.kind == PieceType::King {
            self.kings[us.index()] = Some(mv.from);
        }

        // ---- Restore the capture on its own square ----
        if let Some(cap) = undo.captured {
            self.square_mut(cap.square).piece = Some(cap.piece);
            if cap.piece.kind == PieceType::King {
                self.kings[cap.piece.color.index()] = Some(cap.square);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Castling availability implied by has-moved flags: a right exists while
    /// the king and that rook both stand unmoved on their home squares.
    pub fn castling_rights(&self) -> CastlingRights {
        let mut rights = CastlingRights::NONE;
        for color in [Color::White, Color::Black] {
            let rank = color.back_rank();
            if !self.is_unmoved(Coord::from_file_rank(4, rank), color, PieceType::King) {
                continue;
            }
            if self.is_unmoved(Coord::from_file_rank(7, rank), color, PieceType::Rook) {
                rights.insert(CastlingRights::kingside_flag(color));
            }
            if self.is_unmoved(Coord::from_file_rank(0, rank), color, PieceType::Rook) {
                rights.insert(CastlingRights::queenside_flag(color));
            }
        }
        rights
    }

    /// Whether an unmoved `color` `kind` stands on `sq`.
    pub fn is_unmoved(&self, sq: Coord, color: Color, kind: PieceType) -> bool {
        self.piece_at(sq)
            .is_some_and(|p| p.color == color && p.kind == kind && !p.has_moved)
    }

    // -----------------------------------------------------------------------
    // Board display (8×8 text grid)
    // -----------------------------------------------------------------------

    /// Render the board as an 8-line string (rank 8 at top), useful for debugging.
    pub fn board_string(&self) -> String {
        let mut s = String::with_capacity(200);
        for rank in (0..8).rev() {
            s.push((b'1' + rank) as char);
            s.push(' ');
            for file in 0..8 {
                let ch = match self.piece_at(Coord::from_file_rank(file, rank)) {
                    Some(p) => p.to_char(),
                    None => '.',
                };
                s.push(ch);
                if file < 7 {
                    s.push(' ');
                }
            }
            s.push('\n');
        }
        s.push_str("  a b c d e f g h");
        s
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.board_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
