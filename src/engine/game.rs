//! Stateful game controller wrapping the Board.
//!
//! `Game` owns turn order, legality filtering, undo/redo history, repetition
//! and clock bookkeeping, and game status detection (checkmate, stalemate,
//! draws). It is the only type front ends need to drive a game.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::engine::attacks;
use crate::engine::board::{Board, UndoInfo};
use crate::engine::fen::{self, Setup};
use crate::engine::movegen;
use crate::engine::pgn::PgnHeaders;
use crate::engine::san;
use crate::engine::types::{
    ChessError, Color, Coord, DrawReason, GameStatus, Move, MoveKind, Piece, PieceType,
};
use crate::engine::zobrist::{self, hash_position};

// =========================================================================
// Players
// =========================================================================

/// Who supplies a side's moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Controller {
    /// Entered at this terminal.
    #[default]
    Local,
    /// An external search process.
    Engine,
    /// The other end of a peer session.
    Remote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub color: Color,
    pub controller: Controller,
}

impl Player {
    pub fn new(name: impl Into<String>, color: Color, controller: Controller) -> Self {
        Player {
            name: name.into(),
            color,
            controller,
        }
    }
}

// =========================================================================
// MoveRecord
// =========================================================================

/// A recorded move in the game history.
#[derive(Clone, Debug)]
pub struct MoveRecord {
    /// The move that was played, with generation metadata.
    pub mv: Move,
    /// Board snapshot for reversing it.
    pub undo: UndoInfo,
    pub halfmove_clock_before: u16,
    pub en_passant_before: Option<Coord>,
    /// Position hash after the move.
    pub hash_after: u64,
    /// SAN including the check/mate suffix.
    pub san: String,
    /// What game status resulted from this move.
    pub status_after: GameStatus,
}

// =========================================================================
// Legality trial
// =========================================================================

/// A move applied to a scratch board, taken back when the trial is dropped.
struct Trial<'a> {
    board: &'a mut Board,
    mv: Move,
    undo: UndoInfo,
}

impl<'a> Trial<'a> {
    fn apply(board: &'a mut Board, mv: Move) -> Result<Self, ChessError> {
        let undo = board.apply_move(&mv)?;
        Ok(Trial { board, mv, undo })
    }

    fn board(&self) -> &Board {
        self.board
    }
}

impl Drop for Trial<'_> {
    fn drop(&mut self) {
        self.board.undo_move(&self.mv, &self.undo);
    }
}

// =========================================================================
// Game
// =========================================================================

/// A complete chess game with history, undo/redo, and status tracking.
#[derive(Clone, Debug)]
pub struct Game {
    // Core state
    board: Board,
    side_to_move: Color,
    halfmove_clock: u16,
    /// Zobrist hash of the current position, maintained incrementally.
    hash: u64,
    status: GameStatus,

    // History
    undo_stack: Vec<MoveRecord>,
    redo_stack: Vec<MoveRecord>,
    /// Occurrences of every position hash reached, the start included.
    repetitions: HashMap<u64, u32>,
    /// Pieces taken by each colour, indexed by the capturer.
    captured: [Vec<Piece>; 2],

    // Starting point
    start_side: Color,
    start_fullmove: u16,
    start_en_passant: Option<Coord>,
    starting_fen: Option<String>,

    // Metadata
    players: [Player; 2],
    headers: PgnHeaders,
}

impl Game {
    // -----------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------

    /// Create a new game from the standard starting position.
    pub fn new() -> Self {
        Self::with_setup(Setup::standard(), None)
    }

    /// Create a game from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let setup = Setup::from_fen(fen)?;
        let normalized = setup.to_fen();
        let mut game = Self::with_setup(setup, Some(normalized));
        game.status = game.evaluate_status()?;
        if game.status.is_game_over() {
            info!(status = %game.status, "loaded a finished position");
        }
        Ok(game)
    }

    fn with_setup(setup: Setup, starting_fen: Option<String>) -> Self {
        let hash = hash_position(&setup.board, setup.side_to_move, setup.en_passant);
        Game {
            board: setup.board,
            side_to_move: setup.side_to_move,
            halfmove_clock: setup.halfmove_clock,
            hash,
            status: GameStatus::Active,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            repetitions: HashMap::from([(hash, 1)]),
            captured: [Vec::new(), Vec::new()],
            start_side: setup.side_to_move,
            start_fullmove: setup.fullmove_number,
            start_en_passant: setup.en_passant,
            starting_fen,
            players: [
                Player::new("Player", Color::White, Controller::Local),
                Player::new("Player", Color::Black, Controller::Local),
            ],
            headers: PgnHeaders::default(),
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current game status.
    pub fn status(&self) -> &GameStatus {
        &self.status
    }

    /// Side to move.
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// Moves played so far, oldest first.
    pub fn history(&self) -> &[MoveRecord] {
        &self.undo_stack
    }

    /// Number of undone moves available to `redo`.
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Whether the game is over.
    pub fn is_game_over(&self) -> bool {
        self.status.is_game_over()
    }

    /// Zobrist hash of the current position.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Halfmove clock (for 50-move rule).
    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    /// Fullmove number.
    pub fn fullmove_number(&self) -> u16 {
        let black_started = usize::from(self.start_side == Color::Black);
        let moves = (self.undo_stack.len() + black_started) / 2;
        self.start_fullmove.saturating_add(moves as u16)
    }

    /// How many times the current position has occurred.
    pub fn repetition_count(&self) -> u32 {
        self.repetitions.get(&self.hash).copied().unwrap_or(0)
    }

    /// Square a pawn may capture onto en passant right now.
    ///
    /// Derived from the last move played; before any move, the target the
    /// game was loaded with.
    pub fn en_passant_target(&self) -> Option<Coord> {
        match self.undo_stack.last() {
            Some(record) => movegen::en_passant_target_after(&record.mv),
            None => self.start_en_passant,
        }
    }

    /// Pieces captured by `color`, in capture order.
    pub fn captured_by(&self, color: Color) -> &[Piece] {
        &self.captured[color.index()]
    }

    pub fn player(&self, color: Color) -> &Player {
        &self.players[color.index()]
    }

    /// Replace the player for `player.color`; the PGN name follows.
    pub fn set_player(&mut self, player: Player) {
        match player.color {
            Color::White => self.headers.white = player.name.clone(),
            Color::Black => self.headers.black = player.name.clone(),
        }
        let idx = player.color.index();
        self.players[idx] = player;
    }

    pub fn headers(&self) -> &PgnHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut PgnHeaders {
        &mut self.headers
    }

    /// The FEN the game was loaded from, if it did not start normally.
    pub fn starting_fen(&self) -> Option<&str> {
        self.starting_fen.as_deref()
    }

    /// Colour that made the first move.
    pub fn start_side(&self) -> Color {
        self.start_side
    }

    pub fn start_fullmove(&self) -> u16 {
        self.start_fullmove
    }

    /// Current position as FEN.
    pub fn to_fen(&self) -> String {
        fen::format_fen(
            &self.board,
            self.side_to_move,
            self.en_passant_target(),
            self.halfmove_clock,
            self.fullmove_number(),
        )
    }

    /// Hash of the current position computed from scratch.
    pub fn compute_hash(&self) -> u64 {
        hash_position(&self.board, self.side_to_move, self.en_passant_target())
    }

    // -----------------------------------------------------------------
    // Legal move generation
    // -----------------------------------------------------------------

    /// All legal moves for the side to move.
    pub fn legal_moves(&self) -> Result<Vec<Move>, ChessError> {
        self.legal_moves_for(self.side_to_move)
    }

    /// All legal moves for `color`, as if it were that side's turn.
    ///
    /// Only the side to move may capture en passant.
    pub fn legal_moves_for(&self, color: Color) -> Result<Vec<Move>, ChessError> {
        let en_passant = if color == self.side_to_move {
            self.en_passant_target()
        } else {
            None
        };

        let mut pseudo = Vec::with_capacity(64);
        movegen::pseudo_legal_moves_for(&self.board, color, en_passant, &mut pseudo);

        let mut scratch = self.board.clone();
        let mut legal = Vec::with_capacity(pseudo.len());
        for mv in pseudo {
            let trial = Trial::apply(&mut scratch, mv)?;
            if !attacks::is_in_check(trial.board(), color)? {
                legal.push(mv);
            }
        }

        self.push_castling_moves(color, &mut legal)?;
        Ok(legal)
    }

    /// Legal moves of the piece on `sq`.
    pub fn legal_moves_from(&self, sq: Coord) -> Result<Vec<Move>, ChessError> {
        let mut moves = self.legal_moves()?;
        moves.retain(|m| m.from == sq);
        Ok(moves)
    }

    /// Append castling moves: king and rook unmoved, the path between them
    /// empty, and the king's start, transit and landing squares unattacked.
    fn push_castling_moves(&self, color: Color, moves: &mut Vec<Move>) -> Result<(), ChessError> {
        let rank = color.back_rank();
        let king_sq = Coord::from_file_rank(4, rank);
        if !self.board.is_unmoved(king_sq, color, PieceType::King) {
            return Ok(());
        }
        let them = !color;
        if attacks::is_square_attacked(&self.board, self.board.king_square(color)?, them) {
            return Ok(());
        }

        // (rook file, files that must be empty, files the king crosses, king file, rook landing file)
        let sides: [(u8, &[u8], [u8; 2], u8, u8); 2] = [
            (7, &[5, 6], [5, 6], 6, 5),
            (0, &[1, 2, 3], [3, 2], 2, 3),
        ];
        for (rook_file, between, transit, king_to, rook_to) in sides {
            let rook_from = Coord::from_file_rank(rook_file, rank);
            if !self.board.is_unmoved(rook_from, color, PieceType::Rook) {
                continue;
            }
            let clear = between
                .iter()
                .all(|&f| self.board.piece_at(Coord::from_file_rank(f, rank)).is_none());
            if !clear {
                continue;
            }
            let safe = transit.iter().all(|&f| {
                !attacks::is_square_attacked(&self.board, Coord::from_file_rank(f, rank), them)
            });
            if !safe {
                continue;
            }
            moves.push(Move::with_kind(
                king_sq,
                Coord::from_file_rank(king_to, rank),
                MoveKind::Castle {
                    rook_from,
                    rook_to: Coord::from_file_rank(rook_to, rank),
                },
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Make move
    // -----------------------------------------------------------------

    /// Play a move. Returns the SAN notation of the move played.
    ///
    /// Only `from`, `to` and `promotion` of the candidate are used; the
    /// special-move metadata comes from the matching legal move. Returns
    /// `ChessError::GameOver` if the game is already finished, or
    /// `ChessError::IllegalMove` if nothing matches. Nothing is mutated on
    /// error.
    pub fn make_move(&mut self, candidate: Move) -> Result<String, ChessError> {
        self.ensure_playable()?;

        let legal = self.legal_moves()?;
        let mv = self.resolve(candidate, &legal)?;

        // SAN needs the position before the move.
        let san = san::move_to_san(&self.board, &mv, &legal);

        self.push_move(mv)?;
        let (status, san) = match self.status_and_suffix(san) {
            Ok(done) => done,
            Err(e) => {
                self.pop_move()?;
                return Err(e);
            }
        };
        self.redo_stack.clear();

        if let Some(record) = self.undo_stack.last_mut() {
            record.san = san.clone();
            record.status_after = status.clone();
        }
        self.set_status(status);

        debug!(mv = %mv, san = %san, hash = self.hash, "move applied");
        Ok(san)
    }

    /// Status after a just-pushed move, and its SAN with the check suffix.
    fn status_and_suffix(&self, san: String) -> Result<(GameStatus, String), ChessError> {
        let status = self.evaluate_status()?;
        let san = match &status {
            GameStatus::Checkmate { .. } => format!("{san}#"),
            _ if attacks::is_in_check(&self.board, self.side_to_move)? => format!("{san}+"),
            _ => san,
        };
        Ok((status, san))
    }

    /// Parse a coordinate string (`e2e4`, `e7e8q`) and resolve it to the
    /// matching legal move.
    pub fn parse_coordinate(&self, text: &str) -> Result<Move, ChessError> {
        let candidate = Move::parse_coordinate(text)?;
        let legal = self.legal_moves()?;
        self.resolve(candidate, &legal)
    }

    /// Play a move given as a coordinate string.
    pub fn make_coordinate_move(&mut self, text: &str) -> Result<String, ChessError> {
        let candidate = Move::parse_coordinate(text)?;
        self.make_move(candidate)
    }

    /// Play a move given in SAN (`Nf3`, `exd5`, `O-O`, `e8=Q+`).
    pub fn make_san_move(&mut self, text: &str) -> Result<String, ChessError> {
        self.ensure_playable()?;
        let legal = self.legal_moves()?;
        let mv = san::parse_san(&self.board, text, &legal)?;
        self.make_move(mv)
    }

    /// Play a move in either coordinate or SAN form.
    pub fn make_move_text(&mut self, text: &str) -> Result<String, ChessError> {
        match Move::parse_coordinate(text) {
            Ok(candidate) => self.make_move(candidate),
            Err(_) => self.make_san_move(text),
        }
    }

    fn ensure_playable(&self) -> Result<(), ChessError> {
        if self.status.is_game_over() {
            return Err(ChessError::GameOver(self.status.to_string()));
        }
        Ok(())
    }

    /// Find the legal move expressing the same intent as `candidate`.
    fn resolve(&self, candidate: Move, legal: &[Move]) -> Result<Move, ChessError> {
        if let Some(mv) = legal.iter().find(|m| m.same_intent(&candidate)) {
            return Ok(*mv);
        }
        let reason = match self.board.piece_at(candidate.from) {
            None => format!("no piece on {}", candidate.from),
            Some(p) if p.color != self.side_to_move => {
                format!("{} is not {}'s piece", candidate.from, self.side_to_move)
            }
            Some(_) => "not a legal move".to_string(),
        };
        Err(ChessError::IllegalMove {
            mv: candidate.to_string(),
            reason,
        })
    }

    // -----------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------

    /// Undo the last move. Returns the move that was undone.
    ///
    /// Also clears a resignation or agreed draw.
    pub fn undo(&mut self) -> Result<Move, ChessError> {
        let record = self.pop_move()?;
        let mv = record.mv;
        self.redo_stack.push(record);
        self.status = GameStatus::Active;
        let status = self.evaluate_status()?;
        self.set_status(status);
        debug!(mv = %mv, hash = self.hash, "move undone");
        Ok(mv)
    }

    /// Re-apply the most recently undone move. Returns its SAN.
    pub fn redo(&mut self) -> Result<String, ChessError> {
        if self.status.is_frozen() {
            return Err(ChessError::GameOver(self.status.to_string()));
        }
        let record = self.redo_stack.pop().ok_or(ChessError::NothingToRedo)?;
        let undo = match self.board.apply_move(&record.mv) {
            Ok(undo) => undo,
            Err(e) => {
                self.redo_stack.push(record);
                return Err(e);
            }
        };
        let mover = undo.moved.color;
        if let Some(cap) = undo.captured {
            self.captured[mover.index()].push(cap.piece);
        }
        self.halfmove_clock = next_clock(record.halfmove_clock_before, &undo);
        self.side_to_move = !mover;
        let san = record.san.clone();
        let status = record.status_after.clone();
        let mv = record.mv;
        self.undo_stack.push(MoveRecord { undo, ..record });
        self.hash = self.compute_hash();
        debug_assert_eq!(
            Some(self.hash),
            self.undo_stack.last().map(|r| r.hash_after)
        );
        *self.repetitions.entry(self.hash).or_insert(0) += 1;

        // Same position, clock and repetition counts as when it was first
        // played, so the recorded status still holds.
        debug_assert_eq!(self.evaluate_status().ok().as_ref(), Some(&status));
        self.set_status(status);
        debug!(mv = %mv, hash = self.hash, "move redone");
        Ok(san)
    }

    // -----------------------------------------------------------------
    // Caller-set outcomes
    // -----------------------------------------------------------------

    /// `color` resigns; the opponent wins.
    pub fn resign(&mut self, color: Color) -> Result<(), ChessError> {
        self.ensure_playable()?;
        self.set_status(GameStatus::Resigned { winner: !color });
        Ok(())
    }

    /// Both sides agree to a draw.
    pub fn agree_draw(&mut self) -> Result<(), ChessError> {
        self.ensure_playable()?;
        self.set_status(GameStatus::Draw(DrawReason::Agreement));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Perft
    // -----------------------------------------------------------------

    /// Count leaf nodes of the legal move tree to `depth` plies.
    ///
    /// Game status and SAN are not evaluated along the way; the game is left
    /// exactly as it was.
    pub fn perft(&mut self, depth: u32) -> Result<u64, ChessError> {
        if depth == 0 {
            return Ok(1);
        }
        let moves = self.legal_moves()?;
        if depth == 1 {
            return Ok(moves.len() as u64);
        }
        let mut nodes = 0;
        for mv in moves {
            self.push_move(mv)?;
            let below = self.perft(depth - 1);
            self.pop_move()?;
            nodes += below?;
        }
        Ok(nodes)
    }

    // -----------------------------------------------------------------
    // Apply / reverse bookkeeping
    // -----------------------------------------------------------------

    /// Apply a legal move with incremental hashing and push its record.
    fn push_move(&mut self, mv: Move) -> Result<(), ChessError> {
        let zk = zobrist::keys();
        let ep_before = self.en_passant_target();

        // ---- XOR out what the move disturbs ----
        let mut hash = self.hash;
        if let Some(mover) = self.board.piece_at(mv.from) {
            hash ^= zk.piece_key(mover, mv.from);
        }
        let cap_sq = mv.capture_square();
        if let Some(victim) = self.board.piece_at(cap_sq) {
            hash ^= zk.piece_key(victim, cap_sq);
        }
        hash ^= zk.castling_key(self.board.castling_rights().0);
        if let Some(ep) = ep_before {
            hash ^= zk.ep_key(ep);
        }

        let undo = self.board.apply_move(&mv)?;
        let us = undo.moved.color;

        // ---- XOR in the result ----
        if let Some(landed) = self.board.piece_at(mv.to) {
            hash ^= zk.piece_key(landed, mv.to);
        }
        if let MoveKind::Castle { rook_from, rook_to } = mv.kind {
            let rook = Piece::new(us, PieceType::Rook);
            hash ^= zk.piece_key(rook, rook_from) ^ zk.piece_key(rook, rook_to);
        }
        hash ^= zk.castling_key(self.board.castling_rights().0);
        if let Some(ep) = movegen::en_passant_target_after(&mv) {
            hash ^= zk.ep_key(ep);
        }
        hash ^= zk.side_to_move;

        if let Some(cap) = undo.captured {
            self.captured[us.index()].push(cap.piece);
        }
        let halfmove_clock_before = self.halfmove_clock;
        self.halfmove_clock = next_clock(halfmove_clock_before, &undo);
        self.side_to_move = !us;
        self.hash = hash;
        self.undo_stack.push(MoveRecord {
            mv,
            undo,
            halfmove_clock_before,
            en_passant_before: ep_before,
            hash_after: hash,
            san: String::new(),
            status_after: GameStatus::Active,
        });
        *self.repetitions.entry(hash).or_insert(0) += 1;

        debug_assert_eq!(self.hash, self.compute_hash(), "incremental hash drifted");
        Ok(())
    }

    /// Pop the last record and reverse it on the board.
    fn pop_move(&mut self) -> Result<MoveRecord, ChessError> {
        let record = self.undo_stack.pop().ok_or(ChessError::NothingToUndo)?;

        if let Some(count) = self.repetitions.get_mut(&record.hash_after) {
            *count -= 1;
            if *count == 0 {
                self.repetitions.remove(&record.hash_after);
            }
        }

        self.board.undo_move(&record.mv, &record.undo);
        let us = record.undo.moved.color;
        if record.undo.captured.is_some() {
            self.captured[us.index()].pop();
        }
        self.halfmove_clock = record.halfmove_clock_before;
        self.side_to_move = us;
        self.hash = self.compute_hash();
        Ok(record)
    }

    // -----------------------------------------------------------------
    // Status detection
    // -----------------------------------------------------------------

    fn set_status(&mut self, status: GameStatus) {
        if status.is_game_over() && status != self.status {
            info!(status = %status, winner = ?status.winner(), "game over");
        }
        self.status = status;
    }

    /// Status for the side about to move.
    fn evaluate_status(&self) -> Result<GameStatus, ChessError> {
        let side = self.side_to_move;
        let in_check = attacks::is_in_check(&self.board, side)?;
        let has_moves = !self.legal_moves()?.is_empty();

        let mut status = match (in_check, has_moves) {
            (true, false) => return Ok(GameStatus::Checkmate { winner: !side }),
            (false, false) => return Ok(GameStatus::Stalemate),
            (true, true) => GameStatus::Check,
            (false, true) => GameStatus::Active,
        };

        // Later rules override earlier ones.
        if self.halfmove_clock >= 100 {
            status = GameStatus::Draw(DrawReason::FiftyMoveRule);
        }
        if self.repetition_count() >= 3 {
            status = GameStatus::Draw(DrawReason::ThreefoldRepetition);
        }
        if self.is_insufficient_material() {
            status = GameStatus::Draw(DrawReason::InsufficientMaterial);
        }
        Ok(status)
    }

    /// Insufficient material detection.
    ///
    /// Draws: K vs K, K+B vs K, K+N vs K, K+B vs K+B (same color bishops).
    fn is_insufficient_material(&self) -> bool {
        let mut minors: [Vec<(Coord, PieceType)>; 2] = [Vec::new(), Vec::new()];
        for (sq, piece) in self.board.pieces() {
            match piece.kind {
                PieceType::King => {}
                // Any pawns, rooks, or queens → sufficient.
                PieceType::Pawn | PieceType::Rook | PieceType::Queen => return false,
                PieceType::Knight | PieceType::Bishop => {
                    minors[piece.color.index()].push((sq, piece.kind));
                }
            }
        }

        match (minors[0].as_slice(), minors[1].as_slice()) {
            ([], []) | ([_], []) | ([], [_]) => true,
            ([(w_sq, PieceType::Bishop)], [(b_sq, PieceType::Bishop)]) => {
                w_sq.is_light() == b_sq.is_light()
            }
            _ => false,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

/// Halfmove clock after a move: reset by pawn moves and captures.
fn next_clock(before: u16, undo: &UndoInfo) -> u16 {
    if undo.moved.kind == PieceType::Pawn || undo.captured.is_some() {
        0
    } else {
        before.saturating_add(1)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Coord {
        Coord::from_algebraic(name).unwrap()
    }

    fn play(g: &mut Game, text: &str) -> String {
        g.make_coordinate_move(text).unwrap()
    }

    // -----------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------

    #[test]
    fn new_game_is_active() {
        let g = Game::new();
        assert_eq!(*g.status(), GameStatus::Active);
        assert!(!g.is_game_over());
        assert_eq!(g.side_to_move(), Color::White);
        assert_eq!(g.fullmove_number(), 1);
        assert_eq!(g.repetition_count(), 1);
        assert_eq!(g.to_fen(), fen::STARTING_FEN);
        assert!(g.starting_fen().is_none());
    }

    #[test]
    fn twenty_moves_from_start() {
        assert_eq!(Game::new().legal_moves().unwrap().len(), 20);
    }

    #[test]
    fn game_from_fen() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let g = Game::from_fen(fen).unwrap();
        assert_eq!(g.side_to_move(), Color::Black);
        assert_eq!(g.starting_fen(), Some(fen));
        assert_eq!(g.en_passant_target(), Some(sq("e3")));
        assert_eq!(g.to_fen(), fen);
    }

    #[test]
    fn game_from_invalid_fen() {
        assert!(Game::from_fen("invalid").is_err());
    }

    // -----------------------------------------------------------------
    // Making moves
    // -----------------------------------------------------------------

    #[test]
    fn make_move_e2e4() {
        let mut g = Game::new();
        let san = g.make_move(Move::new(sq("e2"), sq("e4"))).unwrap();
        assert_eq!(san, "e4");
        assert_eq!(g.side_to_move(), Color::Black);
        assert_eq!(g.history().len(), 1);
        assert_eq!(g.history()[0].mv.kind, MoveKind::DoublePush);
        assert_eq!(g.en_passant_target(), Some(sq("e3")));
        assert_eq!(
            g.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn illegal_move_errors_without_mutation() {
        let mut g = Game::new();
        let before_fen = g.to_fen();
        let before_hash = g.hash();
        let err = g.make_move(Move::new(sq("e2"), sq("e5"))).unwrap_err();
        assert!(matches!(err, ChessError::IllegalMove { .. }));
        assert_eq!(g.to_fen(), before_fen);
        assert_eq!(g.hash(), before_hash);
        assert!(g.history().is_empty());
    }

    #[test]
    fn broken_status_rolls_the_move_back() {
        // Not reachable from FEN: the waiting white king is en prise.
        let mut setup = Setup::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap();
        setup
            .board
            .set_piece(sq("h1"), Some(Piece::new(Color::Black, PieceType::Rook)));
        let mut g = Game::with_setup(setup, None);
        play(&mut g, "e8d8");
        g.undo().unwrap();
        let before_fen = g.to_fen();
        let before_hash = g.hash();

        let err = g.make_coordinate_move("h1e1").unwrap_err();
        assert!(matches!(err, ChessError::Invariant(_)));
        assert!(g.history().is_empty());
        assert_eq!(g.redo_len(), 1);
        assert_eq!(g.side_to_move(), Color::Black);
        assert_eq!(g.to_fen(), before_fen);
        assert_eq!(g.hash(), before_hash);
        assert_eq!(g.repetition_count(), 1);
        assert!(g.captured_by(Color::Black).is_empty());
        assert!(matches!(g.undo(), Err(ChessError::NothingToUndo)));
    }

    #[test]
    fn moving_opponent_piece_is_illegal() {
        let mut g = Game::new();
        let err = g.make_coordinate_move("e7e5").unwrap_err();
        match err {
            ChessError::IllegalMove { reason, .. } => assert!(reason.contains("not white's")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn malformed_text_is_rejected_before_matching() {
        let mut g = Game::new();
        assert!(matches!(
            g.make_coordinate_move("e2"),
            Err(ChessError::MalformedMove(_))
        ));
    }

    #[test]
    fn caller_metadata_is_ignored() {
        // A plain e5d6 is promoted to the generated en-passant capture.
        let mut g = Game::new();
        for m in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            play(&mut g, m);
        }
        let san = g.make_move(Move::new(sq("e5"), sq("d6"))).unwrap();
        assert_eq!(san, "exd6");
        assert!(g.board().piece_at(sq("d5")).is_none());

        // A bogus castle tag on a knight move is discarded.
        let mut g = Game::new();
        let bogus = Move::with_kind(
            sq("g1"),
            sq("f3"),
            MoveKind::Castle {
                rook_from: sq("h1"),
                rook_to: sq("g1"),
            },
        );
        g.make_move(bogus).unwrap();
        assert_eq!(g.history()[0].mv.kind, MoveKind::Normal);
        assert!(g.board().piece_at(sq("h1")).is_some());
    }

    #[test]
    fn parse_coordinate_resolves_metadata() {
        let g = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let mv = g.parse_coordinate("e1g1").unwrap();
        assert!(mv.is_castling());
        assert!(g.parse_coordinate("e1e3").is_err());
    }

    #[test]
    fn legal_moves_from_square() {
        let g = Game::new();
        let moves = g.legal_moves_from(sq("g1")).unwrap();
        assert_eq!(moves.len(), 2);
        assert!(g.legal_moves_from(sq("e4")).unwrap().is_empty());
    }

    // -----------------------------------------------------------------
    // Checkmate / stalemate
    // -----------------------------------------------------------------

    #[test]
    fn fools_mate() {
        let mut g = Game::new();
        play(&mut g, "f2f3");
        play(&mut g, "e7e5");
        play(&mut g, "g2g4");
        let san = play(&mut g, "d8h4");
        assert_eq!(san, "Qh4#");
        assert_eq!(
            *g.status(),
            GameStatus::Checkmate {
                winner: Color::Black
            }
        );
        assert!(g.legal_moves().unwrap().is_empty());
        assert!(matches!(
            g.make_coordinate_move("e2e4"),
            Err(ChessError::GameOver(_))
        ));
    }

    #[test]
    fn scholars_mate_with_san() {
        let mut g = Game::new();
        for m in ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6"] {
            g.make_san_move(m).unwrap();
        }
        assert_eq!(g.make_san_move("Qxf7").unwrap(), "Qxf7#");
        assert_eq!(g.status().winner(), Some(Color::White));
    }

    #[test]
    fn check_suffix() {
        let mut g = Game::new();
        for m in ["e2e4", "f7f6"] {
            play(&mut g, m);
        }
        assert_eq!(play(&mut g, "d1h5"), "Qh5+");
        assert_eq!(*g.status(), GameStatus::Check);
    }

    #[test]
    fn stalemate_detection() {
        let g = Game::from_fen("k7/2K5/1Q6/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(*g.status(), GameStatus::Stalemate);
        assert!(g.is_game_over());
    }

    // -----------------------------------------------------------------
    // Draw rules
    // -----------------------------------------------------------------

    #[test]
    fn fifty_move_rule_from_fen_clock() {
        let g = Game::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").unwrap();
        assert_eq!(*g.status(), GameStatus::Draw(DrawReason::FiftyMoveRule));
    }

    #[test]
    fn threefold_repetition() {
        let mut g = Game::new();
        // Shuffle knights back and forth twice: the start position occurs
        // a third time after 8 plies.
        for _ in 0..2 {
            for m in ["g1f3", "g8f6", "f3g1", "f6g8"] {
                play(&mut g, m);
            }
        }
        assert_eq!(g.repetition_count(), 3);
        assert_eq!(
            *g.status(),
            GameStatus::Draw(DrawReason::ThreefoldRepetition)
        );
    }

    #[test]
    fn insufficient_material_cases() {
        let draw = GameStatus::Draw(DrawReason::InsufficientMaterial);
        for fen in [
            "4k3/8/8/8/8/8/8/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/4KB2 w - - 0 1",
            "4k3/8/8/8/8/8/8/4KN2 w - - 0 1",
            // c1 and f8 are both dark.
            "4kb2/8/8/8/8/8/8/2B1K3 w - - 0 1",
        ] {
            assert_eq!(*Game::from_fen(fen).unwrap().status(), draw, "{fen}");
        }
        for fen in [
            // c1 dark, c8 light.
            "2b1k3/8/8/8/8/8/8/2B1K3 w - - 0 1",
            "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/3NKN2 w - - 0 1",
        ] {
            assert_eq!(
                *Game::from_fen(fen).unwrap().status(),
                GameStatus::Active,
                "{fen}"
            );
        }
    }

    #[test]
    fn capture_into_bare_kings_is_a_draw() {
        let mut g = Game::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert_eq!(*g.status(), GameStatus::Check);
        assert_eq!(play(&mut g, "e1e2"), "Kxe2");
        assert_eq!(
            *g.status(),
            GameStatus::Draw(DrawReason::InsufficientMaterial)
        );
        assert_eq!(g.captured_by(Color::White).len(), 1);
    }

    // -----------------------------------------------------------------
    // Clock, hashing
    // -----------------------------------------------------------------

    #[test]
    fn halfmove_clock_resets_on_pawn_and_capture() {
        let mut g = Game::new();
        play(&mut g, "g1f3");
        assert_eq!(g.halfmove_clock(), 1);
        play(&mut g, "b8c6");
        assert_eq!(g.halfmove_clock(), 2);
        play(&mut g, "e2e4");
        assert_eq!(g.halfmove_clock(), 0);
        play(&mut g, "c6d4");
        play(&mut g, "f3d4");
        assert_eq!(g.halfmove_clock(), 0);
        assert_eq!(g.fullmove_number(), 3);
    }

    #[test]
    fn incremental_hash_matches_recompute() {
        let mut g = Game::new();
        for m in ["e2e4", "d7d5", "e4d5", "g8f6", "f1b5", "c7c6", "d5c6", "d8d2"] {
            play(&mut g, m);
            assert_eq!(g.hash(), g.compute_hash(), "after {m}");
        }
        play(&mut g, "b1d2");
        play(&mut g, "e7e5");
        assert_eq!(g.hash(), g.compute_hash());
    }

    #[test]
    fn transposition_has_same_hash() {
        let mut a = Game::new();
        for m in ["g1f3", "g8f6", "b1c3"] {
            play(&mut a, m);
        }
        let mut b = Game::new();
        for m in ["b1c3", "g8f6", "g1f3"] {
            play(&mut b, m);
        }
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.to_fen(), b.to_fen());
    }

    // -----------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------

    #[test]
    fn undo_restores_everything() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 3 1";
        let mut g = Game::from_fen(fen).unwrap();
        let board = g.board().clone();
        let hash = g.hash();

        for mv in g.legal_moves().unwrap() {
            g.make_move(mv).unwrap();
            g.undo().unwrap();
            assert_eq!(*g.board(), board, "{mv}");
            assert_eq!(g.to_fen(), fen, "{mv}");
            assert_eq!(g.hash(), hash, "{mv}");
            assert_eq!(g.halfmove_clock(), 3, "{mv}");
            assert_eq!(g.side_to_move(), Color::White, "{mv}");
        }
    }

    #[test]
    fn undo_nothing_errors() {
        let mut g = Game::new();
        assert!(matches!(g.undo(), Err(ChessError::NothingToUndo)));
        assert!(matches!(g.redo(), Err(ChessError::NothingToRedo)));
    }

    #[test]
    fn redo_replays_and_new_move_clears_redo() {
        let mut g = Game::new();
        for m in ["e2e4", "e7e5", "g1f3"] {
            play(&mut g, m);
        }
        let fen = g.to_fen();
        let hash = g.hash();
        g.undo().unwrap();
        g.undo().unwrap();
        assert_eq!(g.redo_len(), 2);
        assert_eq!(g.redo().unwrap(), "e5");
        assert_eq!(g.redo().unwrap(), "Nf3");
        assert_eq!(g.to_fen(), fen);
        assert_eq!(g.hash(), hash);

        g.undo().unwrap();
        play(&mut g, "b1c3");
        assert_eq!(g.redo_len(), 0);
    }

    #[test]
    fn undo_releases_repetition_counts() {
        let mut g = Game::new();
        for m in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            play(&mut g, m);
        }
        assert_eq!(g.repetition_count(), 2);
        for _ in 0..4 {
            g.undo().unwrap();
        }
        assert_eq!(g.repetition_count(), 1);
        assert_eq!(g.repetitions.len(), 1);
    }

    #[test]
    fn undo_out_of_checkmate() {
        let mut g = Game::new();
        for m in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            play(&mut g, m);
        }
        g.undo().unwrap();
        assert_eq!(*g.status(), GameStatus::Active);
        assert_eq!(g.redo().unwrap(), "Qh4#");
        assert!(g.is_game_over());
    }

    #[test]
    fn redo_restores_recorded_status() {
        let mut g = Game::new();
        for m in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"] {
            play(&mut g, m);
        }
        let drawn = GameStatus::Draw(DrawReason::ThreefoldRepetition);
        assert_eq!(*g.status(), drawn);
        assert_eq!(g.history().last().map(|r| &r.status_after), Some(&drawn));

        g.undo().unwrap();
        assert_eq!(*g.status(), GameStatus::Active);
        g.redo().unwrap();
        assert_eq!(*g.status(), drawn);
    }

    // -----------------------------------------------------------------
    // Caller-set outcomes
    // -----------------------------------------------------------------

    #[test]
    fn resignation_freezes_the_game() {
        let mut g = Game::new();
        play(&mut g, "e2e4");
        g.resign(Color::Black).unwrap();
        assert_eq!(
            *g.status(),
            GameStatus::Resigned {
                winner: Color::White
            }
        );
        assert!(g.make_coordinate_move("e7e5").is_err());
        assert!(g.resign(Color::White).is_err());
        assert!(g.agree_draw().is_err());

        // Undo lifts the resignation.
        g.undo().unwrap();
        assert_eq!(*g.status(), GameStatus::Active);
    }

    #[test]
    fn agreed_draw_blocks_redo() {
        let mut g = Game::new();
        play(&mut g, "e2e4");
        play(&mut g, "e7e5");
        g.undo().unwrap();
        g.agree_draw().unwrap();
        assert_eq!(*g.status(), GameStatus::Draw(DrawReason::Agreement));
        assert!(matches!(g.redo(), Err(ChessError::GameOver(_))));
        assert_eq!(g.redo_len(), 1);
    }

    // -----------------------------------------------------------------
    // Castling / en passant
    // -----------------------------------------------------------------

    #[test]
    fn castling_apply_and_undo() {
        let mut g = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(play(&mut g, "e1g1"), "O-O");
        assert_eq!(g.board().piece_at(sq("f1")).unwrap().kind, PieceType::Rook);
        assert_eq!(g.board().king_square(Color::White).unwrap(), sq("g1"));
        assert!(g.to_fen().contains(" b kq "));

        g.undo().unwrap();
        for name in ["e1", "h1", "a1"] {
            assert!(!g.board().piece_at(sq(name)).unwrap().has_moved, "{name}");
        }
        assert_eq!(g.to_fen(), "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");

        assert_eq!(play(&mut g, "e1c1"), "O-O-O");
        assert_eq!(g.board().piece_at(sq("d1")).unwrap().kind, PieceType::Rook);
    }

    #[test]
    fn no_castling_through_check() {
        // Black rook on f8 covers f1.
        let g = Game::from_fen("4kr2/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let moves = g.legal_moves().unwrap();
        assert!(!moves.iter().any(|m| m.to == sq("g1") && m.is_castling()));
        assert!(moves.iter().any(|m| m.to == sq("c1") && m.is_castling()));
    }

    #[test]
    fn no_castling_out_of_check() {
        let g = Game::from_fen("4r1k1/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        assert!(!g.legal_moves().unwrap().iter().any(|m| m.is_castling()));
    }

    #[test]
    fn queenside_b_file_may_be_attacked() {
        let g = Game::from_fen("1r2k3/8/8/8/8/8/8/R3K3 w Q - 0 1").unwrap();
        assert!(g.legal_moves().unwrap().iter().any(|m| m.is_castling()));
    }

    #[test]
    fn rook_return_does_not_restore_castling() {
        let mut g = Game::from_fen("4k3/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        for m in ["h1h2", "e8d8", "h2h1", "d8e8"] {
            play(&mut g, m);
        }
        assert!(!g.legal_moves().unwrap().iter().any(|m| m.is_castling()));
        assert!(g.to_fen().contains(" w - "));
    }

    #[test]
    fn en_passant_only_immediately() {
        let mut g = Game::new();
        for m in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            play(&mut g, m);
        }
        let ep = g
            .legal_moves()
            .unwrap()
            .into_iter()
            .find(|m| m.is_en_passant())
            .unwrap();
        assert_eq!(ep.to, sq("d6"));
        assert_eq!(ep.capture_square(), sq("d5"));

        // Wait one move pair and the chance is gone.
        play(&mut g, "h2h3");
        play(&mut g, "h7h6");
        assert!(!g.legal_moves().unwrap().iter().any(|m| m.is_en_passant()));
    }

    #[test]
    fn en_passant_capture_and_undo() {
        let mut g = Game::new();
        for m in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            play(&mut g, m);
        }
        let before = g.board().clone();
        let hash = g.hash();
        assert_eq!(play(&mut g, "e5d6"), "exd6");
        assert!(g.board().piece_at(sq("d5")).is_none());
        assert_eq!(g.captured_by(Color::White)[0].kind, PieceType::Pawn);
        g.undo().unwrap();
        assert_eq!(*g.board(), before);
        assert_eq!(g.hash(), hash);
        assert_eq!(g.en_passant_target(), Some(sq("d6")));
        assert!(g.captured_by(Color::White).is_empty());
    }

    #[test]
    fn pinned_pawn_cannot_capture_en_passant() {
        // Capturing would expose the king on a5 along the fifth rank.
        let g = Game::from_fen("8/8/8/KPp4r/8/8/8/4k3 w - c6 0 1").unwrap();
        assert!(!g.legal_moves().unwrap().iter().any(|m| m.is_en_passant()));
    }

    #[test]
    fn promotion_and_undo() {
        let mut g = Game::from_fen("7k/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(g.legal_moves_from(sq("a7")).unwrap().len(), 4);
        assert_eq!(play(&mut g, "a7a8n"), "a8=N");
        assert_eq!(g.board().piece_at(sq("a8")).unwrap().kind, PieceType::Knight);
        g.undo().unwrap();
        assert_eq!(g.board().piece_at(sq("a7")).unwrap().kind, PieceType::Pawn);
    }

    #[test]
    fn legal_moves_never_leave_king_in_check() {
        let mut g = Game::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        for mv in g.legal_moves().unwrap() {
            g.push_move(mv).unwrap();
            assert!(!attacks::is_in_check(g.board(), Color::White).unwrap(), "{mv}");
            g.pop_move().unwrap();
        }
    }

    #[test]
    fn legal_moves_for_other_color() {
        let g = Game::new();
        assert_eq!(g.legal_moves_for(Color::Black).unwrap().len(), 20);
    }

    #[test]
    fn perft_leaves_game_untouched() {
        let mut g = Game::new();
        play(&mut g, "e2e4");
        let fen = g.to_fen();
        let hash = g.hash();
        assert_eq!(g.perft(2).unwrap(), 600);
        assert_eq!(g.to_fen(), fen);
        assert_eq!(g.hash(), hash);
        assert_eq!(g.repetition_count(), 1);
    }

    #[test]
    fn set_player_updates_pgn_names() {
        let mut g = Game::new();
        g.set_player(Player::new("Stockfish", Color::Black, Controller::Engine));
        assert_eq!(g.player(Color::Black).controller, Controller::Engine);
        assert_eq!(g.headers().black, "Stockfish");
        assert_eq!(g.headers().white, "?");
    }
}
