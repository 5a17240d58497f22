//! Client side of the UCI protocol, for an external search process.
//!
//! Only what a game front end needs: the `uci`/`isready` handshake, a new
//! game, and `position ... / go movetime N` answered by `bestmove`. Every
//! reply is awaited under a configurable timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::engine::game::Game;

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("failed to start search process '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("search process i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search process closed its output")]
    Closed,

    #[error("no '{expected}' from search process within {timeout:?}")]
    Timeout {
        expected: &'static str,
        timeout: Duration,
    },

    #[error("unexpected reply from search process: {0}")]
    Protocol(String),
}

/// A UCI conversation over any line reader and writer.
pub struct UciClient<R, W> {
    lines: Lines<R>,
    writer: W,
    timeout: Duration,
    child: Option<Child>,
}

/// Client talking to a spawned search process over its stdio.
pub type ProcessClient = UciClient<BufReader<ChildStdout>, ChildStdin>;

impl ProcessClient {
    /// Start the executable at `path` and complete the handshake.
    pub async fn spawn(path: &str, timeout: Duration) -> Result<Self, UciError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| UciError::Spawn {
                path: path.to_string(),
                source,
            })?;
        let stdin = child.stdin.take().ok_or(UciError::Closed)?;
        let stdout = child.stdout.take().ok_or(UciError::Closed)?;

        let mut client = UciClient::new(BufReader::new(stdout), stdin, timeout);
        client.child = Some(child);
        client.handshake().await?;
        info!(path, "search process ready");
        Ok(client)
    }
}

impl<R, W> UciClient<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, timeout: Duration) -> Self {
        UciClient {
            lines: reader.lines(),
            writer,
            timeout,
            child: None,
        }
    }

    async fn send(&mut self, command: &str) -> Result<(), UciError> {
        debug!(command, "uci >");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read lines until `accept` yields a value, or `timeout` expires.
    async fn read_until<T>(
        &mut self,
        expected: &'static str,
        timeout: Duration,
        mut accept: impl FnMut(&str) -> Option<T>,
    ) -> Result<T, UciError> {
        let lines = &mut self.lines;
        let wait = async {
            loop {
                let Some(line) = lines.next_line().await? else {
                    return Err(UciError::Closed);
                };
                debug!(line = %line, "uci <");
                if let Some(value) = accept(line.trim()) {
                    return Ok(value);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| UciError::Timeout { expected, timeout })?
    }

    /// `uci` → `uciok`, then `isready` → `readyok`.
    pub async fn handshake(&mut self) -> Result<(), UciError> {
        self.send("uci").await?;
        self.read_until("uciok", self.timeout, |line| (line == "uciok").then_some(()))
            .await?;
        self.is_ready().await
    }

    pub async fn is_ready(&mut self) -> Result<(), UciError> {
        self.send("isready").await?;
        self.read_until("readyok", self.timeout, |line| (line == "readyok").then_some(()))
            .await
    }

    pub async fn new_game(&mut self) -> Result<(), UciError> {
        self.send("ucinewgame").await?;
        self.is_ready().await
    }

    /// Ask for a move in the position reached by `game`.
    /// Returns the coordinate move string.
    ///
    /// The reply may take `movetime` plus the usual response timeout.
    pub async fn best_move(&mut self, game: &Game, movetime: Duration) -> Result<String, UciError> {
        self.send(&position_command(game)).await?;
        self.send(&format!("go movetime {}", movetime.as_millis()))
            .await?;
        let timeout = self.timeout.saturating_add(movetime);
        self.read_until("bestmove", timeout, parse_bestmove).await?
    }

    /// Send `quit` and wait for a spawned process to exit.
    pub async fn quit(mut self) -> Result<(), UciError> {
        self.send("quit").await?;
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.timeout, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    debug!(?status, "search process exited");
                }
                Err(_) => {
                    warn!("search process ignored quit; killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}

/// `position startpos|fen <fen> [moves ...]` for the game so far.
pub fn position_command(game: &Game) -> String {
    let mut command = match game.starting_fen() {
        Some(fen) => format!("position fen {fen}"),
        None => "position startpos".to_string(),
    };
    if !game.history().is_empty() {
        command.push_str(" moves");
        for record in game.history() {
            command.push(' ');
            command.push_str(&record.mv.to_coordinate());
        }
    }
    command
}

/// Extract the move from a `bestmove` line; other lines yield `None`.
pub fn parse_bestmove(line: &str) -> Option<Result<String, UciError>> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("bestmove") {
        return None;
    }
    Some(match parts.next() {
        Some("(none)") | Some("0000") | None => {
            Err(UciError::Protocol(format!("no move offered: '{line}'")))
        }
        Some(mv) => Ok(mv.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    use super::*;

    type DuplexClient = UciClient<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

    fn client(io: DuplexStream, timeout_ms: u64) -> DuplexClient {
        let (r, w) = tokio::io::split(io);
        UciClient::new(BufReader::new(r), w, Duration::from_millis(timeout_ms))
    }

    /// Scripted search process answering on the other end of a duplex pipe.
    /// Records every command it receives.
    async fn fake_engine(io: DuplexStream, bestmove: &'static str) -> Vec<String> {
        let (r, mut w) = tokio::io::split(io);
        let mut lines = BufReader::new(r).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line.clone());
            let reply = match line.split_whitespace().next() {
                Some("uci") => "id name Fake\noption name Hash type spin\nuciok\n".to_string(),
                Some("isready") => "readyok\n".to_string(),
                Some("go") => {
                    // Think for the whole movetime, as a real search would.
                    let ms = line
                        .split_whitespace()
                        .nth(2)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    format!("info depth 1 score cp 20\nbestmove {bestmove} ponder a7a6\n")
                }
                Some("quit") => break,
                _ => continue,
            };
            if w.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
        seen
    }

    #[test]
    fn position_command_from_start() {
        let mut g = Game::new();
        assert_eq!(position_command(&g), "position startpos");
        g.make_coordinate_move("e2e4").unwrap();
        g.make_coordinate_move("c7c5").unwrap();
        assert_eq!(position_command(&g), "position startpos moves e2e4 c7c5");
    }

    #[test]
    fn position_command_from_fen_with_promotion() {
        let mut g = Game::from_fen("7k/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        g.make_coordinate_move("a7a8q").unwrap();
        assert_eq!(
            position_command(&g),
            "position fen 7k/P7/8/8/8/8/8/4K3 w - - 0 1 moves a7a8q"
        );
    }

    #[test]
    fn bestmove_lines() {
        assert_eq!(parse_bestmove("bestmove e2e4").unwrap().unwrap(), "e2e4");
        assert_eq!(
            parse_bestmove("bestmove e7e8q ponder a2a3").unwrap().unwrap(),
            "e7e8q"
        );
        assert!(parse_bestmove("info depth 3").is_none());
        assert!(matches!(
            parse_bestmove("bestmove (none)"),
            Some(Err(UciError::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn handshake_and_best_move() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let engine = tokio::spawn(fake_engine(theirs, "g8f6"));

        let mut c = client(ours, 2000);
        c.handshake().await.unwrap();
        c.new_game().await.unwrap();

        let mut g = Game::new();
        g.make_coordinate_move("d2d4").unwrap();
        let reply = c.best_move(&g, Duration::from_millis(50)).await.unwrap();
        assert_eq!(reply, "g8f6");
        assert_eq!(g.make_coordinate_move(&reply).unwrap(), "Nf6");

        c.quit().await.unwrap();
        let seen = engine.await.unwrap();
        assert_eq!(
            seen,
            vec![
                "uci",
                "isready",
                "ucinewgame",
                "isready",
                "position startpos moves d2d4",
                "go movetime 50",
                "quit",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_engine_times_out() {
        let (ours, theirs) = tokio::io::duplex(4096);
        // Keep the other end open but never answer.
        let _silent = tokio::spawn(async move {
            let mut lines = BufReader::new(theirs).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let mut c = client(ours, 500);
        let err = c.handshake().await.unwrap_err();
        assert!(matches!(
            err,
            UciError::Timeout {
                expected: "uciok",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn movetime_longer_than_timeout_still_answers() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let engine = tokio::spawn(fake_engine(theirs, "e7e5"));

        let mut c = client(ours, 10_000);
        c.handshake().await.unwrap();
        let mut g = Game::new();
        g.make_coordinate_move("e2e4").unwrap();
        let reply = c.best_move(&g, Duration::from_secs(20)).await.unwrap();
        assert_eq!(reply, "e7e5");

        c.quit().await.unwrap();
        let seen = engine.await.unwrap();
        assert!(seen.contains(&"go movetime 20000".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn bestmove_wait_is_bounded() {
        let (ours, theirs) = tokio::io::duplex(4096);
        // Answers the handshake, then never replies to `go`.
        let _stalled = tokio::spawn(async move {
            let (r, mut w) = tokio::io::split(theirs);
            let mut lines = BufReader::new(r).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.as_str() {
                    "uci" => "uciok\n",
                    "isready" => "readyok\n",
                    _ => continue,
                };
                if w.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let mut c = client(ours, 500);
        c.handshake().await.unwrap();
        let err = c
            .best_move(&Game::new(), Duration::from_millis(1000))
            .await
            .unwrap_err();
        match err {
            UciError::Timeout { expected, timeout } => {
                assert_eq!(expected, "bestmove");
                assert_eq!(timeout, Duration::from_millis(1500));
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_engine_is_an_error() {
        let (ours, theirs) = tokio::io::duplex(4096);
        drop(theirs);
        let mut c = client(ours, 500);
        assert!(c.handshake().await.is_err());
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let err = ProcessClient::spawn("/nonexistent/search-process", Duration::from_millis(100))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UciError::Spawn { .. }));
    }
}
