use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use chess_arbiter::config::AppConfig;
use chess_arbiter::engine::{Color, Controller, Game, GameStatus, PgnHeaders, Player, to_pgn};
use chess_arbiter::session::{PeerListener, PeerMessage, PeerSession};
use chess_arbiter::uci::ProcessClient;

const HELP: &str = "\
commands:
  <move>   e2e4, e7e8q, Nf3, exd5, O-O ...
  undo     take back the last move
  redo     replay an undone move
  moves    list legal moves
  fen      print the position as FEN
  pgn      print the game record
  resign   give up
  draw     offer or accept a draw
  quit     leave";

/// Who is on the other side of the board.
enum Opponent {
    HotSeat,
    Engine(ProcessClient),
    Peer {
        session: PeerSession,
        draw_offered: bool,
    },
}

enum Mode {
    HotSeat,
    Engine(Option<String>),
    Host,
    Join(String),
}

fn parse_args() -> Result<Mode, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => Ok(Mode::HotSeat),
        ["--engine"] => Ok(Mode::Engine(None)),
        ["--engine", path] => Ok(Mode::Engine(Some(path.to_string()))),
        ["--host"] => Ok(Mode::Host),
        ["--join", addr] => Ok(Mode::Join(addr.to_string())),
        _ => Err("usage: chess-arbiter [--engine [PATH] | --host | --join ADDR]".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing (structured logging) on stderr, away from the board.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chess_arbiter=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env();
    let mode = match parse_args() {
        Ok(mode) => mode,
        Err(usage) => {
            eprintln!("{usage}");
            std::process::exit(2);
        }
    };

    info!("chess-arbiter v{} starting", env!("CARGO_PKG_VERSION"));

    let mut game = Game::new();
    *game.headers_mut() = PgnHeaders::dated_today();
    let me = config.player_name.clone();

    let opponent = match mode {
        Mode::HotSeat => {
            game.set_player(Player::new(me.clone(), Color::White, Controller::Local));
            game.set_player(Player::new(me, Color::Black, Controller::Local));
            Opponent::HotSeat
        }
        Mode::Engine(path) => {
            let Some(path) = path.or_else(|| config.engine_path.clone()) else {
                eprintln!("no search process given; pass --engine PATH or set CHESS_ENGINE_PATH");
                std::process::exit(2);
            };
            let mut client = ProcessClient::spawn(&path, config.engine_timeout()).await?;
            client.new_game().await?;
            game.set_player(Player::new(me, Color::White, Controller::Local));
            game.set_player(Player::new(path, Color::Black, Controller::Engine));
            Opponent::Engine(client)
        }
        Mode::Host => {
            let listener = PeerListener::bind(&config.peer_addr()).await?;
            println!("waiting for a peer on {}", listener.local_addr()?);
            let session = listener.accept(&me).await?;
            game.set_player(Player::new(me, Color::White, Controller::Local));
            game.set_player(Player::new(
                session.peer_name(),
                Color::Black,
                Controller::Remote,
            ));
            Opponent::Peer {
                session,
                draw_offered: false,
            }
        }
        Mode::Join(addr) => {
            let session = PeerSession::join(&addr, &me).await?;
            game.set_player(Player::new(
                session.peer_name(),
                Color::White,
                Controller::Remote,
            ));
            game.set_player(Player::new(me, Color::Black, Controller::Local));
            Opponent::Peer {
                session,
                draw_offered: false,
            }
        }
    };

    run(game, opponent, &config).await
}

async fn run(
    mut game: Game,
    mut opponent: Opponent,
    config: &AppConfig,
) -> Result<(), Box<dyn Error>> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}\n");
    print_position(&game);

    loop {
        if game.is_game_over() {
            println!("game over: {}", describe(game.status()));
            println!("{}", to_pgn(&game));
            if let Opponent::Engine(client) = opponent {
                client.quit().await?;
            }
            return Ok(());
        }

        let side = game.side_to_move();
        match (game.player(side).controller, &mut opponent) {
            (Controller::Engine, Opponent::Engine(client)) => {
                let reply = client.best_move(&game, config.engine_movetime()).await?;
                match game.make_coordinate_move(&reply) {
                    Ok(san) => println!("{} plays {san}", game.player(side).name),
                    Err(e) => {
                        warn!(reply = %reply, error = %e, "search process sent an unusable move");
                        return Err(e.into());
                    }
                }
                print_position(&game);
                continue;
            }
            (
                Controller::Remote,
                Opponent::Peer {
                    session,
                    draw_offered,
                },
            ) => {
                match session.recv().await? {
                    PeerMessage::Move { uci } => match game.make_coordinate_move(&uci) {
                        Ok(san) => println!("{} plays {san}", session.peer_name()),
                        Err(e) => {
                            warn!(uci = %uci, error = %e, "peer sent an illegal move");
                            return Err(e.into());
                        }
                    },
                    PeerMessage::Resign => game.resign(side)?,
                    PeerMessage::DrawOffer => {
                        *draw_offered = true;
                        println!("{} offers a draw; type 'draw' to accept", session.peer_name());
                        // The offer arrives on their turn; wait for their move next.
                        continue;
                    }
                    PeerMessage::DrawAccept => game.agree_draw()?,
                    PeerMessage::Hello { .. } => warn!("unexpected hello from peer"),
                }
                print_position(&game);
                continue;
            }
            _ => {}
        }

        let Some(line) = stdin.next_line().await? else {
            return Ok(());
        };
        let input = line.trim();
        match input {
            "" => {}
            "help" => println!("{HELP}"),
            "quit" | "exit" => return Ok(()),
            "moves" => match game.legal_moves() {
                Ok(moves) => {
                    let list: Vec<String> = moves.iter().map(|m| m.to_coordinate()).collect();
                    println!("{}", list.join(" "));
                }
                Err(e) => println!("error: {e}"),
            },
            "fen" => println!("{}", game.to_fen()),
            "pgn" => println!("{}", to_pgn(&game)),
            "undo" => match &opponent {
                Opponent::Peer { .. } => println!("undo is not available in a peer session"),
                Opponent::Engine(_) => {
                    // Take back the engine's reply together with our move.
                    let mut undone = 0;
                    while undone < 2 && game.undo().is_ok() {
                        undone += 1;
                        if game.player(game.side_to_move()).controller == Controller::Local {
                            break;
                        }
                    }
                    print_position(&game);
                }
                Opponent::HotSeat => match game.undo() {
                    Ok(_) => print_position(&game),
                    Err(e) => println!("error: {e}"),
                },
            },
            "redo" => match &opponent {
                Opponent::Peer { .. } => println!("redo is not available in a peer session"),
                _ => match game.redo() {
                    Ok(san) => {
                        println!("redo {san}");
                        print_position(&game);
                    }
                    Err(e) => println!("error: {e}"),
                },
            },
            "resign" => {
                game.resign(side)?;
                if let Opponent::Peer { session, .. } = &mut opponent {
                    session.send(&PeerMessage::Resign).await?;
                }
            }
            "draw" => match &mut opponent {
                Opponent::Peer {
                    session,
                    draw_offered,
                } => {
                    if *draw_offered {
                        session.send(&PeerMessage::DrawAccept).await?;
                        game.agree_draw()?;
                    } else {
                        session.send(&PeerMessage::DrawOffer).await?;
                        println!("draw offered");
                    }
                }
                _ => game.agree_draw()?,
            },
            text => match game.make_move_text(text) {
                Ok(san) => {
                    if let Opponent::Peer {
                        session,
                        draw_offered,
                    } = &mut opponent
                    {
                        *draw_offered = false;
                        if let Some(record) = game.history().last() {
                            let uci = record.mv.to_coordinate();
                            session.send(&PeerMessage::Move { uci }).await?;
                        }
                    }
                    println!("{san}");
                    print_position(&game);
                }
                Err(e) => println!("error: {e}"),
            },
        }
    }
}

fn print_position(game: &Game) {
    println!("\n{}\n", game.board());
    if !game.is_game_over() {
        let side = game.side_to_move();
        let check = if *game.status() == GameStatus::Check {
            " (check)"
        } else {
            ""
        };
        println!("{} to move{check}", game.player(side).name);
    }
}

fn describe(status: &GameStatus) -> String {
    match status {
        GameStatus::Checkmate { winner } => format!("checkmate, {winner} wins"),
        GameStatus::Resigned { winner } => format!("resignation, {winner} wins"),
        GameStatus::Stalemate => "stalemate".to_string(),
        GameStatus::Draw(reason) => format!("draw ({})", reason.as_str()),
        GameStatus::Active | GameStatus::Check => "in progress".to_string(),
    }
}
