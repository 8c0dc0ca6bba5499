use std::io;
use std::time::Instant;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;

const MAX_LINE_LEN: usize = 4096;

pub const HELP: &str = "\
commands:
  register <email> <password> <name...>
  login <email> <password>
  logout
  whoami
  users                                        (login)
  add-vehicle <plate> <hourly-rate-cents> <model...>  (login)
  remove-vehicle <plate>                       (login)
  vehicles
  available <start-ms> <end-ms>
  check <plate> <start-ms> <end-ms>
  book <plate> <start-ms> <end-ms>             (login)
  cancel <booking-id>                          (login)
  bookings <plate>
  my-bookings                                  (login)
  compact                                      (login)
  help
  quit";

/// Parsed console command.
#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Register {
        email: String,
        password: String,
        name: String,
    },
    Login {
        email: String,
        password: String,
    },
    Logout,
    WhoAmI,
    Users,
    AddVehicle {
        plate: String,
        hourly_rate: Cents,
        model: String,
    },
    RemoveVehicle {
        plate: String,
    },
    Vehicles,
    Available {
        interval: Interval,
    },
    Check {
        plate: String,
        interval: Interval,
    },
    Book {
        plate: String,
        interval: Interval,
    },
    Cancel {
        id: Ulid,
    },
    Bookings {
        plate: String,
    },
    MyBookings,
    Compact,
    Quit,
}

#[derive(Debug)]
pub enum ConsoleError {
    Empty,
    Unknown(String),
    /// (command, expected args, got)
    WrongArity(&'static str, &'static str, usize),
    InvalidNumber(String),
    InvalidId(String),
    InvalidInterval(InvalidInterval),
    NotLoggedIn,
    Engine(EngineError),
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Empty => write!(f, "empty command"),
            ConsoleError::Unknown(verb) => write!(f, "unknown command '{verb}' (try 'help')"),
            ConsoleError::WrongArity(cmd, usage, got) => {
                write!(f, "usage: {cmd} {usage} (got {got} arguments)")
            }
            ConsoleError::InvalidNumber(s) => write!(f, "not a number: {s}"),
            ConsoleError::InvalidId(s) => write!(f, "not a booking id: {s}"),
            ConsoleError::InvalidInterval(e) => write!(f, "{e}"),
            ConsoleError::NotLoggedIn => write!(f, "log in first"),
            ConsoleError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl From<EngineError> for ConsoleError {
    fn from(e: EngineError) -> Self {
        ConsoleError::Engine(e)
    }
}

fn parse_i64(s: &str) -> Result<i64, ConsoleError> {
    s.parse().map_err(|_| ConsoleError::InvalidNumber(s.to_string()))
}

fn parse_interval(start: &str, end: &str) -> Result<Interval, ConsoleError> {
    Interval::new(parse_i64(start)?, parse_i64(end)?).map_err(ConsoleError::InvalidInterval)
}

fn expect_args(
    args: &[&str],
    n: usize,
    cmd: &'static str,
    usage: &'static str,
) -> Result<(), ConsoleError> {
    if args.len() != n {
        return Err(ConsoleError::WrongArity(cmd, usage, args.len()));
    }
    Ok(())
}

pub fn parse_command(line: &str) -> Result<Command, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(ConsoleError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "logout" => Ok(Command::Logout),
        "whoami" => Ok(Command::WhoAmI),
        "users" => Ok(Command::Users),
        "vehicles" => Ok(Command::Vehicles),
        "my-bookings" => Ok(Command::MyBookings),
        "compact" => Ok(Command::Compact),
        "register" => {
            if args.len() < 3 {
                return Err(ConsoleError::WrongArity("register", "<email> <password> <name...>", args.len()));
            }
            Ok(Command::Register {
                email: args[0].to_string(),
                password: args[1].to_string(),
                name: args[2..].join(" "),
            })
        }
        "login" => {
            expect_args(&args, 2, "login", "<email> <password>")?;
            Ok(Command::Login {
                email: args[0].to_string(),
                password: args[1].to_string(),
            })
        }
        "add-vehicle" => {
            if args.len() < 3 {
                return Err(ConsoleError::WrongArity(
                    "add-vehicle",
                    "<plate> <hourly-rate-cents> <model...>",
                    args.len(),
                ));
            }
            let hourly_rate = args[1]
                .parse()
                .map_err(|_| ConsoleError::InvalidNumber(args[1].to_string()))?;
            Ok(Command::AddVehicle {
                plate: args[0].to_string(),
                hourly_rate,
                model: args[2..].join(" "),
            })
        }
        "remove-vehicle" => {
            expect_args(&args, 1, "remove-vehicle", "<plate>")?;
            Ok(Command::RemoveVehicle { plate: args[0].to_string() })
        }
        "available" => {
            expect_args(&args, 2, "available", "<start-ms> <end-ms>")?;
            Ok(Command::Available { interval: parse_interval(args[0], args[1])? })
        }
        "check" => {
            expect_args(&args, 3, "check", "<plate> <start-ms> <end-ms>")?;
            Ok(Command::Check {
                plate: args[0].to_string(),
                interval: parse_interval(args[1], args[2])?,
            })
        }
        "book" => {
            expect_args(&args, 3, "book", "<plate> <start-ms> <end-ms>")?;
            Ok(Command::Book {
                plate: args[0].to_string(),
                interval: parse_interval(args[1], args[2])?,
            })
        }
        "cancel" => {
            expect_args(&args, 1, "cancel", "<booking-id>")?;
            let id = Ulid::from_string(args[0])
                .map_err(|_| ConsoleError::InvalidId(args[0].to_string()))?;
            Ok(Command::Cancel { id })
        }
        "bookings" => {
            expect_args(&args, 1, "bookings", "<plate>")?;
            Ok(Command::Bookings { plate: args[0].to_string() })
        }
        other => Err(ConsoleError::Unknown(other.to_string())),
    }
}

/// Per-connection state: who is logged in.
#[derive(Debug, Default)]
pub struct Session {
    pub user: Option<UserInfo>,
}

impl Session {
    fn require_user(&self) -> Result<&UserInfo, ConsoleError> {
        self.user.as_ref().ok_or(ConsoleError::NotLoggedIn)
    }
}

fn fmt_cents(c: Cents) -> String {
    format!("{}.{:02}", c / 100, c % 100)
}

fn render_vehicles(vehicles: &[VehicleInfo]) -> String {
    if vehicles.is_empty() {
        return "no vehicles".to_string();
    }
    vehicles
        .iter()
        .map(|v| {
            format!(
                "{:<16} {:<24} {:>10}/h  {} bookings",
                v.plate,
                v.model,
                fmt_cents(v.hourly_rate),
                v.booking_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_booking(b: &BookingInfo) -> String {
    format!(
        "{}  {:<16} [{}, {}]  {:>10}  {}",
        b.id,
        b.plate,
        b.start,
        b.end,
        fmt_cents(b.cost),
        b.client
    )
}

fn render_bookings(bookings: &[BookingInfo]) -> String {
    if bookings.is_empty() {
        return "no bookings".to_string();
    }
    bookings.iter().map(render_booking).collect::<Vec<_>>().join("\n")
}

/// Execute one parsed command (never `Quit`) and render its output.
pub async fn execute(
    engine: &Engine,
    session: &mut Session,
    cmd: Command,
) -> Result<String, ConsoleError> {
    match cmd {
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".to_string()),
        Command::Register {
            email,
            password,
            name,
        } => {
            let user = engine.register_user(&email, &name, &password).await?;
            Ok(format!("registered {} ({})", user.email, user.name))
        }
        Command::Login { email, password } => {
            let user = engine.authenticate(&email, &password).await?;
            let text = format!("welcome, {}", user.name);
            session.user = Some(user);
            Ok(text)
        }
        Command::Logout => match session.user.take() {
            Some(user) => Ok(format!("goodbye, {}", user.name)),
            None => Err(ConsoleError::NotLoggedIn),
        },
        Command::WhoAmI => {
            let email = session.require_user()?.email.clone();
            let user = engine.get_user(&email)?;
            Ok(format!("{} ({})", user.email, user.name))
        }
        Command::Users => {
            session.require_user()?;
            let users = engine.list_users();
            if users.is_empty() {
                return Ok("no users".to_string());
            }
            Ok(users
                .iter()
                .map(|u| format!("{:<32} {}", u.email, u.name))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::AddVehicle {
            plate,
            hourly_rate,
            model,
        } => {
            session.require_user()?;
            let v = engine.add_vehicle(&plate, &model, hourly_rate).await?;
            Ok(format!("added {} ({}) at {}/h", v.plate, v.model, fmt_cents(v.hourly_rate)))
        }
        Command::RemoveVehicle { plate } => {
            session.require_user()?;
            let dropped = engine.remove_vehicle(&plate).await?;
            Ok(format!("removed {} and {dropped} bookings", plate.to_ascii_uppercase()))
        }
        Command::Vehicles => Ok(render_vehicles(&engine.list_vehicles().await)),
        Command::Available { interval } => {
            let free = engine.available_vehicles(interval).await?;
            Ok(render_vehicles(&free))
        }
        Command::Check { plate, interval } => {
            if engine.is_available(&plate, interval).await? {
                let cost = engine.quote(&plate, interval).await?;
                Ok(format!("free during {interval}, would cost {}", fmt_cents(cost)))
            } else {
                let clashes = engine.conflicts(&plate, interval).await?;
                Ok(format!("occupied during {interval}:\n{}", render_bookings(&clashes)))
            }
        }
        Command::Book { plate, interval } => {
            let client = session.require_user()?.email.clone();
            let booking = engine.book(Ulid::new(), &plate, &client, interval).await?;
            Ok(format!("booked: {}", render_booking(&booking)))
        }
        Command::Cancel { id } => {
            let requester = session.require_user()?.email.clone();
            let booking = engine.cancel_booking(id, &requester).await?;
            Ok(format!("cancelled: {}", render_booking(&booking)))
        }
        Command::Bookings { plate } => Ok(render_bookings(&engine.vehicle_bookings(&plate).await?)),
        Command::MyBookings => {
            let email = session.require_user()?.email.clone();
            Ok(render_bookings(&engine.user_bookings(&email).await?))
        }
        Command::Compact => {
            session.require_user()?;
            engine.compact_wal().await?;
            Ok("log compacted".to_string())
        }
    }
}

/// Parse and execute one input line. `None` means the session should end.
pub async fn run_line(engine: &Engine, session: &mut Session, line: &str) -> Option<String> {
    let cmd = match parse_command(line) {
        Ok(Command::Quit) => return None,
        Ok(cmd) => cmd,
        Err(ConsoleError::Empty) => return Some(String::new()),
        Err(e) => return Some(format!("error: {e}")),
    };

    let label = observability::command_label(&cmd);
    let start = Instant::now();
    let result = execute(engine, session, cmd).await;
    metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
        .increment(1);

    Some(match result {
        Ok(text) => text,
        Err(e) => {
            debug!("{label} failed: {e}");
            format!("error: {e}")
        }
    })
}

/// Drive a console session over any line-oriented byte stream until EOF or `quit`.
pub async fn run<R, W>(engine: &Engine, input: R, mut output: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut session = Session::default();
    output.write_all(b"fleetbook ready, type 'help' for commands\n").await?;
    output.flush().await?;

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                output.write_all(b"error: line too long\n").await?;
                continue;
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
        };
        let Some(reply) = run_line(engine, &mut session, &line).await else {
            output.write_all(b"bye\n").await?;
            break;
        };
        if !reply.is_empty() {
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        output.flush().await?;
    }
    output.flush().await
}
