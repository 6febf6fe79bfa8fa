//! Text wire protocol for sketch synchronization.
//!
//! One command per newline-delimited UTF-8 line, tokens space-separated:
//!
//! ```text
//! add <kind> <fields...> <color>     append a shape (server assigns the ID)
//! <id> <kind> <fields...> <color>    explicit-ID add (reconciliation path)
//! move <id> <dx> <dy>                displace a shape
//! recolor <id> <color>               recolor a shape
//! remove <id>                        delete a shape
//! bottom <id> / top <id>             reorder a shape
//! save_state / undo / redo           history control, never rebroadcast
//! ```
//!
//! The server additionally pushes three client-only directives: `clear`
//! (reset the local document), `curId <n>` (pin the local ID allocator), and
//! `print <text>` (console notice, used by the password handshake).
//!
//! A line whose first token parses as an integer is always the explicit-ID
//! path; the command vocabulary is fixed and non-numeric, so no collision
//! class exists.

use scrawl_core::shape::{Shape, ShapeError};

/// A client-to-server command (also the rebroadcast payload).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Append a shape at the next free ID.
    Add(Shape),
    /// Upsert a shape at an explicit, server-assigned ID.
    PutShape { id: i32, shape: Shape },
    Move { id: i32, dx: i32, dy: i32 },
    Recolor { id: i32, color: i32 },
    Remove(i32),
    Bottom(i32),
    Top(i32),
    SaveState,
    Undo,
    Redo,
}

/// Why a line failed to parse as a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Empty,
    /// First token is neither a command word nor an integer.
    Unknown(String),
    /// Wrong token count for the command word.
    Arity { word: &'static str, expected: usize, got: usize },
    /// A token that should be an integer was not.
    BadNumber(String),
    /// The shape payload of an add failed to decode.
    MalformedShape(ShapeError),
    /// An add line missing its shape kind.
    MissingKind,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command line"),
            Self::Unknown(word) => write!(f, "invalid command {word:?}"),
            Self::Arity { word, expected, got } => {
                write!(f, "{word} takes {expected} tokens, got {got}")
            }
            Self::BadNumber(token) => write!(f, "expected an integer, got {token:?}"),
            Self::MalformedShape(err) => write!(f, "malformed shape: {err}"),
            Self::MissingKind => write!(f, "add requires a shape kind"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedShape(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShapeError> for CommandError {
    fn from(err: ShapeError) -> Self {
        Self::MalformedShape(err)
    }
}

fn parse_i32(token: &str) -> Result<i32, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::BadNumber(token.to_string()))
}

fn expect_arity(
    word: &'static str,
    words: &[&str],
    expected: usize,
) -> Result<(), CommandError> {
    if words.len() != expected {
        return Err(CommandError::Arity {
            word,
            expected,
            got: words.len(),
        });
    }
    Ok(())
}

impl Command {
    /// Parse one wire line. Never panics on malformed input.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = words.first() else {
            return Err(CommandError::Empty);
        };
        match head {
            "add" => {
                let kind = words.get(1).ok_or(CommandError::MissingKind)?;
                let shape = Shape::decode(kind, &words[2..])?;
                Ok(Self::Add(shape))
            }
            "move" => {
                expect_arity("move", &words, 4)?;
                Ok(Self::Move {
                    id: parse_i32(words[1])?,
                    dx: parse_i32(words[2])?,
                    dy: parse_i32(words[3])?,
                })
            }
            "recolor" => {
                expect_arity("recolor", &words, 3)?;
                Ok(Self::Recolor {
                    id: parse_i32(words[1])?,
                    color: parse_i32(words[2])?,
                })
            }
            "remove" => {
                expect_arity("remove", &words, 2)?;
                Ok(Self::Remove(parse_i32(words[1])?))
            }
            "bottom" => {
                expect_arity("bottom", &words, 2)?;
                Ok(Self::Bottom(parse_i32(words[1])?))
            }
            "top" => {
                expect_arity("top", &words, 2)?;
                Ok(Self::Top(parse_i32(words[1])?))
            }
            "save_state" => Ok(Self::SaveState),
            "undo" => Ok(Self::Undo),
            "redo" => Ok(Self::Redo),
            other => match other.parse::<i32>() {
                Ok(id) => {
                    let kind = words.get(1).ok_or(CommandError::MissingKind)?;
                    let shape = Shape::decode(kind, &words[2..])?;
                    Ok(Self::PutShape { id, shape })
                }
                Err(_) => Err(CommandError::Unknown(other.to_string())),
            },
        }
    }

    /// The wire line for this command.
    pub fn encode(&self) -> String {
        match self {
            Self::Add(shape) => format!("add {}", shape.encode()),
            Self::PutShape { id, shape } => format!("{id} {}", shape.encode()),
            Self::Move { id, dx, dy } => format!("move {id} {dx} {dy}"),
            Self::Recolor { id, color } => format!("recolor {id} {color}"),
            Self::Remove(id) => format!("remove {id}"),
            Self::Bottom(id) => format!("bottom {id}"),
            Self::Top(id) => format!("top {id}"),
            Self::SaveState => "save_state".to_string(),
            Self::Undo => "undo".to_string(),
            Self::Redo => "redo".to_string(),
        }
    }
}

/// A server-to-client line: either a relayed command or a directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Apply(Command),
    /// Reset the local document (start of a full resync).
    Clear,
    /// Pin the local ID allocator to the master's.
    CurId(i32),
    /// Console notice (password handshake and diagnostics).
    Notice(String),
}

impl Update {
    /// Parse a line received from the server.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("clear") => Ok(Self::Clear),
            Some("curId") => {
                let token = tokens.next().ok_or(CommandError::Arity {
                    word: "curId",
                    expected: 2,
                    got: 1,
                })?;
                Ok(Self::CurId(parse_i32(token)?))
            }
            Some("print") => {
                let text = line.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
                Ok(Self::Notice(text.to_string()))
            }
            Some(_) => Command::parse(line).map(Self::Apply),
            None => Err(CommandError::Empty),
        }
    }

    pub fn clear_line() -> String {
        "clear".to_string()
    }

    pub fn cur_id_line(next_id: i32) -> String {
        format!("curId {next_id}")
    }

    pub fn notice_line(text: &str) -> String {
        format!("print {text}")
    }
}
