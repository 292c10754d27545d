//! Operator console commands
//!
//! One command per stdin line, see [`HELP`].

use crate::joystick::channel::{scale_axis, scale_button, Channel, UnknownChannel};
use crate::link::{LinkError, LinkHandle};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  connect [host[:port]]        connect (configured robot when omitted)
  disconnect                   drop the connection
  enable | disable             enable or disable the robot
  count <n>                    number of active controllers (0-4)
  set <slot> <channel> <0-255> raw channel value
  axis <slot> <channel> <v>    analog axis, v in -1.0..1.0
  button <slot> <channel> <v>  button or trigger, v in 0.0..1.0
  status                       show link status
  help                         this text
  quit                         disconnect and exit
Channels are 0-23 or names like left-x, a, dpad-up, aux1.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),

    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: invalid {argument} '{value}'")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },

    #[error("{command}: unexpected argument '{value}'")]
    UnexpectedArgument { command: &'static str, value: String },

    #[error(transparent)]
    Channel(#[from] UnknownChannel),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Connect {
        host: Option<String>,
        port: Option<u16>,
    },
    Disconnect,
    Enable,
    Disable,
    Count(usize),
    Set {
        slot: usize,
        channel: Channel,
        value: u8,
    },
    Axis {
        slot: usize,
        channel: Channel,
        value: f32,
    },
    Button {
        slot: usize,
        channel: Channel,
        value: f32,
    },
    Status,
    Help,
    Quit,
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(Option<String>),
    Quit,
}

struct Args<'a> {
    command: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, argument: &'static str) -> Result<&'a str, ConsoleError> {
        self.words.next().ok_or(ConsoleError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn parse<T: std::str::FromStr>(&mut self, argument: &'static str) -> Result<T, ConsoleError> {
        let word = self.next(argument)?;
        word.parse().map_err(|_| ConsoleError::InvalidArgument {
            command: self.command,
            argument,
            value: word.to_string(),
        })
    }

    fn channel(&mut self) -> Result<Channel, ConsoleError> {
        Ok(self.next("channel")?.parse()?)
    }

    fn finish(mut self) -> Result<(), ConsoleError> {
        match self.words.next() {
            Some(extra) => Err(ConsoleError::UnexpectedArgument {
                command: self.command,
                value: extra.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl ConsoleCommand {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };

        let name: &'static str = match word.to_ascii_lowercase().as_str() {
            "connect" => "connect",
            "disconnect" => "disconnect",
            "enable" => "enable",
            "disable" => "disable",
            "count" => "count",
            "set" => "set",
            "axis" => "axis",
            "button" => "button",
            "status" => "status",
            "help" | "?" => "help",
            "quit" | "exit" => "quit",
            _ => return Err(ConsoleError::UnknownCommand(word.to_string())),
        };
        let mut args = Args {
            command: name,
            words,
        };

        let command = match name {
            "connect" => match args.words.next() {
                None => ConsoleCommand::Connect {
                    host: None,
                    port: None,
                },
                Some(target) => parse_target(target)?,
            },
            "disconnect" => ConsoleCommand::Disconnect,
            "enable" => ConsoleCommand::Enable,
            "disable" => ConsoleCommand::Disable,
            "count" => ConsoleCommand::Count(args.parse("controller count")?),
            "set" => ConsoleCommand::Set {
                slot: args.parse("slot")?,
                channel: args.channel()?,
                value: args.parse("value (0-255)")?,
            },
            "axis" => ConsoleCommand::Axis {
                slot: args.parse("slot")?,
                channel: args.channel()?,
                value: args.parse("value (-1.0..1.0)")?,
            },
            "button" => ConsoleCommand::Button {
                slot: args.parse("slot")?,
                channel: args.channel()?,
                value: args.parse("value (0.0..1.0)")?,
            },
            "status" => ConsoleCommand::Status,
            "help" => ConsoleCommand::Help,
            _ => ConsoleCommand::Quit,
        };
        args.finish()?;
        Ok(Some(command))
    }

    pub async fn execute(self, link: &LinkHandle) -> Result<Outcome, LinkError> {
        let message = match self {
            ConsoleCommand::Connect { host, port } => {
                let host = host.unwrap_or_else(|| link.default_host().to_string());
                let port = port.unwrap_or(link.default_port());
                link.connect(&host, port).await?;
                Some(format!("Connected: {}", link.status()))
            }
            ConsoleCommand::Disconnect => Some(if link.disconnect().await? {
                "Disconnected".to_string()
            } else {
                "Not connected".to_string()
            }),
            ConsoleCommand::Enable => Some(if link.enable().await? {
                "Robot enabled".to_string()
            } else {
                "Not connected, robot stays disabled".to_string()
            }),
            ConsoleCommand::Disable => {
                link.disable().await;
                Some("Robot disabled".to_string())
            }
            ConsoleCommand::Count(count) => {
                let stored = link.handle_controller_count_change(count).await?;
                Some(format!("{} controller(s) active", stored))
            }
            ConsoleCommand::Set {
                slot,
                channel,
                value,
            } => {
                link.handle_channel_update(slot, channel, value).await?;
                None
            }
            ConsoleCommand::Axis {
                slot,
                channel,
                value,
            } => {
                link.handle_channel_update(slot, channel, scale_axis(value))
                    .await?;
                None
            }
            ConsoleCommand::Button {
                slot,
                channel,
                value,
            } => {
                link.handle_channel_update(slot, channel, scale_button(value))
                    .await?;
                None
            }
            ConsoleCommand::Status => Some(link.status().to_string()),
            ConsoleCommand::Help => Some(HELP.to_string()),
            ConsoleCommand::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(message))
    }
}

fn parse_target(target: &str) -> Result<ConsoleCommand, ConsoleError> {
    let (host, port) = split_peer(target);
    let port = match port {
        None => None,
        Some(port) => Some(port.parse().map_err(|_| ConsoleError::InvalidArgument {
            command: "connect",
            argument: "port",
            value: port.to_string(),
        })?),
    };
    Ok(ConsoleCommand::Connect { host, port })
}

/// Splits `host[:port]`. A bare `:port` keeps the host empty.
fn split_peer(target: &str) -> (Option<String>, Option<&str>) {
    let (host, port) = match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (target, None),
    };
    let host = (!host.is_empty()).then(|| host.to_string());
    (host, port)
}
