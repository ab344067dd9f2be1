//! Interactive console: parses one command per line and runs it against
//! the session.
//!
//! Verbs mirror the interpreter's own (`connect`, `char-read-hnd`, ...).
//! Handles and offsets are hexadecimal, `psm` and `mtu` decimal, write
//! payloads hex bytes (`0a1b` or `0a 1b`).

use std::str::FromStr;

use tokio::sync::mpsc;

use gattlink_app::ports::IoBridge;
use gattlink_app::session::{GattSession, SessionError};
use gattlink_domain::address::{AddressType, BdAddr};
use gattlink_domain::command::{parse_handle, parse_hex_bytes};
use gattlink_domain::error::ValidationError;
use gattlink_domain::gatt_uuid::GattUuid;
use gattlink_domain::security::SecurityLevel;

/// Usage text printed by `help`.
pub const HELP: &str = "\
connect <addr> [public|random]
disconnect
psm <n>
mtu <n>
sec-level <low|medium|high>
primary [<uuid>]
characteristics [<start> [<end> [<uuid>]]]
char-desc [<start> [<end>]]
char-read-hnd <handle> [<offset>]
char-read-uuid <uuid> [<start> [<end>]]
char-write-req <handle> <hex>
char-write-cmd <handle> <hex>
state
help
quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect {
        address: BdAddr,
        address_type: Option<AddressType>,
    },
    Disconnect,
    Psm(u16),
    Mtu(u16),
    SecurityLevel(SecurityLevel),
    Primary(Option<GattUuid>),
    Characteristics {
        start: Option<u16>,
        end: Option<u16>,
        uuid: Option<GattUuid>,
    },
    Descriptors {
        start: Option<u16>,
        end: Option<u16>,
    },
    ReadByHandle {
        handle: u16,
        offset: Option<u16>,
    },
    ReadByUuid {
        uuid: GattUuid,
        start: Option<u16>,
        end: Option<u16>,
    },
    WriteRequest {
        handle: u16,
        value: Vec<u8>,
    },
    WriteCommand {
        handle: u16,
        value: Vec<u8>,
    },
    State,
    Help,
    Quit,
}

/// Why a console line could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command {0:?}, try `help`")]
    UnknownVerb(String),

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

struct Args<'a> {
    words: std::slice::Iter<'a, &'a str>,
}

impl<'a> Args<'a> {
    fn next(&mut self) -> Option<&'a str> {
        self.words.next().copied()
    }

    fn required<T>(
        &mut self,
        name: &'static str,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.next().ok_or(ParseError::MissingArgument(name)).and_then(parse)
    }

    fn optional<T>(
        &mut self,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        self.next().map(parse).transpose()
    }

    /// Everything left, joined by single spaces.
    fn rest(&mut self) -> String {
        self.words.by_ref().copied().collect::<Vec<_>>().join(" ")
    }

    fn finish(mut self) -> Result<(), ParseError> {
        match self.next() {
            Some(extra) => Err(ParseError::UnexpectedArgument(extra.to_string())),
            None => Ok(()),
        }
    }
}

fn handle(text: &str) -> Result<u16, ParseError> {
    Ok(parse_handle(text)?)
}

fn decimal(text: &str) -> Result<u16, ParseError> {
    text.parse()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))
}

fn value<T>(text: &str) -> Result<T, ParseError>
where
    T: FromStr<Err = ValidationError>,
{
    Ok(text.parse()?)
}

/// Parse one console line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns [`ParseError`] for unknown verbs and bad arguments.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, rest)) = words.split_first() else {
        return Ok(None);
    };
    let mut args = Args { words: rest.iter() };

    let command = match verb.to_ascii_lowercase().as_str() {
        "connect" => ConsoleCommand::Connect {
            address: args.required("addr", value)?,
            address_type: args.optional(value)?,
        },
        "disconnect" => ConsoleCommand::Disconnect,
        "psm" => ConsoleCommand::Psm(args.required("n", decimal)?),
        "mtu" => ConsoleCommand::Mtu(args.required("n", decimal)?),
        "sec-level" => ConsoleCommand::SecurityLevel(args.required("level", value)?),
        "primary" => ConsoleCommand::Primary(args.optional(value)?),
        "characteristics" => ConsoleCommand::Characteristics {
            start: args.optional(handle)?,
            end: args.optional(handle)?,
            uuid: args.optional(value)?,
        },
        "char-desc" => ConsoleCommand::Descriptors {
            start: args.optional(handle)?,
            end: args.optional(handle)?,
        },
        "char-read-hnd" => ConsoleCommand::ReadByHandle {
            handle: args.required("handle", handle)?,
            offset: args.optional(handle)?,
        },
        "char-read-uuid" => ConsoleCommand::ReadByUuid {
            uuid: args.required("uuid", value)?,
            start: args.optional(handle)?,
            end: args.optional(handle)?,
        },
        "char-write-req" | "char-write-cmd" => {
            let target = args.required("handle", handle)?;
            let payload = args.rest();
            if payload.is_empty() {
                return Err(ParseError::MissingArgument("hex"));
            }
            let bytes = parse_hex_bytes(&payload)?;
            if verb.eq_ignore_ascii_case("char-write-req") {
                ConsoleCommand::WriteRequest {
                    handle: target,
                    value: bytes,
                }
            } else {
                ConsoleCommand::WriteCommand {
                    handle: target,
                    value: bytes,
                }
            }
        }
        "state" => ConsoleCommand::State,
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return Err(ParseError::UnknownVerb((*verb).to_string())),
    };

    args.finish()?;
    Ok(Some(command))
}

/// Run a session command. `State`, `Help` and `Quit` are handled by the
/// caller and do nothing here.
///
/// # Errors
///
/// Propagates the [`SessionError`] of the underlying operation.
pub async fn execute<B: IoBridge>(
    session: &GattSession<B>,
    command: ConsoleCommand,
) -> Result<(), SessionError> {
    match command {
        ConsoleCommand::Connect {
            address,
            address_type,
        } => session.connect(address, address_type).await,
        ConsoleCommand::Disconnect => session.disconnect().await,
        ConsoleCommand::Psm(psm) => session.set_psm(psm).await,
        ConsoleCommand::Mtu(mtu) => session.set_mtu(mtu).await,
        ConsoleCommand::SecurityLevel(level) => session.set_security_level(level).await,
        ConsoleCommand::Primary(None) => session.primary_discovery().await,
        ConsoleCommand::Primary(Some(uuid)) => session.primary_discovery_by_uuid(uuid).await,
        ConsoleCommand::Characteristics { start, end, uuid } => {
            session.characteristics_discovery(start, end, uuid).await
        }
        ConsoleCommand::Descriptors { start, end } => {
            session.descriptor_discovery(start, end).await
        }
        ConsoleCommand::ReadByHandle { handle, offset } => {
            session.read_by_handle(handle, offset).await
        }
        ConsoleCommand::ReadByUuid { uuid, start, end } => {
            session.read_by_uuid(uuid, start, end).await
        }
        ConsoleCommand::WriteRequest { handle, value } => {
            session.write_request(handle, &value).await
        }
        ConsoleCommand::WriteCommand { handle, value } => {
            session.write_command(handle, &value).await
        }
        ConsoleCommand::State | ConsoleCommand::Help | ConsoleCommand::Quit => Ok(()),
    }
}

/// Read commands from `lines` and run them until `quit`, the end of input
/// or the release of the session, whichever comes first.
pub async fn run<B: IoBridge>(
    session: &GattSession<B>,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            () = session.released() => {
                tracing::info!("session released, console stopped");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::State => println!("{}", session.state().await),
            command => match execute(session, command).await {
                Ok(()) => {}
                Err(SessionError::Released) => {
                    eprintln!("session released");
                    break;
                }
                Err(err) => eprintln!("{:#}", anyhow::Error::new(err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use gattlink_app::ports::BridgeError;

    use super::*;

    fn parsed(line: &str) -> ConsoleCommand {
        parse(line).unwrap().unwrap()
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn should_skip_blank_lines() {
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn should_parse_connect_with_optional_type() {
        assert_eq!(
            parsed("connect 00:11:22:33:44:55 random"),
            ConsoleCommand::Connect {
                address: "00:11:22:33:44:55".parse().unwrap(),
                address_type: Some(AddressType::Random),
            }
        );
        assert!(matches!(
            parsed("connect aa:bb:cc:dd:ee:ff"),
            ConsoleCommand::Connect {
                address_type: None,
                ..
            }
        ));
    }

    #[test]
    fn should_parse_decimal_psm_and_mtu() {
        assert_eq!(parsed("psm 31"), ConsoleCommand::Psm(31));
        assert_eq!(parsed("MTU 247"), ConsoleCommand::Mtu(247));
        assert!(matches!(
            parse("mtu 0x10"),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn should_parse_hex_handles() {
        assert_eq!(
            parsed("characteristics 10 0x05"),
            ConsoleCommand::Characteristics {
                start: Some(0x10),
                end: Some(0x05),
                uuid: None,
            }
        );
        assert_eq!(
            parsed("char-read-hnd 002a 4"),
            ConsoleCommand::ReadByHandle {
                handle: 0x2A,
                offset: Some(4),
            }
        );
    }

    #[test]
    fn should_parse_uuid_arguments() {
        assert_eq!(
            parsed("primary 180f"),
            ConsoleCommand::Primary(Some(GattUuid::from_u16(0x180F)))
        );
        assert_eq!(parsed("primary"), ConsoleCommand::Primary(None));
        assert_eq!(
            parsed("char-read-uuid 2a19 1 ffff"),
            ConsoleCommand::ReadByUuid {
                uuid: GattUuid::from_u16(0x2A19),
                start: Some(1),
                end: Some(0xFFFF),
            }
        );
    }

    #[test]
    fn should_parse_spaced_and_packed_write_payloads() {
        assert_eq!(
            parsed("char-write-req 0010 ab cd"),
            ConsoleCommand::WriteRequest {
                handle: 0x10,
                value: vec![0xAB, 0xCD],
            }
        );
        assert_eq!(
            parsed("char-write-cmd 10 ABCD"),
            ConsoleCommand::WriteCommand {
                handle: 0x10,
                value: vec![0xAB, 0xCD],
            }
        );
    }

    #[test]
    fn should_report_missing_and_extra_arguments() {
        assert!(matches!(
            parse("char-write-req 0010"),
            Err(ParseError::MissingArgument("hex"))
        ));
        assert!(matches!(
            parse("connect"),
            Err(ParseError::MissingArgument("addr"))
        ));
        assert!(matches!(
            parse("state now"),
            Err(ParseError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn should_surface_validation_errors() {
        assert!(matches!(
            parse("sec-level paranoid"),
            Err(ParseError::Invalid(ValidationError::UnknownSecurityLevel(_)))
        ));
        assert!(matches!(
            parse("char-read-hnd 12345"),
            Err(ParseError::Invalid(ValidationError::InvalidHandle(_)))
        ));
    }

    #[test]
    fn should_reject_unknown_verb() {
        assert!(matches!(
            parse("frobnicate"),
            Err(ParseError::UnknownVerb(verb)) if verb == "frobnicate"
        ));
    }

    // ── Execution ───────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingBridge {
        sent: Mutex<Vec<String>>,
    }

    impl IoBridge for RecordingBridge {
        fn send_line(&self, line: &str) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        }

        fn shutdown(&self) {}
    }

    #[tokio::test]
    async fn should_execute_parsed_command_against_session() {
        let bridge = Arc::new(RecordingBridge::default());
        let session = GattSession::new(Arc::clone(&bridge));

        execute(&session, parsed("connect 00:11:22:33:44:55 public"))
            .await
            .unwrap();
        let err = execute(&session, parsed("mtu 100")).await.unwrap_err();

        assert!(matches!(err, SessionError::State(_)));
        assert_eq!(
            *bridge.sent.lock().unwrap(),
            ["connect 00:11:22:33:44:55 public"]
        );
    }

    // ── Console loop ────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_stop_console_when_session_is_released() {
        let session = Arc::new(GattSession::new(RecordingBridge::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let console = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { run(&session, rx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!console.is_finished());

        session.release().await;

        tokio::time::timeout(Duration::from_secs(1), console)
            .await
            .expect("console still waiting for input")
            .unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn should_stop_console_on_quit() {
        let bridge = Arc::new(RecordingBridge::default());
        let session = GattSession::new(Arc::clone(&bridge));
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("connect 00:11:22:33:44:55".to_string()).unwrap();
        tx.send("quit".to_string()).unwrap();
        tx.send("psm 31".to_string()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), run(&session, rx))
            .await
            .expect("console did not stop on quit");

        assert_eq!(*bridge.sent.lock().unwrap(), ["connect 00:11:22:33:44:55"]);
        drop(tx);
    }
}
