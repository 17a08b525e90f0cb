//! Host request parsing.
//!
//! A request string is either host-scoped (`host:<verb>[:<args>]`),
//! device-scoped (`host-serial:<serial>:<verb>[:<args>]`), or a raw service
//! invocation destined for whichever device the connection's transport has
//! been bound to.

use crate::error::{BridgeError, BridgeResult};

const HOST_PREFIX: &str = "host:";
const HOST_SERIAL_PREFIX: &str = "host-serial:";

/// Token that marks a streamed-stdin payload when it is the last argument.
pub const STREAM_MARKER: &str = "-";
/// Flag declaring the expected streamed byte count.
pub const SIZE_FLAG: &str = "-S";

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// `host:<verb>[:<args>]` — device-agnostic command.
    Host { verb: String, args: String },
    /// `host-serial:<serial>:<verb>[:<args>]` — command scoped to one device.
    DeviceScoped {
        serial: String,
        verb: String,
        args: String,
    },
    /// Anything else: a raw service invocation string.
    Service(String),
}

/// Split a request into its scope, verb, and remaining argument string.
pub fn parse_request(line: &str) -> HostRequest {
    if let Some(rest) = line.strip_prefix(HOST_SERIAL_PREFIX) {
        if let Some((serial, command)) = rest.split_once(':') {
            let (verb, args) = split_verb(command);
            return HostRequest::DeviceScoped {
                serial: serial.to_string(),
                verb,
                args,
            };
        }
        // A serial with no command falls through as a service string; the
        // dispatcher will reject it with a wire failure.
    } else if let Some(rest) = line.strip_prefix(HOST_PREFIX) {
        let (verb, args) = split_verb(rest);
        return HostRequest::Host { verb, args };
    }
    HostRequest::Service(line.to_string())
}

fn split_verb(command: &str) -> (String, String) {
    match command.split_once(':') {
        Some((verb, args)) => (verb.to_string(), args.to_string()),
        None => (command.to_string(), String::new()),
    }
}

/// How service output is multiplexed back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// `shell:` / `exec:` — stdout and stderr merged into the raw socket.
    Raw,
    /// `shell,v2:` — discrete stdout/stderr/exit packets.
    ShellV2,
}

/// A parsed on-device service invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInvocation {
    pub mode: StreamMode,
    /// Space-delimited argument tokens; the first names the service.
    pub args: Vec<String>,
}

/// Parse a raw service invocation string such as
/// `shell,v2,raw:package install-create` or `exec:package install foo.apk`.
pub fn parse_service_invocation(request: &str) -> BridgeResult<ServiceInvocation> {
    let (prefix, command) = request
        .split_once(':')
        .ok_or_else(|| BridgeError::Protocol(format!("malformed service request {request:?}")))?;

    let mode = match prefix {
        "shell" | "exec" => StreamMode::Raw,
        _ if prefix.starts_with("shell,") => {
            if prefix.split(',').any(|opt| opt == "v2") {
                StreamMode::ShellV2
            } else {
                StreamMode::Raw
            }
        }
        _ => {
            return Err(BridgeError::Protocol(format!(
                "unsupported service prefix {prefix:?}"
            )))
        }
    };

    Ok(ServiceInvocation {
        mode,
        args: command.split_whitespace().map(String::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_scoped_with_args() {
        assert_eq!(
            parse_request("host:pair:123456:192.168.1.4:37000"),
            HostRequest::Host {
                verb: "pair".into(),
                args: "123456:192.168.1.4:37000".into(),
            }
        );
    }

    #[test]
    fn host_scoped_without_args() {
        assert_eq!(
            parse_request("host:list-forward"),
            HostRequest::Host {
                verb: "list-forward".into(),
                args: String::new(),
            }
        );
    }

    #[test]
    fn device_scoped() {
        assert_eq!(
            parse_request("host-serial:emulator-5554:list-forward"),
            HostRequest::DeviceScoped {
                serial: "emulator-5554".into(),
                verb: "list-forward".into(),
                args: String::new(),
            }
        );
    }

    #[test]
    fn raw_service_string() {
        assert_eq!(
            parse_request("shell,v2,raw:package install-create"),
            HostRequest::Service("shell,v2,raw:package install-create".into())
        );
    }

    #[test]
    fn shell_v2_invocation() {
        let inv = parse_service_invocation("shell,v2,TERM=dumb,raw:package install-commit 1234")
            .unwrap();
        assert_eq!(inv.mode, StreamMode::ShellV2);
        assert_eq!(inv.args, ["package", "install-commit", "1234"]);
    }

    #[test]
    fn legacy_shell_is_raw() {
        let inv = parse_service_invocation("shell:package install foo.apk").unwrap();
        assert_eq!(inv.mode, StreamMode::Raw);
        assert_eq!(inv.args, ["package", "install", "foo.apk"]);
    }

    #[test]
    fn trailing_stream_marker_survives_tokenization() {
        let inv =
            parse_service_invocation("exec:package install-write -S 128 sess base.apk -").unwrap();
        assert_eq!(inv.args.last().map(String::as_str), Some(STREAM_MARKER));
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        assert!(parse_service_invocation("sync:something").is_err());
        assert!(parse_service_invocation("no-colon-at-all").is_err());
    }
}
