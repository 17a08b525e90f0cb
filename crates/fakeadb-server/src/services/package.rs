//! Simulated package-manager service.
//!
//! Implements the session-based install protocol (create → write →
//! commit/abandon) plus the one-shot and streamed variants. The state
//! machine is intentionally shallow: its purpose is to let harnesses force
//! every branch of the real install protocol deterministically, including
//! specific upstream error text, via the poisoned fixtures below.

use super::{Service, ServiceOutput};
use async_trait::async_trait;
use fakeadb_core::request::{SIZE_FLAG, STREAM_MARKER};
use fakeadb_core::BridgeResult;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Argument flag that makes `install-create` fail without creating a session.
pub const CREATE_FAIL_FLAG: &str = "--poison-create-failure";
/// Session id whose writes and commits fail with an install-rejected error.
pub const SESSION_REJECT_ID: &str = "poisoned-session-reject";
/// Session id whose writes and commits fail with a storage-full error.
pub const SESSION_STORAGE_FULL_ID: &str = "poisoned-session-storage-full";
/// Session id that fails only at commit, independent of the poisoned table.
pub const COMMIT_ADHOC_FAIL_ID: &str = "poisoned-session-adhoc-commit";
/// Package id whose uninstall always fails.
pub const UNINSTALL_FAIL_PACKAGE: &str = "poison.uninstall.failure";

/// Byte count reported by the non-streamed `install-write` form.
pub const REMOTE_WRITE_BYTE_COUNT: u64 = 65536;

/// Stderr text for the ad-hoc commit failure.
pub const COMMIT_ADHOC_FAIL_TEXT: &str = "Error: session commit rejected";
/// Stderr text for a failed `install-create`.
pub const CREATE_FAIL_TEXT: &str = "Error: failed to create install session";
/// Stderr text for a failed uninstall.
pub const UNINSTALL_FAIL_TEXT: &str = "Failure [DELETE_FAILED_INTERNAL_ERROR]";

/// Read granularity for streamed uploads.
const STREAM_CHUNK_SIZE: usize = 8192;

/// The closed set of poisoned session fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallFailure {
    Rejected,
    StorageFull,
}

impl InstallFailure {
    fn for_session(id: &str) -> Option<Self> {
        match id {
            SESSION_REJECT_ID => Some(InstallFailure::Rejected),
            SESSION_STORAGE_FULL_ID => Some(InstallFailure::StorageFull),
            _ => None,
        }
    }

    fn stderr_text(self) -> &'static str {
        match self {
            InstallFailure::Rejected => "Failure [INSTALL_FAILED_REJECTED: poisoned session]",
            InstallFailure::StorageFull => "Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Committed,
    Abandoned,
}

/// Simulated `package` service holding in-flight install sessions.
pub struct PackageManagerService {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl PackageManagerService {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sessions still in the `Created` state.
    pub async fn open_session_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| **s == SessionState::Created)
            .count()
    }

    async fn install_create(
        &self,
        args: &[String],
        output: &mut dyn ServiceOutput,
    ) -> BridgeResult<()> {
        if args.iter().any(|a| a == CREATE_FAIL_FLAG) {
            output.write_stderr(CREATE_FAIL_TEXT.as_bytes()).await?;
            return output.write_exit(1).await;
        }

        let id = generate_session_id();
        self.sessions
            .lock()
            .await
            .insert(id.clone(), SessionState::Created);
        debug!(session = %id, "install session created");
        output
            .write_stdout(format!("Success: created install session [{id}]\n").as_bytes())
            .await?;
        output.write_exit(0).await
    }

    async fn install_write(
        &self,
        args: &[String],
        output: &mut dyn ServiceOutput,
    ) -> BridgeResult<()> {
        let spec = WriteSpec::parse(args);

        if let Some(failure) = spec
            .session_id
            .as_deref()
            .and_then(InstallFailure::for_session)
        {
            output.write_stderr(failure.stderr_text().as_bytes()).await?;
            return output.write_exit(1).await;
        }

        let written = if spec.streamed {
            // Consume stdin in bounded chunks until the declared byte count
            // is satisfied or the input runs out; report what was actually
            // read so truncation scenarios are observable.
            let declared = spec.declared_size.unwrap_or(0);
            let mut chunk = [0u8; STREAM_CHUNK_SIZE];
            let mut total: u64 = 0;
            while total < declared {
                let want = (declared - total).min(STREAM_CHUNK_SIZE as u64) as usize;
                let n = output.read_stdin(&mut chunk[..want]).await?;
                if n == 0 {
                    break;
                }
                total += n as u64;
            }
            total
        } else {
            REMOTE_WRITE_BYTE_COUNT
        };

        output
            .write_stdout(format!("Success: streamed {written} bytes\n").as_bytes())
            .await?;
        output.write_exit(0).await
    }

    async fn install_commit(
        &self,
        args: &[String],
        output: &mut dyn ServiceOutput,
    ) -> BridgeResult<()> {
        let id = args.first().map(String::as_str).unwrap_or("");

        // The poisoned-session table wins over everything else.
        if let Some(failure) = InstallFailure::for_session(id) {
            output.write_stderr(failure.stderr_text().as_bytes()).await?;
            return output.write_exit(1).await;
        }
        if id == COMMIT_ADHOC_FAIL_ID {
            output.write_stderr(COMMIT_ADHOC_FAIL_TEXT.as_bytes()).await?;
            return output.write_exit(1).await;
        }

        self.sessions
            .lock()
            .await
            .insert(id.to_string(), SessionState::Committed);
        debug!(session = id, "install session committed");
        output.write_stdout(b"Success\n").await?;
        output.write_exit(0).await
    }

    async fn install_abandon(
        &self,
        args: &[String],
        output: &mut dyn ServiceOutput,
    ) -> BridgeResult<()> {
        let id = args.first().map(String::as_str).unwrap_or("");
        self.sessions
            .lock()
            .await
            .insert(id.to_string(), SessionState::Abandoned);
        debug!(session = id, "install session abandoned");
        output.write_stdout(b"Success\n").await?;
        output.write_exit(0).await
    }

    async fn uninstall(&self, args: &[String], output: &mut dyn ServiceOutput) -> BridgeResult<()> {
        let package = args.last().map(String::as_str).unwrap_or("");
        if package == UNINSTALL_FAIL_PACKAGE {
            output.write_stderr(UNINSTALL_FAIL_TEXT.as_bytes()).await?;
            return output.write_exit(1).await;
        }
        output.write_stdout(b"Success\n").await?;
        output.write_exit(0).await
    }
}

impl Default for PackageManagerService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for PackageManagerService {
    async fn run(&self, args: &[String], output: &mut dyn ServiceOutput) -> BridgeResult<()> {
        let verb = args.first().map(String::as_str).unwrap_or("");
        let rest = if args.is_empty() { &args[..] } else { &args[1..] };

        match verb {
            // One-shot install bypasses session tracking entirely.
            "install" => {
                output.write_stdout(b"Success\n").await?;
                output.write_exit(0).await
            }
            "install-create" => self.install_create(rest, output).await,
            "install-write" => self.install_write(rest, output).await,
            "install-commit" => self.install_commit(rest, output).await,
            "install-abandon" => self.install_abandon(rest, output).await,
            "uninstall" => self.uninstall(rest, output).await,
            "path" => match rest.first() {
                Some(package) => {
                    output
                        .write_stdout(format!("package:/data/app/{package}/base.apk\n").as_bytes())
                        .await?;
                    output.write_exit(0).await
                }
                None => {
                    output.write_stderr(b"Error: no package specified").await?;
                    output.write_exit(1).await
                }
            },
            "list" if rest.first().map(String::as_str) == Some("users") => {
                output
                    .write_stdout(b"Users:\n\tUserInfo{0:Owner:13} running\n")
                    .await?;
                output.write_exit(0).await
            }
            other => {
                output
                    .write_stderr(format!("Error: unknown command '{other}'").as_bytes())
                    .await?;
                output.write_exit(1).await
            }
        }
    }
}

/// Parsed `install-write` arguments.
struct WriteSpec {
    session_id: Option<String>,
    declared_size: Option<u64>,
    streamed: bool,
}

impl WriteSpec {
    /// `install-write [-S <size>] <session> [<name>] [-]`. The session id is
    /// the first positional token; a trailing lone `-` selects the streamed
    /// form.
    fn parse(args: &[String]) -> Self {
        let streamed = args.last().map(String::as_str) == Some(STREAM_MARKER);
        let mut declared_size = None;
        let mut session_id = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == SIZE_FLAG {
                declared_size = iter.next().and_then(|v| v.parse().ok());
            } else if arg != STREAM_MARKER && session_id.is_none() {
                session_id = Some(arg.clone());
            }
        }

        Self {
            session_id,
            declared_size,
            streamed,
        }
    }
}

/// Synthetic, opaque session id (8 random bytes, hex-encoded).
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
