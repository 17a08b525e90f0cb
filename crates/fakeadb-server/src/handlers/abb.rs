//! The `abb_exec` handler: an alternate, binder-style transport into the
//! package installer.
//!
//! Unlike the shell path, abb acknowledges the request up front and then
//! answers a narrow subset of install sub-commands with fixed canned
//! responses, bypassing the full service framework.

use super::CommandHandler;
use crate::device::Device;
use crate::server::{Connection, ServerState};
use async_trait::async_trait;
use fakeadb_core::codec::write_okay;
use fakeadb_core::BridgeResult;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Canned response for `abb_exec:package install-create`.
pub const ABB_CREATE_RESPONSE: &str = "Success: created install session [1234]\n";
/// Canned response for `abb_exec:package install-commit`.
pub const ABB_COMMIT_RESPONSE: &str = "Success\n";

pub struct AbbHandler;

#[async_trait]
impl CommandHandler for AbbHandler {
    async fn invoke(
        &self,
        _state: &ServerState,
        conn: &mut Connection,
        _device: Option<Arc<Device>>,
        args: &str,
    ) -> BridgeResult<bool> {
        // abb always acknowledges first, then streams raw output.
        write_okay(&mut conn.stream).await?;

        let tokens: Vec<&str> = args.split('\0').collect();
        let response = match tokens.as_slice() {
            ["package", "install-create", ..] => ABB_CREATE_RESPONSE,
            ["package", "install-commit", ..] => ABB_COMMIT_RESPONSE,
            _ => {
                debug!(args, "unsupported abb command");
                "Error: unsupported abb command\n"
            }
        };
        conn.stream.write_all(response.as_bytes()).await?;
        Ok(false)
    }
}
