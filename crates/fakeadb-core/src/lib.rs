//! fakeadb-core: Shared protocol library for the fake device bridge.
//!
//! Provides the host wire codec (OKAY/FAIL tokens, hex length prefixes),
//! host request parsing, shell-v2 stream multiplexing, and the error type.

pub mod codec;
pub mod error;
pub mod request;
pub mod shell;

// Re-export commonly used items at crate root.
pub use codec::{
    encode_frame, read_frame, read_request, write_fail, write_frame, write_okay,
    write_okay_payload, FAIL, OKAY,
};
pub use error::{BridgeError, BridgeResult};
pub use request::{parse_request, parse_service_invocation, HostRequest, ServiceInvocation, StreamMode};
