//! The capability manifest this SDK publishes for certification.

use serde_derive::{Deserialize, Serialize};

/// Capability booleans declared to the certification suite. Routing-mode
/// names use kebab-case on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether the SDK can serve holon-rpc (this one only dials).
    pub holon_rpc_server: bool,
    /// Whether the SDK dials `ws://` carriers.
    pub grpc_dial_ws: bool,
    /// One-to-one routing.
    pub unicast: bool,
    /// One-to-many routing.
    pub fanout: bool,
    /// Broadcast with per-recipient responses.
    #[serde(rename = "broadcast-response")]
    pub broadcast_response: bool,
    /// Unconditional broadcast.
    #[serde(rename = "full-broadcast")]
    pub full_broadcast: bool,
}

/// The static manifest: executable names plus capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Names of executables the SDK ships (none, for this library-only SDK).
    pub executables: Vec<String>,
    /// Declared capabilities.
    pub capabilities: Capabilities,
}

impl Manifest {
    /// The manifest this SDK publishes.
    ///
    /// The client observes every routing mode the server performs, so all
    /// four modes are declared; serving holon-rpc is not.
    pub fn published() -> Self {
        Manifest {
            executables: Vec::new(),
            capabilities: Capabilities {
                holon_rpc_server: false,
                grpc_dial_ws: true,
                unicast: true,
                fanout: true,
                broadcast_response: true,
                full_broadcast: true,
            },
        }
    }
}
