//! Plain-language descriptions of TCP socket states for port queries.

use witr_common::SocketInfo;

use crate::collect::TcpState;

/// Describe the state of a socket on `port`.
pub fn socket_info(port: u16, state: TcpState) -> SocketInfo {
    let (explanation, workaround) = describe(state);
    SocketInfo {
        port,
        state: state.as_str().to_string(),
        explanation: explanation.to_string(),
        workaround: workaround.map(str::to_string),
    }
}

fn describe(state: TcpState) -> (&'static str, Option<&'static str>) {
    match state {
        TcpState::Listen => (
            "The process is actively waiting for incoming connections.",
            None,
        ),
        TcpState::TimeWait => (
            "The local OS is holding the port in a protocol-wait state to ensure all packets are received.",
            Some("Wait for the timeout (usually 60s) or bind with SO_REUSEADDR."),
        ),
        TcpState::CloseWait => (
            "The remote end has closed the connection, but the local application hasn't responded.",
            Some("The application is not closing its socket; restart it or fix its connection handling."),
        ),
        TcpState::Established => ("An active connection is open on this port.", None),
        TcpState::SynSent | TcpState::SynRecv => (
            "A connection handshake is in progress.",
            None,
        ),
        TcpState::FinWait1 | TcpState::FinWait2 | TcpState::Closing | TcpState::LastAck => (
            "The connection is being shut down.",
            Some("This normally clears within seconds; a stuck peer can hold it longer."),
        ),
        TcpState::Close => ("The socket is closed.", None),
        TcpState::Unknown => ("The socket state could not be determined.", None),
    }
}
