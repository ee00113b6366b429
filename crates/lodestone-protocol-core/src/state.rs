/// The state of a protocol connection, from the client's side.
///
/// Transitions only move forward (handshake packet, login-success,
/// finish-configuration) except that the server may send the client
/// back from Play to Configuration with a start-configuration packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Login,
    Configuration,
    Play,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Login => "login",
            ConnectionState::Configuration => "configuration",
            ConnectionState::Play => "play",
        };
        f.write_str(name)
    }
}
