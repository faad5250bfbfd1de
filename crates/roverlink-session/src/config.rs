/// Where the backend lives and how this rover introduces itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Host name or address of the backend.
    pub server: String,
    pub command_port: u16,
    pub media_port: u16,
    /// Name sent in the command-channel registration.
    pub rover_name: String,
}

impl BackendConfig {
    pub const DEFAULT_COMMAND_PORT: u16 = 8080;
    pub const DEFAULT_MEDIA_PORT: u16 = 8081;
    pub const DEFAULT_ROVER_NAME: &'static str = "ATRover";

    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            command_port: Self::DEFAULT_COMMAND_PORT,
            media_port: Self::DEFAULT_MEDIA_PORT,
            rover_name: Self::DEFAULT_ROVER_NAME.to_string(),
        }
    }

    pub fn command_url(&self) -> String {
        format!("ws://{}:{}/ws", self.server, self.command_port)
    }

    pub fn media_url(&self) -> String {
        format!("ws://{}:{}/ws", self.server, self.media_port)
    }
}
