use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How often a hosting process refreshes its session advertisement.
    pub advert_heartbeat: Duration,
    /// Advertisements older than this are treated as "no live host".
    pub advert_expiry: Duration,
    /// Bind address for the socket medium's host listener.
    pub listen_addr: String,
    /// How long a joining process waits for the host's handshake reply.
    pub join_timeout: Duration,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self {
            advert_heartbeat: Duration::from_secs(
                env::var("ADVERT_HEARTBEAT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("Invalid ADVERT_HEARTBEAT_SECONDS"),
            ),
            advert_expiry: Duration::from_secs(
                env::var("ADVERT_EXPIRY_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .expect("Invalid ADVERT_EXPIRY_SECONDS"),
            ),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:0".to_string()),
            join_timeout: Duration::from_secs(
                env::var("JOIN_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("Invalid JOIN_TIMEOUT_SECONDS"),
            ),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}
