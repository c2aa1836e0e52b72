use serde::{Deserialize, Serialize};

/// Reason codes carried by directed `Error` wire messages. These travel
/// back to the originating peer only and are never fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorReason {
    InvalidWord,
    NameTaken,
    AlreadyJoined,
    NotAccepting,
}
