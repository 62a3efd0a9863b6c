pub mod auth;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use auth::{Authenticator, BasicAuth, Credential, DigestAuth};
pub use error::{Result, RtspError};
pub use media::mjpeg::JpegPayloadizer;
pub use media::{Frame, Payloadizer};
pub use server::{Server, ServerConfig};
pub use session::{FeedReport, SessionInfo, SessionManager, SessionState, TimeoutReport};
