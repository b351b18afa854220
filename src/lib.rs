pub mod constants;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod session;
pub mod token;
pub mod upstream;

mod test_utils;
#[cfg(test)]
mod tests;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, ProcessExit, Reauthenticator, ShutdownHook};
pub use models::{
    ChatType, ContentPart, GatewayConfig, GenerationReply, GenerationRequest, RequestContent,
};
pub use session::{SessionBackend, SessionFactory, SessionHandle};
