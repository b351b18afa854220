pub mod account;
pub mod config;
pub mod request;
pub mod response;

pub use account::{Account, AccountState};
pub use config::GatewayConfig;
pub use request::{ChatType, ContentPart, GenerationRequest, RequestContent};
pub use response::{ErrorBody, GenerationReply, SyncResult, TaskCreatedBody, TaskResultBody};
