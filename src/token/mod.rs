pub mod cache;
pub mod pool;

pub use cache::TokenCache;
pub use pool::AccountPool;
