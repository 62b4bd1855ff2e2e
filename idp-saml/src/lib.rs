pub mod codec;
pub mod schema;

mod provider;
mod session;

pub use provider::{IdentityProvider, MockIdentityProvider};
pub use session::Session;
