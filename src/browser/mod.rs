pub mod auth;
mod cdp_client;
mod chrome_page;
pub mod driver;

pub use auth::{Authenticator, SessionRestorer};
pub use cdp_client::CdpClient;
pub use chrome_page::ChromePage;
pub use driver::{PageDriver, RawEvaluation, SessionCookie, SessionState};
