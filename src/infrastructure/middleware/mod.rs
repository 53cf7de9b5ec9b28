pub mod session_extractor;

pub use session_extractor::{HasIdentity, MaybeSession, Session};
