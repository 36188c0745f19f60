//! Shared building blocks for holgithub: the multipart wire format and the
//! messages exchanged by the game endpoints.

mod multipart;
mod protocol;
mod util;

pub use multipart::*;
pub use protocol::*;
pub use util::*;
