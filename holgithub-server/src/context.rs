use std::sync::Arc;

use axum::extract::FromRef;
use holgithub_collab::Collab;

use crate::cookies::SessionCookie;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    pub cookie: SessionCookie,
}
