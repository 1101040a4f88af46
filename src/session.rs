use crate::error::AppError;
use actix_identity::{Identity, IdentityExt};
use actix_session::{storage::CookieSessionStore, Session, SessionMiddleware};
use actix_web::{cookie::Key, dev::Payload, FromRequest, HttpMessage, HttpRequest};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

pub const SESSION_COOKIE: &str = "auth-cookie";
const FLASHES: &str = "_flashes";

pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_owned())
        .cookie_secure(secure)
        .build()
}

/// The identity behind the current request.
#[derive(Debug, Clone, Default)]
pub struct Visitor {
    username: Option<String>,
}

impl Visitor {
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The logged-in username, or an auth error asking the visitor to log in.
    pub fn require(&self) -> Result<&str, AppError> {
        self.username()
            .ok_or_else(|| AppError::Auth("Please log in.".to_owned()))
    }

    pub fn login(req: &HttpRequest, username: &str) -> Result<(), AppError> {
        Identity::login(&req.extensions(), username.to_owned())
            .map_err(|err| AppError::Session(err.to_string()))?;
        Ok(())
    }

    pub fn logout(req: &HttpRequest) {
        if let Ok(identity) = req.get_identity() {
            identity.logout();
        }
    }
}

impl FromRequest for Visitor {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let username = req.get_identity().ok().and_then(|identity| identity.id().ok());
        ready(Ok(Visitor { username }))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

/// Queues a message for the next rendered page.
pub fn flash(session: &Session, level: Level, message: impl Into<String>) -> Result<(), AppError> {
    let mut flashes = session
        .get::<Vec<Flash>>(FLASHES)
        .map_err(|err| AppError::Session(err.to_string()))?
        .unwrap_or_default();
    flashes.push(Flash {
        level,
        message: message.into(),
    });
    session
        .insert(FLASHES, flashes)
        .map_err(|err| AppError::Session(err.to_string()))
}

pub fn take_flashes(session: &Session) -> Vec<Flash> {
    match session.remove_as::<Vec<Flash>>(FLASHES) {
        Some(Ok(flashes)) => flashes,
        Some(Err(raw)) => {
            log::debug!("Dropping unreadable flash messages: {}", raw);
            Vec::new()
        }
        None => Vec::new(),
    }
}
