use crate::error::log_error;
use actix_identity::{Identity, IdentityExt};
use actix_session::{Session, SessionExt};
use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use log::debug;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

const FLASH_KEY: &str = "flash";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Flash {
    pub message: String,
    pub category: String,
}

/// Per-request view of the signed session cookie: who is logged in, plus a
/// flash message that survives exactly one read.
pub struct UserSession {
    request: HttpRequest,
    session: Session,
}

impl FromRequest for UserSession {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(UserSession {
            request: req.clone(),
            session: req.get_session(),
        }))
    }
}

impl UserSession {
    pub fn user(&self) -> Option<String> {
        self.request
            .get_identity()
            .ok()
            .and_then(|identity| identity.id().ok())
    }

    pub fn login(&self, username: &str) -> actix_web::Result<()> {
        Identity::login(&self.request.extensions(), username.to_owned())
            .map_err(|err| log_error(err, "Session error"))?;
        Ok(())
    }

    /// Drops the identity and everything else stored in the session.
    pub fn logout(&self) {
        if let Ok(identity) = self.request.get_identity() {
            identity.logout();
        }
        self.session.clear();
    }

    pub fn flash(&self, message: impl Into<String>, category: &str) {
        let flash = Flash {
            message: message.into(),
            category: category.to_owned(),
        };
        if let Err(err) = self.session.insert(FLASH_KEY, flash) {
            debug!("{:?}", err);
        }
    }

    pub fn take_flash(&self) -> Option<Flash> {
        match self.session.remove_as::<Flash>(FLASH_KEY)? {
            Ok(flash) => Some(flash),
            Err(raw) => {
                debug!("Discarding malformed flash: {}", raw);
                None
            }
        }
    }
}
