/*!
Server-side session table.

The browser only ever holds an opaque token in the `tcm_session` cookie;
who the user is and what role they have is looked up here on every
request.
*/
use std::collections::HashMap;

use axum::http::header::{self, HeaderMap};
use rand::{Rng, distributions::Alphanumeric};
use time::{Duration, OffsetDateTime};

use crate::user::SessionUser;

pub const COOKIE_NAME: &str = "tcm_session";
const TOKEN_LENGTH: usize = 32;

#[derive(Debug)]
struct Entry {
    user: SessionUser,
    expires: OffsetDateTime,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<String, Entry>,
    lifetime: Duration,
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        log::trace!("SessionStore::new( {:?} ) called.", &lifetime);

        Self { sessions: HashMap::new(), lifetime }
    }

    pub fn lifetime(&self) -> Duration { self.lifetime }

    /// Start a session for `user`, returning its token.
    pub fn issue(&mut self, user: SessionUser, now: OffsetDateTime) -> Result<String, String> {
        log::trace!("SessionStore::issue( {:?} ) called.", &user);

        let mut token = generate_token();
        while self.sessions.contains_key(&token) {
            token = generate_token();
        }

        let expires = now.checked_add(self.lifetime)
            .ok_or_else(|| format!(
                "Session lifetime {} overflows the calendar from {}.",
                &self.lifetime, &now
            ))?;
        self.sessions.insert(token.clone(), Entry { user, expires });
        Ok(token)
    }

    /// The session for `token`, if it exists and hasn't expired.
    ///
    /// Expired sessions are dropped as they're found.
    pub fn lookup(&mut self, token: &str, now: OffsetDateTime) -> Option<SessionUser> {
        let expired = match self.sessions.get(token) {
            None => { return None; },
            Some(entry) => entry.expires <= now,
        };

        if expired {
            log::debug!("Session for token expired; removing.");
            self.sessions.remove(token);
            return None;
        }

        self.sessions.get(token).map(|e| e.user.clone())
    }

    pub fn revoke(&mut self, token: &str) -> Option<SessionUser> {
        log::trace!("SessionStore::revoke( [ token ] ) called.");
        self.sessions.remove(token).map(|e| e.user)
    }

    /// Drop every expired session; returns how many went.
    pub fn purge(&mut self, now: OffsetDateTime) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, e| e.expires > now);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize { self.sessions.len() }

    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }
}

/**
Value of cookie `name` from the request headers.

Unparseable headers and malformed pairs are skipped rather than treated
as errors.
*/
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

pub fn set_cookie(token: &str, lifetime: Duration) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        COOKIE_NAME, token, lifetime.whole_seconds()
    )
}

pub fn clear_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", COOKIE_NAME)
}
