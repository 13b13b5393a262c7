/*!
Logging in and out.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Form},
    http::{header, HeaderMap, StatusCode},
    http::header::HeaderValue,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::actions;
use crate::config::Glob;
use crate::policy;
use crate::session::{self, COOKIE_NAME};
use crate::user::SessionUser;
use super::*;

/// Credentials that skip the backend when the development bypass is on.
const DEV_LOGIN: (&str, &str) = ("admin", "admin");

/// Data type to read the form data from a login request.
#[derive(Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for LoginData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LoginData")
            .field("login", &self.login)
            .field("password", &"[ redacted ]")
            .finish()
    }
}

fn login_form(code: StatusCode, login: &str, error: Option<&str>) -> Response {
    serve_page(
        code,
        "login",
        "Connexion",
        None,
        policy::LOGIN_PATH,
        json!({ "login": login, "error": error }),
    )
}

pub async fn login_page() -> Response {
    log::trace!("login_page() called.");
    login_form(StatusCode::OK, "", None)
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("login( {:?} ) called.", &form);

    let login = form.login.trim();
    if login.is_empty() || form.password.is_empty() {
        return login_form(
            StatusCode::UNPROCESSABLE_ENTITY,
            login,
            Some("Login and password are required."),
        );
    }

    let (backend, dev_bypass) = {
        let glob = glob.read().await;
        (glob.backend(), glob.dev_bypass)
    };

    let user = if dev_bypass && (login, form.password.as_str()) == DEV_LOGIN {
        log::warn!("Development bypass login used.");
        SessionUser::development()
    } else {
        let result = actions::login(&*backend, login, &form.password).await;
        let refusal = if result.is_unreachable() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::UNAUTHORIZED
        };
        match result.into_result() {
            Ok(Some(u)) => u,
            Ok(None) => {
                log::error!("actions::login() succeeded with no user.");
                return login_form(StatusCode::UNAUTHORIZED, login, Some(actions::BAD_CREDENTIALS));
            },
            Err(e) => {
                return login_form(refusal, login, Some(&e));
            },
        }
    };

    let landing = policy::landing(user.role());
    log::info!("{:?} logged in (role {:?}).", &user.user_name, user.role_name());

    let (token, lifetime) = {
        let mut glob = glob.write().await;
        match glob.sessions.issue(user, OffsetDateTime::now_utc()) {
            Ok(token) => (token, glob.sessions.lifetime()),
            Err(e) => {
                log::error!("Unable to start session: {}", &e);
                return html_500();
            },
        }
    };

    let cookie = match HeaderValue::from_str(&session::set_cookie(&token, lifetime)) {
        Ok(v) => v,
        Err(e) => {
            log::error!("Unable to build session cookie header: {}", &e);
            return html_500();
        },
    };

    redirect(landing).add_headers(vec![(header::SET_COOKIE, cookie)])
}

pub async fn logout(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    headers: HeaderMap,
) -> Response {
    log::trace!("logout() called.");

    if let Some(token) = session::cookie_value(&headers, COOKIE_NAME) {
        if let Some(u) = glob.write().await.sessions.revoke(token) {
            log::info!("{:?} logged out.", &u.user_name);
        }
    }

    let cleared = HeaderValue::from_str(&session::clear_cookie());
    match cleared {
        Ok(v) => redirect(policy::LOGIN_PATH).add_headers(vec![(header::SET_COOKIE, v)]),
        Err(e) => {
            log::error!("Unable to build cookie-clearing header: {}", &e);
            redirect(policy::LOGIN_PATH)
        },
    }
}
