/*!
Interoperation between the client (browser) and server.

(Not the console and the backend; that's covered by `actions` and `store`.)

Every page is rendered server-side from the handlebars templates loaded by
[`init`]. Every request first passes through [`gate`], which resolves the
session cookie and applies the route policy.
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    extract::{Extension, OriginalUri},
    http::{Request, StatusCode},
    http::header::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;

use crate::config::Glob;
use crate::model::{Domaine, Employeur, Formateur, Formation, Participant, Profil,
    Resource, RoleRecord, Structure, Utilisateur};
use crate::policy::{self, Verdict};
use crate::session::{self, COOKIE_NAME};
use crate::user::SessionUser;

pub mod auth;
pub mod crud;
pub mod dashboard;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>tcm | Error</title>
<link rel="stylesheet" href="/static/tcm.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/**
Initializes the resources used in this module. This function should be called
before any functionality of this module or any of its submodules is used.

Currently the only thing that happens here is loading the templates used by
`serve_template()`, which will serve a bare 500 page until `init()` has been
called.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    let mut dir_opts = handlebars::DirectorySourceOptions::default();
    dir_opts.tpl_extension = String::from(".html");
    h.register_templates_directory(template_dir, dir_opts)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    let templates = match TEMPLATES.get() {
        Some(t) => t,
        None => {
            log::error!("serve_template( {:?} ) called before inter::init().", template_name);
            return html_500();
        },
    };

    match templates.render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// Menu label of the section holding `res` ("Formateurs").
pub fn section_label(res: Resource) -> &'static str {
    policy::NAV_ITEMS.iter()
        .find(|item| item.href == res.page_path())
        .map(|item| item.label)
        .unwrap_or_else(|| res.title())
}

/// Whether nav entry `href` should be highlighted while showing `current`.
fn is_active(href: &str, current: &str) -> bool {
    if href == policy::ROOT_PATH {
        return current == policy::ROOT_PATH;
    }
    match current.strip_prefix(href) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/**
Render `template` inside the console chrome: page title, who's logged in,
and the navigation menu for their role.

`data` must be a JSON object; the chrome keys are added to it.
*/
pub fn serve_page(
    code: StatusCode,
    template: &str,
    title: &str,
    user: Option<&SessionUser>,
    current_path: &str,
    data: Value,
) -> Response {
    let mut data = match data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        x => {
            log::error!("serve_page( {:?} ) given non-object data: {:?}", template, &x);
            return html_500();
        },
    };

    let nav: Vec<Value> = match user {
        Some(u) => policy::nav_items(u.role_name())
            .into_iter()
            .map(|item| json!({
                "label": item.label,
                "href": item.href,
                "active": is_active(item.href, current_path),
            }))
            .collect(),
        None => Vec::new(),
    };

    data.insert("title".to_owned(), json!(title));
    data.insert("user".to_owned(), json!(user));
    data.insert("nav".to_owned(), Value::Array(nav));

    serve_template(code, template, &Value::Object(data), vec![])
}

/// The "something went wrong talking to the backend" page.
pub fn respond_backend_error(user: Option<&SessionUser>, current_path: &str, msg: &str) -> Response {
    log::trace!("respond_backend_error( {:?} ) called.", msg);

    serve_page(
        StatusCode::BAD_GATEWAY,
        "error",
        "Error",
        user,
        current_path,
        json!({ "message": msg }),
    )
}

pub fn respond_not_found(user: Option<&SessionUser>, current_path: &str) -> Response {
    log::trace!("respond_not_found( {:?} ) called.", current_path);

    serve_page(
        StatusCode::NOT_FOUND,
        "not_found",
        "Not found",
        user,
        current_path,
        json!({ "path": current_path }),
    )
}

/// Fallback for every path no route claims.
pub async fn not_found(
    user: Option<Extension<SessionUser>>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let user = user.map(|Extension(u)| u);
    respond_not_found(user.as_ref(), uri.path())
}

/// See-other redirect, for after a form post.
pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/**
Middleware that resolves the session and applies the route policy.

A live session gets inserted into the request as an
`Extension<SessionUser>` for the handlers downstream. Missing, forged or
expired cookies all just mean "no session".
*/
pub async fn gate<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let path = req.uri().path().to_owned();

    let glob: Arc<RwLock<Glob>> = match req.extensions().get::<Arc<RwLock<Glob>>>() {
        Some(glob) => glob.clone(),
        None => {
            log::error!("gate(): no global state in request extensions.");
            return html_500();
        },
    };

    let token = session::cookie_value(req.headers(), COOKIE_NAME).map(str::to_owned);
    let user = match token {
        Some(token) => glob.write().await.sessions.lookup(&token, OffsetDateTime::now_utc()),
        None => None,
    };

    match policy::decide(&path, user.as_ref()) {
        Verdict::Proceed => {
            if let Some(u) = user {
                req.extensions_mut().insert(u);
            }
            next.run(req).await
        },
        Verdict::Redirect(to) => {
            log::debug!(
                "gate(): {:?} (role {:?}) redirected to {:?}",
                &path, user.as_ref().and_then(|u| u.role_name()), to
            );
            Redirect::temporary(to).into_response()
        },
    }
}

async fn favicon() -> StatusCode { StatusCode::NO_CONTENT }

/// The whole console, wired to the given global state.
pub fn router<P: AsRef<Path>>(glob: Arc<RwLock<Glob>>, static_dir: P) -> Router {
    Router::new()
        .route("/", get(dashboard::dashboard))
        .route(policy::LOGIN_PATH, get(auth::login_page).post(auth::login))
        .route(policy::LOGOUT_PATH, get(auth::logout).post(auth::logout))
        .merge(crud::routes::<Formateur>())
        .merge(crud::routes::<Participant>())
        .merge(crud::routes::<Formation>())
        .merge(crud::routes::<Domaine>())
        .merge(crud::routes::<Structure>())
        .merge(crud::routes::<Employeur>())
        .merge(crud::routes::<Profil>())
        .merge(crud::routes::<Utilisateur>())
        .merge(crud::routes::<RoleRecord>())
        .route("/favicon.ico", get(favicon))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .fallback(not_found)
        .layer(middleware::from_fn(gate))
        .layer(Extension(glob))
}

#[cfg(test)]
pub(crate) mod testing {
    /*!
    Helpers for driving the real router in tests.
    */
    use super::*;

    use axum::body::Body;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    use crate::config::Cfg;
    use crate::store::Backend;

    pub fn app_with(backend: Arc<dyn Backend>) -> (Router, Arc<RwLock<Glob>>) {
        if let Err(e) = init("templates/") {
            panic!("{}", &e);
        }
        let cfg = Cfg { dev_bypass: true, ..Cfg::default() };
        let glob = Arc::new(RwLock::new(Glob::new(backend, &cfg)));
        (router(glob.clone(), "static/"), glob)
    }

    /// Session cookie header value for a fresh session as `user`.
    pub async fn cookie_for(glob: &Arc<RwLock<Glob>>, user: SessionUser) -> String {
        let token = glob.write().await.sessions.issue(user, OffsetDateTime::now_utc()).unwrap();
        format!("{}={}", COOKIE_NAME, token)
    }

    pub fn user(role: &str) -> SessionUser {
        SessionUser {
            user_id: "1".to_owned(),
            role: Some(role.to_owned()),
            user_name: format!("{}-user", role),
        }
    }

    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        form: Option<&str>,
    ) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let body = match form {
            Some(f) => {
                req = req.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(f.to_owned())
            },
            None => Body::empty(),
        };
        app.clone().oneshot(req.body(body).unwrap()).await.unwrap()
    }

    pub fn location(r: &Response) -> &str {
        r.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    pub async fn body_text(r: Response) -> String {
        let bytes = hyper::body::to_bytes(r.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
