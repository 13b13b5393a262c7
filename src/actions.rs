/*!
Server actions: the calls screens make to the backend.

Each action sends one request through a [`Backend`] and folds whatever
comes back (good reply, error status, or no reply at all) into an
[`ActionResult`]. Nothing here returns `Err`; a failed action carries a
message fit to show the user.
*/
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::{de_id, Entity, Resource};
use crate::store::{Backend, BackendError, Method, Reply};
use crate::user::SessionUser;

/// Shown when the backend can't be reached at all.
pub const UNREACHABLE: &str = "Unable to reach the server.";
pub const BAD_CREDENTIALS: &str = "Invalid login or password.";
pub const BAD_ID: &str = "Invalid identifier.";

/// Why an action failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The backend answered, and said no.
    Refused,
    /// No answer at all.
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<Failure>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, failure: None }
    }

    /// Success with nothing to show for it (a 404 on fetch, an empty 204).
    pub fn empty() -> Self {
        Self { success: true, data: None, error: None, failure: None }
    }

    pub fn fail<S: Into<String>>(msg: S) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            failure: Some(Failure::Refused),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            success: false,
            data: None,
            error: Some(UNREACHABLE.to_owned()),
            failure: Some(Failure::Unreachable),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.failure == Some(Failure::Unreachable)
    }

    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

/// An id is spliced into a URL path, so it has to be a single segment.
pub fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.chars().any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
}

/**
Pull a human-readable message out of an error body.

Looks at `message`, then `error`, then accepts a body that is just a
JSON string.
*/
pub fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;

    for key in ["message", "error"] {
        if let Some(Value::String(s)) = v.get(key) {
            if !s.trim().is_empty() {
                return Some(s.clone());
            }
        }
    }

    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

async fn exchange(
    backend: &dyn Backend,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<Reply, BackendError> {
    match backend.send(method, path, body).await {
        Ok(reply) => {
            log::debug!("{} {} -> {}", &method, path, reply.status);
            Ok(reply)
        },
        Err(e) => {
            let e = e.annotate(&format!("{} {}", &method, path));
            log::error!("Backend unreachable: {}", &e);
            Err(e)
        },
    }
}

fn failure(reply: &Reply, op: &str, resource: Resource) -> String {
    let msg = error_message(&reply.body)
        .unwrap_or_else(|| format!("Unable to {} {}.", op, resource));
    log::error!("Backend refused to {} {}: status {}: {}", op, resource, reply.status, &msg);
    msg
}

/// Deserialize a 2xx body, treating an empty body as no data.
fn parse_body<T: DeserializeOwned>(
    reply: &Reply,
    op: &str,
    resource: Resource,
) -> ActionResult<T> {
    if reply.body.trim().is_empty() {
        return ActionResult::empty();
    }
    match serde_json::from_str(&reply.body) {
        Ok(data) => ActionResult::ok(data),
        Err(e) => {
            log::error!(
                "Unable to deserialize {} reply {:?}: {}",
                resource, &reply.body, &e
            );
            ActionResult::fail(format!("Unable to {} {}.", op, resource))
        },
    }
}

pub async fn list<E: Entity>(backend: &dyn Backend) -> ActionResult<Vec<E>> {
    let res = E::RESOURCE;
    log::trace!("actions::list::<{}>() called.", res);

    let reply = match exchange(backend, Method::Get, &res.api_path(), None).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "fetch", res));
    }

    match parse_body::<Vec<E>>(&reply, "fetch", res) {
        ActionResult { success: true, data: None, .. } => ActionResult::ok(Vec::new()),
        x => x,
    }
}

/// Fetch one record. A 404 is a success with no data.
pub async fn get<E: Entity>(backend: &dyn Backend, id: &str) -> ActionResult<E> {
    let res = E::RESOURCE;
    log::trace!("actions::get::<{}>( {:?} ) called.", res, id);

    if !valid_id(id) {
        return ActionResult::fail(BAD_ID);
    }

    let path = format!("{}/{}", res.api_path(), id);
    let reply = match exchange(backend, Method::Get, &path, None).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if reply.status == 404 {
        return ActionResult::empty();
    }
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "fetch", res));
    }

    parse_body(&reply, "fetch", res)
}

pub async fn create<E: Entity>(backend: &dyn Backend, payload: Value) -> ActionResult<E> {
    let res = E::RESOURCE;
    log::trace!("actions::create::<{}>( {:?} ) called.", res, &payload);

    let reply = match exchange(backend, Method::Post, &res.api_path(), Some(payload)).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "create", res));
    }

    // The write went through; an odd-looking echo doesn't undo that.
    match parse_body(&reply, "create", res) {
        ActionResult { success: false, .. } => ActionResult::empty(),
        x => x,
    }
}

/// Update record `id`. The backend wants the id in the body, not the path.
pub async fn update<E: Entity>(
    backend: &dyn Backend,
    id: &str,
    payload: Value,
) -> ActionResult<E> {
    let res = E::RESOURCE;
    log::trace!("actions::update::<{}>( {:?}, {:?} ) called.", res, id, &payload);

    if !valid_id(id) {
        return ActionResult::fail(BAD_ID);
    }

    let mut payload = payload;
    match payload.as_object_mut() {
        Some(obj) => { obj.insert("id".to_owned(), Value::String(id.to_owned())); },
        None => {
            log::error!("Update payload for {} is not an object: {:?}", res, &payload);
            return ActionResult::fail(format!("Unable to update {}.", res));
        },
    }

    let reply = match exchange(backend, Method::Put, &res.api_path(), Some(payload)).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "update", res));
    }

    match parse_body(&reply, "update", res) {
        ActionResult { success: false, .. } => ActionResult::empty(),
        x => x,
    }
}

pub async fn delete(backend: &dyn Backend, res: Resource, id: &str) -> ActionResult<()> {
    log::trace!("actions::delete( {}, {:?} ) called.", res, id);

    if !valid_id(id) {
        return ActionResult::fail(BAD_ID);
    }

    let path = format!("{}/{}", res.api_path(), id);
    let reply = match exchange(backend, Method::Delete, &path, None).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "delete", res));
    }

    ActionResult::ok(())
}

/// How many records the backend holds for `res`.
pub async fn count(backend: &dyn Backend, res: Resource) -> ActionResult<usize> {
    log::trace!("actions::count( {} ) called.", res);

    let reply = match exchange(backend, Method::Get, &res.api_path(), None).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };
    if !reply.is_success() {
        return ActionResult::fail(failure(&reply, "count", res));
    }

    match serde_json::from_str::<Vec<Value>>(&reply.body) {
        Ok(records) => ActionResult::ok(records.len()),
        Err(e) => {
            log::error!("{} list is not a JSON array: {}", res, &e);
            ActionResult::fail(format!("Unable to count {}.", res))
        },
    }
}

#[derive(Deserialize)]
struct LoginReply {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default)]
    role: Option<Value>,
}

/// The role label, whether the backend nests it (`{"nom": ...}`) or not.
fn role_label(role: &Value) -> Option<String> {
    match role {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("nom")
            .or_else(|| obj.get("libelle"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

/// Check credentials against the backend's login endpoint.
pub async fn login(
    backend: &dyn Backend,
    login: &str,
    password: &str,
) -> ActionResult<SessionUser> {
    log::trace!("actions::login( {:?}, [ password ] ) called.", login);

    let body = json!({ "login": login, "password": password });
    let reply = match exchange(backend, Method::Post, backend.login_path(), Some(body)).await {
        Ok(reply) => reply,
        Err(_) => { return ActionResult::unreachable(); },
    };

    if !reply.is_success() {
        let msg = match reply.status {
            400 | 401 | 403 | 404 => error_message(&reply.body)
                .unwrap_or_else(|| BAD_CREDENTIALS.to_owned()),
            _ => error_message(&reply.body)
                .unwrap_or_else(|| "Unable to log in.".to_owned()),
        };
        log::debug!("Login for {:?} refused ({}): {}", login, reply.status, &msg);
        return ActionResult::fail(msg);
    }

    let lr: LoginReply = match serde_json::from_str(&reply.body) {
        Ok(lr) => lr,
        Err(e) => {
            log::error!("Unable to deserialize login reply {:?}: {}", &reply.body, &e);
            return ActionResult::fail(BAD_CREDENTIALS);
        },
    };

    ActionResult::ok(SessionUser {
        user_id: lr.id,
        role: lr.role.as_ref().and_then(role_label),
        user_name: login.to_owned(),
    })
}
