/*!
Backend interaction module.

All data lives behind the training-center REST API. The rest of the crate
talks to it only through the [`Backend`] trait, so the transport can be
swapped: [`rest::RestBackend`] for the real API, [`memory::MemoryBackend`]
for demos and tests.

The API exposes one collection per entity (`/api/formateur`,
`/api/participant`, ...) with the usual verbs:

```text
GET    /api/<res>          list
GET    /api/<res>/<id>     fetch one
POST   /api/<res>          create (JSON body)
PUT    /api/<res>          update (JSON body carrying "id")
DELETE /api/<res>/<id>     delete
```

plus a credential-check endpoint that takes `{login, password}` and
answers with the user record, role included.
*/
use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

pub mod memory;
pub mod rest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get    => "GET",
            Method::Post   => "POST",
            Method::Put    => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What came back from the backend, whatever the status.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: String) -> Self { Self { status, body } }

    pub fn json(status: u16, body: &Value) -> Self {
        Self { status, body: body.to_string() }
    }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Failure to get any reply at all.
#[derive(Debug, PartialEq)]
pub struct BackendError(String);

impl BackendError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> BackendError { BackendError(s) }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> BackendError { BackendError(s.to_owned()) }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> BackendError {
        BackendError(format!("I/O error: {}", &e))
    }
}

/**
A transport to the training-center API.

`path` is always absolute from the API root (`/api/domaine/3`). A non-2xx
status is a perfectly good [`Reply`]; `Err` means nothing came back.
*/
#[async_trait]
pub trait Backend: Debug + Send + Sync {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Reply, BackendError>;

    /// Path of the credential-check endpoint.
    fn login_path(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_status() {
        assert!(Reply::new(200, String::new()).is_success());
        assert!(Reply::new(204, String::new()).is_success());
        assert!(!Reply::new(302, String::new()).is_success());
        assert!(!Reply::new(404, String::new()).is_success());
    }

    #[test]
    fn annotated_errors() {
        let e = BackendError::from("connection refused")
            .annotate("GET /api/role");
        assert_eq!(e.display(), "GET /api/role: connection refused");
    }
}
