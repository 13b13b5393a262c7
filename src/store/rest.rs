/*!
The real thing: HTTP to the training-center API.

`ureq` is blocking, so every call is pushed onto tokio's blocking pool.
One attempt per call; no retries and no timeout beyond the agent's own.
*/
use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, BackendError, Method, Reply};

#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: String,
    login_path: String,
    agent: ureq::Agent,
}

impl RestBackend {
    pub fn new(base_url: &str, login_path: &str) -> Self {
        log::trace!("RestBackend::new( {:?}, {:?} ) called.", base_url, login_path);

        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            login_path: login_path.to_owned(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", &self.base_url, path)
    }
}

fn call(
    agent: ureq::Agent,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Reply, BackendError> {
    let req = agent.request(method.as_str(), url)
        .set("Accept", "application/json");

    let res = match body {
        Some(body) => req
            .set("Content-Type", "application/json")
            .send_string(&body.to_string()),
        None => req.call(),
    };

    let response = match res {
        Ok(r) => r,
        // 4xx and 5xx still carry a body worth reading.
        Err(ureq::Error::Status(_, r)) => r,
        Err(ureq::Error::Transport(t)) => {
            return Err(BackendError::from(t.to_string()));
        },
    };

    let status = response.status();
    let body = response.into_string()?;
    Ok(Reply { status, body })
}

#[async_trait]
impl Backend for RestBackend {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Reply, BackendError> {
        log::trace!("RestBackend::send( {}, {:?}, ... ) called.", &method, path);

        let url = self.url(path);
        let agent = self.agent.clone();
        let annotation = format!("{} {}", &method, &url);

        let joined = tokio::task::spawn_blocking(move || {
            call(agent, method, &url, body)
        }).await;

        match joined {
            Ok(Ok(reply)) => {
                log::debug!("{} -> {}", &annotation, reply.status);
                Ok(reply)
            },
            Ok(Err(e)) => Err(e.annotate(&annotation)),
            Err(e) => Err(BackendError::from(format!("request task failed: {}", &e))
                .annotate(&annotation)),
        }
    }

    fn login_path(&self) -> &str { &self.login_path }
}
