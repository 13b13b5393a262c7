/*!
The landing page: one card per section, with a record count for each.

Every role that reaches the dashboard sees every count; a card only links
through to its section when the role may open it.
*/
use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::actions;
use crate::config::Glob;
use crate::model::Resource;
use crate::policy;
use crate::user::SessionUser;
use super::*;

pub async fn dashboard(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    log::trace!("dashboard( {:?} ) called.", &user);

    let backend = glob.read().await.backend();
    let role = user.as_ref().and_then(|u| u.role());

    let sections: Vec<Resource> = policy::NAV_ITEMS.iter()
        .filter_map(|item| Resource::from_page_path(item.href))
        .collect();

    let counts = join_all(
        sections.iter().map(|&res| actions::count(&*backend, res))
    ).await;

    let cards: Vec<Value> = sections.iter()
        .zip(counts)
        .map(|(res, n)| {
            let href = match role {
                Some(r) if r.permits(res.page_path()) => Some(res.page_path()),
                _ => None,
            };
            json!({
                "title": section_label(*res),
                "href": href,
                "blurb": res.blurb(),
                "count": n.data,
                "error": n.error,
            })
        })
        .collect();

    serve_page(
        StatusCode::OK,
        "dashboard",
        "Dashboard",
        user.as_ref(),
        policy::ROOT_PATH,
        json!({ "cards": cards }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::testing::*;
    use axum::http::Method;
    use serial_test::serial;

    use crate::store::memory::MemoryBackend;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[serial]
    async fn counts_for_every_role() {
        ensure_logging();
        let (app, glob) = app_with(Arc::new(MemoryBackend::seeded("/api/utilisateur/login")));

        let cookie = cookie_for(&glob, user("admin")).await;
        let r = send(&app, Method::GET, "/", Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::OK);
        let page = body_text(r).await;
        assert!(page.contains("Trainers registered in the system"));
        assert!(page.contains("Access levels"));
        assert!(page.contains("href=\"/domaines\""));

        // Mid-tier role sees the same counts, but none of them link anywhere.
        let cookie = cookie_for(&glob, user("responsable")).await;
        let r = send(&app, Method::GET, "/", Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::OK);
        let page = body_text(r).await;
        assert!(page.contains("Trainers registered in the system"));
        assert!(page.contains("Access levels"));
        assert!(page.contains("<p class=\"count\">3</p>"));
        assert!(!page.contains("class=\"card stat\" href="));
    }
}
