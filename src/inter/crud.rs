/*!
The five screens every entity gets: list, detail, new, edit and delete.

All of it is generic over [`Entity`]; [`routes`] mounts the lot under the
entity's page path.
*/
use std::cmp::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Extension, Form, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::actions::{self, valid_id};
use crate::config::Glob;
use crate::model::{pair_value, Entity, EntityForm, Field, FieldErrors, Resource};
use crate::store::Backend;
use crate::user::SessionUser;
use super::*;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub notice: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir {
    Asc,
    Desc,
}

impl Dir {
    fn parse(s: Option<&str>) -> Dir {
        match s {
            Some("desc") => Dir::Desc,
            _ => Dir::Asc,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Dir::Asc => "asc",
            Dir::Desc => "desc",
        }
    }

    fn flip(&self) -> Dir {
        match self {
            Dir::Asc => Dir::Desc,
            Dir::Desc => Dir::Asc,
        }
    }
}

/// Percent-encode a query-string component.
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            },
            _ => { out.push_str(&format!("%{:02X}", b)); },
        }
    }
    out
}

/// Toast text for a `?notice=` value.
fn notice_text(res: Resource, notice: Option<&str>) -> Option<String> {
    let verb = match notice? {
        "created" => "created",
        "updated" => "updated",
        "deleted" => "deleted",
        _ => { return None; },
    };
    Some(format!("{} {}.", res.title(), verb))
}

/// Compare two cells, numerically when both look like numbers.
fn compare_cells(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.to_lowercase().cmp(&b.to_lowercase())
}

/**
The rows of a list screen: `(id, cells)` for every record matching the
search term, in the requested order.
*/
fn table_rows<E: Entity>(
    records: &[E],
    q: &str,
    sort: Option<usize>,
    dir: Dir,
) -> Vec<(String, Vec<String>)> {
    let needle = q.trim().to_lowercase();
    let mut rows: Vec<(String, Vec<String>)> = records.iter()
        .map(|r| (r.id().to_owned(), r.cells()))
        .filter(|(_, cells)| {
            needle.is_empty() || cells.iter().any(|c| c.to_lowercase().contains(&needle))
        })
        .collect();

    if let Some(n) = sort {
        rows.sort_by(|(_, a), (_, b)| {
            let ord = compare_cells(
                a.get(n).map(String::as_str).unwrap_or_default(),
                b.get(n).map(String::as_str).unwrap_or_default(),
            );
            match dir {
                Dir::Asc => ord,
                Dir::Desc => ord.reverse(),
            }
        });
    }

    rows
}

async fn list<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    let base = res.page_path();
    log::trace!("crud::list::<{}>( {:?} ) called.", res, &query);

    let backend = glob.read().await.backend();
    let records = match actions::list::<E>(&*backend).await.into_result() {
        Ok(records) => records.unwrap_or_default(),
        Err(e) => { return respond_backend_error(user.as_ref(), base, &e); },
    };

    let q = query.q.as_deref().unwrap_or_default().trim().to_owned();
    let sort = query.sort.as_deref()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n < E::columns().len());
    let dir = Dir::parse(query.dir.as_deref());

    let q_part = if q.is_empty() {
        String::new()
    } else {
        format!("&q={}", encode(&q))
    };

    let columns: Vec<Value> = E::columns().iter()
        .enumerate()
        .map(|(n, label)| {
            let (next, arrow) = match sort {
                Some(s) if s == n => (dir.flip(), if dir == Dir::Asc { "▲" } else { "▼" }),
                _ => (Dir::Asc, ""),
            };
            json!({
                "label": label,
                "href": format!("{}?sort={}&dir={}{}", base, n, next.as_str(), &q_part),
                "arrow": arrow,
            })
        })
        .collect();

    let rows: Vec<Value> = table_rows(&records, &q, sort, dir)
        .into_iter()
        .map(|(id, cells)| json!({
            "href": format!("{}/{}", base, encode(&id)),
            "id": id,
            "cells": cells,
        }))
        .collect();

    let data = json!({
        "resource": res.title(),
        "heading": section_label(res),
        "base": base,
        "columns": columns,
        "shown": rows.len(),
        "total": records.len(),
        "rows": rows,
        "q": &q,
        "notice": notice_text(res, query.notice.as_deref()),
    });

    serve_page(StatusCode::OK, "list", section_label(res), user.as_ref(), base, data)
}

async fn detail<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    let here = format!("{}/{}", res.page_path(), &id);
    log::trace!("crud::detail::<{}>( {:?} ) called.", res, &id);

    if !valid_id(&id) {
        return respond_not_found(user.as_ref(), &here);
    }

    let backend = glob.read().await.backend();
    let record = match actions::get::<E>(&*backend, &id).await.into_result() {
        Ok(Some(record)) => record,
        Ok(None) => { return respond_not_found(user.as_ref(), &here); },
        Err(e) => { return respond_backend_error(user.as_ref(), &here, &e); },
    };

    let details: Vec<Value> = record.details()
        .into_iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let data = json!({
        "resource": res.title(),
        "base": res.page_path(),
        "here": &here,
        "label": record.label(),
        "details": details,
        "notice": notice_text(res, query.notice.as_deref()),
    });

    serve_page(StatusCode::OK, "detail", &record.label(), user.as_ref(), &here, data)
}

/// What a form screen is doing, and where it posts.
enum Purpose<'a> {
    Create,
    Edit(&'a str),
}

async fn serve_form<E: Entity>(
    code: StatusCode,
    backend: &dyn Backend,
    user: Option<&SessionUser>,
    purpose: Purpose<'_>,
    form: &E::Form,
    errors: &FieldErrors,
    error: Option<&str>,
) -> Response {
    let res = E::RESOURCE;
    let choices = <E::Form as EntityForm>::choices(backend).await;
    let fields: Vec<Field> = form.fields()
        .into_iter()
        .map(|f| f.resolve(&choices, errors))
        .collect();

    let (heading, action, cancel) = match purpose {
        Purpose::Create => (
            format!("New {}", res.title()),
            format!("{}/new", res.page_path()),
            res.page_path().to_owned(),
        ),
        Purpose::Edit(id) => (
            format!("Edit {}", res.title()),
            format!("{}/{}/edit", res.page_path(), id),
            format!("{}/{}", res.page_path(), id),
        ),
    };

    let data = json!({
        "resource": res.title(),
        "heading": &heading,
        "action": &action,
        "cancel": cancel,
        "fields": fields,
        "error": error,
    });

    serve_page(code, "form", &heading, user, &action, data)
}

async fn new_form<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    log::trace!("crud::new_form::<{}>() called.", E::RESOURCE);

    let backend = glob.read().await.backend();
    serve_form::<E>(
        StatusCode::OK, &*backend, user.as_ref(), Purpose::Create,
        &E::Form::default(), &FieldErrors::new(), None,
    ).await
}

async fn create<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    log::trace!("crud::create::<{}>() called.", res);

    let backend = glob.read().await.backend();
    let form = E::Form::from_pairs(&pairs);

    let payload = match form.validate() {
        Ok(payload) => payload,
        Err(errors) => {
            log::debug!("{} form rejected: {:?}", res, &errors);
            return serve_form::<E>(
                StatusCode::UNPROCESSABLE_ENTITY, &*backend, user.as_ref(),
                Purpose::Create, &form, &errors, None,
            ).await;
        },
    };

    match actions::create::<E>(&*backend, payload).await.into_result() {
        Ok(_) => redirect(&format!("{}?notice=created", res.page_path())),
        Err(e) => serve_form::<E>(
            StatusCode::BAD_GATEWAY, &*backend, user.as_ref(),
            Purpose::Create, &form, &FieldErrors::new(), Some(&e),
        ).await,
    }
}

async fn edit_form<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Path(id): Path<String>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    let here = format!("{}/{}/edit", res.page_path(), &id);
    log::trace!("crud::edit_form::<{}>( {:?} ) called.", res, &id);

    if !valid_id(&id) {
        return respond_not_found(user.as_ref(), &here);
    }

    let backend = glob.read().await.backend();
    let record = match actions::get::<E>(&*backend, &id).await.into_result() {
        Ok(Some(record)) => record,
        Ok(None) => { return respond_not_found(user.as_ref(), &here); },
        Err(e) => { return respond_backend_error(user.as_ref(), &here, &e); },
    };

    serve_form::<E>(
        StatusCode::OK, &*backend, user.as_ref(), Purpose::Edit(&id),
        &E::Form::from_entity(&record), &FieldErrors::new(), None,
    ).await
}

async fn update<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Path(id): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    log::trace!("crud::update::<{}>( {:?} ) called.", res, &id);

    if !valid_id(&id) {
        return respond_not_found(user.as_ref(), &format!("{}/{}/edit", res.page_path(), &id));
    }

    let backend = glob.read().await.backend();
    let form = E::Form::from_pairs(&pairs);

    let payload = match form.validate() {
        Ok(payload) => payload,
        Err(errors) => {
            log::debug!("{} form rejected: {:?}", res, &errors);
            return serve_form::<E>(
                StatusCode::UNPROCESSABLE_ENTITY, &*backend, user.as_ref(),
                Purpose::Edit(&id), &form, &errors, None,
            ).await;
        },
    };

    match actions::update::<E>(&*backend, &id, payload).await.into_result() {
        Ok(_) => redirect(&format!("{}/{}?notice=updated", res.page_path(), encode(&id))),
        Err(e) => serve_form::<E>(
            StatusCode::BAD_GATEWAY, &*backend, user.as_ref(),
            Purpose::Edit(&id), &form, &FieldErrors::new(), Some(&e),
        ).await,
    }
}

fn serve_confirm<E: Entity>(
    code: StatusCode,
    user: Option<&SessionUser>,
    record: &E,
    error: Option<&str>,
) -> Response {
    let res = E::RESOURCE;
    let here = format!("{}/{}/delete", res.page_path(), record.id());

    let data = json!({
        "resource": res.title(),
        "id": record.id(),
        "label": record.label(),
        "action": &here,
        "cancel": format!("{}/{}", res.page_path(), record.id()),
        "error": error,
    });

    serve_page(code, "confirm_delete", &format!("Delete {}", res.title()), user, &here, data)
}

async fn confirm_delete<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Path(id): Path<String>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    let here = format!("{}/{}/delete", res.page_path(), &id);
    log::trace!("crud::confirm_delete::<{}>( {:?} ) called.", res, &id);

    if !valid_id(&id) {
        return respond_not_found(user.as_ref(), &here);
    }

    let backend = glob.read().await.backend();
    match actions::get::<E>(&*backend, &id).await.into_result() {
        Ok(Some(record)) => serve_confirm(StatusCode::OK, user.as_ref(), &record, None),
        Ok(None) => respond_not_found(user.as_ref(), &here),
        Err(e) => respond_backend_error(user.as_ref(), &here, &e),
    }
}

/// Deletes only when the posted `confirm_id` names the record in the path.
async fn delete<E: Entity>(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    user: Option<Extension<SessionUser>>,
    Path(id): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let user = user.map(|Extension(u)| u);
    let res = E::RESOURCE;
    let here = format!("{}/{}/delete", res.page_path(), &id);
    log::trace!("crud::delete::<{}>( {:?} ) called.", res, &id);

    if !valid_id(&id) {
        return respond_not_found(user.as_ref(), &here);
    }

    let confirm_id = pair_value(&pairs, "confirm_id");
    if confirm_id != id {
        log::warn!(
            "Delete of {} {:?} not confirmed (confirm_id {:?}).",
            res, &id, &confirm_id
        );
        return redirect(&format!("{}/{}/delete", res.page_path(), encode(&id)));
    }

    let backend = glob.read().await.backend();
    match actions::delete(&*backend, res, &id).await.into_result() {
        Ok(_) => redirect(&format!("{}?notice=deleted", res.page_path())),
        Err(e) => match actions::get::<E>(&*backend, &id).await.into_result() {
            Ok(Some(record)) => serve_confirm(StatusCode::BAD_GATEWAY, user.as_ref(), &record, Some(&e)),
            _ => respond_backend_error(user.as_ref(), &here, &e),
        },
    }
}

/// All the screens for `E`, rooted at its page path.
pub fn routes<E: Entity>() -> Router {
    let base = E::RESOURCE.page_path();

    Router::new()
        .route(base, get(list::<E>))
        .route(&format!("{}/new", base), get(new_form::<E>).post(create::<E>))
        .route(&format!("{}/:id", base), get(detail::<E>))
        .route(&format!("{}/:id/edit", base), get(edit_form::<E>).post(update::<E>))
        .route(&format!("{}/:id/delete", base), get(confirm_delete::<E>).post(delete::<E>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::testing::*;
    use axum::http::Method;
    use serial_test::serial;

    use crate::model::{Domaine, Formation};
    use crate::store::memory::MemoryBackend;
    use crate::tests::ensure_logging;

    fn domaines() -> Vec<Domaine> {
        ["Langues", "informatique", "Management"].iter()
            .enumerate()
            .map(|(n, l)| Domaine { id: (n + 1).to_string(), libelle: l.to_string() })
            .collect()
    }

    #[test]
    fn search_and_sort() {
        let recs = domaines();

        let rows = table_rows(&recs, "AN", None, Dir::Asc);
        assert_eq!(rows.len(), 2);

        let rows = table_rows(&recs, "", Some(0), Dir::Asc);
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);

        let rows = table_rows(&recs, "", Some(0), Dir::Desc);
        assert_eq!(rows[0].0, "3");

        assert_eq!(compare_cells("9", "10"), Ordering::Less);
        assert_eq!(encode("a b&c/é"), "a%20b%26c%2F%C3%A9");
        assert_eq!(notice_text(Resource::Domaine, Some("deleted")).as_deref(), Some("Domaine deleted."));
        assert_eq!(notice_text(Resource::Domaine, Some("<script>")), None);
    }

    fn app() -> (Router, Arc<RwLock<Glob>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::seeded("/api/utilisateur/login"));
        let (app, glob) = app_with(backend.clone());
        (app, glob, backend)
    }

    #[tokio::test]
    #[serial]
    async fn invalid_form_makes_no_call() {
        ensure_logging();
        let (app, glob, backend) = app();
        let cookie = cookie_for(&glob, user("admin")).await;

        let r = send(&app, Method::POST, "/domaines/new", Some(&cookie), Some("libelle=X")).await;
        assert_eq!(r.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(r).await.contains("Label must be at least 2 characters."));
        assert_eq!(backend.records("domaine").await.len(), 3);

        let r = send(
            &app, Method::POST, "/formateurs/1/edit", Some(&cookie),
            Some("name=Jean+Dupont&email=nope&phone=0612345678&kind=interne"),
        ).await;
        assert_eq!(r.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let page = body_text(r).await;
        assert!(page.contains("Please enter a valid email address."));
        assert!(page.contains("Cabinet Conseil Atlas"));
    }

    #[tokio::test]
    #[serial]
    async fn create_edit_delete() {
        ensure_logging();
        let (app, glob, backend) = app();
        let cookie = cookie_for(&glob, user("admin")).await;

        let r = send(&app, Method::POST, "/domaines/new", Some(&cookie), Some("libelle=Bureautique")).await;
        assert_eq!(r.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&r), "/domaines?notice=created");

        let id = backend.records("domaine").await
            .iter()
            .find(|d| d["libelle"] == "Bureautique")
            .and_then(crate::store::memory::id_of)
            .unwrap();

        let r = send(&app, Method::GET, "/domaines?notice=created&q=bureau", Some(&cookie), None).await;
        let page = body_text(r).await;
        assert!(page.contains("Domaine created."));
        assert!(page.contains("Bureautique"));
        assert!(!page.contains("Langues"));

        let r = send(
            &app, Method::POST, &format!("/domaines/{}/edit", &id), Some(&cookie),
            Some("libelle=Bureautique+avanc%C3%A9e"),
        ).await;
        assert_eq!(location(&r), format!("/domaines/{}?notice=updated", &id));

        let r = send(&app, Method::GET, &format!("/domaines/{}", &id), Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::OK);
        assert!(body_text(r).await.contains("Bureautique avancée"));

        // Wrong or missing confirmation: nothing deleted.
        let r = send(
            &app, Method::POST, &format!("/domaines/{}/delete", &id), Some(&cookie),
            Some("confirm_id=1"),
        ).await;
        assert_eq!(location(&r), format!("/domaines/{}/delete", &id));
        let r = send(&app, Method::POST, &format!("/domaines/{}/delete", &id), Some(&cookie), Some("")).await;
        assert_eq!(r.status(), StatusCode::SEE_OTHER);
        assert_eq!(backend.records("domaine").await.len(), 4);

        let r = send(&app, Method::GET, &format!("/domaines/{}/delete", &id), Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::OK);

        let r = send(
            &app, Method::POST, &format!("/domaines/{}/delete", &id), Some(&cookie),
            Some(&format!("confirm_id={}", &id)),
        ).await;
        assert_eq!(location(&r), "/domaines?notice=deleted");
        assert_eq!(backend.records("domaine").await.len(), 3);

        let r = send(&app, Method::GET, &format!("/domaines/{}", &id), Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[serial]
    async fn untouched_edit_keeps_name_parts() {
        ensure_logging();
        let (app, glob, backend) = app();
        let cookie = cookie_for(&glob, user("admin")).await;

        backend.load("formateur", vec![serde_json::json!({
            "id": "9", "nom": "Dupont", "prenom": "Marie Claire",
            "email": "mc@example.com", "tel": "0601020304", "type": "interne"
        })]).await;

        let r = send(&app, Method::GET, "/formateurs/9/edit", Some(&cookie), None).await;
        let page = body_text(r).await;
        assert!(page.contains(r#"<input name="prenom" type="hidden" value="Marie Claire">"#));

        let r = send(
            &app, Method::POST, "/formateurs/9/edit", Some(&cookie),
            Some("name=Marie+Claire+Dupont&prenom=Marie+Claire&nom=Dupont\
                &email=mc%40example.com&phone=0601020304&kind=interne&employer_id="),
        ).await;
        assert_eq!(location(&r), "/formateurs/9?notice=updated");

        let saved = backend.records("formateur").await
            .into_iter()
            .find(|f| f["id"] == "9")
            .unwrap();
        assert_eq!(saved["prenom"], "Marie Claire");
        assert_eq!(saved["nom"], "Dupont");
    }

    #[tokio::test]
    #[serial]
    async fn formation_screens() {
        ensure_logging();
        let (app, glob, backend) = app();
        let cookie = cookie_for(&glob, user("simple")).await;

        let r = send(&app, Method::GET, "/formations", Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::OK);
        assert!(body_text(r).await.contains("12\u{202f}500,00\u{a0}€"));

        let r = send(&app, Method::GET, "/formations/new", Some(&cookie), None).await;
        let page = body_text(r).await;
        assert!(page.contains("Sophie Martin"));
        assert!(page.contains("Informatique"));

        let r = send(
            &app, Method::POST, "/formations/new", Some(&cookie),
            Some("titre=Excel&annee=2025&duree=2&budget=800&domaine_id=1\
                &formateur_id=none&participant_ids=1&participant_ids=2"),
        ).await;
        assert_eq!(r.status(), StatusCode::SEE_OTHER);

        let created: Vec<Formation> = backend.records("formation").await
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .filter(|f: &Formation| f.titre == "Excel")
            .collect();
        assert_eq!(created.len(), 1);
        assert!(created[0].formateur.is_none());
        assert_eq!(created[0].participant_links().len(), 2);

        let r = send(&app, Method::GET, "/formations/999", Some(&cookie), None).await;
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
    }
}
