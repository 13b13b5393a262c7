/*!
An in-process stand-in for the training-center API.

It answers the same paths and verbs as the real thing, keeps everything
in memory, and resolves `{ "id": ... }` references to the records they
point at, the way the real backend does. Used for demos
(`backend = "memory"`) and as the fake in tests.
*/
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::{Backend, BackendError, Method, Reply};

const API_PREFIX: &str = "/api/";

/// Tables every fresh backend has, even if empty.
pub static TABLES: &[&str] = &[
    "formateur", "participant", "formation", "domaine", "employeur",
    "structure", "profil", "role", "utilisateur",
];

/// Reference fields and the table they point into.
static LINKS: &[(&str, &str)] = &[
    ("domaine", "domaine"),
    ("employeur", "employeur"),
    ("formateur", "formateur"),
    ("profil", "profil"),
    ("role", "role"),
    ("structure", "structure"),
];

/// Reference-list fields and the table their members point into.
static LINK_LISTS: &[(&str, &str)] = &[
    ("participants", "participant"),
];

/// The `id` of a record, whether the JSON has it as a string or a number.
pub fn id_of(v: &Value) -> Option<String> {
    match v.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message(status: u16, msg: &str) -> Reply {
    Reply::json(status, &json!({ "message": msg }))
}

type Tables = HashMap<String, Vec<Value>>;

fn empty_tables() -> Tables {
    TABLES.iter()
        .map(|t| (t.to_string(), Vec::new()))
        .collect()
}

#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    login_path: String,
}

impl MemoryBackend {
    pub fn new(login_path: &str) -> Self {
        log::trace!("MemoryBackend::new( {:?} ) called.", login_path);

        Self {
            tables: RwLock::new(empty_tables()),
            login_path: login_path.to_owned(),
        }
    }

    /// A backend preloaded with a small sample training center.
    pub fn seeded(login_path: &str) -> Self {
        log::trace!("MemoryBackend::seeded( {:?} ) called.", login_path);

        let mut tables = empty_tables();
        for (table, records) in seed_data() {
            tables.insert(table.to_owned(), records);
        }
        resolve_all(&mut tables);

        Self {
            tables: RwLock::new(tables),
            login_path: login_path.to_owned(),
        }
    }

    /// Insert `records` into `table` directly, bypassing the HTTP surface.
    #[cfg(test)]
    pub async fn load(&self, table: &str, records: Vec<Value>) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_owned()).or_default().extend(records);
        resolve_all(&mut tables);
    }

    pub async fn records(&self, table: &str) -> Vec<Value> {
        self.tables.read().await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    async fn login(&self, body: Option<Value>) -> Reply {
        let body = body.unwrap_or(Value::Null);
        let login = body.get("login").and_then(Value::as_str).unwrap_or_default();
        let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

        let tables = self.tables.read().await;
        let found = tables.get("utilisateur")
            .and_then(|users| users.iter().find(|u| {
                u.get("login").and_then(Value::as_str) == Some(login)
                    && u.get("password").and_then(Value::as_str) == Some(password)
            }));

        match found {
            Some(u) => {
                let mut u = u.clone();
                resolve_links(&tables, &mut u);
                if let Some(obj) = u.as_object_mut() {
                    obj.remove("password");
                }
                Reply::json(200, &u)
            },
            None => message(401, "Invalid login or password."),
        }
    }
}

fn resolve_all(tables: &mut Tables) {
    let snapshot = tables.clone();
    for records in tables.values_mut() {
        for r in records.iter_mut() {
            resolve_links(&snapshot, r);
        }
    }
}

fn lookup(tables: &Tables, table: &str, id: &str) -> Option<Value> {
    tables.get(table)?
        .iter()
        .find(|r| id_of(r).as_deref() == Some(id))
        .cloned()
}

/// Expand `{id}` references in `record` into the records they name.
///
/// Only one level deep; a referenced record keeps its own references as
/// they were stored.
fn resolve_links(tables: &Tables, record: &mut Value) {
    let obj = match record.as_object_mut() {
        Some(obj) => obj,
        None => { return; },
    };

    for (field, table) in LINKS.iter() {
        if let Some(v) = obj.get_mut(*field) {
            if let Some(id) = id_of(v) {
                if let Some(target) = lookup(tables, table, &id) {
                    *v = target;
                }
            }
        }
    }

    for (field, table) in LINK_LISTS.iter() {
        if let Some(Value::Array(items)) = obj.get_mut(*field) {
            for v in items.iter_mut() {
                if let Some(id) = id_of(v) {
                    if let Some(target) = lookup(tables, table, &id) {
                        *v = target;
                    }
                }
            }
        }
    }
}

/// Split `/api/<table>[/<id>]` into its parts.
fn route(path: &str) -> Option<(&str, Option<&str>)> {
    let rest = path.strip_prefix(API_PREFIX)?;
    let mut parts = rest.split('/').filter(|s| !s.is_empty());
    let table = parts.next()?;
    let id = parts.next();
    if parts.next().is_some() {
        return None;
    }
    Some((table, id))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Reply, BackendError> {
        log::trace!("MemoryBackend::send( {}, {:?}, {:?} ) called.", &method, path, &body);

        if path == self.login_path {
            return match method {
                Method::Post => Ok(self.login(body).await),
                _ => Ok(message(405, "Method not allowed.")),
            };
        }

        let (table, id) = match route(path) {
            Some(x) => x,
            None => { return Ok(message(404, "No such endpoint.")); },
        };

        if !self.tables.read().await.contains_key(table) {
            return Ok(message(404, "No such endpoint."));
        }

        match (method, id) {
            (Method::Get, None) => {
                let tables = self.tables.read().await;
                let records = tables.get(table).cloned().unwrap_or_default();
                Ok(Reply::json(200, &Value::Array(records)))
            },

            (Method::Get, Some(id)) => {
                let tables = self.tables.read().await;
                match lookup(&tables, table, id) {
                    Some(r) => Ok(Reply::json(200, &r)),
                    None => Ok(message(404, &format!("No {} with id {}.", table, id))),
                }
            },

            (Method::Post, None) => {
                let mut record = match body {
                    Some(Value::Object(obj)) => obj,
                    _ => { return Ok(message(400, "Expected a JSON object.")); },
                };
                record.insert(
                    "id".to_owned(),
                    Value::String(uuid::Uuid::new_v4().to_string())
                );
                let mut record = Value::Object(record);

                let mut tables = self.tables.write().await;
                resolve_links(&tables, &mut record);
                tables.entry(table.to_owned()).or_default().push(record.clone());
                Ok(Reply::json(201, &record))
            },

            (Method::Put, None) => {
                let record: Map<String, Value> = match body {
                    Some(Value::Object(obj)) => obj,
                    _ => { return Ok(message(400, "Expected a JSON object.")); },
                };
                let mut record = Value::Object(record);
                let id = match id_of(&record) {
                    Some(id) => id,
                    None => { return Ok(message(400, "Update requires an id.")); },
                };

                let mut tables = self.tables.write().await;
                resolve_links(&tables, &mut record);
                let records = tables.entry(table.to_owned()).or_default();
                match records.iter_mut().find(|r| id_of(r).as_deref() == Some(id.as_str())) {
                    Some(slot) => {
                        *slot = record.clone();
                        Ok(Reply::json(200, &record))
                    },
                    None => Ok(message(404, &format!("No {} with id {}.", table, &id))),
                }
            },

            (Method::Delete, Some(id)) => {
                let mut tables = self.tables.write().await;
                let records = tables.entry(table.to_owned()).or_default();
                let before = records.len();
                records.retain(|r| id_of(r).as_deref() != Some(id));
                if records.len() == before {
                    Ok(message(404, &format!("No {} with id {}.", table, id)))
                } else {
                    Ok(Reply::new(204, String::new()))
                }
            },

            _ => Ok(message(405, "Method not allowed.")),
        }
    }

    fn login_path(&self) -> &str { &self.login_path }
}

fn seed_data() -> Vec<(&'static str, Vec<Value>)> {
    vec![
        ("role", vec![
            json!({ "id": "1", "nom": "admin" }),
            json!({ "id": "2", "nom": "responsable" }),
            json!({ "id": "3", "nom": "simple" }),
        ]),
        ("utilisateur", vec![
            json!({ "id": "1", "login": "direction", "password": "direction", "role": { "id": "1" } }),
            json!({ "id": "2", "login": "responsable", "password": "responsable", "role": { "id": "2" } }),
            json!({ "id": "3", "login": "accueil", "password": "accueil", "role": { "id": "3" } }),
        ]),
        ("domaine", vec![
            json!({ "id": "1", "libelle": "Informatique" }),
            json!({ "id": "2", "libelle": "Management" }),
            json!({ "id": "3", "libelle": "Langues" }),
        ]),
        ("structure", vec![
            json!({ "id": "1", "libelle": "Direction centrale" }),
            json!({ "id": "2", "libelle": "Agence régionale" }),
        ]),
        ("profil", vec![
            json!({ "id": "1", "libelle": "Ingénieur" }),
            json!({ "id": "2", "libelle": "Technicien" }),
        ]),
        ("employeur", vec![
            json!({ "id": "1", "nomemployeur": "Centre de formation" }),
            json!({ "id": "2", "nomemployeur": "Cabinet Conseil Atlas" }),
        ]),
        ("formateur", vec![
            json!({
                "id": "1", "nom": "Dupont", "prenom": "Jean",
                "email": "jean.dupont@example.com", "tel": "+33 6 12 34 56 78",
                "type": "interne", "employeur": { "id": "1" }
            }),
            json!({
                "id": "2", "nom": "Laurent", "prenom": "Marie",
                "email": "marie.laurent@example.com", "tel": "+33 6 23 45 67 89",
                "type": "externe", "employeur": { "id": "2" }
            }),
        ]),
        ("participant", vec![
            json!({
                "id": "1", "nom": "Benali", "prenom": "Ahmed",
                "email": "ahmed.benali@example.com", "tel": "0612345678",
                "structure": { "id": "1" }, "profil": { "id": "1" }
            }),
            json!({
                "id": "2", "nom": "Martin", "prenom": "Sophie",
                "email": "sophie.martin@example.com", "tel": "0698765432",
                "structure": { "id": "2" }, "profil": { "id": "2" }
            }),
        ]),
        ("formation", vec![
            json!({
                "id": "1", "titre": "Développement Web", "annee": 2024,
                "duree": 5, "budget": 12500.0,
                "domaine": { "id": "1" }, "formateur": { "id": "1" },
                "participants": [ { "id": "1" }, { "id": "2" } ]
            }),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "/api/utilisateur/login";

    #[test]
    fn routes() {
        assert_eq!(route("/api/domaine"), Some(("domaine", None)));
        assert_eq!(route("/api/domaine/4"), Some(("domaine", Some("4"))));
        assert_eq!(route("/api/domaine/4/x"), None);
        assert_eq!(route("/other"), None);
    }

    #[test]
    fn ids_as_strings() {
        assert_eq!(id_of(&json!({ "id": 12 })), Some("12".to_owned()));
        assert_eq!(id_of(&json!({ "id": "ab" })), Some("ab".to_owned()));
        assert_eq!(id_of(&json!({ "id": null })), None);
    }

    #[tokio::test]
    async fn crud_cycle() {
        let b = MemoryBackend::new(LOGIN);

        let r = b.send(Method::Post, "/api/domaine", Some(json!({ "libelle": "Finance" })))
            .await.unwrap();
        assert_eq!(r.status, 201);
        let created: Value = serde_json::from_str(&r.body).unwrap();
        let id = id_of(&created).unwrap();

        let r = b.send(Method::Get, &format!("/api/domaine/{}", &id), None).await.unwrap();
        assert_eq!(r.status, 200);

        let r = b.send(
            Method::Put, "/api/domaine",
            Some(json!({ "id": &id, "libelle": "Finances" }))
        ).await.unwrap();
        assert_eq!(r.status, 200);
        assert_eq!(b.records("domaine").await[0]["libelle"], "Finances");

        let r = b.send(Method::Delete, &format!("/api/domaine/{}", &id), None).await.unwrap();
        assert_eq!(r.status, 204);
        let r = b.send(Method::Delete, &format!("/api/domaine/{}", &id), None).await.unwrap();
        assert_eq!(r.status, 404);
        assert!(b.records("domaine").await.is_empty());
    }

    #[tokio::test]
    async fn references_resolve() {
        let b = MemoryBackend::seeded(LOGIN);
        let r = b.send(
            Method::Post, "/api/formation",
            Some(json!({
                "titre": "Anglais", "annee": 2025, "duree": 3, "budget": 900,
                "domaine": { "id": "3" }, "formateur": null,
                "participants": [ { "id": "2" } ]
            }))
        ).await.unwrap();
        let f: Value = serde_json::from_str(&r.body).unwrap();
        assert_eq!(f["domaine"]["libelle"], "Langues");
        assert_eq!(f["participants"][0]["prenom"], "Sophie");
    }

    #[tokio::test]
    async fn loaded_records_link_up() {
        let b = MemoryBackend::new(LOGIN);
        b.load("employeur", vec![json!({ "id": 7, "nomemployeur": "Atlas" })]).await;
        b.load("formateur", vec![json!({ "id": 1, "nom": "Dupont", "employeur": { "id": 7 } })]).await;

        let r = b.send(Method::Get, "/api/formateur/1", None).await.unwrap();
        let f: Value = serde_json::from_str(&r.body).unwrap();
        assert_eq!(f["employeur"]["nomemployeur"], "Atlas");
    }

    #[tokio::test]
    async fn credentials() {
        let b = MemoryBackend::seeded(LOGIN);

        let r = b.send(
            Method::Post, LOGIN,
            Some(json!({ "login": "accueil", "password": "accueil" }))
        ).await.unwrap();
        assert_eq!(r.status, 200);
        let u: Value = serde_json::from_str(&r.body).unwrap();
        assert_eq!(u["role"]["nom"], "simple");
        assert!(u.get("password").is_none());

        let r = b.send(
            Method::Post, LOGIN,
            Some(json!({ "login": "accueil", "password": "nope" }))
        ).await.unwrap();
        assert_eq!(r.status, 401);
    }

    #[tokio::test]
    async fn unknown_paths() {
        let b = MemoryBackend::new(LOGIN);
        assert_eq!(b.send(Method::Get, "/api/nothing", None).await.unwrap().status, 404);
        assert_eq!(b.send(Method::Delete, "/api/role", None).await.unwrap().status, 405);
        assert_eq!(b.send(Method::Put, "/api/role", Some(json!({ "nom": "x" }))).await.unwrap().status, 400);
    }
}
