/*!
Entity records as the backend serves them, and the forms that edit them.

Every entity is a flat record with an `id`; references to other entities
come back as nested objects and go out as `{ "id": ... }`. The forms hold
raw submitted strings; [`EntityForm::validate`] checks them and builds the
JSON payload the backend expects, mapping form field names onto API
field names on the way.
*/
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::store::Backend;

pub mod catalog;
pub mod formation;
pub mod people;

pub use catalog::{Domaine, Employeur, Profil, RoleRecord, Structure};
pub use formation::Formation;
pub use people::{Formateur, Participant, Utilisateur};

/// The nine kinds of record the console manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    Formateur,
    Participant,
    Formation,
    Domaine,
    Employeur,
    Structure,
    Profil,
    Role,
    Utilisateur,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::Formateur, Resource::Participant, Resource::Formation,
        Resource::Domaine, Resource::Employeur, Resource::Structure,
        Resource::Profil, Resource::Role, Resource::Utilisateur,
    ];

    /// Lower-case singular name; also the API collection name.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Formateur   => "formateur",
            Resource::Participant => "participant",
            Resource::Formation   => "formation",
            Resource::Domaine     => "domaine",
            Resource::Employeur   => "employeur",
            Resource::Structure   => "structure",
            Resource::Profil      => "profil",
            Resource::Role        => "role",
            Resource::Utilisateur => "utilisateur",
        }
    }

    pub fn api_path(&self) -> String {
        format!("/api/{}", self.name())
    }

    /// Root of this resource's screens in the console.
    pub fn page_path(&self) -> &'static str {
        match self {
            Resource::Formateur   => "/formateurs",
            Resource::Participant => "/participants",
            Resource::Formation   => "/formations",
            Resource::Domaine     => "/domaines",
            Resource::Employeur   => "/employeurs",
            Resource::Structure   => "/structures",
            Resource::Profil      => "/profils",
            Resource::Role        => "/roles",
            Resource::Utilisateur => "/utilisateurs",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Resource::Formateur   => "Formateur",
            Resource::Participant => "Participant",
            Resource::Formation   => "Formation",
            Resource::Domaine     => "Domaine",
            Resource::Employeur   => "Employeur",
            Resource::Structure   => "Structure",
            Resource::Profil      => "Profil",
            Resource::Role        => "Role",
            Resource::Utilisateur => "Utilisateur",
        }
    }

    /// Short description shown on the dashboard.
    pub fn blurb(&self) -> &'static str {
        match self {
            Resource::Formateur   => "Trainers registered in the system",
            Resource::Participant => "Trainees enrolled in programs",
            Resource::Formation   => "Training programs available",
            Resource::Domaine     => "Training domains",
            Resource::Employeur   => "Employers of trainers",
            Resource::Structure   => "Organizational structures",
            Resource::Profil      => "Participant profiles",
            Resource::Role        => "Access levels",
            Resource::Utilisateur => "Console login accounts",
        }
    }

    pub fn from_page_path(path: &str) -> Option<Resource> {
        Resource::ALL.iter().copied().find(|r| r.page_path() == path)
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(serde_json::Number),
}

/// Read an id that the backend may send as either a string or a number.
pub fn de_id<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>
{
    match IdRepr::deserialize(d)? {
        IdRepr::Text(s) => Ok(s),
        IdRepr::Number(n) => Ok(n.to_string()),
    }
}

/// Read a plain field that the backend may send as `null`, taking the
/// type's default in that case.
pub fn de_null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// A nested reference to another record, with whatever label fields the
/// backend chose to include.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libelle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prenom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomemployeur: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titre: Option<String>,
}

impl Link {
    pub fn label(&self) -> String {
        if let Some(s) = self.libelle.as_ref().or(self.nomemployeur.as_ref()).or(self.titre.as_ref()) {
            return s.clone();
        }
        match (&self.prenom, &self.nom) {
            (None, None) => self.id.clone(),
            (p, n) => full_name(
                p.as_deref().unwrap_or_default(),
                n.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Label of an optional reference, or `fallback`.
pub fn link_label(link: &Option<Link>, fallback: &str) -> String {
    match link {
        Some(l) => l.label(),
        None => fallback.to_owned(),
    }
}

/// `{ "id": id }`, or `null` for an empty id.
pub fn link_payload(id: &str) -> Value {
    if id.is_empty() {
        Value::Null
    } else {
        serde_json::json!({ "id": id })
    }
}

/// First name and last name as one display string.
pub fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_owned()
}

/**
Split a combined name into (first, last).

The first whitespace-separated word is the first name; everything after
it is the last name, which may be empty.
*/
pub fn split_name(name: &str) -> (String, String) {
    let mut words = name.split_whitespace();
    let first = words.next().unwrap_or_default().to_owned();
    let last: Vec<&str> = words.collect();
    (first, last.join(" "))
}

/// Largest amount [`format_euros`] will spell out; cents still fit in a `u64`.
pub const MAX_AMOUNT: f64 = 1e15;

fn squeeze(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/**
First and last name for a submitted combined `name`.

`first` and `last` are what the record held when the form was opened. If
`name` still spells exactly those, they're kept as they were; otherwise
`name` is split with [`split_name`].
*/
pub fn name_parts(name: &str, first: &str, last: &str) -> (String, String) {
    let loaded = full_name(first, last);
    if !loaded.is_empty() && squeeze(&loaded) == squeeze(name) {
        (squeeze(first), squeeze(last))
    } else {
        split_name(name)
    }
}

/// Format an amount the way fr-FR formats EUR: `1 234,50 €`.
pub fn format_euros(amount: f64) -> String {
    if !amount.is_finite() || amount.abs() > MAX_AMOUNT {
        return "-".to_owned();
    }

    let cents = (amount.abs() * 100.0).round() as u64;
    let units = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3 * 3);
    for (n, c) in units.chars().enumerate() {
        if n > 0 && (units.len() - n) % 3 == 0 {
            grouped.push('\u{202f}');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}{},{:02}\u{a0}€", sign, grouped, frac)
}

/// Per-field validation messages, keyed by form field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

/// Option lists a form needs from the backend, keyed by field name.
pub type Choices = HashMap<&'static str, Vec<Choice>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Text,
    Email,
    Password,
    Number,
    Select,
    Multi,
    Hidden,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// One input on a rendered form.
#[derive(Clone, Debug, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub input: Input,
    pub value: String,
    pub values: Vec<String>,
    pub options: Vec<FieldOption>,
    pub error: Option<String>,
    #[serde(skip)]
    fixed: &'static [(&'static str, &'static str)],
    /// Label of an extra "no selection" option, for optional selects.
    #[serde(skip)]
    blank: Option<(&'static str, &'static str)>,
}

impl Field {
    fn new(name: &'static str, label: &'static str, input: Input, value: &str) -> Field {
        Field {
            name, label, input,
            value: value.to_owned(),
            values: Vec::new(),
            options: Vec::new(),
            error: None,
            fixed: &[],
            blank: None,
        }
    }

    pub fn text(name: &'static str, label: &'static str, value: &str) -> Field {
        Field::new(name, label, Input::Text, value)
    }

    pub fn email(name: &'static str, label: &'static str, value: &str) -> Field {
        Field::new(name, label, Input::Email, value)
    }

    pub fn password(name: &'static str, label: &'static str, value: &str) -> Field {
        Field::new(name, label, Input::Password, value)
    }

    /// Carried through the form unseen.
    pub fn hidden(name: &'static str, value: &str) -> Field {
        Field::new(name, "", Input::Hidden, value)
    }

    pub fn number(name: &'static str, label: &'static str, value: &str) -> Field {
        Field::new(name, label, Input::Number, value)
    }

    /// A select whose options come from the form's [`Choices`].
    pub fn select(name: &'static str, label: &'static str, value: &str) -> Field {
        Field::new(name, label, Input::Select, value)
    }

    /// A select over a fixed list of `(value, label)` pairs.
    pub fn fixed(
        name: &'static str,
        label: &'static str,
        value: &str,
        options: &'static [(&'static str, &'static str)],
    ) -> Field {
        let mut f = Field::new(name, label, Input::Select, value);
        f.fixed = options;
        f
    }

    pub fn multi(name: &'static str, label: &'static str, values: &[String]) -> Field {
        let mut f = Field::new(name, label, Input::Multi, "");
        f.values = values.to_vec();
        f
    }

    /// Offer an explicit "nothing selected" option with the given value.
    pub fn or_none(mut self, value: &'static str, label: &'static str) -> Field {
        self.blank = Some((value, label));
        self
    }

    fn is_selected(&self, value: &str) -> bool {
        match self.input {
            Input::Multi => self.values.iter().any(|v| v == value),
            _ => self.value == value,
        }
    }

    /// Fill in options and error message for rendering.
    pub fn resolve(mut self, choices: &Choices, errors: &FieldErrors) -> Field {
        let mut options: Vec<(String, String)> = Vec::new();
        if let Some((v, l)) = self.blank {
            options.push((v.to_owned(), l.to_owned()));
        }
        if !self.fixed.is_empty() {
            options.extend(self.fixed.iter().map(|(v, l)| (v.to_string(), l.to_string())));
        } else if let Some(list) = choices.get(self.name) {
            options.extend(list.iter().map(|c| (c.value.clone(), c.label.clone())));
        }

        self.options = options.into_iter()
            .map(|(value, label)| FieldOption {
                selected: self.is_selected(&value),
                value,
                label,
            })
            .collect();
        self.error = errors.get(self.name).cloned();
        self
    }
}

/// First submitted value for `name`, trimmed; empty if absent.
pub fn pair_value(pairs: &[(String, String)], name: &str) -> String {
    pairs.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_owned())
        .unwrap_or_default()
}

/// Every non-empty submitted value for `name`.
pub fn pair_values(pairs: &[(String, String)], name: &str) -> Vec<String> {
    pairs.iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn check_min_len(
    errors: &mut FieldErrors,
    field: &'static str,
    value: &str,
    min: usize,
    what: &str,
) {
    if value.chars().count() < min {
        errors.insert(field, format!("{} must be at least {} characters.", what, min));
    }
}

pub fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let (local, domain) = match s.split_once('@') {
        Some(x) => x,
        None => { return false; },
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

pub fn check_email(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if !is_email(value) {
        errors.insert(field, "Please enter a valid email address.".to_owned());
    }
}

pub fn check_required(errors: &mut FieldErrors, field: &'static str, value: &str, msg: &str) {
    if value.is_empty() {
        errors.insert(field, msg.to_owned());
    }
}

/// Coerce `value` to a whole number no smaller than `min`.
pub fn check_int(
    errors: &mut FieldErrors,
    field: &'static str,
    value: &str,
    min: i64,
    what: &str,
) -> Option<i64> {
    match value.parse::<i64>() {
        Ok(n) if n >= min => Some(n),
        Ok(_) => {
            errors.insert(field, format!("{} must be at least {}.", what, min));
            None
        },
        Err(_) => {
            errors.insert(field, format!("{} must be a whole number.", what));
            None
        },
    }
}

/// Coerce `value` to a finite number between `min` and `max`.
///
/// A decimal comma is accepted as well as a decimal point.
pub fn check_number(
    errors: &mut FieldErrors,
    field: &'static str,
    value: &str,
    min: f64,
    max: f64,
    what: &str,
) -> Option<f64> {
    let normalized = value.replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= min && n <= max => Some(n),
        Ok(n) if n.is_finite() && n > max => {
            errors.insert(field, format!("{} must be at most {}.", what, max));
            None
        },
        Ok(n) if n.is_finite() => {
            errors.insert(field, format!("{} must be at least {}.", what, min));
            None
        },
        _ => {
            errors.insert(field, format!("{} must be a number.", what));
            None
        },
    }
}

/// A record the console can list, show, create, edit and delete.
pub trait Entity: DeserializeOwned + Serialize + Clone + Debug + Send + Sync + 'static {
    const RESOURCE: Resource;
    type Form: EntityForm<Entity = Self>;

    fn id(&self) -> &str;
    /// How this record is named in headings and select boxes.
    fn label(&self) -> String;
    fn columns() -> &'static [&'static str];
    /// Table cells, one per entry of `columns()`.
    fn cells(&self) -> Vec<String>;
    fn details(&self) -> Vec<(&'static str, String)>;
}

/// The create/edit form for an [`Entity`].
#[async_trait]
pub trait EntityForm: Debug + Default + Send + Sync + Sized + 'static {
    type Entity: Entity;

    fn from_pairs(pairs: &[(String, String)]) -> Self;
    fn from_entity(e: &Self::Entity) -> Self;
    /// Check the submitted values and build the backend payload (sans id).
    fn validate(&self) -> Result<Value, FieldErrors>;
    fn fields(&self) -> Vec<Field>;

    /// Fetch whatever option lists the form's selects need.
    async fn choices(_backend: &dyn Backend) -> Choices {
        Choices::new()
    }
}

/// Turn a list of records into select options.
pub fn to_choices<E: Entity>(records: &[E]) -> Vec<Choice> {
    records.iter()
        .map(|r| Choice { value: r.id().to_owned(), label: r.label() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names() {
        assert_eq!(split_name("Jean Dupont"), ("Jean".to_owned(), "Dupont".to_owned()));
        assert_eq!(split_name("  Marie  de la Tour "), ("Marie".to_owned(), "de la Tour".to_owned()));
        assert_eq!(split_name("Cher"), ("Cher".to_owned(), String::new()));
        assert_eq!(full_name("Jean", "Dupont"), "Jean Dupont");
        assert_eq!(full_name("Cher", ""), "Cher");

        let kept = ("Marie Claire".to_owned(), "Dupont".to_owned());
        assert_eq!(name_parts("Marie Claire Dupont", "Marie Claire", "Dupont"), kept);
        assert_eq!(name_parts(" Marie  Claire Dupont ", "Marie Claire", "Dupont"), kept);
        assert_eq!(
            name_parts("Marie Durand", "Marie Claire", "Dupont"),
            ("Marie".to_owned(), "Durand".to_owned())
        );
        assert_eq!(name_parts("Jean Dupont", "", ""), ("Jean".to_owned(), "Dupont".to_owned()));
    }

    #[test]
    fn euros() {
        assert_eq!(format_euros(0.0), "0,00\u{a0}€");
        assert_eq!(format_euros(12500.0), "12\u{202f}500,00\u{a0}€");
        assert_eq!(format_euros(1234567.891), "1\u{202f}234\u{202f}567,89\u{a0}€");
        assert_eq!(format_euros(-42.5), "-42,50\u{a0}€");
        assert_eq!(format_euros(999.999), "1\u{202f}000,00\u{a0}€");
        assert_eq!(format_euros(2e17), "-");
    }

    #[test]
    fn emails() {
        assert!(is_email("jean.dupont@example.com"));
        assert!(!is_email("jean.dupont@example"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("a b@example.com"));
        assert!(!is_email("a@b@example.com"));
        assert!(!is_email("a@example..com"));
    }

    #[test]
    fn ids_from_either() {
        let l: Link = serde_json::from_value(json!({ "id": 4, "libelle": "Langues" })).unwrap();
        assert_eq!(l.id, "4");
        assert_eq!(l.label(), "Langues");

        let l: Link = serde_json::from_value(json!({ "id": "x", "nom": "Dupont", "prenom": "Jean" })).unwrap();
        assert_eq!(l.label(), "Jean Dupont");

        let l: Link = serde_json::from_value(json!({ "id": "9" })).unwrap();
        assert_eq!(l.label(), "9");
    }

    #[test]
    fn coercion() {
        let mut errors = FieldErrors::new();
        assert_eq!(check_int(&mut errors, "annee", "2024", 2000, "Year"), Some(2024));
        assert_eq!(check_int(&mut errors, "annee", "1999", 2000, "Year"), None);
        assert_eq!(errors["annee"], "Year must be at least 2000.");
        assert_eq!(check_int(&mut errors, "duree", "3.5", 1, "Duration"), None);
        assert_eq!(errors["duree"], "Duration must be a whole number.");
        assert_eq!(check_number(&mut errors, "budget", "1500,5", 0.0, 1e6, "Budget"), Some(1500.5));
        assert_eq!(check_number(&mut errors, "budget", "NaN", 0.0, 1e6, "Budget"), None);
        assert_eq!(check_number(&mut errors, "budget", "-1", 0.0, 1e6, "Budget"), None);
        assert_eq!(errors["budget"], "Budget must be at least 0.");
        assert_eq!(check_number(&mut errors, "budget", "2e6", 0.0, 1e6, "Budget"), None);
        assert_eq!(errors["budget"], "Budget must be at most 1000000.");
    }

    #[test]
    fn pairs() {
        let pairs = vec![
            ("name".to_owned(), " Jean ".to_owned()),
            ("ids".to_owned(), "1".to_owned()),
            ("ids".to_owned(), "".to_owned()),
            ("ids".to_owned(), "3".to_owned()),
        ];
        assert_eq!(pair_value(&pairs, "name"), "Jean");
        assert_eq!(pair_value(&pairs, "missing"), "");
        assert_eq!(pair_values(&pairs, "ids"), vec!["1".to_owned(), "3".to_owned()]);
    }

    #[test]
    fn field_options() {
        static KINDS: &[(&str, &str)] = &[("interne", "Interne"), ("externe", "Externe")];
        let f = Field::fixed("kind", "Type", "externe", KINDS)
            .resolve(&Choices::new(), &FieldErrors::new());
        assert_eq!(f.options.len(), 2);
        assert!(f.options[1].selected);

        let mut choices = Choices::new();
        choices.insert("domaine_id", vec![Choice { value: "1".to_owned(), label: "Informatique".to_owned() }]);
        let mut errors = FieldErrors::new();
        errors.insert("domaine_id", "Please select a domain.".to_owned());
        let f = Field::select("domaine_id", "Domaine", "")
            .or_none("", "Select a domain")
            .resolve(&choices, &errors);
        assert_eq!(f.options.len(), 2);
        assert!(f.options[0].selected);
        assert_eq!(f.error.as_deref(), Some("Please select a domain."));

        let f = Field::multi("participant_ids", "Participants", &["1".to_owned()])
            .resolve(&choices, &FieldErrors::new());
        assert!(f.options.is_empty());
    }

    #[test]
    fn resources() {
        assert_eq!(Resource::Domaine.api_path(), "/api/domaine");
        assert_eq!(Resource::from_page_path("/utilisateurs"), Some(Resource::Utilisateur));
        assert_eq!(Resource::from_page_path("/"), None);
        assert_eq!(link_payload(""), Value::Null);
        assert_eq!(link_payload("3"), json!({ "id": "3" }));
    }
}
