/*!
Formateurs, participants and console login accounts.

The backend keeps first and last names apart (`prenom`, `nom`); the forms
take one combined name and split it on the way out. An edit form also
carries the stored parts along, so saving an untouched name leaves them
as they were.
*/
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::actions;
use super::*;

static FORMATEUR_KINDS: &[(&str, &str)] = &[
    ("interne", "Interne"),
    ("externe", "Externe"),
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Formateur {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub nom: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub prenom: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub email: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub tel: String,
    #[serde(rename = "type", default, deserialize_with = "de_null_default")]
    pub kind: String,
    #[serde(default)]
    pub employeur: Option<Link>,
}

impl Entity for Formateur {
    const RESOURCE: Resource = Resource::Formateur;
    type Form = FormateurForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { full_name(&self.prenom, &self.nom) }
    fn columns() -> &'static [&'static str] { &["Nom", "Email", "Employeur", "Type"] }

    fn cells(&self) -> Vec<String> {
        vec![
            self.label(),
            self.email.clone(),
            link_label(&self.employeur, "-"),
            self.kind.clone(),
        ]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Prénom", self.prenom.clone()),
            ("Nom", self.nom.clone()),
            ("Email", self.email.clone()),
            ("Téléphone", self.tel.clone()),
            ("Type", if self.kind.is_empty() { "N/A".to_owned() } else { self.kind.clone() }),
            ("Employeur", link_label(&self.employeur, "Unknown")),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormateurForm {
    pub name: String,
    /// `prenom` as loaded, for an edit.
    pub first: String,
    /// `nom` as loaded, for an edit.
    pub last: String,
    pub email: String,
    pub phone: String,
    pub kind: String,
    pub employer_id: String,
}

#[async_trait]
impl EntityForm for FormateurForm {
    type Entity = Formateur;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            name: pair_value(pairs, "name"),
            first: pair_value(pairs, "prenom"),
            last: pair_value(pairs, "nom"),
            email: pair_value(pairs, "email"),
            phone: pair_value(pairs, "phone"),
            kind: pair_value(pairs, "kind"),
            employer_id: pair_value(pairs, "employer_id"),
        }
    }

    fn from_entity(e: &Formateur) -> Self {
        Self {
            name: e.label(),
            first: e.prenom.clone(),
            last: e.nom.clone(),
            email: e.email.clone(),
            phone: e.tel.clone(),
            kind: e.kind.clone(),
            employer_id: e.employeur.as_ref().map(|l| l.id.clone()).unwrap_or_default(),
        }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "name", &self.name, 2, "Name");
        check_email(&mut errors, "email", &self.email);
        check_min_len(&mut errors, "phone", &self.phone, 5, "Phone number");
        if !FORMATEUR_KINDS.iter().any(|(k, _)| *k == self.kind) {
            errors.insert("kind", "Type must be either interne or externe.".to_owned());
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let (prenom, nom) = name_parts(&self.name, &self.first, &self.last);
        Ok(json!({
            "nom": nom,
            "prenom": prenom,
            "email": &self.email,
            "tel": &self.phone,
            "type": &self.kind,
            "employeur": link_payload(&self.employer_id),
        }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::text("name", "Nom complet", &self.name),
            Field::hidden("prenom", &self.first),
            Field::hidden("nom", &self.last),
            Field::email("email", "Email", &self.email),
            Field::text("phone", "Téléphone", &self.phone),
            Field::fixed("kind", "Type", &self.kind, FORMATEUR_KINDS),
            Field::select("employer_id", "Employeur", &self.employer_id)
                .or_none("", "Aucun"),
        ]
    }

    async fn choices(backend: &dyn Backend) -> Choices {
        let mut choices = Choices::new();
        let employeurs = actions::list::<Employeur>(backend).await;
        choices.insert("employer_id", to_choices(&employeurs.data.unwrap_or_default()));
        choices
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub nom: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub prenom: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub email: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub tel: String,
    #[serde(default)]
    pub structure: Option<Link>,
    #[serde(default)]
    pub profil: Option<Link>,
}

impl Entity for Participant {
    const RESOURCE: Resource = Resource::Participant;
    type Form = ParticipantForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { full_name(&self.prenom, &self.nom) }
    fn columns() -> &'static [&'static str] { &["Nom", "Email", "Structure", "Profil"] }

    fn cells(&self) -> Vec<String> {
        vec![
            self.label(),
            self.email.clone(),
            link_label(&self.structure, "-"),
            link_label(&self.profil, "-"),
        ]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Prénom", self.prenom.clone()),
            ("Nom", self.nom.clone()),
            ("Email", self.email.clone()),
            ("Téléphone", self.tel.clone()),
            ("Structure", link_label(&self.structure, "No Structure")),
            ("Profil", link_label(&self.profil, "No Profile")),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticipantForm {
    pub name: String,
    /// `prenom` as loaded, for an edit.
    pub first: String,
    /// `nom` as loaded, for an edit.
    pub last: String,
    pub email: String,
    pub phone: String,
    pub structure_id: String,
    pub profil_id: String,
}

#[async_trait]
impl EntityForm for ParticipantForm {
    type Entity = Participant;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            name: pair_value(pairs, "name"),
            first: pair_value(pairs, "prenom"),
            last: pair_value(pairs, "nom"),
            email: pair_value(pairs, "email"),
            phone: pair_value(pairs, "phone"),
            structure_id: pair_value(pairs, "structure_id"),
            profil_id: pair_value(pairs, "profil_id"),
        }
    }

    fn from_entity(e: &Participant) -> Self {
        Self {
            name: e.label(),
            first: e.prenom.clone(),
            last: e.nom.clone(),
            email: e.email.clone(),
            phone: e.tel.clone(),
            structure_id: e.structure.as_ref().map(|l| l.id.clone()).unwrap_or_default(),
            profil_id: e.profil.as_ref().map(|l| l.id.clone()).unwrap_or_default(),
        }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "name", &self.name, 2, "Name");
        check_email(&mut errors, "email", &self.email);
        check_min_len(&mut errors, "phone", &self.phone, 5, "Phone number");
        if !errors.is_empty() {
            return Err(errors);
        }

        let (prenom, nom) = name_parts(&self.name, &self.first, &self.last);
        Ok(json!({
            "nom": nom,
            "prenom": prenom,
            "email": &self.email,
            "tel": &self.phone,
            "structure": link_payload(&self.structure_id),
            "profil": link_payload(&self.profil_id),
        }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::text("name", "Nom complet", &self.name),
            Field::hidden("prenom", &self.first),
            Field::hidden("nom", &self.last),
            Field::email("email", "Email", &self.email),
            Field::text("phone", "Téléphone", &self.phone),
            Field::select("structure_id", "Structure", &self.structure_id)
                .or_none("", "Aucune"),
            Field::select("profil_id", "Profil", &self.profil_id)
                .or_none("", "Aucun"),
        ]
    }

    async fn choices(backend: &dyn Backend) -> Choices {
        let (structures, profils) = tokio::join!(
            actions::list::<Structure>(backend),
            actions::list::<Profil>(backend),
        );

        let mut choices = Choices::new();
        choices.insert("structure_id", to_choices(&structures.data.unwrap_or_default()));
        choices.insert("profil_id", to_choices(&profils.data.unwrap_or_default()));
        choices
    }
}

/// A console login account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilisateur {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub login: String,
    #[serde(default, skip_serializing, deserialize_with = "de_null_default")]
    pub password: String,
    #[serde(default)]
    pub role: Option<Link>,
}

impl Entity for Utilisateur {
    const RESOURCE: Resource = Resource::Utilisateur;
    type Form = UtilisateurForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { self.login.clone() }
    fn columns() -> &'static [&'static str] { &["Login", "Role"] }

    fn cells(&self) -> Vec<String> {
        vec![self.login.clone(), link_label(&self.role, "-")]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Login", self.login.clone()),
            ("Role", link_label(&self.role, "Unknown")),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UtilisateurForm {
    pub login: String,
    pub password: String,
    pub role_id: String,
}

#[async_trait]
impl EntityForm for UtilisateurForm {
    type Entity = Utilisateur;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            login: pair_value(pairs, "login"),
            password: pair_value(pairs, "password"),
            role_id: pair_value(pairs, "role_id"),
        }
    }

    // The password is never echoed back into the edit form.
    fn from_entity(e: &Utilisateur) -> Self {
        Self {
            login: e.login.clone(),
            password: String::new(),
            role_id: e.role.as_ref().map(|l| l.id.clone()).unwrap_or_default(),
        }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "login", &self.login, 2, "Login");
        check_min_len(&mut errors, "password", &self.password, 6, "Password");
        check_required(&mut errors, "role_id", &self.role_id, "Please select a role.");
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(json!({
            "login": &self.login,
            "password": &self.password,
            "role": link_payload(&self.role_id),
        }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::text("login", "Login", &self.login),
            Field::password("password", "Mot de passe", ""),
            Field::select("role_id", "Role", &self.role_id)
                .or_none("", "Choisir un role"),
        ]
    }

    async fn choices(backend: &dyn Backend) -> Choices {
        let mut choices = Choices::new();
        let roles = actions::list::<RoleRecord>(backend).await;
        choices.insert("role_id", to_choices(&roles.data.unwrap_or_default()));
        choices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(v: &[(&str, &str)]) -> Vec<(String, String)> {
        v.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn formateur_payload() {
        let f = FormateurForm::from_pairs(&pairs(&[
            ("name", "Jean Dupont"),
            ("email", "jean.dupont@example.com"),
            ("phone", "+33 6 12 34 56 78"),
            ("kind", "interne"),
            ("employer_id", "2"),
        ]));
        assert_eq!(f.validate().unwrap(), json!({
            "nom": "Dupont",
            "prenom": "Jean",
            "email": "jean.dupont@example.com",
            "tel": "+33 6 12 34 56 78",
            "type": "interne",
            "employeur": { "id": "2" },
        }));
    }

    #[test]
    fn formateur_rules() {
        let f = FormateurForm::from_pairs(&pairs(&[
            ("name", "J"),
            ("email", "not-an-email"),
            ("phone", "123"),
            ("kind", "freelance"),
        ]));
        let errors = f.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors["email"], "Please enter a valid email address.");
        assert_eq!(errors["phone"], "Phone number must be at least 5 characters.");

        let f = FormateurForm { kind: "externe".to_owned(), ..f };
        assert!(!f.validate().unwrap_err().contains_key("kind"));
    }

    #[test]
    fn formateur_round_trip_from_backend() {
        let e: Formateur = serde_json::from_value(json!({
            "id": 5, "nom": "Laurent", "prenom": "Marie",
            "email": "marie@example.com", "tel": "0601020304", "type": "externe",
            "employeur": { "id": 2, "nomemployeur": "Atlas" }
        })).unwrap();
        assert_eq!(e.cells(), vec!["Marie Laurent", "marie@example.com", "Atlas", "externe"]);

        let f = FormateurForm::from_entity(&e);
        assert_eq!(f.name, "Marie Laurent");
        assert_eq!(f.employer_id, "2");
        assert_eq!(f.validate().unwrap()["employeur"], json!({ "id": "2" }));
    }

    #[test]
    fn unchanged_names_keep_their_parts() {
        let e: Formateur = serde_json::from_value(json!({
            "id": 8, "nom": "Dupont", "prenom": "Marie Claire",
            "email": "mc@example.com", "tel": "0601020304", "type": "interne"
        })).unwrap();
        let payload = FormateurForm::from_entity(&e).validate().unwrap();
        assert_eq!(payload["prenom"], "Marie Claire");
        assert_eq!(payload["nom"], "Dupont");

        // As the browser posts the edit form back, hidden parts included.
        let f = FormateurForm::from_pairs(&pairs(&[
            ("name", "Marie Claire Dupont"), ("prenom", "Marie Claire"), ("nom", "Dupont"),
            ("email", "mc@example.com"), ("phone", "0601020304"), ("kind", "interne"),
        ]));
        assert_eq!(f.validate().unwrap()["prenom"], "Marie Claire");

        let f = FormateurForm { name: "Marie Durand".to_owned(), ..f };
        let payload = f.validate().unwrap();
        assert_eq!(payload["prenom"], "Marie");
        assert_eq!(payload["nom"], "Durand");

        let p = Participant {
            id: "3".to_owned(),
            nom: "de la Tour".to_owned(),
            prenom: "Anne Sophie".to_owned(),
            email: "as@example.com".to_owned(),
            tel: "0600000000".to_owned(),
            ..Participant::default()
        };
        let payload = ParticipantForm::from_entity(&p).validate().unwrap();
        assert_eq!(payload["prenom"], "Anne Sophie");
        assert_eq!(payload["nom"], "de la Tour");
    }

    #[test]
    fn participant_without_links() {
        let f = ParticipantForm::from_pairs(&pairs(&[
            ("name", "Sophie Martin"),
            ("email", "sophie@example.com"),
            ("phone", "0698765432"),
        ]));
        let payload = f.validate().unwrap();
        assert_eq!(payload["structure"], Value::Null);
        assert_eq!(payload["profil"], Value::Null);
        assert_eq!(payload["prenom"], "Sophie");
    }

    #[test]
    fn participant_details() {
        let p: Participant = serde_json::from_value(json!({
            "id": "1", "nom": "Benali", "prenom": "Ahmed", "email": "a@b.co",
            "profil": { "id": 2, "libelle": "Cadre" }
        })).unwrap();
        let details = p.details();
        assert!(details.contains(&("Structure", "No Structure".to_owned())));
        assert!(details.contains(&("Profil", "Cadre".to_owned())));
        assert_eq!(ParticipantForm::from_entity(&p).profil_id, "2");
    }

    #[test]
    fn utilisateur_rules() {
        let f = UtilisateurForm::from_pairs(&pairs(&[
            ("login", "marie"), ("password", "12345"), ("role_id", ""),
        ]));
        let errors = f.validate().unwrap_err();
        assert_eq!(errors["password"], "Password must be at least 6 characters.");
        assert_eq!(errors["role_id"], "Please select a role.");

        let f = UtilisateurForm { password: "secret1".to_owned(), role_id: "2".to_owned(), ..f };
        assert_eq!(f.validate().unwrap(), json!({
            "login": "marie", "password": "secret1", "role": { "id": "2" }
        }));
    }

    #[test]
    fn passwords_stay_hidden() {
        let u: Utilisateur = serde_json::from_value(json!({
            "id": "1", "login": "marie", "password": "secret1", "role": { "id": "2", "nom": "responsable" }
        })).unwrap();
        assert!(serde_json::to_value(&u).unwrap().get("password").is_none());
        assert_eq!(UtilisateurForm::from_entity(&u).password, "");
        assert_eq!(u.cells(), vec!["marie", "responsable"]);
    }
}
