/*!
The small reference tables: domaines, structures, profils, employeurs
and roles. Each is an id plus a single label.
*/
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::*;

/// Form shared by the three tables whose only field is `libelle`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LibelleForm<E> {
    pub libelle: String,
    _entity: std::marker::PhantomData<E>,
}

impl<E> LibelleForm<E> {
    pub fn new(libelle: &str) -> Self {
        Self { libelle: libelle.to_owned(), _entity: std::marker::PhantomData }
    }
}

macro_rules! libelle_entity {
    ($name:ident, $resource:expr) => {
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(deserialize_with = "de_id")]
            pub id: String,
            #[serde(default, deserialize_with = "de_null_default")]
            pub libelle: String,
        }

        impl Entity for $name {
            const RESOURCE: Resource = $resource;
            type Form = LibelleForm<$name>;

            fn id(&self) -> &str { &self.id }
            fn label(&self) -> String { self.libelle.clone() }
            fn columns() -> &'static [&'static str] { &["Libellé"] }
            fn cells(&self) -> Vec<String> { vec![self.libelle.clone()] }
            fn details(&self) -> Vec<(&'static str, String)> {
                vec![("ID", self.id.clone()), ("Libellé", self.libelle.clone())]
            }
        }

        #[async_trait]
        impl EntityForm for LibelleForm<$name> {
            type Entity = $name;

            fn from_pairs(pairs: &[(String, String)]) -> Self {
                LibelleForm::new(&pair_value(pairs, "libelle"))
            }

            fn from_entity(e: &$name) -> Self { LibelleForm::new(&e.libelle) }

            fn validate(&self) -> Result<Value, FieldErrors> {
                let mut errors = FieldErrors::new();
                check_min_len(&mut errors, "libelle", &self.libelle, 2, "Label");
                if !errors.is_empty() {
                    return Err(errors);
                }
                Ok(json!({ "libelle": &self.libelle }))
            }

            fn fields(&self) -> Vec<Field> {
                vec![Field::text("libelle", "Libellé", &self.libelle)]
            }
        }
    };
}

libelle_entity!(Domaine, Resource::Domaine);
libelle_entity!(Structure, Resource::Structure);
libelle_entity!(Profil, Resource::Profil);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Employeur {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub nomemployeur: String,
}

impl Entity for Employeur {
    const RESOURCE: Resource = Resource::Employeur;
    type Form = EmployeurForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { self.nomemployeur.clone() }
    fn columns() -> &'static [&'static str] { &["Nom"] }
    fn cells(&self) -> Vec<String> { vec![self.nomemployeur.clone()] }
    fn details(&self) -> Vec<(&'static str, String)> {
        vec![("ID", self.id.clone()), ("Nom", self.nomemployeur.clone())]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmployeurForm {
    pub nom_employeur: String,
}

#[async_trait]
impl EntityForm for EmployeurForm {
    type Entity = Employeur;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self { nom_employeur: pair_value(pairs, "nom_employeur") }
    }

    fn from_entity(e: &Employeur) -> Self {
        Self { nom_employeur: e.nomemployeur.clone() }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "nom_employeur", &self.nom_employeur, 2, "Employer name");
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(json!({ "nomemployeur": &self.nom_employeur }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![Field::text("nom_employeur", "Nom de l'employeur", &self.nom_employeur)]
    }
}

/// An access level as stored by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub nom: String,
}

impl Entity for RoleRecord {
    const RESOURCE: Resource = Resource::Role;
    type Form = RoleForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { self.nom.clone() }
    fn columns() -> &'static [&'static str] { &["Nom"] }
    fn cells(&self) -> Vec<String> { vec![self.nom.clone()] }
    fn details(&self) -> Vec<(&'static str, String)> {
        vec![("ID", self.id.clone()), ("Nom", self.nom.clone())]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleForm {
    pub name: String,
}

#[async_trait]
impl EntityForm for RoleForm {
    type Entity = RoleRecord;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self { name: pair_value(pairs, "name") }
    }

    fn from_entity(e: &RoleRecord) -> Self {
        Self { name: e.nom.clone() }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "name", &self.name, 2, "Name");
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(json!({ "nom": &self.name }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![Field::text("name", "Nom", &self.name)]
    }
}
