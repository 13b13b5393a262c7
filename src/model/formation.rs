/*!
Formations: the training programs themselves.
*/
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::actions;
use super::*;

/// Submitted by the formateur select when nobody is assigned.
const NO_FORMATEUR: &str = "none";

const MAX_BUDGET: f64 = 1_000_000_000.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub titre: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub annee: i64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub duree: i64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub budget: f64,
    #[serde(default)]
    pub domaine: Option<Link>,
    #[serde(default)]
    pub formateur: Option<Link>,
    #[serde(default)]
    pub participants: Option<Vec<Link>>,
}

impl Formation {
    pub fn participant_links(&self) -> &[Link] {
        self.participants.as_deref().unwrap_or_default()
    }
}

impl Entity for Formation {
    const RESOURCE: Resource = Resource::Formation;
    type Form = FormationForm;

    fn id(&self) -> &str { &self.id }
    fn label(&self) -> String { self.titre.clone() }

    fn columns() -> &'static [&'static str] {
        &["Titre", "Année", "Durée (jours)", "Domaine", "Budget"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.titre.clone(),
            self.annee.to_string(),
            self.duree.to_string(),
            link_label(&self.domaine, "-"),
            format_euros(self.budget),
        ]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        let participants: Vec<String> = self.participant_links()
            .iter()
            .map(Link::label)
            .collect();
        let participants = if participants.is_empty() {
            "Aucun".to_owned()
        } else {
            participants.join(", ")
        };

        vec![
            ("ID", self.id.clone()),
            ("Titre", self.titre.clone()),
            ("Année", self.annee.to_string()),
            ("Durée (jours)", self.duree.to_string()),
            ("Domaine", link_label(&self.domaine, "Unknown")),
            ("Formateur", link_label(&self.formateur, "Aucun")),
            ("Budget", format_euros(self.budget)),
            ("Participants", participants),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormationForm {
    pub titre: String,
    pub annee: String,
    pub duree: String,
    pub budget: String,
    pub domaine_id: String,
    pub formateur_id: String,
    pub participant_ids: Vec<String>,
}

#[async_trait]
impl EntityForm for FormationForm {
    type Entity = Formation;

    fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            titre: pair_value(pairs, "titre"),
            annee: pair_value(pairs, "annee"),
            duree: pair_value(pairs, "duree"),
            budget: pair_value(pairs, "budget"),
            domaine_id: pair_value(pairs, "domaine_id"),
            formateur_id: pair_value(pairs, "formateur_id"),
            participant_ids: pair_values(pairs, "participant_ids"),
        }
    }

    fn from_entity(e: &Formation) -> Self {
        Self {
            titre: e.titre.clone(),
            annee: e.annee.to_string(),
            duree: e.duree.to_string(),
            budget: e.budget.to_string(),
            domaine_id: e.domaine.as_ref().map(|l| l.id.clone()).unwrap_or_default(),
            formateur_id: e.formateur.as_ref()
                .map(|l| l.id.clone())
                .unwrap_or_else(|| NO_FORMATEUR.to_owned()),
            participant_ids: e.participant_links().iter().map(|l| l.id.clone()).collect(),
        }
    }

    fn validate(&self) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_min_len(&mut errors, "titre", &self.titre, 2, "Title");
        let annee = check_int(&mut errors, "annee", &self.annee, 2000, "Year");
        let duree = check_int(&mut errors, "duree", &self.duree, 1, "Duration");
        let budget = check_number(&mut errors, "budget", &self.budget, 0.0, MAX_BUDGET, "Budget");
        check_required(&mut errors, "domaine_id", &self.domaine_id, "Please select a domain.");

        let (annee, duree, budget) = match (annee, duree, budget) {
            (Some(a), Some(d), Some(b)) if errors.is_empty() => (a, d, b),
            _ => { return Err(errors); },
        };

        let formateur = if self.formateur_id == NO_FORMATEUR {
            ""
        } else {
            self.formateur_id.as_str()
        };

        let participants: Vec<Value> = self.participant_ids.iter()
            .map(|id| json!({ "id": id }))
            .collect();

        Ok(json!({
            "titre": &self.titre,
            "annee": annee,
            "duree": duree,
            "budget": budget,
            "domaine": link_payload(&self.domaine_id),
            "formateur": link_payload(formateur),
            "participants": participants,
        }))
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::text("titre", "Titre", &self.titre),
            Field::number("annee", "Année", &self.annee),
            Field::number("duree", "Durée (jours)", &self.duree),
            Field::select("domaine_id", "Domaine", &self.domaine_id)
                .or_none("", "Choisir un domaine"),
            Field::number("budget", "Budget (EUR)", &self.budget),
            Field::select("formateur_id", "Formateur", &self.formateur_id)
                .or_none(NO_FORMATEUR, "Aucun"),
            Field::multi("participant_ids", "Participants", &self.participant_ids),
        ]
    }

    async fn choices(backend: &dyn Backend) -> Choices {
        let (domaines, formateurs, participants) = tokio::join!(
            actions::list::<Domaine>(backend),
            actions::list::<Formateur>(backend),
            actions::list::<Participant>(backend),
        );

        let mut choices = Choices::new();
        choices.insert("domaine_id", to_choices(&domaines.data.unwrap_or_default()));
        choices.insert("formateur_id", to_choices(&formateurs.data.unwrap_or_default()));
        choices.insert("participant_ids", to_choices(&participants.data.unwrap_or_default()));
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
    fn payload() {
        let f = FormationForm::from_pairs(&pairs(&[
            ("titre", "Anglais professionnel"),
            ("annee", "2025"),
            ("duree", "3"),
            ("budget", "1500.50"),
            ("domaine_id", "3"),
            ("formateur_id", "none"),
            ("participant_ids", "1"),
            ("participant_ids", "2"),
        ]));
        assert_eq!(f.validate().unwrap(), json!({
            "titre": "Anglais professionnel",
            "annee": 2025,
            "duree": 3,
            "budget": 1500.5,
            "domaine": { "id": "3" },
            "formateur": null,
            "participants": [ { "id": "1" }, { "id": "2" } ],
        }));
    }

    #[test]
    fn rules() {
        let f = FormationForm::from_pairs(&pairs(&[
            ("titre", "A"),
            ("annee", "1999"),
            ("duree", "zero"),
            ("budget", "-5"),
        ]));
        let errors = f.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert_eq!(errors["annee"], "Year must be at least 2000.");
        assert_eq!(errors["duree"], "Duration must be a whole number.");
        assert_eq!(errors["domaine_id"], "Please select a domain.");

        // Numbers fine, title too short: still rejected.
        let f = FormationForm::from_pairs(&pairs(&[
            ("titre", "A"), ("annee", "2024"), ("duree", "2"),
            ("budget", "0"), ("domaine_id", "1"),
        ]));
        assert_eq!(f.validate().unwrap_err().len(), 1);

        let f = FormationForm::from_pairs(&pairs(&[
            ("titre", "Audit"), ("annee", "2024"), ("duree", "2"),
            ("budget", "1e300"), ("domaine_id", "1"),
        ]));
        assert_eq!(f.validate().unwrap_err()["budget"], "Budget must be at most 1000000000.");
    }

    #[test]
    fn from_backend() {
        let e: Formation = serde_json::from_value(json!({
            "id": 1, "titre": "Web", "annee": 2024, "duree": 5, "budget": 12500,
            "domaine": { "id": 1, "libelle": "Informatique" },
            "formateur": null,
            "participants": [ { "id": 1, "nom": "Benali", "prenom": "Ahmed" } ]
        })).unwrap();

        assert_eq!(e.cells()[4], "12\u{202f}500,00\u{a0}€");
        assert_eq!(e.cells()[3], "Informatique");

        let f = FormationForm::from_entity(&e);
        assert_eq!(f.formateur_id, "none");
        assert_eq!(f.participant_ids, vec!["1".to_owned()]);
        assert_eq!(f.validate().unwrap()["formateur"], Value::Null);

        let details = e.details();
        assert!(details.contains(&("Participants", "Ahmed Benali".to_owned())));
    }
}
