//! Verb catalog and display-language resolution
//!
//! Statements always carry a single display entry: the configured language
//! when the verb has a translation for it, otherwise `en-US`.

use crate::config::DEFAULT_LANG;
use crate::error::{Result, TrackerError};
use lrs_client::{language_map, LanguageMap, Verb};
use std::collections::BTreeMap;
use tracing::error;

const ADL_VERB_BASE: &str = "http://adlnet.gov/expapi/verbs/";
const W3ID_VERB_BASE: &str = "https://w3id.org/xapi/adl/verbs/";

/// key, [(en-US, de-DE, fr-FR, es-ES)]
const ADL_VERBS: &[(&str, [&str; 4])] = &[
    ("answered", ["answered", "beantwortete", "a répondu", "contestó"]),
    ("asked", ["asked", "fragte", "a demandé", "preguntó"]),
    ("attempted", ["attempted", "versuchte", "a essayé", "intentó"]),
    ("attended", ["attended", "nahm teil an", "a suivi", "asistió"]),
    ("commented", ["commented", "kommentierte", "a commenté", "comentó"]),
    ("completed", ["completed", "beendete", "a terminé", "completó"]),
    ("exited", ["exited", "verließ", "a quitté", "salió"]),
    ("experienced", ["experienced", "erlebte", "a éprouvé", "experimentó"]),
    ("failed", ["failed", "verfehlte", "a échoué", "fracasó"]),
    ("imported", ["imported", "importierte", "a importé", "importó"]),
    ("initialized", ["initialized", "initialisierte", "a initialisé", "inicializó"]),
    ("interacted", ["interacted", "interagierte", "a interagi", "interactuó"]),
    ("launched", ["launched", "startete", "a lancé", "lanzó"]),
    ("mastered", ["mastered", "meisterte", "a maîtrisé", "dominó"]),
    ("passed", ["passed", "bestand", "a réussi", "aprobó"]),
    ("preferred", ["preferred", "bevorzugte", "a préféré", "prefirió"]),
    ("progressed", ["progressed", "machte Fortschritt mit", "a progressé", "progresó"]),
    ("registered", ["registered", "registrierte", "a enregistré", "registró"]),
    ("responded", ["responded", "reagierte", "a répondu", "respondió"]),
    ("resumed", ["resumed", "setzte fort", "a repris", "continuó"]),
    ("scored", ["scored", "erreichte", "a marqué", "anotó"]),
    ("shared", ["shared", "teilte", "a partagé", "compartió"]),
    ("suspended", ["suspended", "pausierte", "a suspendu", "aplazó"]),
    ("terminated", ["terminated", "beendete", "a terminé", "terminó"]),
    ("voided", ["voided", "entwertete", "a annulé", "anuló"]),
];

const CATALOG_LANGS: [&str; 4] = ["en-US", "de-DE", "fr-FR", "es-ES"];

/// Verbs from the ADL profile vocabulary, English only
const W3ID_VERBS: &[&str] = &["abandoned", "satisfied", "waived"];

/// A verb given either by catalog key or as a full verb object
#[derive(Debug, Clone, Copy)]
pub enum VerbRef<'a> {
    Key(&'a str),
    Verb(&'a Verb),
}

impl<'a> From<&'a str> for VerbRef<'a> {
    fn from(key: &'a str) -> Self {
        VerbRef::Key(key)
    }
}

impl<'a> From<&'a Verb> for VerbRef<'a> {
    fn from(verb: &'a Verb) -> Self {
        VerbRef::Verb(verb)
    }
}

/// Canonical verbs keyed by lowercase name
#[derive(Debug, Clone)]
pub struct VerbCatalog {
    verbs: BTreeMap<String, Verb>,
}

impl Default for VerbCatalog {
    fn default() -> Self {
        Self::adl()
    }
}

impl VerbCatalog {
    /// The ADL verb vocabulary
    pub fn adl() -> Self {
        let mut verbs = BTreeMap::new();

        for (key, displays) in ADL_VERBS {
            let display: LanguageMap = CATALOG_LANGS
                .iter()
                .zip(displays.iter())
                .map(|(lang, text)| (lang.to_string(), text.to_string()))
                .collect();
            verbs.insert(
                key.to_string(),
                Verb {
                    id: format!("{}{}", ADL_VERB_BASE, key),
                    display,
                },
            );
        }

        for key in W3ID_VERBS {
            verbs.insert(
                key.to_string(),
                Verb {
                    id: format!("{}{}", W3ID_VERB_BASE, key),
                    display: language_map(DEFAULT_LANG, *key),
                },
            );
        }

        Self { verbs }
    }

    /// Add or replace a verb
    pub fn insert(&mut self, key: &str, verb: Verb) {
        self.verbs.insert(key.to_lowercase(), verb);
    }

    pub fn get(&self, key: &str) -> Option<&Verb> {
        self.verbs.get(&key.to_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.verbs.keys().map(String::as_str)
    }

    /// Resolve a verb to a single display entry in `lang`.
    ///
    /// Falls back to `en-US`, then to whatever single entry the verb has.
    pub fn resolve<'a>(&self, verb: impl Into<VerbRef<'a>>, lang: &str) -> Result<Verb> {
        let verb = match verb.into() {
            VerbRef::Key(key) => self.get(key).ok_or_else(|| {
                error!(verb = %key, "Verb does not exist in the catalog");
                TrackerError::UnknownVerb(key.to_string())
            })?,
            VerbRef::Verb(verb) => verb,
        };

        let entry = [lang, DEFAULT_LANG]
            .iter()
            .find_map(|l| {
                verb.display
                    .get_key_value(*l)
                    .filter(|(_, text)| !text.is_empty())
            })
            .or_else(|| verb.display.iter().find(|(_, text)| !text.is_empty()));

        match entry {
            Some((l, text)) => Ok(Verb {
                id: verb.id.clone(),
                display: language_map(l.clone(), text.clone()),
            }),
            None => Err(TrackerError::UnknownVerb(format!("{} has no display", verb.id))),
        }
    }
}
