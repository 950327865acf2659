//! Language resources: honorifics, kinship terms, gendered first names,
//! nicknames, gendered common nouns and the nameless-character stop-list.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use speaker_types::Gender;

use crate::error::{Error, Result};

pub const HONORIFICS_FILE: &str = "honorifics.json";
pub const RELATIONS_FILE: &str = "relations.json";
pub const FEMALE_NAMES_FILE: &str = "female.txt";
pub const MALE_NAMES_FILE: &str = "male.txt";
pub const HYPOCORISMS_FILE: &str = "hypocorisms.txt";
pub const GENDERED_WORDS_FILE: &str = "gendered_words.json";
pub const STOPLIST_FILE: &str = "stop-list.txt";

/// Terms split by the gender they imply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenderedTerms {
    pub woman: Vec<String>,
    pub man: Vec<String>,
    #[serde(default)]
    pub other: Vec<String>,
}

impl GenderedTerms {
    pub fn contains(&self, term: &str) -> bool {
        self.iter().any(|t| t == term)
    }

    pub fn gender_of(&self, term: &str) -> Option<Gender> {
        if self.woman.iter().any(|t| t == term) {
            Some(Gender::Female)
        } else if self.man.iter().any(|t| t == term) {
            Some(Gender::Male)
        } else {
            None
        }
    }

    fn iter(&self) -> impl Iterator<Item = &String> {
        self.woman.iter().chain(&self.man).chain(&self.other)
    }
}

#[derive(Deserialize)]
struct GenderedWord {
    word: String,
    gender: String,
}

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    pub honorifics: GenderedTerms,
    pub relations: GenderedTerms,
    pub female_names: HashSet<String>,
    pub male_names: HashSet<String>,
    /// First name → its nicknames / alternate spellings
    pub variants: HashMap<String, Vec<String>>,
    /// Lowercased common word → gender it implies ("sister" → F)
    pub gendered_words: HashMap<String, Gender>,
    pub stoplist: HashSet<String>,
}

impl Lexicon {
    /// Load every resource file from `dir`. Each one is required.
    pub fn load(dir: &Path) -> Result<Self> {
        let lexicon = Lexicon {
            honorifics: read_json(&dir.join(HONORIFICS_FILE))?,
            relations: read_json(&dir.join(RELATIONS_FILE))?,
            female_names: read_list(&dir.join(FEMALE_NAMES_FILE))?.into_iter().collect(),
            male_names: read_list(&dir.join(MALE_NAMES_FILE))?.into_iter().collect(),
            variants: parse_variants(&read_list(&dir.join(HYPOCORISMS_FILE))?),
            gendered_words: parse_gendered_words(read_json(&dir.join(GENDERED_WORDS_FILE))?),
            stoplist: read_list(&dir.join(STOPLIST_FILE))?
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect(),
        };
        tracing::info!(
            honorifics = lexicon.honorifics.iter().count(),
            first_names = lexicon.female_names.len() + lexicon.male_names.len(),
            nicknames = lexicon.variants.len(),
            "language resources loaded from {}",
            dir.display()
        );
        Ok(lexicon)
    }

    pub fn is_honorific(&self, word: &str) -> bool {
        self.honorifics.contains(word)
    }

    pub fn is_relation(&self, word: &str) -> bool {
        self.relations.contains(word)
    }

    /// Gender implied by a common word, looked up case-insensitively.
    pub fn word_gender(&self, word: &str) -> Option<Gender> {
        self.gendered_words.get(&word.to_lowercase()).copied()
    }

    pub fn first_name_gender(&self, name: &str) -> Option<Gender> {
        if self.male_names.contains(name) {
            Some(Gender::Male)
        } else if self.female_names.contains(name) {
            Some(Gender::Female)
        } else {
            None
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|e| Error::resource(path, e))?;
    serde_json::from_str(&raw).map_err(|e| Error::resource(path, e))
}

/// Non-empty lines, skipping `#` comments.
fn read_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).map_err(|e| Error::resource(path, e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn parse_variants(lines: &[String]) -> HashMap<String, Vec<String>> {
    let mut variants = HashMap::new();
    for line in lines {
        let mut names = line.split_whitespace().map(String::from);
        if let Some(name) = names.next() {
            variants.insert(name, names.collect());
        }
    }
    variants
}

fn parse_gendered_words(words: Vec<GenderedWord>) -> HashMap<String, Gender> {
    words
        .into_iter()
        .filter_map(|w| {
            let gender = match w.gender.to_uppercase().as_str() {
                "F" => Gender::Female,
                "M" => Gender::Male,
                _ => return None,
            };
            Some((w.word.to_lowercase(), gender))
        })
        .collect()
}

/// Small in-memory lexicon shared by the unit tests.
#[cfg(test)]
pub(crate) fn test_lexicon() -> Lexicon {
    fn terms(woman: &[&str], man: &[&str], other: &[&str]) -> GenderedTerms {
        let own = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        GenderedTerms {
            woman: own(woman),
            man: own(man),
            other: own(other),
        }
    }
    let set = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<HashSet<_>>();

    let mut variants = HashMap::new();
    variants.insert("William".to_string(), vec!["Bill".to_string(), "Will".to_string()]);
    variants.insert("Elizabeth".to_string(), vec!["Lizzy".to_string(), "Eliza".to_string()]);

    let gendered_words = [
        ("she", Gender::Female),
        ("her", Gender::Female),
        ("woman", Gender::Female),
        ("sister", Gender::Female),
        ("he", Gender::Male),
        ("him", Gender::Male),
        ("man", Gender::Male),
        ("brother", Gender::Male),
    ]
    .into_iter()
    .map(|(w, g)| (w.to_string(), g))
    .collect();

    Lexicon {
        honorifics: terms(&["Mrs.", "Miss", "Lady"], &["Mr.", "Sir", "Lord"], &["Dr."]),
        relations: terms(&["sister", "mother"], &["brother", "father"], &["cousin"]),
        female_names: set(&["Alice", "Elizabeth", "Irene", "Jane"]),
        male_names: set(&["Bob", "William", "John", "Sherlock"]),
        variants,
        gendered_words,
        stoplist: set(&["thing", "people"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn write_all(dir: &Path) {
        write(dir, HONORIFICS_FILE, r#"{"woman": ["Mrs."], "man": ["Mr."], "other": ["Dr."]}"#);
        write(dir, RELATIONS_FILE, r#"{"woman": ["aunt"], "man": ["uncle"]}"#);
        write(dir, FEMALE_NAMES_FILE, "# female first names\nIrene\n\nMary\n");
        write(dir, MALE_NAMES_FILE, "John\n");
        write(dir, HYPOCORISMS_FILE, "William Bill Will\nMargaret Peggy\n");
        write(
            dir,
            GENDERED_WORDS_FILE,
            r#"[{"word": "Sister", "gender": "f"}, {"word": "he", "gender": "m"}, {"word": "doctor", "gender": "n"}]"#,
        );
        write(dir, STOPLIST_FILE, "Thing\npeople\n");
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        let lexicon = Lexicon::load(dir.path()).unwrap();

        assert!(lexicon.is_honorific("Dr."));
        assert_eq!(lexicon.honorifics.gender_of("Mrs."), Some(Gender::Female));
        assert!(lexicon.is_relation("uncle"));
        assert!(lexicon.female_names.contains("Mary"));
        assert!(!lexicon.female_names.contains("# female first names"));
        assert_eq!(lexicon.variants["William"], vec!["Bill", "Will"]);
        assert_eq!(lexicon.word_gender("SISTER"), Some(Gender::Female));
        assert_eq!(lexicon.word_gender("doctor"), None);
        assert!(lexicon.stoplist.contains("thing"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        fs::remove_file(dir.path().join(MALE_NAMES_FILE)).unwrap();
        let err = Lexicon::load(dir.path()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains(MALE_NAMES_FILE));
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        write(dir.path(), HONORIFICS_FILE, r#"["Mr."]"#);
        assert!(Lexicon::load(dir.path()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_bundled_vocabulary_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("vocab");
        let lexicon = Lexicon::load(&dir).unwrap();
        assert!(lexicon.is_honorific("Mr."));
        assert_eq!(lexicon.first_name_gender("John"), Some(Gender::Male));
    }
}
