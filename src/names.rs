use std::collections::HashSet;
use std::fmt;

use speaker_types::Gender;

use crate::lexicon::Lexicon;

/// Lowercase particles that belong to the surname ("de Winter", "von Kramm").
pub const NAME_PARTICLES: &[&str] = &["de", "von", "van", "du", "da", "di"];

// ── Parsed person name ─────────────────────────────────────────────

/// Structured reading of a PERSON string. Any part may be missing; a
/// missing part never contradicts anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub gender: Option<Gender>,
    pub honorific: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Nicknames of the first name, from the hypocorism table
    pub name_variants: Vec<String>,
}

impl Person {
    /// Both carry an honorific and they differ ("Mr. Smith" / "Mrs. Smith").
    pub fn honorific_differs(&self, other: &Person) -> bool {
        matches!((&self.honorific, &other.honorific), (Some(a), Some(b)) if a != b)
    }

    /// Every part present in `self` is equal in `other`.
    pub fn is_subset_of(&self, other: &Person) -> bool {
        fn part_fits(mine: &Option<String>, theirs: &Option<String>) -> bool {
            match mine {
                Some(m) => theirs.as_ref() == Some(m),
                None => true,
            }
        }
        part_fits(&self.honorific, &other.honorific)
            && part_fits(&self.first_name, &other.first_name)
            && part_fits(&self.last_name, &other.last_name)
    }

    /// Same first name, or one is listed as a nickname of the other.
    pub fn first_names_variant(&self, other: &Person) -> bool {
        let (Some(mine), Some(theirs)) = (&self.first_name, &other.first_name) else {
            return false;
        };
        mine == theirs || other.name_variants.contains(mine) || self.name_variants.contains(theirs)
    }

    /// Conflicting first names or conflicting last names.
    pub fn name_part_differs(&self, other: &Person) -> bool {
        let differ = |a: &Option<String>, b: &Option<String>| matches!((a, b), (Some(x), Some(y)) if x != y);
        differ(&self.first_name, &other.first_name) || differ(&self.last_name, &other.last_name)
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.honorific, &self.first_name, &self.last_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

// ── Parser ─────────────────────────────────────────────────────────

/// Splits PERSON strings into honorific / first / last name.
///
/// First and last names are also learned from the corpus itself: every
/// multi-token name contributes its first and last part, which later
/// decides how a bare single token ("Holmes", "Irene") is read.
pub struct NameParser<'a> {
    lexicon: &'a Lexicon,
    first_names: HashSet<String>,
    last_names: HashSet<String>,
}

impl<'a> NameParser<'a> {
    pub fn new<S: AsRef<str>>(lexicon: &'a Lexicon, names: &[S]) -> Self {
        let mut parser = NameParser {
            lexicon,
            first_names: HashSet::new(),
            last_names: HashSet::new(),
        };

        for full_name in names {
            let (_, rest) = parser.split_honorific(full_name.as_ref());
            if rest.split_whitespace().count() < 2 {
                continue;
            }
            let (_, first, last) = parser.parse_name(full_name.as_ref());
            parser.first_names.extend(first);
            parser.last_names.extend(last);
        }
        parser
    }

    /// Full structured reading, including gender and nicknames.
    pub fn parse(&self, full_name: &str) -> Person {
        let (honorific, first_name, last_name) = self.parse_name(full_name);
        let gender = self.gender(honorific.as_deref(), first_name.as_deref());
        let name_variants = first_name
            .as_ref()
            .and_then(|f| self.lexicon.variants.get(f))
            .cloned()
            .unwrap_or_default();
        Person {
            gender,
            honorific,
            first_name,
            last_name,
            name_variants,
        }
    }

    /// Positional split into (honorific, first name, last name).
    pub fn parse_name(&self, full_name: &str) -> (Option<String>, Option<String>, Option<String>) {
        let (honorific, rest) = self.split_honorific(full_name);
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let honorific_gender = honorific.as_deref().and_then(|h| self.gender(Some(h), None));

        let (first, last) = match parts.as_slice() {
            [] => (None, None),
            [single] => {
                if self.last_names.contains(*single) {
                    (None, Some(single.to_string()))
                } else if self.first_names.contains(*single) || self.is_gendered_first_name(single, honorific_gender) {
                    (Some(single.to_string()), None)
                } else {
                    (None, Some(single.to_string()))
                }
            }
            [first, last] => {
                if NAME_PARTICLES.contains(&first.to_lowercase().as_str()) {
                    (None, Some(parts.join(" ")))
                } else {
                    (Some(first.to_string()), Some(last.to_string()))
                }
            }
            [first, rest @ ..] if rest.len() == 2 => (Some(first.to_string()), Some(rest.join(" "))),
            _ => (Some(parts[..2].join(" ")), Some(parts[2..].join(" "))),
        };

        (honorific, first, last)
    }

    /// Honorific decides first; otherwise the first-name lists.
    pub fn gender(&self, honorific: Option<&str>, first_name: Option<&str>) -> Option<Gender> {
        honorific
            .and_then(|h| self.lexicon.honorifics.gender_of(h))
            .or_else(|| first_name.and_then(|f| self.lexicon.first_name_gender(f)))
    }

    /// Strip a leading honorific token, if the first token is one.
    pub fn split_honorific(&self, full_name: &str) -> (Option<String>, String) {
        let mut parts = full_name.split_whitespace();
        match parts.next() {
            Some(first) if self.lexicon.is_honorific(first) => {
                (Some(first.to_string()), parts.collect::<Vec<_>>().join(" "))
            }
            _ => (None, full_name.to_string()),
        }
    }

    /// A gazetteer first name, checked against the list matching the
    /// honorific's gender when there is one.
    fn is_gendered_first_name(&self, name: &str, honorific_gender: Option<Gender>) -> bool {
        match honorific_gender {
            Some(Gender::Female) => self.lexicon.female_names.contains(name),
            Some(Gender::Male) => self.lexicon.male_names.contains(name),
            None => self.lexicon.female_names.contains(name) || self.lexicon.male_names.contains(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::test_lexicon;

    fn parts(p: &Person) -> (Option<&str>, Option<&str>, Option<&str>) {
        (p.honorific.as_deref(), p.first_name.as_deref(), p.last_name.as_deref())
    }

    #[test]
    fn test_honorific_and_two_tokens() {
        let lexicon = test_lexicon();
        let parser = NameParser::new(&lexicon, &["Mr. Sherlock Holmes"]);
        let p = parser.parse("Mr. Sherlock Holmes");
        assert_eq!(parts(&p), (Some("Mr."), Some("Sherlock"), Some("Holmes")));
        assert_eq!(p.gender, Some(Gender::Male));
    }

    #[test]
    fn test_single_token_uses_corpus_names() {
        let lexicon = test_lexicon();
        let parser = NameParser::new(&lexicon, &["Sherlock Holmes", "Holmes", "Sherlock"]);
        assert_eq!(parts(&parser.parse("Holmes")), (None, None, Some("Holmes")));
        assert_eq!(parts(&parser.parse("Sherlock")), (None, Some("Sherlock"), None));
    }

    #[test]
    fn test_single_token_gazetteer_with_honorific_gender() {
        let lexicon = test_lexicon();
        let parser = NameParser::new(&lexicon, &["Miss Irene", "Mr. Irene"]);
        assert_eq!(parts(&parser.parse("Miss Irene")), (Some("Miss"), Some("Irene"), None));
        // Male honorific with a female-list name: read as a surname
        assert_eq!(parts(&parser.parse("Mr. Irene")), (Some("Mr."), None, Some("Irene")));
        // Unknown token defaults to a last name
        assert_eq!(parts(&parser.parse("Lestrade")), (None, None, Some("Lestrade")));
    }

    #[test]
    fn test_particle_joins_last_name() {
        let lexicon = test_lexicon();
        let parser = NameParser::new(&lexicon, &["von Kramm"]);
        assert_eq!(parts(&parser.parse("von Kramm")), (None, None, Some("von Kramm")));
    }

    #[test]
    fn test_three_and_four_tokens() {
        let lexicon = test_lexicon();
        let parser = NameParser::new::<&str>(&lexicon, &[]);
        assert_eq!(
            parts(&parser.parse("Irene Adler Norton")),
            (None, Some("Irene"), Some("Adler Norton"))
        );
        assert_eq!(
            parts(&parser.parse("John Hamish Watson Jr")),
            (None, Some("John Hamish"), Some("Watson Jr"))
        );
    }

    #[test]
    fn test_gender_from_first_name_and_variants() {
        let lexicon = test_lexicon();
        let parser = NameParser::new::<&str>(&lexicon, &[]);
        let p = parser.parse("William Wilson");
        assert_eq!(p.gender, Some(Gender::Male));
        assert_eq!(p.name_variants, vec!["Bill", "Will"]);
        assert_eq!(parser.parse("Dr. Watson").gender, None);
    }

    #[test]
    fn test_person_comparisons() {
        let lexicon = test_lexicon();
        let parser = NameParser::new(&lexicon, &["Mr. John Smith", "Bill Turner"]);
        let mr_smith = parser.parse("Mr. Smith");
        let smith = parser.parse("Smith");
        let mrs_smith = parser.parse("Mrs. Smith");
        let john = parser.parse("Mr. John Smith");

        assert!(!mr_smith.honorific_differs(&smith));
        assert!(mr_smith.honorific_differs(&mrs_smith));
        assert!(smith.is_subset_of(&mr_smith));
        assert!(mr_smith.is_subset_of(&john));
        assert!(!mrs_smith.is_subset_of(&john));
        assert!(!smith.name_part_differs(&john));

        let william = parser.parse("William Turner");
        let bill = parser.parse("Bill Turner");
        assert!(william.first_names_variant(&bill));
        assert!(bill.first_names_variant(&william));
        assert!(william.name_part_differs(&bill));
        assert!(!william.first_names_variant(&smith));
    }

    #[test]
    fn test_display_skips_missing_parts() {
        let lexicon = test_lexicon();
        let parser = NameParser::new::<&str>(&lexicon, &[]);
        assert_eq!(parser.parse("Mrs.  Hudson").to_string(), "Mrs. Hudson");
    }
}
