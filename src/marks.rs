//! Links tokens to resolved characters: a name lookup over every variant,
//! and a side table of `(unit, token) → character id` filled from
//! coreference clusters and exact name matches.

use std::collections::HashMap;

use speaker_types::{Character, EntityLabel, Gender, TokenCharacter};

use crate::config::NARRATOR_NAME;
use crate::document::Document;
use crate::lexicon::Lexicon;

/// Variant name → character, plus each character's gender.
#[derive(Debug, Clone, Default)]
pub struct CharacterIndex {
    by_name: HashMap<String, usize>,
    genders: HashMap<usize, Gender>,
}

impl CharacterIndex {
    pub fn new(characters: &[Character]) -> Self {
        let mut index = CharacterIndex::default();
        for character in characters {
            index.genders.insert(character.id, character.gender);
            for variant in &character.variants {
                index.by_name.entry(variant.name.clone()).or_insert(character.id);
            }
        }
        index
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn gender(&self, id: usize) -> Option<Gender> {
        self.genders.get(&id).copied()
    }

    /// A known gender that disagrees with the character's is the only
    /// contradiction; missing information never contradicts.
    pub fn compatible(&self, id: usize, gender: Option<Gender>) -> bool {
        match gender {
            Some(g) => self.gender(id) == Some(g),
            None => true,
        }
    }
}

/// Token-level character assignments.
#[derive(Debug, Clone, Default)]
pub struct CharacterMarks {
    marks: HashMap<(usize, usize), usize>,
}

impl CharacterMarks {
    pub fn get(&self, unit: usize, token: usize) -> Option<usize> {
        self.marks.get(&(unit, token)).copied()
    }

    pub fn set(&mut self, unit: usize, token: usize, character: usize) {
        self.marks.insert((unit, token), character);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Every mark, in reading order.
    pub fn rows(&self) -> Vec<TokenCharacter> {
        let mut rows: Vec<TokenCharacter> = self
            .marks
            .iter()
            .map(|(&(unit, token), &character)| TokenCharacter { unit, token, character })
            .collect();
        rows.sort_by_key(|r| (r.unit, r.token));
        rows
    }

    /// Mark coreference members with their cluster's character, then
    /// entity roots and tokens that spell a variant name exactly.
    pub fn mark(doc: &Document, index: &CharacterIndex, lexicon: &Lexicon) -> Self {
        let mut marks = CharacterMarks::default();

        for cluster in doc.clusters() {
            let mut ids: Vec<usize> = Vec::new();
            for member in &cluster.members {
                if let Some(id) = index.id_of(&member.text) {
                    ids.push(id);
                    continue;
                }
                let root = doc.root(member.unit, member.start, member.end);
                let Some(entity) = doc.entity_rooted_at(member.unit, root) else {
                    continue;
                };
                let name = match entity.label {
                    EntityLabel::NamelessCharacter => entity.nameless_name.as_deref(),
                    EntityLabel::Narrator => Some(NARRATOR_NAME),
                    EntityLabel::Person => None,
                };
                if let Some(id) = name.and_then(|n| index.id_of(n)) {
                    ids.push(id);
                }
            }
            if ids.is_empty() {
                continue;
            }
            let ranked = rank_by_frequency(&ids);

            for member in &cluster.members {
                let root = doc.root(member.unit, member.start, member.end);
                let gender = lexicon.word_gender(&doc.unit(member.unit).tokens[root].text);
                let chosen = ranked.iter().copied().find(|&id| index.compatible(id, gender));
                if let Some(id) = chosen {
                    marks.marks.entry((member.unit, root)).or_insert(id);
                }
            }
        }

        for u in 0..doc.len() {
            for entity in doc.entities(u) {
                if let Some(id) = index.id_of(&doc.entity_text(u, entity)) {
                    marks.set(u, doc.root(u, entity.start, entity.end), id);
                }
            }
            for (t, token) in doc.unit(u).tokens.iter().enumerate() {
                if let Some(id) = index.id_of(&token.text) {
                    marks.set(u, t, id);
                }
            }
        }

        tracing::info!(tokens = marks.len(), "characters marked in coreference");
        marks
    }
}

/// Distinct ids, most frequent first; ties keep first-seen order.
pub fn rank_by_frequency(ids: &[usize]) -> Vec<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for &id in ids {
        match counts.iter_mut().find(|(c, _)| *c == id) {
            Some((_, n)) => *n += 1,
            None => counts.push((id, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(id, _)| id).collect()
}
