//! Speaker sieves: map each unit's mention (or its absence) to a
//! character id.

use speaker_types::{Gender, SpeakerAssignment};

use crate::config::{AttributionConfig, NARRATOR_NAME};
use crate::document::Document;
use crate::lexicon::Lexicon;
use crate::marks::{CharacterIndex, CharacterMarks};
use crate::mention::MentionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerSieve {
    ExactNameMatch,
    Coreference,
    ConversationalPattern,
    MajoritySpeaker,
}

impl SpeakerSieve {
    pub const ORDER: [SpeakerSieve; 4] = [
        SpeakerSieve::ExactNameMatch,
        SpeakerSieve::Coreference,
        SpeakerSieve::ConversationalPattern,
        SpeakerSieve::MajoritySpeaker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactNameMatch => "exact_name_match",
            Self::Coreference => "coreference",
            Self::ConversationalPattern => "conversational_pattern",
            Self::MajoritySpeaker => "majority_speaker",
        }
    }

    /// The chosen id, and the sieve to credit for it (majority speaker
    /// first tries the conversational pattern and credits that).
    pub fn run(&self, ctx: &SpeakerContext<'_>, table: &SpeakerTable, u: usize) -> Option<(usize, SpeakerSieve)> {
        match self {
            Self::ExactNameMatch => ctx.exact_name_match(u).map(|id| (id, *self)),
            Self::Coreference => ctx.coreference(u).map(|id| (id, *self)),
            Self::ConversationalPattern => ctx.conversational_pattern(table, u).map(|id| (id, *self)),
            Self::MajoritySpeaker => match ctx.conversational_pattern(table, u) {
                Some(id) => Some((id, Self::ConversationalPattern)),
                None => ctx.majority_speaker(table, u).map(|id| (id, *self)),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpeakerTable {
    entries: Vec<Option<(usize, SpeakerSieve)>>,
}

impl SpeakerTable {
    pub fn new(units: usize) -> Self {
        SpeakerTable {
            entries: vec![None; units],
        }
    }

    pub fn get(&self, u: usize) -> Option<usize> {
        self.entries.get(u).copied().flatten().map(|(id, _)| id)
    }

    pub fn sieve(&self, u: usize) -> Option<SpeakerSieve> {
        self.entries.get(u).copied().flatten().map(|(_, s)| s)
    }

    fn assign(&mut self, u: usize, id: usize, sieve: SpeakerSieve) -> bool {
        match self.entries.get_mut(u) {
            Some(slot) if slot.is_none() => {
                *slot = Some((id, sieve));
                true
            }
            _ => false,
        }
    }

    /// Neither neighboring unit is already attributed to `id`.
    fn differs_from_neighbors(&self, u: usize, id: usize) -> bool {
        let prev = u.checked_sub(1).and_then(|p| self.get(p));
        let next = self.get(u + 1);
        prev != Some(id) && next != Some(id)
    }
}

// ── Candidate speakers ─────────────────────────────────────────────

/// Token positions as offsets into the whole corpus.
struct Positions {
    offsets: Vec<i64>,
}

impl Positions {
    fn new(doc: &Document) -> Self {
        let mut offsets = Vec::with_capacity(doc.len());
        let mut total = 0i64;
        for u in 0..doc.len() {
            offsets.push(total);
            total += doc.unit_len(u) as i64;
        }
        Positions { offsets }
    }

    /// Tokens from `left` to `right`; zero when `right` lies in an
    /// earlier unit, negative when it is earlier in the same unit.
    fn distance(&self, left: (usize, usize), right: (usize, usize)) -> i64 {
        if left.0 > right.0 {
            return 0;
        }
        (self.offsets[right.0] + right.1 as i64) - (self.offsets[left.0] + left.1 as i64)
    }
}

/// For every unit with quotes, the characters marked in narrative text
/// within the window around its quotes, most frequent first.
pub fn candidate_speakers(doc: &Document, marks: &CharacterMarks, config: &AttributionConfig) -> Vec<Vec<usize>> {
    let positions = Positions::new(doc);
    let mentions: Vec<((usize, usize), usize)> = (0..doc.len())
        .flat_map(|u| (0..doc.unit_len(u)).map(move |t| (u, t)))
        .filter(|&(u, t)| !doc.is_direct(u, t))
        .filter_map(|(u, t)| marks.get(u, t).map(|id| ((u, t), id)))
        .collect();

    let mut candidates = vec![Vec::new(); doc.len()];
    let (mut left, mut right) = (0, 0);
    for (u, slot) in candidates.iter_mut().enumerate() {
        let (Some(first), Some(last)) = (doc.quotes(u).first(), doc.quotes(u).last()) else {
            continue;
        };
        let min_token = (u, first.start);
        let max_token = (u, last.end);
        while left + 1 < mentions.len() && positions.distance(mentions[left].0, min_token) > config.window_before {
            left += 1;
        }
        while right < mentions.len() && positions.distance(max_token, mentions[right].0) < config.window_after {
            right += 1;
        }

        let mut counts: Vec<(usize, usize)> = Vec::new();
        for &(_, id) in mentions.get(left..right).unwrap_or(&[]) {
            match counts.iter_mut().find(|(c, _)| *c == id) {
                Some((_, n)) => *n += 1,
                None => counts.push((id, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        *slot = counts.into_iter().map(|(id, _)| id).collect();
    }
    candidates
}

// ── Context ────────────────────────────────────────────────────────

pub struct SpeakerContext<'a> {
    pub doc: &'a Document,
    pub index: &'a CharacterIndex,
    pub marks: &'a CharacterMarks,
    pub lexicon: &'a Lexicon,
    pub mentions: &'a MentionTable,
    pub candidates: Vec<Vec<usize>>,
}

impl<'a> SpeakerContext<'a> {
    pub fn new(
        doc: &'a Document,
        index: &'a CharacterIndex,
        marks: &'a CharacterMarks,
        lexicon: &'a Lexicon,
        mentions: &'a MentionTable,
        config: &AttributionConfig,
    ) -> Self {
        SpeakerContext {
            doc,
            index,
            marks,
            lexicon,
            mentions,
            candidates: candidate_speakers(doc, marks, config),
        }
    }

    fn mention_text(&self, u: usize) -> Option<String> {
        let m = self.mentions.get(u)?;
        Some(self.doc.span_text(m.unit, m.start, m.end))
    }

    /// Gender implied by the mention's wording ("she", "the woman").
    fn mention_gender(&self, u: usize) -> Option<Gender> {
        self.mention_text(u).and_then(|text| self.lexicon.word_gender(&text))
    }

    fn exact_name_match(&self, u: usize) -> Option<usize> {
        let text = self.mention_text(u)?;
        self.index
            .id_of(&text)
            .or_else(|| (text == "I").then(|| self.index.id_of(NARRATOR_NAME)).flatten())
    }

    fn coreference(&self, u: usize) -> Option<usize> {
        let m = self.mentions.get(u)?;
        let root = self.doc.root(m.unit, m.start, m.end);
        let id = self.marks.get(m.unit, root)?;
        self.index.compatible(id, self.mention_gender(u)).then_some(id)
    }

    /// Speaker of two units back, when dialogue alternates.
    fn conversational_pattern(&self, table: &SpeakerTable, u: usize) -> Option<usize> {
        if u <= 1 {
            return None;
        }
        let id = table.get(u - 2)?;
        (self.index.compatible(id, self.mention_gender(u)) && table.differs_from_neighbors(u, id)).then_some(id)
    }

    /// Highest-ranked compatible nearby character, preferring one who is
    /// not already speaking next door.
    fn majority_speaker(&self, table: &SpeakerTable, u: usize) -> Option<usize> {
        let gender = self.mention_gender(u);
        let compatible: Vec<usize> = self.candidates[u]
            .iter()
            .copied()
            .filter(|&id| self.index.compatible(id, gender))
            .collect();
        compatible
            .iter()
            .copied()
            .find(|&id| table.differs_from_neighbors(u, id))
            .or_else(|| compatible.first().copied())
    }
}

/// Run the speaker sieves in order over every unit with quotes.
pub fn attribute_speakers(ctx: &SpeakerContext<'_>) -> SpeakerTable {
    let doc = ctx.doc;
    let mut table = SpeakerTable::new(doc.len());
    for sieve in SpeakerSieve::ORDER {
        let mut decided = 0;
        for u in 0..doc.len() {
            if table.get(u).is_some() || !doc.has_quotes(u) {
                continue;
            }
            if let Some((id, credited)) = sieve.run(ctx, &table, u) {
                if table.assign(u, id, credited) {
                    decided += 1;
                }
            }
        }
        tracing::debug!(sieve = sieve.as_str(), decided, "speaker sieve done");
    }
    let attributed = (0..doc.len()).filter(|&u| table.get(u).is_some()).count();
    tracing::info!(attributed, "speakers linked");
    table
}

/// One row per unit that contains quoted speech.
pub fn assignments(doc: &Document, mentions: &MentionTable, speakers: &SpeakerTable) -> Vec<SpeakerAssignment> {
    (0..doc.len())
        .filter(|&u| doc.has_quotes(u))
        .map(|u| SpeakerAssignment {
            unit: u,
            mention: mentions.get(u),
            mention_sieve: mentions.sieve(u).map(|s| s.as_str().to_string()),
            speaker: speakers.get(u),
            speaker_sieve: speakers.sieve(u).map(|s| s.as_str().to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use speaker_types::{Character, Corpus, EntityLabel, NameVariant, TextUnit};

    use super::*;
    use crate::document::fixture::*;
    use crate::lexicon::test_lexicon;
    use crate::mention::{MentionContext, resolve_mentions};

    fn character(id: usize, name: &str, gender: Gender) -> Character {
        Character {
            id,
            variants: vec![NameVariant {
                name: name.to_string(),
                count: 3,
            }],
            gender,
        }
    }

    struct Run {
        doc: Document,
        mentions: MentionTable,
        speakers: SpeakerTable,
    }

    fn run(units: Vec<TextUnit>, characters: &[Character]) -> Run {
        let lexicon = test_lexicon();
        let doc = Document::new(Corpus { units }, &lexicon);
        let index = CharacterIndex::new(characters);
        let marks = CharacterMarks::mark(&doc, &index, &lexicon);
        let mentions = resolve_mentions(&MentionContext::new(&doc, &index, &marks));
        let ctx = SpeakerContext::new(&doc, &index, &marks, &lexicon, &mentions, &AttributionConfig::default());
        let speakers = attribute_speakers(&ctx);
        Run { doc, mentions, speakers }
    }

    fn said(u: TextUnit, verb: usize, subject: usize) -> TextUnit {
        dep(pos(u, verb, "VERB", "say"), subject, "nsubj", verb)
    }

    #[test]
    fn test_distance() {
        let lexicon = test_lexicon();
        let doc = Document::new(
            Corpus {
                units: vec![unit("a b c"), unit("d e"), unit("f g h i")],
            },
            &lexicon,
        );
        let p = Positions::new(&doc);
        assert_eq!(p.distance((0, 1), (0, 2)), 1);
        assert_eq!(p.distance((0, 2), (0, 1)), -1);
        assert_eq!(p.distance((0, 1), (2, 3)), 2 + 2 + 3);
        assert_eq!(p.distance((2, 0), (0, 1)), 0);
    }

    #[test]
    fn test_alice_dialogue() {
        let a = entity(unit("Alice : Hello ."), 0, 1, EntityLabel::Person);
        let b = said(unit("\" Hi , \" Alice said ."), 5, 4);
        let b = entity(b, 4, 5, EntityLabel::Person);
        let c = unit("\" How are you ? \"");
        let r = run(vec![a, b, c], &[character(0, "Alice", Gender::Female)]);

        assert_eq!(r.speakers.get(0), None);
        assert_eq!(r.speakers.get(1), Some(0));
        assert_eq!(r.speakers.sieve(1), Some(SpeakerSieve::ExactNameMatch));
        assert_eq!(r.speakers.get(2), Some(0));

        let rows = assignments(&r.doc, &r.mentions, &r.speakers);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mention_sieve.as_deref(), Some("trigram_match"));
        assert_eq!(rows[0].speaker_sieve.as_deref(), Some("exact_name_match"));
    }

    #[test]
    fn test_narrator_i() {
        let u = said(unit("\" Yes , \" I said ."), 5, 4);
        let r = run(vec![u], &[character(3, NARRATOR_NAME, Gender::Male)]);
        assert_eq!(r.speakers.get(0), Some(3));
    }

    #[test]
    fn test_coreference_respects_gender() {
        let a = coref(entity(unit("Alice came in"), 0, 1, EntityLabel::Person), 0, 0, 1);
        let b = coref(said(unit("\" Sit , \" she said ."), 5, 4), 0, 4, 5);
        let r = run(vec![a, b], &[character(0, "Alice", Gender::Female)]);
        assert_eq!(r.speakers.get(1), Some(0));
        assert_eq!(r.speakers.sieve(1), Some(SpeakerSieve::Coreference));
    }

    #[test]
    fn test_first_speaker_decision_sticks() {
        let mut table = SpeakerTable::new(2);
        assert!(table.assign(0, 4, SpeakerSieve::ExactNameMatch));
        assert!(!table.assign(0, 7, SpeakerSieve::MajoritySpeaker));
        assert_eq!(table.get(0), Some(4));
        assert_eq!(table.sieve(0), Some(SpeakerSieve::ExactNameMatch));
    }

    #[test]
    fn test_exact_name_beats_majority_candidate() {
        let lexicon = test_lexicon();
        let a = unit("Bob and Bob and Bob waited");
        let b = said(unit("\" Hi , \" Alice said ."), 5, 4);
        let doc = Document::new(Corpus { units: vec![a, b] }, &lexicon);
        let index = CharacterIndex::new(&[
            character(0, "Alice", Gender::Female),
            character(1, "Bob", Gender::Male),
        ]);
        let marks = CharacterMarks::mark(&doc, &index, &lexicon);
        let mentions = resolve_mentions(&MentionContext::new(&doc, &index, &marks));
        let ctx = SpeakerContext::new(&doc, &index, &marks, &lexicon, &mentions, &AttributionConfig::default());

        // Bob dominates the window, so the majority sieve alone picks him
        assert_eq!(ctx.majority_speaker(&SpeakerTable::new(doc.len()), 1), Some(1));

        let speakers = attribute_speakers(&ctx);
        assert_eq!(speakers.get(1), Some(0));
        assert_eq!(speakers.sieve(1), Some(SpeakerSieve::ExactNameMatch));
    }

    #[test]
    fn test_gender_mismatch_blocks_majority() {
        let a = unit("Alice was there .");
        let b = said(unit("\" Go , \" he said ."), 5, 4);
        let r = run(vec![a, b], &[character(0, "Alice", Gender::Female)]);
        assert_eq!(r.mentions.get(1).map(|m| m.start), Some(4));
        assert_eq!(r.speakers.get(1), None);
    }

    #[test]
    fn test_conversational_alternation() {
        let a = said(unit("\" Hi , \" Alice said ."), 5, 4);
        let b = said(unit("\" Hello , \" Bob said ."), 5, 4);
        // "she" is found but linked to no one
        let c = said(unit("\" Sit , \" she said ."), 5, 4);
        let r = run(
            vec![a, b, c],
            &[character(0, "Alice", Gender::Female), character(1, "Bob", Gender::Male)],
        );
        assert_eq!(r.speakers.get(0), Some(0));
        assert_eq!(r.speakers.get(1), Some(1));
        assert_eq!(r.speakers.get(2), Some(0));
        assert_eq!(r.speakers.sieve(2), Some(SpeakerSieve::ConversationalPattern));
    }

    #[test]
    fn test_candidate_ranking_and_window() {
        let lexicon = test_lexicon();
        let units = vec![
            unit("Bob and Alice and Alice waited"),
            unit("\" Well ? \""),
        ];
        let doc = Document::new(Corpus { units }, &lexicon);
        let index = CharacterIndex::new(&[
            character(0, "Alice", Gender::Female),
            character(1, "Bob", Gender::Male),
        ]);
        let marks = CharacterMarks::mark(&doc, &index, &lexicon);

        let candidates = candidate_speakers(&doc, &marks, &AttributionConfig::default());
        assert_eq!(candidates[1], vec![0, 1]);
        assert!(candidates[0].is_empty());

        let narrow = AttributionConfig {
            window_before: 2,
            window_after: 1,
        };
        // only the last "Alice" (two tokens before the quote) is close enough
        assert_eq!(candidate_speakers(&doc, &marks, &narrow)[1], vec![0]);
    }
}
