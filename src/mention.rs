//! Mention sieves: for each unit with quoted speech, find the span that
//! refers to whoever is speaking.

use speaker_types::MentionRef;

use crate::document::{Document, is_punct, is_quote_mark, is_verb_like};
use crate::marks::{CharacterIndex, CharacterMarks};

pub const SPEECH_VERBS: &[&str] = &[
    "say", "cry", "reply", "add", "think", "observe", "call", "answer", "whisper", "shout", "sigh", "ask", "mutter",
    "repeat",
];

const NOMINATIVE_PRONOUNS: &[&str] = &["he", "she", "i"];
const OBJECT_PRONOUNS: &[&str] = &["his", "him", "her"];
const COMMON_MENTIONS: &[&str] = &["man", "woman", "girl", "boy", "wife", "husband", "brother", "sister"];
const VOCATIVE_SEPARATORS: &[&str] = &[",", ";", "?", "!"];

// ── Sieves ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MentionSieve {
    TrigramMatch,
    PreviousUnitDetermined,
    CommonSpeechVerb,
    SingleMention,
    PreviousVocative,
    FinalMention,
    ConversationalPattern,
    LooseConversationalPattern,
}

impl MentionSieve {
    /// Priority order; a unit keeps the first mention any sieve finds.
    pub const ORDER: [MentionSieve; 8] = [
        MentionSieve::TrigramMatch,
        MentionSieve::PreviousUnitDetermined,
        MentionSieve::CommonSpeechVerb,
        MentionSieve::SingleMention,
        MentionSieve::PreviousVocative,
        MentionSieve::FinalMention,
        MentionSieve::ConversationalPattern,
        MentionSieve::LooseConversationalPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrigramMatch => "trigram_match",
            Self::PreviousUnitDetermined => "previous_unit_determined",
            Self::CommonSpeechVerb => "common_speech_verb",
            Self::SingleMention => "single_mention",
            Self::PreviousVocative => "previous_vocative",
            Self::FinalMention => "final_mention",
            Self::ConversationalPattern => "conversational_pattern",
            Self::LooseConversationalPattern => "loose_conversational_pattern",
        }
    }

    pub fn run(&self, ctx: &MentionContext<'_>, table: &MentionTable, u: usize) -> Option<MentionRef> {
        match self {
            Self::TrigramMatch => ctx.trigram_match(u),
            Self::PreviousUnitDetermined => ctx.previous_unit_determined(u),
            Self::CommonSpeechVerb => ctx.common_speech_verb(u),
            Self::SingleMention => ctx.single_mention(u),
            Self::PreviousVocative => ctx.previous_vocative(u),
            Self::FinalMention => ctx.final_mention(u),
            Self::ConversationalPattern => ctx.conversational_pattern(table, u),
            Self::LooseConversationalPattern => loose_conversational_pattern(table, u),
        }
    }
}

/// The mention chosen for each unit and the sieve that chose it.
#[derive(Debug, Clone, Default)]
pub struct MentionTable {
    entries: Vec<Option<(MentionRef, MentionSieve)>>,
}

impl MentionTable {
    pub fn new(units: usize) -> Self {
        MentionTable {
            entries: vec![None; units],
        }
    }

    pub fn get(&self, u: usize) -> Option<MentionRef> {
        self.entries.get(u).copied().flatten().map(|(m, _)| m)
    }

    pub fn sieve(&self, u: usize) -> Option<MentionSieve> {
        self.entries.get(u).copied().flatten().map(|(_, s)| s)
    }

    /// First assignment sticks.
    fn assign(&mut self, u: usize, mention: MentionRef, sieve: MentionSieve) -> bool {
        match self.entries.get_mut(u) {
            Some(slot) if slot.is_none() => {
                *slot = Some((mention, sieve));
                true
            }
            _ => false,
        }
    }
}

/// Run every sieve in priority order over the units that contain quotes.
pub fn resolve_mentions(ctx: &MentionContext<'_>) -> MentionTable {
    let doc = ctx.doc;
    let mut table = MentionTable::new(doc.len());
    for sieve in MentionSieve::ORDER {
        let mut decided = 0;
        for u in 0..doc.len() {
            if table.get(u).is_some() || !doc.has_quotes(u) {
                continue;
            }
            if let Some(mention) = sieve.run(ctx, &table, u) {
                if table.assign(u, mention, sieve) {
                    decided += 1;
                }
            }
        }
        tracing::debug!(sieve = sieve.as_str(), decided, "mention sieve done");
    }
    let linked = (0..doc.len()).filter(|&u| table.get(u).is_some()).count();
    tracing::info!(linked, "mentions linked");
    table
}

fn loose_conversational_pattern(table: &MentionTable, u: usize) -> Option<MentionRef> {
    if u <= 1 {
        return None;
    }
    table.get(u - 2).filter(|m| m.unit + 2 >= u)
}

// ── Context ────────────────────────────────────────────────────────

pub struct MentionContext<'a> {
    pub doc: &'a Document,
    pub index: &'a CharacterIndex,
    pub marks: &'a CharacterMarks,
}

impl<'a> MentionContext<'a> {
    pub fn new(doc: &'a Document, index: &'a CharacterIndex, marks: &'a CharacterMarks) -> Self {
        MentionContext { doc, index, marks }
    }

    fn mention(u: usize, (start, end): (usize, usize)) -> MentionRef {
        MentionRef { unit: u, start, end }
    }

    /// A lone nominative pronoun or role noun, a known name, or a span the
    /// annotator put in a coreference cluster (object pronouns aside).
    pub fn is_mention(&self, u: usize, start: usize, end: usize) -> bool {
        let unit = self.doc.unit(u);
        if start >= end || end > unit.len() {
            return false;
        }
        if end - start == 1 {
            let lower = unit.tokens[start].text.to_lowercase();
            if NOMINATIVE_PRONOUNS.contains(&lower.as_str()) || COMMON_MENTIONS.contains(&lower.as_str()) {
                return true;
            }
        }
        let text = unit.span_text(start, end);
        if self.index.contains_name(&text) {
            return true;
        }
        let lower = text.to_lowercase();
        unit.coref
            .iter()
            .any(|m| m.start == start && m.end == end && !OBJECT_PRONOUNS.contains(&lower.as_str()))
    }

    pub fn is_speech_verb(&self, u: usize, t: usize) -> bool {
        let Some(token) = self.doc.unit(u).tokens.get(t) else {
            return false;
        };
        token.pos == "VERB"
            && !self.doc.is_direct(u, t)
            && SPEECH_VERBS.contains(&token.lemma.to_lowercase().as_str())
    }

    /// Subject span of a verb, following a conjunct verb up to the verb it
    /// is coordinated with when it has no subject of its own.
    pub fn subject(&self, u: usize, verb: usize, passive_too: bool) -> Option<(usize, usize)> {
        let tokens = &self.doc.unit(u).tokens;
        if !tokens.get(verb).is_some_and(|t| is_verb_like(&t.pos)) {
            return None;
        }
        let mut root = verb;
        let mut subject: Vec<usize> = Vec::new();
        // bounded, in case conjunct heads form a cycle
        for _ in 0..=tokens.len() {
            for child in self.doc.children(u, root) {
                let dep = tokens[child].dep.as_str();
                if dep == "nsubj" || (passive_too && dep == "nsubjpass") {
                    subject.extend(self.doc.children(u, child).filter(|&c| tokens[c].dep == "compound"));
                    subject.push(child);
                }
            }
            let head = tokens[root].head;
            if !subject.is_empty() || tokens[root].dep != "conj" || head == root {
                break;
            }
            root = head;
        }
        let start = *subject.iter().min()?;
        let end = *subject.iter().max()? + 1;
        Some((start, end))
    }

    /// Subjects of narrative verbs that pass the mention test, in order.
    fn verb_mentions(&self, u: usize) -> Vec<(usize, usize)> {
        let unit = self.doc.unit(u);
        (0..unit.len())
            .filter(|&t| !self.doc.is_direct(u, t) && is_verb_like(&unit.tokens[t].pos))
            .filter_map(|t| self.subject(u, t, true))
            .filter(|&(s, e)| self.is_mention(u, s, e))
            .collect()
    }

    /// Narrative tokens already linked to a character.
    fn marked_tokens(&self, u: usize) -> Vec<(usize, usize)> {
        (0..self.doc.unit_len(u))
            .filter(|&t| !self.doc.is_direct(u, t))
            .filter_map(|t| self.marks.get(u, t).map(|id| (t, id)))
            .collect()
    }

    // ── Individual sieves ──────────────────────────────────────────

    /// `"..." Holmes said` / `"..." said Holmes` / `Holmes said "..."` /
    /// `said Holmes "..."`. A later match overrides an earlier one.
    fn trigram_match(&self, u: usize) -> Option<MentionRef> {
        let len = self.doc.unit_len(u);
        let mut found = None;
        for quote in self.doc.quotes(u) {
            let (start, end) = (quote.start, quote.end);
            if end + 1 < len {
                if self.is_mention(u, end, end + 1) && self.is_speech_verb(u, end + 1) {
                    found = Some((end, end + 1));
                }
                if self.is_mention(u, end + 1, end + 2) && self.is_speech_verb(u, end) {
                    found = Some((end + 1, end + 2));
                }
            }
            if start > 1 {
                if self.is_mention(u, start - 1, start) && self.is_speech_verb(u, start - 2) {
                    found = Some((start - 1, start));
                }
                if self.is_mention(u, start - 2, start - 1) && self.is_speech_verb(u, start - 1) {
                    found = Some((start - 2, start - 1));
                }
            }
        }
        found.map(|span| Self::mention(u, span))
    }

    /// The previous unit introduces this one ("Holmes said:"): take the
    /// subject of its last sentence's verb or of a verb coordinated with it.
    fn previous_unit_determined(&self, u: usize) -> Option<MentionRef> {
        let prev = u.checked_sub(1)?;
        let unit = self.doc.unit(prev);
        let text = unit.text.trim_end();
        if unit.is_empty() || !(text.ends_with(':') || text.ends_with("--") || text.ends_with(',')) {
            return None;
        }
        let last = unit.sentence_spans().last().copied()?;
        let mut verbs = vec![self.doc.root(prev, last.start, last.end)];
        for (t, token) in unit.tokens.iter().enumerate() {
            if is_verb_like(&token.pos) && token.dep == "conj" && verbs.contains(&token.head) {
                verbs.push(t);
            }
        }
        verbs
            .into_iter()
            .filter_map(|v| self.subject(prev, v, true))
            .filter(|&(s, e)| self.is_mention(prev, s, e))
            .last()
            .map(|span| Self::mention(prev, span))
    }

    /// Subject of the first narrative speech verb, whatever it is.
    fn common_speech_verb(&self, u: usize) -> Option<MentionRef> {
        (0..self.doc.unit_len(u))
            .filter(|&t| self.is_speech_verb(u, t))
            .find_map(|t| self.subject(u, t, false))
            .map(|span| Self::mention(u, span))
    }

    /// Exactly one character outside the quotes (possibly named several times).
    fn single_mention(&self, u: usize) -> Option<MentionRef> {
        let marked = self.marked_tokens(u);
        let &(first, id) = marked.first()?;
        marked
            .iter()
            .all(|&(_, other)| other == id)
            .then(|| Self::mention(u, (first, first + 1)))
    }

    /// Someone addressed by name in the previous unit's speech ("Come,
    /// my dear Watson") is likely the one answering.
    fn previous_vocative(&self, u: usize) -> Option<MentionRef> {
        let prev = u.checked_sub(1)?;
        self.vocatives(prev).last().map(|&span| Self::mention(prev, span))
    }

    fn vocatives(&self, u: usize) -> Vec<(usize, usize)> {
        let unit = self.doc.unit(u);
        let mut addressed = Vec::new();
        for sentence in unit.sentence_spans() {
            if sentence.start >= sentence.end || sentence.end > unit.len() {
                continue;
            }
            let separators: Vec<usize> = (sentence.start..sentence.end - 1)
                .filter(|&t| VOCATIVE_SEPARATORS.contains(&unit.tokens[t].text.as_str()))
                .collect();
            let (Some(&first), Some(&last)) = (separators.first(), separators.last()) else {
                continue;
            };

            let mut parts = vec![(sentence.start, first)];
            parts.extend(separators.windows(2).map(|w| (w[0] + 1, w[1])));
            let end = if is_punct(&unit.tokens[sentence.end - 1].text) {
                sentence.end - 1
            } else {
                sentence.end
            };
            parts.push((last + 1, end));

            for (start, end) in parts {
                if start >= end || !self.doc.is_direct_span(u, start, end) {
                    continue;
                }
                if let Some(span) = self.vocative(u, start, end) {
                    addressed.push(span);
                }
            }
        }
        addressed
    }

    /// A name, `my <name>`, `<adjective> <name>` or `my <adjective> <name>`,
    /// ignoring quote marks and punctuation at the edges.
    fn vocative(&self, u: usize, start: usize, end: usize) -> Option<(usize, usize)> {
        let tokens = &self.doc.unit(u).tokens;
        let edge = |t: usize| is_quote_mark(&tokens[t].text) || is_punct(&tokens[t].text);
        let (mut start, mut end) = (start, end);
        while start < end && edge(start) {
            start += 1;
        }
        while end > start && edge(end - 1) {
            end -= 1;
        }
        if start >= end {
            return None;
        }

        let names = |from: usize| self.index.contains_name(&self.doc.span_text(u, from, end));
        let is_my = |t: usize| tokens[t].text.to_lowercase() == "my";
        let is_adj = |t: usize| tokens[t].pos == "ADJ";
        let len = end - start;

        let addressed = names(start)
            || (len >= 2 && names(start + 1) && (is_my(start) || is_adj(start)))
            || (len >= 3 && names(start + 2) && is_my(start) && is_adj(start + 1));
        addressed.then_some((start, end))
    }

    /// The unit ends inside a quote: take the last narrative subject before
    /// the final quote opens, or the first one if none precedes it.
    fn final_mention(&self, u: usize) -> Option<MentionRef> {
        let unit = self.doc.unit(u);
        if !unit.tokens.last().is_some_and(|t| is_quote_mark(&t.text)) {
            return None;
        }
        let mentions = self.verb_mentions(u);
        let first = *mentions.first()?;
        let quote_start = self.doc.quotes(u).last()?.start;
        let selected = mentions
            .iter()
            .take_while(|(s, _)| *s < quote_start)
            .last()
            .copied()
            .unwrap_or(first);
        Some(Self::mention(u, selected))
    }

    /// Two fully quoted units in a row: the speaker alternates, so reuse
    /// the mention from two units back.
    fn conversational_pattern(&self, table: &MentionTable, u: usize) -> Option<MentionRef> {
        if u <= 1 {
            return None;
        }
        if self.doc.is_direct_unit(u - 1) && self.doc.is_direct_unit(u) {
            table.get(u - 2)
        } else {
            None
        }
    }
}
