//! Read-only view of an annotated corpus plus the tables derived from it:
//! direct-speech flags, quote spans, normalized character entities and
//! reconstructed coreference clusters.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use speaker_types::{ClusterRange, Corpus, EntityLabel, EntitySpan, QuoteSpan, TextUnit};

use crate::lexicon::Lexicon;

// ── Token predicates ───────────────────────────────────────────────

pub fn is_quote_mark(text: &str) -> bool {
    text.contains(['"', '“', '”']) || text == "``" || text == "''"
}

pub fn is_punct(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_punctuation() || matches!(c, '“' | '”' | '‘' | '’' | '—' | '–' | '…'))
}

pub fn is_verb_like(pos: &str) -> bool {
    pos == "VERB" || pos == "AUX"
}

// Letters, apostrophes, hyphens, spaces and periods only.
static RE_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z'\-. ]+$").unwrap());

/// Whether an entity string is safe to treat as a character name.
///
/// Rejects odd characters, possessives ("Holmes's", "Jones'"), empty
/// words and capitals inside a word ("HOLMES").
pub fn is_candidate_name(text: &str) -> bool {
    if !RE_NAME_CHARS.is_match(text) {
        return false;
    }
    if (text.len() > 2 && text.ends_with("'s")) || text.ends_with('\'') {
        return false;
    }
    let normalized = text.replace(['-', '\''], " ").replace('.', "");
    normalized
        .split(' ')
        .all(|part| !part.is_empty() && part.chars().skip(1).all(|c| c.is_ascii_lowercase()))
}

// ── Coreference clusters ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub unit: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A coreference cluster rebuilt across units.
#[derive(Debug, Clone)]
pub struct CorefCluster {
    pub id: u32,
    pub members: Vec<ClusterMember>,
    /// Units the cluster's id range covers
    pub units: Range<usize>,
}

// ── Document ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Document {
    pub units: Vec<TextUnit>,
    quotes: Vec<Vec<QuoteSpan>>,
    direct: Vec<Vec<bool>>,
    entities: Vec<Vec<EntitySpan>>,
    clusters: Vec<CorefCluster>,
    /// unit → root token of a coreference span → cluster ids
    root_clusters: Vec<HashMap<usize, Vec<u32>>>,
}

impl Document {
    pub fn new(corpus: Corpus, lexicon: &Lexicon) -> Self {
        let mut units = corpus.units;
        for (u, unit) in units.iter_mut().enumerate() {
            repair_heads(u, unit);
            repair_sentences(u, unit);
        }

        let mut quotes = Vec::with_capacity(units.len());
        let mut direct = Vec::with_capacity(units.len());
        for unit in &units {
            let (spans, flags) = match &unit.quotes {
                Some(given) => {
                    let spans: Vec<QuoteSpan> = given
                        .iter()
                        .copied()
                        .filter(|q| q.start < q.end && q.end <= unit.len())
                        .collect();
                    let flags = direct_flags_from_spans(unit, &spans);
                    (spans, flags)
                }
                None => parse_quotes(unit),
            };
            quotes.push(spans);
            direct.push(flags);
        }

        let entities = units
            .iter()
            .enumerate()
            .map(|(u, unit)| normalize_entities(u, unit, lexicon))
            .collect();

        let clusters = reconstruct_clusters(&units);
        let mut root_clusters = vec![HashMap::new(); units.len()];
        for cluster in &clusters {
            for member in &cluster.members {
                let root = span_root(&units[member.unit], member.start, member.end);
                root_clusters[member.unit]
                    .entry(root)
                    .or_insert_with(Vec::new)
                    .push(cluster.id);
            }
        }

        let doc = Document {
            units,
            quotes,
            direct,
            entities,
            clusters,
            root_clusters,
        };
        tracing::debug!(
            units = doc.units.len(),
            clusters = doc.clusters.len(),
            entities = doc.entities.iter().map(Vec::len).sum::<usize>(),
            "annotated document prepared"
        );
        doc
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, u: usize) -> &TextUnit {
        &self.units[u]
    }

    pub fn quotes(&self, u: usize) -> &[QuoteSpan] {
        &self.quotes[u]
    }

    pub fn has_quotes(&self, u: usize) -> bool {
        !self.quotes[u].is_empty()
    }

    /// Character-bearing entity spans that passed normalization.
    pub fn entities(&self, u: usize) -> &[EntitySpan] {
        &self.entities[u]
    }

    pub fn clusters(&self) -> &[CorefCluster] {
        &self.clusters
    }

    pub fn is_direct(&self, u: usize, token: usize) -> bool {
        self.direct[u].get(token).copied().unwrap_or(false)
    }

    /// Every token is quoted speech or a quote mark (vacuously true when empty).
    pub fn is_direct_span(&self, u: usize, start: usize, end: usize) -> bool {
        let unit = &self.units[u];
        (start..end.min(unit.len())).all(|i| self.direct[u][i] || is_quote_mark(&unit.tokens[i].text))
    }

    pub fn is_direct_unit(&self, u: usize) -> bool {
        self.is_direct_span(u, 0, self.units[u].len())
    }

    pub fn span_text(&self, u: usize, start: usize, end: usize) -> String {
        self.units[u].span_text(start, end)
    }

    pub fn root(&self, u: usize, start: usize, end: usize) -> usize {
        span_root(&self.units[u], start, end)
    }

    pub fn children(&self, u: usize, token: usize) -> impl Iterator<Item = usize> + '_ {
        self.units[u]
            .tokens
            .iter()
            .enumerate()
            .filter(move |(i, t)| t.head == token && *i != token)
            .map(|(i, _)| i)
    }

    /// Cluster ids whose span is rooted at `token`.
    pub fn token_clusters(&self, u: usize, token: usize) -> &[u32] {
        self.root_clusters[u].get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The entity whose root is `token`, if any.
    pub fn entity_rooted_at(&self, u: usize, token: usize) -> Option<&EntitySpan> {
        self.entities[u]
            .iter()
            .find(|e| self.root(u, e.start, e.end) == token)
    }

    pub fn entity_text(&self, u: usize, entity: &EntitySpan) -> String {
        self.span_text(u, entity.start, entity.end)
    }

    /// Number of tokens in a unit.
    pub fn unit_len(&self, u: usize) -> usize {
        self.units[u].len()
    }
}

/// Head of a span: the first token whose head lies outside it (or is itself).
pub fn span_root(unit: &TextUnit, start: usize, end: usize) -> usize {
    let end = end.min(unit.len());
    (start..end)
        .find(|&i| {
            let head = unit.tokens[i].head;
            head == i || head < start || head >= end
        })
        .unwrap_or(start)
}

fn repair_heads(u: usize, unit: &mut TextUnit) {
    let len = unit.tokens.len();
    for (i, token) in unit.tokens.iter_mut().enumerate() {
        if token.head >= len {
            tracing::warn!(unit = u, token = i, head = token.head, "dependency head outside unit, treating token as root");
            token.head = i;
        }
    }
}

/// Drop sentence spans that start outside the unit and clamp the ones
/// that run past its end.
fn repair_sentences(u: usize, unit: &mut TextUnit) {
    let len = unit.tokens.len();
    unit.sentences.retain(|s| {
        let inside = s.start < s.end && s.start < len;
        if !inside {
            tracing::warn!(unit = u, start = s.start, end = s.end, "sentence span outside unit, skipped");
        }
        inside
    });
    for sentence in &mut unit.sentences {
        if sentence.end > len {
            tracing::warn!(unit = u, start = sentence.start, end = sentence.end, "sentence span crosses unit end, clamped");
            sentence.end = len;
        }
    }
}

// ── Quote parsing ──────────────────────────────────────────────────

/// Derive quote spans and direct-speech flags from the quote marks.
///
/// Straight quotes toggle; curly quotes open and close. Quote marks
/// themselves are never direct speech. An unclosed quote keeps the rest
/// of the unit in direct speech but records no span.
pub fn parse_quotes(unit: &TextUnit) -> (Vec<QuoteSpan>, Vec<bool>) {
    let mut spans = Vec::new();
    let mut flags = vec![false; unit.len()];
    let mut in_quote = false;
    let mut open: Option<usize> = None;

    for (i, token) in unit.tokens.iter().enumerate() {
        flags[i] = in_quote;
        let text = token.text.as_str();
        if text.contains('"') || text == "``" || text == "''" {
            match open.take() {
                None => open = Some(i),
                Some(start) => spans.push(QuoteSpan { start, end: i + 1 }),
            }
            in_quote = !in_quote;
            flags[i] = false;
        } else if text.contains('“') {
            open = Some(i);
            in_quote = true;
            flags[i] = false;
        } else if text.contains('”') {
            if let Some(start) = open.take() {
                spans.push(QuoteSpan { start, end: i + 1 });
            }
            in_quote = false;
            flags[i] = false;
        }
    }
    (spans, flags)
}

fn direct_flags_from_spans(unit: &TextUnit, spans: &[QuoteSpan]) -> Vec<bool> {
    let mut flags = vec![false; unit.len()];
    for span in spans {
        for (i, flag) in flags.iter_mut().enumerate().take(span.end).skip(span.start) {
            *flag = !is_quote_mark(&unit.tokens[i].text);
        }
    }
    flags
}

// ── Entity normalization ───────────────────────────────────────────

fn normalize_entities(u: usize, unit: &TextUnit, lexicon: &Lexicon) -> Vec<EntitySpan> {
    let len = unit.len();
    let mut kept = Vec::new();

    for entity in &unit.entities {
        if entity.start >= entity.end || entity.start >= len {
            tracing::warn!(unit = u, start = entity.start, end = entity.end, "entity span outside unit, skipped");
            continue;
        }
        let mut entity = entity.clone();
        if entity.end > len {
            tracing::warn!(unit = u, start = entity.start, end = entity.end, "entity span crosses unit end, clamped");
            entity.end = len;
        }

        match entity.label {
            EntityLabel::Person => {
                if entity.start > 0 {
                    let prev = entity.start - 1;
                    let free = !unit.entities.iter().any(|e| e.start <= prev && prev < e.end);
                    if free && lexicon.is_honorific(&unit.tokens[prev].text) {
                        entity.start = prev;
                    }
                }
            }
            EntityLabel::NamelessCharacter => {
                let head = &unit.tokens[span_root(unit, entity.start, entity.end)].text;
                let head = head.to_lowercase();
                if lexicon.stoplist.contains(&head) || lexicon.is_relation(&head) {
                    continue;
                }
            }
            EntityLabel::Narrator => {}
        }

        if !is_candidate_name(&unit.span_text(entity.start, entity.end)) {
            continue;
        }
        kept.push(entity);
    }
    kept
}

// ── Cluster reconstruction ─────────────────────────────────────────

/// Rebuild cross-unit clusters from per-unit memberships.
///
/// A cluster covers the units whose id range admits it, widened to every
/// unit holding one of its members.
fn reconstruct_clusters(units: &[TextUnit]) -> Vec<CorefCluster> {
    let mut ranges: Vec<ClusterRange> = Vec::with_capacity(units.len());
    let mut prev_end = 0;
    for unit in units {
        let range = unit.cluster_ids.unwrap_or_else(|| {
            let ids = unit.coref.iter().map(|m| m.cluster);
            match (ids.clone().min(), ids.max()) {
                (Some(lo), Some(hi)) => ClusterRange { start: lo, end: hi + 1 },
                _ => ClusterRange { start: prev_end, end: prev_end },
            }
        });
        prev_end = range.end;
        ranges.push(range);
    }

    let mut members: HashMap<u32, Vec<ClusterMember>> = HashMap::new();
    for (u, unit) in units.iter().enumerate() {
        for m in &unit.coref {
            if m.start >= m.end || m.end > unit.len() {
                tracing::warn!(unit = u, cluster = m.cluster, start = m.start, end = m.end, "coreference span outside unit, skipped");
                continue;
            }
            let text = unit.span_text(m.start, m.end);
            if text != m.text {
                tracing::debug!(unit = u, expected = %m.text, found = %text, "coreference text differs from span");
            }
            members.entry(m.cluster).or_default().push(ClusterMember {
                unit: u,
                start: m.start,
                end: m.end,
                text: m.text.clone(),
            });
        }
    }

    let mut windows: HashMap<u32, Range<usize>> = HashMap::new();
    for (u, range) in ranges.iter().enumerate() {
        for id in range.start..range.end {
            if !members.contains_key(&id) {
                continue;
            }
            let w = windows.entry(id).or_insert(u..u + 1);
            w.start = w.start.min(u);
            w.end = w.end.max(u + 1);
        }
    }

    let mut ids: Vec<u32> = members.keys().copied().collect();
    ids.sort_unstable();
    ids.into_iter()
        .filter_map(|id| {
            let members = members.remove(&id)?;
            let lo = members.iter().map(|m| m.unit).min()?;
            let hi = members.iter().map(|m| m.unit).max()? + 1;
            let units = match windows.get(&id) {
                Some(w) => w.start.min(lo)..w.end.max(hi),
                None => lo..hi,
            };
            Some(CorefCluster { id, members, units })
        })
        .collect()
}

/// Compact builders for hand-annotated units in tests.
#[cfg(test)]
pub(crate) mod fixture {
    use speaker_types::{CorefMention, Iob, Token};

    use super::*;

    /// Whitespace-tokenized unit; every token is a root NOUN until
    /// refined with the helpers below.
    pub fn unit(text: &str) -> TextUnit {
        let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token {
                text: w.to_string(),
                whitespace: if i + 1 < words.len() { " ".into() } else { String::new() },
                lemma: w.to_lowercase(),
                pos: if is_punct(w) { "PUNCT".into() } else { "NOUN".into() },
                dep: "ROOT".into(),
                head: i,
                ent_iob: Iob::Outside,
            })
            .collect();
        TextUnit {
            text: text.to_string(),
            tokens,
            entities: Vec::new(),
            quotes: None,
            coref: Vec::new(),
            cluster_ids: None,
            sentences: Vec::new(),
        }
    }

    pub fn pos(mut unit: TextUnit, i: usize, pos: &str, lemma: &str) -> TextUnit {
        unit.tokens[i].pos = pos.into();
        unit.tokens[i].lemma = lemma.into();
        unit
    }

    pub fn dep(mut unit: TextUnit, i: usize, dep: &str, head: usize) -> TextUnit {
        unit.tokens[i].dep = dep.into();
        unit.tokens[i].head = head;
        unit
    }

    pub fn entity(mut unit: TextUnit, start: usize, end: usize, label: EntityLabel) -> TextUnit {
        unit.entities.push(EntitySpan {
            start,
            end,
            label,
            nameless_name: None,
        });
        unit
    }

    pub fn coref(mut unit: TextUnit, cluster: u32, start: usize, end: usize) -> TextUnit {
        let text = unit.span_text(start, end);
        unit.coref.push(CorefMention {
            cluster,
            start,
            end,
            text,
        });
        unit
    }
}
