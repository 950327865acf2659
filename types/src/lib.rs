use serde::{Deserialize, Serialize};

// ── Annotated corpus ─────────────────────────────────────────────────────

/// Entity-IOB flag carried over from the annotator's tokenizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Iob {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "I")]
    Inside,
    #[default]
    #[serde(rename = "O", alias = "")]
    Outside,
}

/// One token of a text unit, as produced by the linguistic annotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Whitespace following the token in the source text
    #[serde(default)]
    pub whitespace: String,
    #[serde(default)]
    pub lemma: String,
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub dep: String,
    /// Index of the syntactic head within the same unit; roots point at themselves.
    pub head: usize,
    #[serde(default)]
    pub ent_iob: Iob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityLabel {
    #[serde(rename = "PERSON")]
    Person,
    #[serde(rename = "NAMELESS_CHARACTER", alias = "NAMELESS_CHAR")]
    NamelessCharacter,
    #[serde(rename = "NARRATOR")]
    Narrator,
}

/// A character-bearing entity span (token range, end exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    pub label: EntityLabel,
    /// Display name chosen by the annotator for nameless characters
    /// (majority noun chunk, e.g. "the old man").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameless_name: Option<String>,
}

/// A quoted run, as a token range that includes both quote marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSpan {
    pub start: usize,
    pub end: usize,
}

/// Membership of a token range in a (possibly cross-unit) coreference cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorefMention {
    pub cluster: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Half-open range of coreference cluster ids a unit participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
}

/// One paragraph of the novel with its annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub text: String,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub entities: Vec<EntitySpan>,
    /// Explicit quote spans; derived from the quote marks when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotes: Option<Vec<QuoteSpan>>,
    #[serde(default)]
    pub coref: Vec<CorefMention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ids: Option<ClusterRange>,
    /// Sentence boundaries; a unit without them is one sentence.
    #[serde(default)]
    pub sentences: Vec<SentenceSpan>,
}

impl TextUnit {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Surface text of a token range, joined with the original whitespace.
    pub fn span_text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.tokens.len());
        let mut out = String::new();
        for (i, token) in self.tokens.iter().enumerate().take(end).skip(start) {
            out.push_str(&token.text);
            if i + 1 < end {
                out.push_str(&token.whitespace);
            }
        }
        out
    }

    /// Sentence ranges, falling back to the whole unit.
    pub fn sentence_spans(&self) -> Vec<SentenceSpan> {
        if self.sentences.is_empty() {
            vec![SentenceSpan {
                start: 0,
                end: self.tokens.len(),
            }]
        } else {
            self.sentences.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub units: Vec<TextUnit>,
}

// ── Resolved characters ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "F", alias = "f")]
    Female,
    #[serde(rename = "M", alias = "m")]
    Male,
}

impl Gender {
    pub fn as_char(&self) -> char {
        match self {
            Self::Female => 'F',
            Self::Male => 'M',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameVariant {
    pub name: String,
    pub count: usize,
}

/// A merged identity: every surface name it goes by, plus one gender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: usize,
    pub variants: Vec<NameVariant>,
    pub gender: Gender,
}

impl Character {
    /// The most frequent variant, used for display.
    pub fn display_name(&self) -> &str {
        self.variants
            .iter()
            .max_by(|a, b| a.count.cmp(&b.count).then(b.name.cmp(&a.name)))
            .map(|v| v.name.as_str())
            .unwrap_or("")
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v.name == name)
    }

    pub fn occurrences(&self) -> usize {
        self.variants.iter().map(|v| v.count).sum()
    }
}

// ── Attribution output ───────────────────────────────────────────────────

/// A token range in some unit, believed to refer to a quote's speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentionRef {
    pub unit: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerAssignment {
    pub unit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<MentionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_sieve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_sieve: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCharacter {
    pub unit: usize,
    pub token: usize,
    pub character: usize,
}

/// Everything downstream consumers (network building, formatting) need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub characters: Vec<Character>,
    pub speakers: Vec<SpeakerAssignment>,
    pub token_characters: Vec<TokenCharacter>,
}
