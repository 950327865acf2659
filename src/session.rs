//! One resolution pass over a document: graph, scores, pruning, characters
//! and token marks, then speaker attribution on top.

use std::fs;
use std::path::Path;

use speaker_types::{Character, PipelineOutput};

use crate::clustering::{self, MergeGraph};
use crate::config::{AttributionConfig, ResolutionConfig};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::graph::UnificationGraph;
use crate::lexicon::Lexicon;
use crate::marks::{CharacterIndex, CharacterMarks};
use crate::mention::{MentionContext, resolve_mentions};
use crate::scorer::{EdgeProbabilities, EdgeScorer};
use crate::speaker::{SpeakerContext, assignments, attribute_speakers};

/// Where a session's graph currently stands. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Fresh,
    Built,
    Scored,
    Pruned,
    Clustered,
}

/// Characters plus everything attribution needs to read them.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub characters: Vec<Character>,
    /// Absent when the characters were supplied rather than resolved
    pub graph: Option<UnificationGraph>,
    pub index: CharacterIndex,
    pub marks: CharacterMarks,
}

impl Resolution {
    /// Mention sieves, then speaker sieves, packaged for output.
    pub fn attribute(&self, doc: &Document, lexicon: &Lexicon, config: &AttributionConfig) -> PipelineOutput {
        let mention_ctx = MentionContext::new(doc, &self.index, &self.marks);
        let mentions = resolve_mentions(&mention_ctx);
        let speaker_ctx = SpeakerContext::new(doc, &self.index, &self.marks, lexicon, &mentions, config);
        let speakers = attribute_speakers(&speaker_ctx);
        PipelineOutput {
            characters: self.characters.clone(),
            speakers: assignments(doc, &mentions, &speakers),
            token_characters: self.marks.rows(),
        }
    }
}

pub struct ResolutionSession<'a> {
    doc: &'a Document,
    lexicon: &'a Lexicon,
    config: ResolutionConfig,
    next_id: usize,
    stage: Stage,
}

impl<'a> ResolutionSession<'a> {
    pub fn new(doc: &'a Document, lexicon: &'a Lexicon, config: ResolutionConfig) -> Self {
        ResolutionSession {
            doc,
            lexicon,
            config,
            next_id: 0,
            stage: Stage::Fresh,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Id the next character will get.
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    fn advance(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage || stage == Stage::Built);
        self.stage = stage;
    }

    /// Full identity resolution from the annotated document.
    pub fn resolve(&mut self, scorer: &dyn EdgeScorer) -> Result<Resolution> {
        let graph = UnificationGraph::build(self.doc, self.lexicon, &self.config)?;
        self.advance(Stage::Built);

        let probs = EdgeProbabilities::score(&graph, scorer);
        self.advance(Stage::Scored);

        let mut merge = MergeGraph::new(&graph, &probs, &self.config);
        clustering::prune(&mut merge, &probs, &self.config, self.doc.len());
        self.advance(Stage::Pruned);

        let genders: Vec<_> = graph.nodes().iter().map(|n| n.gender(&self.config)).collect();
        let occurrences: Vec<usize> = graph.nodes().iter().map(|n| n.occurrences).collect();
        let characters = clustering::assemble_characters(&merge, &genders, &occurrences, &mut self.next_id);
        self.advance(Stage::Clustered);
        tracing::info!(characters = characters.len(), "characters resolved");

        Ok(self.finish(characters, Some(graph)))
    }

    /// Skip resolution and use a known character list.
    pub fn with_characters(&mut self, characters: Vec<Character>) -> Resolution {
        if let Some(max) = characters.iter().map(|c| c.id).max() {
            self.next_id = self.next_id.max(max + 1);
        }
        self.stage = Stage::Clustered;
        tracing::info!(characters = characters.len(), "using supplied characters");
        self.finish(characters, None)
    }

    fn finish(&self, characters: Vec<Character>, graph: Option<UnificationGraph>) -> Resolution {
        let index = CharacterIndex::new(&characters);
        let marks = CharacterMarks::mark(self.doc, &index, self.lexicon);
        Resolution {
            characters,
            graph,
            index,
            marks,
        }
    }
}

/// Read a character list (`[{"id", "variants", "gender"}]`).
pub fn load_characters(path: &Path) -> Result<Vec<Character>> {
    let raw = fs::read_to_string(path)?;
    let characters: Vec<Character> = serde_json::from_str(&raw)?;
    if let Some(c) = characters.iter().find(|c| c.variants.is_empty()) {
        return Err(Error::invalid_input(format!("character {} has no name variants", c.id)));
    }
    Ok(characters)
}
