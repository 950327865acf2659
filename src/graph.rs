//! The name unification graph: one node per distinct entity string, one
//! feature vector per unordered node pair.

use std::collections::HashMap;

use speaker_types::{EntityLabel, Gender};

use crate::config::{NARRATOR_NAME, ResolutionConfig};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::names::{NameParser, Person};

pub const FEATURE_COUNT: usize = 10;

/// Column names, in the order of [`EdgeFeatures::to_array`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "coref_connected",
    "coref_unconnected",
    "gender_same",
    "gender_different",
    "conjunction",
    "honorific_differ",
    "name_subset",
    "first_name_variant",
    "name_part_differ",
    "same_substring",
];

const FEMALE_PRONOUNS: &[&str] = &["she", "her"];
const MALE_PRONOUNS: &[&str] = &["he", "him", "his"];

// ── Nodes and edges ────────────────────────────────────────────────

/// Evidence for and against merging two entity strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EdgeFeatures {
    pub coref_connected: u32,
    pub coref_unconnected: u32,
    pub gender_same: u32,
    pub gender_different: u32,
    pub conjunction: u32,
    pub honorific_differ: u32,
    pub name_subset: u32,
    pub first_name_variant: u32,
    pub name_part_differ: u32,
    pub same_substring: u32,
}

impl EdgeFeatures {
    pub fn to_array(&self) -> [u32; FEATURE_COUNT] {
        [
            self.coref_connected,
            self.coref_unconnected,
            self.gender_same,
            self.gender_different,
            self.conjunction,
            self.honorific_differ,
            self.name_subset,
            self.first_name_variant,
            self.name_part_differ,
            self.same_substring,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct EntityNode {
    pub text: String,
    pub label: EntityLabel,
    pub occurrences: usize,
    pub female_coref: usize,
    pub male_coref: usize,
    /// Parsed name, PERSON nodes only
    pub person: Option<Person>,
    /// Name the node takes in the final character list
    pub display_name: String,
}

impl EntityNode {
    fn pronoun_majority(&self) -> Option<Gender> {
        use std::cmp::Ordering;
        match self.female_coref.cmp(&self.male_coref) {
            Ordering::Greater => Some(Gender::Female),
            Ordering::Less => Some(Gender::Male),
            Ordering::Equal => None,
        }
    }

    fn name_gender(&self) -> Option<Gender> {
        self.person.as_ref().and_then(|p| p.gender)
    }

    /// Genders this node could have, for the gender pair features: the
    /// pronoun majority, plus the name's gender unless the pronoun counts
    /// are too close to trust either.
    pub fn candidate_genders(&self, config: &ResolutionConfig) -> Vec<Gender> {
        let mut genders: Vec<Gender> = self.pronoun_majority().into_iter().collect();
        if let Some(g) = self.name_gender() {
            if !config.counts_close(self.female_coref, self.male_coref) && !genders.contains(&g) {
                genders.push(g);
            }
        }
        genders
    }

    /// Single best gender guess for this node.
    pub fn gender(&self, config: &ResolutionConfig) -> Option<Gender> {
        let majority = self.pronoun_majority();
        match self.name_gender() {
            Some(g) if majority.is_none() || config.counts_close(self.female_coref, self.male_coref) => Some(g),
            _ => majority,
        }
    }
}

/// Position of the unordered pair `{i, j}` in the upper-triangular edge list.
pub fn pair_slot(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i != j && i < n && j < n);
    let (a, b) = if i < j { (i, j) } else { (j, i) };
    a * n - a * (a + 1) / 2 + (b - a - 1)
}

// ── Graph ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnificationGraph {
    nodes: Vec<EntityNode>,
    index: HashMap<String, usize>,
    edges: Vec<EdgeFeatures>,
}

impl UnificationGraph {
    /// Build the dense graph and fill in every feature family.
    pub fn build(doc: &Document, lexicon: &Lexicon, config: &ResolutionConfig) -> Result<Self> {
        let mut graph = Self::with_nodes(doc, lexicon)?;
        graph.add_coreference_features(doc);
        graph.add_name_features();
        graph.add_conjunction_features(doc);
        graph.add_gender_features(config);
        tracing::info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "unification graph built"
        );
        Ok(graph)
    }

    fn with_nodes(doc: &Document, lexicon: &Lexicon) -> Result<Self> {
        let mut nodes: Vec<EntityNode> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for u in 0..doc.len() {
            for entity in doc.entities(u) {
                let text = doc.entity_text(u, entity);
                let i = *index.entry(text.clone()).or_insert_with(|| {
                    let display_name = match entity.label {
                        EntityLabel::Person => text.clone(),
                        EntityLabel::Narrator => NARRATOR_NAME.to_string(),
                        EntityLabel::NamelessCharacter => {
                            entity.nameless_name.clone().unwrap_or_else(|| text.clone())
                        }
                    };
                    nodes.push(EntityNode {
                        text: text.clone(),
                        label: entity.label,
                        occurrences: 0,
                        female_coref: 0,
                        male_coref: 0,
                        person: None,
                        display_name,
                    });
                    nodes.len() - 1
                });
                if nodes[i].label != entity.label {
                    tracing::debug!(text = %text, "entity string seen with several labels, keeping the first");
                }
                nodes[i].occurrences += 1;
            }
        }

        if nodes.is_empty() {
            return Err(Error::NoCharacters(
                "no PERSON, NAMELESS_CHARACTER or NARRATOR entity survived filtering".into(),
            ));
        }

        let person_names: Vec<&str> = nodes
            .iter()
            .filter(|n| n.label == EntityLabel::Person)
            .map(|n| n.text.as_str())
            .collect();
        let parser = NameParser::new(lexicon, &person_names);
        let persons: Vec<Option<Person>> = nodes
            .iter()
            .map(|n| (n.label == EntityLabel::Person).then(|| parser.parse(&n.text)))
            .collect();
        for (node, person) in nodes.iter_mut().zip(persons) {
            node.person = person;
        }

        let n = nodes.len();
        Ok(UnificationGraph {
            nodes,
            index,
            edges: vec![EdgeFeatures::default(); n * n.saturating_sub(1) / 2],
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[EntityNode] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> &EntityNode {
        &self.nodes[i]
    }

    pub fn index_of(&self, text: &str) -> Option<usize> {
        self.index.get(text).copied()
    }

    pub fn edge(&self, i: usize, j: usize) -> &EdgeFeatures {
        &self.edges[pair_slot(self.nodes.len(), i, j)]
    }

    fn edge_mut(&mut self, i: usize, j: usize) -> Option<&mut EdgeFeatures> {
        if i == j {
            return None;
        }
        let slot = pair_slot(self.nodes.len(), i, j);
        self.edges.get_mut(slot)
    }

    /// Every unordered pair `(i, j)` with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let n = self.nodes.len();
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
    }

    /// `(name_a, name_b, features)` rows, one per edge.
    pub fn feature_rows(&self) -> Vec<(&str, &str, [u32; FEATURE_COUNT])> {
        self.pairs()
            .map(|(i, j)| (self.nodes[i].text.as_str(), self.nodes[j].text.as_str(), self.edge(i, j).to_array()))
            .collect()
    }

    // ── Feature families ───────────────────────────────────────────

    /// For every named member A of a cluster, compare against every
    /// entity B in the units the cluster covers: same cluster counts as
    /// connected, otherwise unconnected. Gendered pronouns in the cluster
    /// are tallied on A.
    fn add_coreference_features(&mut self, doc: &Document) {
        for cluster in doc.clusters() {
            for member in &cluster.members {
                let root = doc.root(member.unit, member.start, member.end);
                if doc.entity_rooted_at(member.unit, root).is_none() {
                    continue;
                }
                let Some(a) = self
                    .index_of(&member.text)
                    .or_else(|| self.index_of(&doc.unit(member.unit).tokens[root].text))
                else {
                    continue;
                };

                for u in cluster.units.clone() {
                    for entity in doc.entities(u) {
                        let Some(b) = self.index_of(&doc.entity_text(u, entity)) else {
                            continue;
                        };
                        let b_root = doc.root(u, entity.start, entity.end);
                        let connected = doc.token_clusters(u, b_root).contains(&cluster.id);
                        if let Some(edge) = self.edge_mut(a, b) {
                            if connected {
                                edge.coref_connected += 1;
                            } else {
                                edge.coref_unconnected += 1;
                            }
                        }
                    }
                }

                for other in &cluster.members {
                    let text = other.text.to_lowercase();
                    if FEMALE_PRONOUNS.contains(&text.as_str()) {
                        self.nodes[a].female_coref += 1;
                    } else if MALE_PRONOUNS.contains(&text.as_str()) {
                        self.nodes[a].male_coref += 1;
                    }
                }
            }
        }
    }

    fn add_name_features(&mut self) {
        for (i, j) in self.pairs() {
            let (a, b) = (&self.nodes[i], &self.nodes[j]);
            let mut features = *self.edge(i, j);

            if let (Some(pa), Some(pb)) = (&a.person, &b.person) {
                features.honorific_differ = pa.honorific_differs(pb) as u32;
                features.name_subset = (pa.is_subset_of(pb) || pb.is_subset_of(pa)) as u32;
                features.first_name_variant = pa.first_names_variant(pb) as u32;
                features.name_part_differ = pa.name_part_differs(pb) as u32;
            }

            if a.label != EntityLabel::Narrator && b.label != EntityLabel::Narrator {
                let (la, lb) = (a.text.to_lowercase(), b.text.to_lowercase());
                if la.starts_with(&lb) || lb.starts_with(&la) {
                    features.same_substring += 1;
                }
                if la.ends_with(&lb) || lb.ends_with(&la) {
                    features.same_substring += 1;
                }
            }

            if let Some(edge) = self.edge_mut(i, j) {
                *edge = features;
            }
        }
    }

    /// "Alice and Bob": an entity whose root is a conjunct of another
    /// entity's root.
    fn add_conjunction_features(&mut self, doc: &Document) {
        for u in 0..doc.len() {
            let tokens = &doc.unit(u).tokens;
            for entity in doc.entities(u) {
                let root = doc.root(u, entity.start, entity.end);
                if tokens[root].dep != "conj" {
                    continue;
                }
                let head = tokens[root].head;
                let Some(a) = self.index_of(&doc.entity_text(u, entity)) else {
                    continue;
                };
                for other in doc.entities(u) {
                    if doc.root(u, other.start, other.end) != head {
                        continue;
                    }
                    if let Some(b) = self.index_of(&doc.entity_text(u, other)) {
                        if let Some(edge) = self.edge_mut(a, b) {
                            edge.conjunction += 1;
                        }
                    }
                }
            }
        }
    }

    fn add_gender_features(&mut self, config: &ResolutionConfig) {
        let genders: Vec<Vec<Gender>> = self.nodes.iter().map(|n| n.candidate_genders(config)).collect();
        for (i, j) in self.pairs() {
            let mut same = 0;
            let mut different = 0;
            for ga in &genders[i] {
                for gb in &genders[j] {
                    if ga == gb {
                        same += 1;
                    } else {
                        different += 1;
                    }
                }
            }
            if let Some(edge) = self.edge_mut(i, j) {
                edge.gender_same += same;
                edge.gender_different += different;
            }
        }
    }
}
