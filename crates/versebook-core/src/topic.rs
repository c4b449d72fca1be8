//! Theme-oriented query expansion.
//!
//! A [`TopicMap`] maps topic names ("forgiveness", "creation") to short
//! representative phrases. When a query names a known topic, the topic
//! engine searches with the representative phrases instead of the raw
//! query, which pulls in verses that express the theme without sharing its
//! vocabulary. Unknown queries fall back to the query text itself, so the
//! engine degrades to plain semantic search rather than failing.

use std::collections::BTreeMap;

/// Named topics and their representative phrases.
#[derive(Debug, Clone, Default)]
pub struct TopicMap {
    topics: BTreeMap<String, Vec<String>>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A starter set of common themes. Callers can extend or replace these
    /// via [`insert`](TopicMap::insert) (the application loads extras from
    /// config).
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.insert(
            "love",
            &[
                "love one another",
                "charity and compassion for others",
                "love thy neighbour as thyself",
            ],
        );
        map.insert(
            "forgiveness",
            &[
                "forgive those who wrong you",
                "pardon of sins and trespasses",
                "mercy toward offenders",
            ],
        );
        map.insert(
            "faith",
            &[
                "trust in God",
                "belief without seeing",
                "faith as a grain of mustard seed",
            ],
        );
        map.insert(
            "hope",
            &[
                "hope in the promise",
                "waiting patiently for deliverance",
                "comfort in affliction",
            ],
        );
        map.insert(
            "creation",
            &[
                "God created the heavens and the earth",
                "the beginning of the world",
                "the works of creation",
            ],
        );
        map.insert(
            "wisdom",
            &[
                "wisdom and understanding",
                "the fear of the Lord is the beginning of wisdom",
                "prudent counsel and discernment",
            ],
        );
        map.insert(
            "mercy",
            &[
                "mercy and lovingkindness",
                "compassion on the poor and needy",
                "slow to anger and plenteous in mercy",
            ],
        );
        map.insert(
            "prayer",
            &[
                "ask and it shall be given",
                "pray without ceasing",
                "petition and supplication to God",
            ],
        );
        map.insert(
            "peace",
            &[
                "peace that passes understanding",
                "blessed are the peacemakers",
                "rest for the weary",
            ],
        );
        map.insert(
            "salvation",
            &[
                "saved by grace",
                "redemption and deliverance",
                "eternal life",
            ],
        );
        map
    }

    /// Add or replace a topic. Names are matched case-insensitively.
    pub fn insert(&mut self, name: &str, phrases: &[&str]) {
        self.topics.insert(
            name.to_lowercase(),
            phrases.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Topic names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Find the topic a query refers to, if any. A query matches a topic
    /// when any of its tokens equals the topic name, or the whole query
    /// equals the name.
    pub fn lookup(&self, query: &str) -> Option<(&str, &[String])> {
        let query_lower = query.to_lowercase();
        if let Some((name, phrases)) = self.topics.get_key_value(query_lower.trim()) {
            return Some((name, phrases));
        }
        for token in query_lower.split(|c: char| !c.is_alphanumeric()) {
            if let Some((name, phrases)) = self.topics.get_key_value(token) {
                return Some((name, phrases));
            }
        }
        None
    }

    /// Expand a query into the texts to search with: the topic's
    /// representative phrases when the query names a known topic, otherwise
    /// the query itself.
    pub fn expand(&self, query: &str) -> Vec<String> {
        match self.lookup(query) {
            Some((_, phrases)) => phrases.to_vec(),
            None => vec![query.to_string()],
        }
    }
}
