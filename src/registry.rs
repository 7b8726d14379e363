//! Protocol identifier registry
//!
//! Maps a protocol name to the strings that identify it on the ledger:
//! program addresses, router/frontend markers, and log keywords. Identifier
//! sets also carry *exclude* strings that break ties between protocols
//! sharing an address prefix or log vocabulary (e.g. aggregator frontends
//! that mention another protocol's keyword in their logs).
//!
//! The registry is built once at startup and injected into the classifier;
//! nothing reads protocol literals at match time. Unknown protocol names
//! yield an empty match set, so the classifier simply never matches - it
//! does not error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Match and exclude identifiers for one protocol.
///
/// Identifiers are matched by substring containment, not equality: the set
/// intentionally mixes full program addresses with short log keywords, and
/// exact-match would miss the log-based signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolIdentifierSet {
    /// Strings whose presence in an account key, program reference, or log
    /// line marks the transaction as belonging to this protocol.
    #[serde(default)]
    pub matches: Vec<String>,

    /// Strings whose presence in the *same* key or log line suppresses a
    /// match. Exclusion takes precedence over matching.
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl ProtocolIdentifierSet {
    pub fn new(matches: &[&str], excludes: &[&str]) -> Self {
        Self {
            matches: matches.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Immutable protocol name -> identifier set table.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, ProtocolIdentifierSet>,
}

impl ProtocolRegistry {
    /// Empty registry, mainly for tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the known DeFi protocols.
    ///
    /// Entries mix canonical program ids with router and frontend markers
    /// observed in transaction logs. The jupiter entry excludes "titan"
    /// because Titan routes through a Jupiter-adjacent frontend whose logs
    /// mention both; a flat exclude list only resolves this two-way case
    /// (see DESIGN.md for the unresolved three-way question).
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.insert(
            "jupiter",
            ProtocolIdentifierSet::new(
                &[
                    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
                    "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
                    "JustUseJupiter",
                ],
                &["titan"],
            ),
        );
        registry.insert(
            "titan",
            ProtocolIdentifierSet::new(
                &[
                    "TITAN7VfQvnFwWHhJjJLQn8S7SfgsL65vWNSckQvp2F",
                    "TITANQvGLLPjnPzzLTRwm7xagDjKExqR7naRMz6N8yG",
                    "T1TANpTeScyeqVzzgNViGDNrkQ6qHz9KrSBS4aNXvGT",
                    "jitodontfronttitans",
                    "titan",
                ],
                &[],
            ),
        );
        registry.insert(
            "meteora",
            ProtocolIdentifierSet::new(
                &[
                    "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
                    "Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB",
                ],
                &[],
            ),
        );
        registry.insert(
            "raydium",
            ProtocolIdentifierSet::new(
                &[
                    "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
                    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
                    "routeUGWgWzqBWFcrCfv8tritsqukccJPu3q5GPP3xS",
                ],
                &[],
            ),
        );
        registry.insert(
            "orca",
            ProtocolIdentifierSet::new(
                &[
                    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
                    "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP",
                ],
                &[],
            ),
        );
        registry.insert(
            "marinade",
            ProtocolIdentifierSet::new(&["MarBmsSgKXdrN1egZf5sqe1TMai9K1rChYNDJgjq7aD"], &[]),
        );
        registry.insert(
            "lifinity",
            ProtocolIdentifierSet::new(&["2wT8Yq49kHgDzXuPxZSaeLaH1qbmGXtEyPy64bL7aD3c"], &[]),
        );
        registry.insert(
            "phoenix",
            ProtocolIdentifierSet::new(&["PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY"], &[]),
        );
        registry.insert(
            "drift",
            ProtocolIdentifierSet::new(&["dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH"], &[]),
        );
        registry.insert(
            "sanctum",
            ProtocolIdentifierSet::new(&["5ocnV1qiCgaQR8Jb8xWnVbApfaygJ8tNoZfgPwsgx9kx"], &[]),
        );
        registry.insert(
            "kamino",
            ProtocolIdentifierSet::new(&["KLend2g3cP87ber41SdPpZskyrQgPpg9GfLpLLKqKms"], &[]),
        );
        registry.insert(
            "marginfi",
            ProtocolIdentifierSet::new(&["MFv2hWf31Z9kbCa1snEPYctwafyhdvnV7FZnsebVacA"], &[]),
        );

        registry
    }

    /// Add or replace a protocol entry. Names are stored lowercase.
    pub fn insert(&mut self, name: &str, set: ProtocolIdentifierSet) {
        self.protocols.insert(name.to_lowercase(), set);
    }

    /// Identifier set for a protocol. Unknown names get an empty set.
    pub fn identifiers_for(&self, name: &str) -> ProtocolIdentifierSet {
        self.protocols
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Known protocol names, sorted for stable display.
    pub fn known_protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.protocols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
