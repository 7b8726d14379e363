//! Quest data model
//!
//! A quest is a verification rule bound to a user: "I transferred into my
//! savings wallet today" or "I used protocol X today". The engine reads
//! quests, it never mutates them - quest CRUD belongs to the owner.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::ProtocolIdentifierSet;
use crate::types::{Result, VigilError};

/// How a quest gets verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationKind {
    /// Checked off by the user; the engine never touches these.
    Manual,
    /// Satisfied by a transfer into the quest's savings wallet.
    SavingsTransfer,
    /// Satisfied by any interaction with the quest's protocol.
    ProtocolInteraction,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::Manual => "manual",
            VerificationKind::SavingsTransfer => "savings-transfer",
            VerificationKind::ProtocolInteraction => "protocol-interaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(VerificationKind::Manual),
            "savings-transfer" => Some(VerificationKind::SavingsTransfer),
            "protocol-interaction" => Some(VerificationKind::ProtocolInteraction),
            _ => None,
        }
    }
}

/// Which token(s) a savings quest counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSelector {
    Sol,
    Usdc,
    /// Either token's daily total can satisfy the minimum.
    Either,
}

impl TokenSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSelector::Sol => "SOL",
            TokenSelector::Usdc => "USDC",
            TokenSelector::Either => "EITHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Some(TokenSelector::Sol),
            "USDC" => Some(TokenSelector::Usdc),
            "EITHER" | "BOTH" => Some(TokenSelector::Either),
            _ => None,
        }
    }

    pub fn counts_sol(&self) -> bool {
        matches!(self, TokenSelector::Sol | TokenSelector::Either)
    }

    pub fn counts_usdc(&self) -> bool {
        matches!(self, TokenSelector::Usdc | TokenSelector::Either)
    }
}

/// A verification rule bound to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub kind: VerificationKind,

    /// Candidate wallet addresses. For savings quests the first entry is the
    /// destination (savings) wallet; for protocol quests these are the
    /// wallets whose activity is checked in order, first match wins.
    pub wallets: Vec<String>,

    /// Optional sender constraint for savings quests.
    #[serde(default)]
    pub source_wallet: Option<String>,

    pub token: TokenSelector,

    /// Minimum aggregate amount per day. 0 = any positive amount. For
    /// protocol quests this is read as a minimum interaction count.
    #[serde(default)]
    pub min_amount: f64,

    /// Protocol name for protocol-interaction quests (registry key).
    #[serde(default)]
    pub protocol: Option<String>,

    /// Custom identifier set overriding the registry entry for this quest.
    #[serde(default)]
    pub custom_identifiers: Option<ProtocolIdentifierSet>,

    pub created_at: String,
}

impl Quest {
    /// Build a new quest with a fresh id. Call [`Quest::validate`] before
    /// persisting.
    pub fn new(owner: &str, title: &str, kind: VerificationKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            title: title.to_string(),
            kind,
            wallets: Vec::new(),
            source_wallet: None,
            token: TokenSelector::Either,
            min_amount: 0.0,
            protocol: None,
            custom_identifiers: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether the engine is allowed to verify this quest.
    pub fn is_auto_verifiable(&self) -> bool {
        !matches!(self.kind, VerificationKind::Manual)
    }

    /// Destination (savings) wallet: the first candidate wallet.
    pub fn destination_wallet(&self) -> Option<&str> {
        self.wallets.first().map(String::as_str)
    }

    /// Check the per-kind invariants from the data model.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            VerificationKind::Manual => Ok(()),
            VerificationKind::SavingsTransfer => {
                if self.wallets.iter().all(|w| w.trim().is_empty()) {
                    return Err(VigilError::InvalidQuest(
                        "savings-transfer quest requires a destination wallet".into(),
                    ));
                }
                if self.min_amount < 0.0 {
                    return Err(VigilError::InvalidQuest(
                        "minimum amount cannot be negative".into(),
                    ));
                }
                Ok(())
            }
            VerificationKind::ProtocolInteraction => {
                if self.wallets.iter().all(|w| w.trim().is_empty()) {
                    return Err(VigilError::InvalidQuest(
                        "protocol-interaction quest requires at least one wallet".into(),
                    ));
                }
                if self.protocol.as_deref().map_or(true, str::is_empty)
                    && self.custom_identifiers.is_none()
                {
                    return Err(VigilError::InvalidQuest(
                        "protocol-interaction quest requires a protocol name or custom identifiers"
                            .into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// A recorded fact: quest Q was satisfied on UTC day D.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub quest_id: String,
    pub completed_date: NaiveDate,
    pub auto_verified: bool,
    /// Evidence only; never used for dedup.
    pub tx_signature: Option<String>,
    pub created_at: String,
}

/// A completion the reconciler wants to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompletion {
    pub quest_id: String,
    pub date: NaiveDate,
    pub auto_verified: bool,
    pub tx_signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savings_quest_requires_destination() {
        let mut quest = Quest::new("alice", "Save daily", VerificationKind::SavingsTransfer);
        assert!(quest.validate().is_err());

        quest.wallets.push("SavWa11et111111111111111111111111".to_string());
        assert!(quest.validate().is_ok());
        assert_eq!(
            quest.destination_wallet(),
            Some("SavWa11et111111111111111111111111")
        );
    }

    #[test]
    fn test_protocol_quest_requires_protocol_or_custom_set() {
        let mut quest = Quest::new("bob", "Swap on Jupiter", VerificationKind::ProtocolInteraction);
        quest.wallets.push("Wa11et11111111111111111111111111".to_string());
        assert!(quest.validate().is_err());

        quest.protocol = Some("jupiter".to_string());
        assert!(quest.validate().is_ok());
    }

    #[test]
    fn test_manual_quests_are_not_auto_verifiable() {
        let quest = Quest::new("carol", "Stretch", VerificationKind::Manual);
        assert!(quest.validate().is_ok());
        assert!(!quest.is_auto_verifiable());
    }

    #[test]
    fn test_token_selector_parse() {
        assert_eq!(TokenSelector::parse("sol"), Some(TokenSelector::Sol));
        assert_eq!(TokenSelector::parse("USDC"), Some(TokenSelector::Usdc));
        // Legacy spelling from older quest rows
        assert_eq!(TokenSelector::parse("BOTH"), Some(TokenSelector::Either));
        assert_eq!(TokenSelector::parse("doge"), None);
    }
}
