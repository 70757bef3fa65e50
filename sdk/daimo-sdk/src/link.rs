//! `daimo://` links
//!
//! ```text
//! daimo://receive/<address>
//! daimo://account/<name>
//! daimo://note?ephemeralPrivateKey=<hex>[&amount=<units>]   bearer, carries the funds
//! daimo://note?ephemeralOwner=<address>                      creator reclaim, no secret
//! ```
//!
//! Parsing never panics and returns `None` for anything it does not
//! recognise.

use alloy_primitives::{Address, U256};
use std::str::FromStr;
use tracing::{info, warn};

use crate::core::ephemeral::EphemeralKey;
use crate::error::{DaimoSdkError, Result};

const SCHEME: &str = "daimo://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaimoLink {
    Receive { addr: Address },
    Account { name: String },
    Note(NoteLink),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteLink {
    /// Carries the ephemeral private key. Possession is ownership.
    Bearer {
        key: EphemeralKey,
        /// Amount in token units, for display before the note is fetched
        amount_hint: Option<U256>,
    },
    /// Identifies a note without granting access; only the creator can
    /// use it, to reclaim.
    Owner { ephemeral_owner: Address },
}

impl NoteLink {
    pub fn ephemeral_owner(&self) -> Address {
        match self {
            NoteLink::Bearer { key, .. } => key.address(),
            NoteLink::Owner { ephemeral_owner } => *ephemeral_owner,
        }
    }

    pub fn key(&self) -> Option<&EphemeralKey> {
        match self {
            NoteLink::Bearer { key, .. } => Some(key),
            NoteLink::Owner { .. } => None,
        }
    }
}

impl DaimoLink {
    /// Link kind without any payload, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            DaimoLink::Receive { .. } => "receive",
            DaimoLink::Account { .. } => "account",
            DaimoLink::Note(NoteLink::Bearer { .. }) => "note",
            DaimoLink::Note(NoteLink::Owner { .. }) => "note-owner",
        }
    }
}

pub fn format_daimo_link(link: &DaimoLink) -> String {
    match link {
        DaimoLink::Receive { addr } => format!("{}receive/{}", SCHEME, addr),
        DaimoLink::Account { name } => format!("{}account/{}", SCHEME, name),
        DaimoLink::Note(NoteLink::Bearer { key, amount_hint }) => {
            let mut url = format!(
                "{}note?ephemeralPrivateKey=0x{}",
                SCHEME,
                hex::encode(key.to_bytes())
            );
            if let Some(amount) = amount_hint {
                url.push_str(&format!("&amount={}", amount));
            }
            url
        },
        DaimoLink::Note(NoteLink::Owner { ephemeral_owner }) => {
            format!("{}note?ephemeralOwner={}", SCHEME, ephemeral_owner)
        },
    }
}

pub fn parse_daimo_link(url: &str) -> Option<DaimoLink> {
    let rest = url.strip_prefix(SCHEME)?;
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    let segments: Vec<&str> = path.split('/').collect();

    match (segments.as_slice(), query) {
        (["receive", addr], None) => parse_address(addr).map(|addr| DaimoLink::Receive { addr }),
        (["account", name], None) if is_valid_account_name(name) => Some(DaimoLink::Account {
            name: name.to_string(),
        }),
        (["note"], Some(query)) => parse_note_query(query).map(DaimoLink::Note),
        _ => None,
    }
}

/// Parse a payment link, as an error rather than `None`.
pub fn parse_note_link(url: &str) -> Result<NoteLink> {
    match parse_daimo_link(url) {
        Some(DaimoLink::Note(note)) => Ok(note),
        Some(other) => Err(DaimoSdkError::InvalidLink(format!(
            "expected a note link, got {}",
            other.kind()
        ))),
        None => Err(DaimoSdkError::InvalidLink("unrecognised link".to_string())),
    }
}

fn parse_note_query(query: &str) -> Option<NoteLink> {
    let mut private_key = None;
    let mut owner = None;
    let mut amount = None;

    for pair in query.split('&') {
        let (k, v) = pair.split_once('=')?;
        let slot = match k {
            "ephemeralPrivateKey" => &mut private_key,
            "ephemeralOwner" => &mut owner,
            "amount" => &mut amount,
            _ => return None,
        };
        if slot.replace(v).is_some() {
            return None;
        }
    }

    match (private_key, owner, amount) {
        (Some(key), None, amount) => {
            let amount_hint = match amount {
                Some(a) => Some(parse_units(a)?),
                None => None,
            };
            Some(NoteLink::Bearer {
                key: parse_private_key(key)?,
                amount_hint,
            })
        },
        (None, Some(owner), None) => Some(NoteLink::Owner {
            ephemeral_owner: parse_address(owner)?,
        }),
        _ => None,
    }
}

fn parse_address(s: &str) -> Option<Address> {
    let digits = s.strip_prefix("0x")?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(s).ok()
}

fn parse_private_key(s: &str) -> Option<EphemeralKey> {
    let hex_str = s.strip_prefix("0x")?;
    if hex_str.len() != 64 {
        return None;
    }
    let bytes = hex::decode(hex_str).ok()?;
    EphemeralKey::from_bytes(&bytes).ok()
}

fn parse_units(s: &str) -> Option<U256> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(s, 10).ok()
}

fn is_valid_account_name(name: &str) -> bool {
    (3..=32).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Entry point for links handed over by the OS. Unparseable links are
/// logged and dropped.
pub fn dispatch_deep_link(url: &str, handler: impl FnOnce(DaimoLink)) -> bool {
    match parse_daimo_link(url) {
        Some(link) => {
            info!(kind = link.kind(), "dispatching deep link");
            handler(link);
            true
        },
        None => {
            // The URL may embed a private key
            warn!(len = url.len(), "dropping unparseable deep link");
            false
        },
    }
}
