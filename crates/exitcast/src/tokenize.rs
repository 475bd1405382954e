//! SSN tokenization.
//!
//! Keeps only the trailing group of each stored SSN, encrypts it with an
//! authenticated, non-deterministic token, and writes each token back over the
//! exact value it came from. Values that already look like tokens are left
//! alone, so a second run never double-encrypts.

use exitcast_db::{ClientStore, SsnRewrite, SsnRow};
use exitcast_security::{decrypt, encrypt, token_kind, TokenKey, TokenKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::outcome::{FailureKind, RowOutcome, SkipReason};

/// Outcome counts of one tokenize run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenizeReport {
    pub fetched: usize,
    /// Exact `(ssn, personal_id)` repeats removed before encryption
    pub duplicates: usize,
    pub encrypted: usize,
    pub already_encrypted: usize,
    pub malformed: usize,
    /// Encrypted rows whose client has another, different plaintext in the
    /// same run. Counted in `encrypted` too.
    pub conflicts: usize,
    pub failed: usize,
    /// Store rows rewritten
    pub written: u64,
}

impl TokenizeReport {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Applied => self.encrypted += 1,
            RowOutcome::Skipped(SkipReason::AlreadyEncrypted) => self.already_encrypted += 1,
            RowOutcome::Skipped(_) => self.malformed += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Keep the low-entropy trailing group of an SSN.
///
/// `123-45-6789` becomes `6789`. A value without dashes is accepted only when
/// it already is a four-digit group.
pub fn normalize_ssn(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let tail = match raw.rfind('-') {
        Some(idx) => raw[idx + 1..].trim(),
        None if raw.len() == 4 => raw,
        None => return None,
    };
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(tail.to_string())
}

pub struct Tokenizer {
    key: TokenKey,
}

impl Tokenizer {
    pub fn new(key: TokenKey) -> Self {
        Self { key }
    }

    /// Build from the operator-supplied key. A malformed key is a
    /// configuration error for the whole run.
    pub fn from_encoded_key(encoded: &str) -> Result<Self> {
        let key = TokenKey::parse(encoded)?;
        debug!(fingerprint = %key.fingerprint(), "Loaded tokenization key");
        Ok(Self::new(key))
    }

    /// Normalize and encrypt one stored value.
    pub fn tokenize_value(&self, raw: &str) -> std::result::Result<String, RowOutcome> {
        if token_kind(raw) != TokenKind::Plain {
            return Err(RowOutcome::Skipped(SkipReason::AlreadyEncrypted));
        }
        let retained = normalize_ssn(raw).ok_or(RowOutcome::Skipped(SkipReason::Malformed))?;
        encrypt(&retained, &self.key).map_err(|_| RowOutcome::Failed(FailureKind::Encryption))
    }

    /// Recover the retained group from a token issued under this key.
    pub fn reveal(&self, token: &str) -> Result<String> {
        let (plaintext, _) = decrypt(token, &self.key)?;
        Ok(plaintext)
    }

    /// Turn fetched rows into the rewrites to apply, counting every outcome.
    ///
    /// Every distinct plaintext is encrypted, including a second value for a
    /// client that already has one; that case is counted as a conflict.
    pub fn prepare(&self, rows: Vec<SsnRow>) -> (Vec<SsnRewrite>, TokenizeReport) {
        let mut report = TokenizeReport {
            fetched: rows.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut encrypted_for: HashMap<String, String> = HashMap::new();
        let mut rewrites = Vec::new();
        for row in rows {
            if !seen.insert(row.clone()) {
                report.duplicates += 1;
                continue;
            }

            match self.tokenize_value(&row.ssn) {
                Ok(token) => {
                    match encrypted_for.get(&row.personal_id) {
                        Some(first) if first != &row.ssn => {
                            warn!(
                                personal_id = %row.personal_id,
                                "Client has more than one stored SSN; encrypting each"
                            );
                            report.conflicts += 1;
                        }
                        Some(_) => {}
                        None => {
                            encrypted_for.insert(row.personal_id.clone(), row.ssn.clone());
                        }
                    }
                    rewrites.push(SsnRewrite {
                        personal_id: row.personal_id,
                        stored: row.ssn,
                        token,
                    });
                    report.record(RowOutcome::Applied);
                }
                Err(outcome) => {
                    if outcome == RowOutcome::Skipped(SkipReason::Malformed) {
                        warn!(personal_id = %row.personal_id, "Stored SSN has no usable group");
                    }
                    report.record(outcome);
                }
            }
        }
        (rewrites, report)
    }

    /// Tokenize every stored SSN in one batched write.
    pub async fn run(&self, store: &ClientStore) -> Result<TokenizeReport> {
        let rows = store.fetch_ssn_rows().await?;
        let (rewrites, mut report) = self.prepare(rows);
        report.written = store.write_ssn_tokens(&rewrites).await?;

        info!(
            fetched = report.fetched,
            duplicates = report.duplicates,
            encrypted = report.encrypted,
            already_encrypted = report.already_encrypted,
            malformed = report.malformed,
            conflicts = report.conflicts,
            failed = report.failed,
            written = report.written,
            "Tokenized SSNs"
        );
        Ok(report)
    }
}
