// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation keys: the partition key of stored messages.
//!
//! A key is `"<id>_<digits>"` where `id` is the partition identity (the
//! configuration's resolved remote instance id) and `digits` is the
//! counterpart phone with every non-digit character removed. Keys are only as
//! unique as the id; configuration refuses to bind one remote instance name
//! to two owners.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the identity and the phone part of a key.
pub const KEY_SEPARATOR: char = '_';

/// A derived conversation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Builds the key for `(id, counterpart_phone)`.
    pub fn build(id: &str, counterpart_phone: &str) -> Self {
        let phone = normalize_phone(counterpart_phone);
        Self(format!("{id}{KEY_SEPARATOR}{phone}"))
    }

    /// Splits a key back into `(id, phone)` at the last separator.
    ///
    /// Returns `None` when the key has no separator or the phone part is not
    /// all digits.
    pub fn split(key: &str) -> Option<(&str, &str)> {
        let (id, phone) = key.rsplit_once(KEY_SEPARATOR)?;
        if phone.chars().all(|c| c.is_ascii_digit()) {
            Some((id, phone))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips every non-digit character from a phone number.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes a WhatsApp JID (`5511999999999@s.whatsapp.net`) or a loose
/// phone string to digits. Device suffixes (`:12`) are dropped as well.
pub fn phone_from_jid(raw: &str) -> String {
    let user = raw.split('@').next().unwrap_or(raw);
    let user = user.split(':').next().unwrap_or(user);
    normalize_phone(user)
}
