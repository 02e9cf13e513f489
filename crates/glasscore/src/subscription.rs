// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream keys and the per-session subscription index (spec §3, §4.2).
//!
//! A [`StreamKey`] is a structured replacement for the source's string-packed
//! `"transcription:en-US"` keys (spec §9): a base stream type, optionally
//! qualified by a language pair (transcription/translation) or by a gesture
//! name (touch events). Two textual spellings of the same language pair
//! canonicalize to the same key.

use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CoreError;

/// Base stream types named in spec §3, plus the two wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseStream {
    Transcription,
    LocationStream,
    Vad,
    TouchEvent,
    Pcm,
    PhotoResponse,
    CustomMessage,
    RtmpStatus,
    /// Additional upstream event types that fan out through the default
    /// dispatch row (spec §4.5) rather than one of the eight named streams.
    /// Not typically subscribed to directly, but still participate in
    /// `ALL`/`WILDCARD` wildcard matching.
    GlassesConnectionState,
    RgbLedControlResponse,
    HeadPosition,
    KeepAliveAck,
    All,
    Wildcard,
}

impl BaseStream {
    fn as_wire(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::LocationStream => "location_stream",
            Self::Vad => "vad",
            Self::TouchEvent => "touch_event",
            Self::Pcm => "pcm",
            Self::PhotoResponse => "photo_response",
            Self::CustomMessage => "custom_message",
            Self::RtmpStatus => "rtmp_status",
            Self::GlassesConnectionState => "glasses_connection_state",
            Self::RgbLedControlResponse => "rgb_led_control_response",
            Self::HeadPosition => "head_position",
            Self::KeepAliveAck => "keep_alive_ack",
            Self::All => "ALL",
            Self::Wildcard => "WILDCARD",
        }
    }
}

impl FromStr for BaseStream {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcription" => Ok(Self::Transcription),
            "location_stream" => Ok(Self::LocationStream),
            "vad" => Ok(Self::Vad),
            "touch_event" => Ok(Self::TouchEvent),
            "pcm" => Ok(Self::Pcm),
            "photo_response" => Ok(Self::PhotoResponse),
            "custom_message" => Ok(Self::CustomMessage),
            "rtmp_status" => Ok(Self::RtmpStatus),
            "glasses_connection_state" => Ok(Self::GlassesConnectionState),
            "rgb_led_control_response" => Ok(Self::RgbLedControlResponse),
            "head_position" => Ok(Self::HeadPosition),
            "keep_alive_ack" => Ok(Self::KeepAliveAck),
            "ALL" => Ok(Self::All),
            "WILDCARD" => Ok(Self::Wildcard),
            _ => Err(CoreError::MalformedMessage),
        }
    }
}

impl fmt::Display for BaseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A canonicalized BCP-47-ish language tag (`en-US`, `es`, ...).
///
/// Canonicalization lower-cases the language subtag and upper-cases the
/// region subtag, so `EN-us` and `en-US` compare equal (spec §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::MalformedMessage);
        }
        let mut parts = raw.split('-');
        let lang = parts.next().ok_or(CoreError::MalformedMessage)?;
        if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::MalformedMessage);
        }
        let mut canonical = lang.to_ascii_lowercase();
        for region in parts {
            if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CoreError::MalformedMessage);
            }
            canonical.push('-');
            canonical.push_str(&region.to_ascii_uppercase());
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully-qualified subscription key (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKey {
    /// A bare base stream type — "I want every instance of this stream".
    Base(BaseStream),
    /// Transcription qualified by a transcribe language and optional
    /// translate language.
    Language { base: BaseStream, transcribe: LanguageTag, translate: Option<LanguageTag> },
    /// A touch event qualified by a specific gesture name.
    Gesture { base: BaseStream, gesture: String },
}

impl StreamKey {
    pub fn base(&self) -> BaseStream {
        match self {
            Self::Base(b) | Self::Language { base: b, .. } | Self::Gesture { base: b, .. } => *b,
        }
    }

    /// Whether this key should populate the base-type wildcard index — i.e.
    /// whether a subscriber on this key wants *every* instance of its base
    /// stream. Gesture-qualified keys want exactly one gesture, so they are
    /// excluded (spec §8 scenario 6).
    fn wants_base_wildcard(&self) -> bool {
        !matches!(self, Self::Gesture { .. })
    }

    /// Parse a wire-format key string, e.g. `"transcription"`,
    /// `"transcription:en-US"`, `"transcription:en-US:es-ES"`, or
    /// `"touch_event:triple_tap"`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut segments = raw.split(':');
        let base_str = segments.next().ok_or(CoreError::MalformedMessage)?;
        let base = BaseStream::from_str(base_str)?;
        let rest: Vec<&str> = segments.collect();

        match (base, rest.len()) {
            (_, 0) => Ok(Self::Base(base)),
            (BaseStream::Transcription, 1) => {
                Ok(Self::Language { base, transcribe: LanguageTag::parse(rest[0])?, translate: None })
            }
            (BaseStream::Transcription, 2) => Ok(Self::Language {
                base,
                transcribe: LanguageTag::parse(rest[0])?,
                translate: Some(LanguageTag::parse(rest[1])?),
            }),
            (BaseStream::TouchEvent, 1) => {
                if rest[0].is_empty() {
                    return Err(CoreError::MalformedMessage);
                }
                Ok(Self::Gesture { base, gesture: rest[0].to_owned() })
            }
            _ => Err(CoreError::MalformedMessage),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(base) => write!(f, "{base}"),
            Self::Language { base, transcribe, translate: None } => {
                write!(f, "{base}:{transcribe}")
            }
            Self::Language { base, transcribe, translate: Some(translate) } => {
                write!(f, "{base}:{transcribe}:{translate}")
            }
            Self::Gesture { base, gesture } => write!(f, "{base}:{gesture}"),
        }
    }
}

/// A (transcribe, translate?) pair, the unit `getMinimalLanguageSubscriptions`
/// returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageTuple {
    pub transcribe: LanguageTag,
    pub translate: Option<LanguageTag>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DerivedFlags {
    has_pcm: bool,
    has_transcription: bool,
}

impl DerivedFlags {
    fn has_media(&self) -> bool {
        self.has_pcm || self.has_transcription
    }
}

/// Per-session subscription index: `streamKey -> set<packageName>`, plus a
/// base-type index for wildcard/bare-base matching, plus cached derived
/// booleans (spec §4.2).
pub struct SubscriptionManager {
    exact: RwLock<IndexMap<StreamKey, IndexSet<String>>>,
    by_base: RwLock<IndexMap<BaseStream, IndexSet<String>>>,
    derived: RwLock<DerivedFlags>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            exact: RwLock::new(IndexMap::new()),
            by_base: RwLock::new(IndexMap::new()),
            derived: RwLock::new(DerivedFlags::default()),
        }
    }

    /// Parse and dedupe a raw wire list of subscription strings.
    pub fn parse_list(raw: &[String]) -> Result<IndexSet<StreamKey>, CoreError> {
        let mut out = IndexSet::new();
        for entry in raw {
            out.insert(StreamKey::parse(entry)?);
        }
        Ok(out)
    }

    /// Replace `pkg`'s subscriptions, updating both indexes and the derived
    /// booleans. Returns `true` if the set of active transcription language
    /// tuples changed (used by the dispatcher to debounce a mic resync).
    pub async fn apply(
        &self,
        pkg: &str,
        old: &IndexSet<StreamKey>,
        new: &IndexSet<StreamKey>,
    ) -> bool {
        {
            let mut exact = self.exact.write().await;
            let mut by_base = self.by_base.write().await;

            for key in old.difference(new) {
                if let Some(set) = exact.get_mut(key) {
                    set.shift_remove(pkg);
                }
                if key.wants_base_wildcard() {
                    if let Some(set) = by_base.get_mut(&key.base()) {
                        set.shift_remove(pkg);
                    }
                }
            }
            for key in new.difference(old) {
                exact.entry(key.clone()).or_default().insert(pkg.to_owned());
                if key.wants_base_wildcard() {
                    by_base.entry(key.base()).or_default().insert(pkg.to_owned());
                }
            }
        }

        self.recompute_derived().await;
        language_tuples(old) != language_tuples(new)
    }

    /// Remove every subscription for `pkg` (AppSession dispose).
    pub async fn clear(&self, pkg: &str, current: &IndexSet<StreamKey>) {
        let empty = IndexSet::new();
        self.apply(pkg, current, &empty).await;
    }

    async fn recompute_derived(&self) {
        let exact = self.exact.read().await;
        let has_pcm = exact
            .iter()
            .any(|(key, set)| key.base() == BaseStream::Pcm && !set.is_empty());
        let has_transcription = exact
            .iter()
            .any(|(key, set)| key.base() == BaseStream::Transcription && !set.is_empty());
        drop(exact);
        *self.derived.write().await = DerivedFlags { has_pcm, has_transcription };
    }

    /// Union of apps subscribed to the exact key, to the bare base type (for
    /// language/gesture-qualified events), and to the two wildcards.
    pub async fn get_subscribed_apps(&self, key: &StreamKey) -> IndexSet<String> {
        let exact = self.exact.read().await;
        let by_base = self.by_base.read().await;

        let mut out = IndexSet::new();
        if let Some(set) = exact.get(key) {
            out.extend(set.iter().cloned());
        }
        if let Some(set) = by_base.get(&key.base()) {
            out.extend(set.iter().cloned());
        }
        for wildcard in [BaseStream::All, BaseStream::Wildcard] {
            if let Some(set) = by_base.get(&wildcard) {
                out.extend(set.iter().cloned());
            }
        }
        out
    }

    /// Minimal set of (transcribe, translate) tuples needed to cover every
    /// subscriber, in deterministic sorted order.
    pub async fn minimal_language_subscriptions(&self) -> Vec<LanguageTuple> {
        let exact = self.exact.read().await;
        let mut tuples: Vec<LanguageTuple> = exact
            .keys()
            .filter_map(|key| match key {
                StreamKey::Language { base: BaseStream::Transcription, transcribe, translate } => {
                    Some(LanguageTuple { transcribe: transcribe.clone(), translate: translate.clone() })
                }
                _ => None,
            })
            .collect();
        tuples.sort();
        tuples.dedup();
        tuples
    }

    pub async fn has_pcm(&self) -> bool {
        self.derived.read().await.has_pcm
    }

    pub async fn has_transcription(&self) -> bool {
        self.derived.read().await.has_transcription
    }

    pub async fn has_media(&self) -> bool {
        self.derived.read().await.has_media()
    }

    /// Snapshot of the three derived booleans, for the mic manager's cache.
    pub async fn snapshot(&self) -> MediaSnapshot {
        let flags = *self.derived.read().await;
        MediaSnapshot {
            has_pcm: flags.has_pcm,
            has_transcription: flags.has_transcription,
            has_media: flags.has_media(),
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time read of the derived subscription booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSnapshot {
    pub has_pcm: bool,
    pub has_transcription: bool,
    pub has_media: bool,
}

fn language_tuples(keys: &IndexSet<StreamKey>) -> Vec<LanguageTuple> {
    let mut tuples: Vec<LanguageTuple> = keys
        .iter()
        .filter_map(|key| match key {
            StreamKey::Language { base: BaseStream::Transcription, transcribe, translate } => {
                Some(LanguageTuple { transcribe: transcribe.clone(), translate: translate.clone() })
            }
            _ => None,
        })
        .collect();
    tuples.sort();
    tuples
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
