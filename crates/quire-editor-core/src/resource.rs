//! Resolution cache for embedded resources (image paths, attachments).
//!
//! Owned by a surface session. A miss issues exactly one
//! `REQUEST_RESOURCE_URI` and records the key as pending; later lookups for
//! the same key answer from the cache without asking again. Terminal entries
//! stay until `invalidate_all`.

use std::collections::HashMap;
use std::sync::LazyLock;

use quire_common::RequestIdGenerator;
use quire_protocol::{RequestId, ResourceKind, SurfaceMessage};
use smol_str::SmolStr;

use crate::render::{ImageState, ImageStates, Regex, Trigger};

/// Reason recorded for references refused by the external-resource policy.
pub const EXTERNAL_BLOCKED: &str = "external_blocked";

static EXTERNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:(?:https?|ftps?|wss?)://|//)").unwrap());

/// Whether `reference` points at the network.
pub fn is_external(reference: &str) -> bool {
    EXTERNAL.is_match(reference.trim())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResourceKey {
    document_uri: SmolStr,
    kind: ResourceKind,
    reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Ready(String),
    Failed(SmolStr),
}

impl Resolution {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resolution::Pending)
    }
}

impl From<Resolution> for ImageState {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Pending => ImageState::Loading,
            Resolution::Ready(handle) => ImageState::Ready { handle },
            Resolution::Failed(reason) => ImageState::Failed { reason },
        }
    }
}

#[derive(Debug)]
pub struct ResourceCache {
    entries: HashMap<ResourceKey, Resolution>,
    in_flight: HashMap<RequestId, ResourceKey>,
    ids: RequestIdGenerator,
    allow_external: bool,
    outgoing: Vec<SurfaceMessage>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ResourceCache {
    pub fn new(allow_external: bool) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            ids: RequestIdGenerator::new("res-"),
            allow_external,
            outgoing: Vec::new(),
        }
    }

    pub fn allow_external(&self) -> bool {
        self.allow_external
    }

    /// Change the external policy. Returns true if it changed, in which case
    /// terminal entries are dropped so refused references get another chance.
    pub fn set_allow_external(&mut self, allow: bool) -> bool {
        if self.allow_external == allow {
            return false;
        }
        self.allow_external = allow;
        self.invalidate_all();
        true
    }

    /// Current state for a key, issuing a resolution request on first sight.
    pub fn lookup(&mut self, kind: ResourceKind, reference: &str, document_uri: &str) -> Resolution {
        let key = ResourceKey {
            document_uri: SmolStr::new(document_uri),
            kind,
            reference: reference.to_string(),
        };
        if let Some(entry) = self.entries.get(&key) {
            return entry.clone();
        }

        if reference.starts_with("data:") {
            let ready = Resolution::Ready(reference.to_string());
            self.entries.insert(key, ready.clone());
            return ready;
        }

        if !self.allow_external && is_external(reference) {
            tracing::debug!(target: "quire::resource", reference, "external resource refused");
            let failed = Resolution::Failed(SmolStr::new_static(EXTERNAL_BLOCKED));
            self.entries.insert(key, failed.clone());
            return failed;
        }

        let request_id = self.ids.next_id();
        tracing::debug!(
            target: "quire::resource",
            %request_id,
            reference,
            kind = kind.as_str(),
            "requesting resource resolution"
        );
        self.outgoing.push(SurfaceMessage::RequestResourceUri {
            request_id: request_id.clone(),
            href: reference.to_string(),
            from_uri: key.document_uri.clone(),
            kind,
        });
        self.in_flight.insert(request_id, key.clone());
        self.entries.insert(key, Resolution::Pending);
        Resolution::Pending
    }

    /// Resolved handle, or `None` while pending or after a failure.
    pub fn resolve(
        &mut self,
        kind: ResourceKind,
        reference: &str,
        document_uri: &str,
    ) -> Option<String> {
        match self.lookup(kind, reference, document_uri) {
            Resolution::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    /// Record an answer. Returns `ForceRedraw` when an entry changed.
    ///
    /// Answers for unknown request ids are ignored.
    pub fn on_result(
        &mut self,
        request_id: &str,
        ok: bool,
        handle: Option<String>,
        error: Option<SmolStr>,
    ) -> Option<Trigger> {
        let Some(key) = self.in_flight.remove(request_id) else {
            tracing::warn!(target: "quire::resource", request_id, "resolution answer for unknown request");
            return None;
        };
        let resolution = match (ok, handle) {
            (true, Some(handle)) => Resolution::Ready(handle),
            (true, None) => Resolution::Failed(SmolStr::new_static("missing_handle")),
            (false, _) => Resolution::Failed(error.unwrap_or_else(|| SmolStr::new_static("unknown"))),
        };
        tracing::debug!(
            target: "quire::resource",
            request_id,
            reference = %key.reference,
            ?resolution,
            "resource resolved"
        );
        self.entries.insert(key, resolution);
        Some(Trigger::ForceRedraw)
    }

    /// Drop every terminal entry. Pending entries stay so their answers are
    /// still accepted and no duplicate request goes out.
    pub fn invalidate_all(&mut self) {
        self.entries.retain(|_, entry| !entry.is_terminal());
    }

    /// Outstanding resolution requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Requests issued since the last call, in order.
    pub fn take_requests(&mut self) -> Vec<SurfaceMessage> {
        std::mem::take(&mut self.outgoing)
    }
}

/// Image lookups for one document, as the renderer sees them.
pub struct DocumentImages<'a> {
    pub cache: &'a mut ResourceCache,
    pub document_uri: &'a str,
}

impl ImageStates for DocumentImages<'_> {
    fn image_state(&mut self, reference: &str) -> ImageState {
        self.cache
            .lookup(ResourceKind::Image, reference, self.document_uri)
            .into()
    }
}
