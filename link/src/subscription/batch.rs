use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{RavenLinkError, Result};
use crate::models::Revision;

/// One document delivered in a batch.
///
/// The payload stays raw until [`result`](Self::result) or
/// [`revision`](Self::revision) is called. Items the server could not
/// produce carry an [`exception`](Self::exception) instead of failing the
/// whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    id: String,
    change_vector: Option<String>,
    collection: Option<String>,
    metadata: Map<String, JsonValue>,
    raw: JsonValue,
    exception: Option<String>,
    size: usize,
}

fn metadata_str(metadata: &Map<String, JsonValue>, key: &str) -> Option<String> {
    metadata.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

impl BatchItem {
    pub(crate) fn from_frame(raw: JsonValue, exception: Option<String>, size: usize) -> Self {
        let metadata = raw
            .get("@metadata")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        let id = metadata_str(&metadata, "@id");

        let exception = match (exception, raw.is_object(), &id) {
            (Some(e), _, _) => Some(e),
            (None, false, _) => Some("document payload is not a JSON object".to_string()),
            (None, true, None) => Some("document is missing @metadata.@id".to_string()),
            (None, true, Some(_)) => None,
        };

        Self {
            id: id.unwrap_or_default(),
            change_vector: metadata_str(&metadata, "@change-vector"),
            collection: metadata_str(&metadata, "@collection"),
            metadata,
            raw,
            exception,
            size,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn change_vector(&self) -> Option<&str> {
        self.change_vector.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    /// Payload as received, `@metadata` included.
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    /// Per-item failure reported by the server.
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    fn invalid(&self, message: impl Into<String>) -> RavenLinkError {
        RavenLinkError::InvalidDocumentInBatch {
            id: self.id.clone(),
            message: message.into(),
        }
    }

    /// Deserialize the payload.
    pub fn result<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(exception) = &self.exception {
            return Err(self.invalid(exception.clone()));
        }
        T::deserialize(&self.raw).map_err(|e| self.invalid(e.to_string()))
    }

    /// Deserialize a revisions-subscription payload.
    pub fn revision<T: DeserializeOwned>(&self) -> Result<Revision<T>> {
        if let Some(exception) = &self.exception {
            return Err(self.invalid(exception.clone()));
        }
        Revision::<T>::deserialize(&self.raw).map_err(|e| self.invalid(e.to_string()))
    }
}

/// Counters included with a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterIncludes {
    pub counter_includes: JsonValue,
    pub included_counter_names: JsonValue,
}

/// A group of documents delivered and acknowledged as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionBatch {
    items: Vec<BatchItem>,
    includes: Vec<JsonValue>,
    counter_includes: Vec<CounterIncludes>,
    size_in_bytes: usize,
    last_change_vector: Option<String>,
    batch_number: u64,
}

impl SubscriptionBatch {
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn number_of_items_in_batch(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes received for this batch, includes frames counted.
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Change vector the acknowledgment carries.
    pub fn last_change_vector(&self) -> Option<&str> {
        self.last_change_vector.as_deref()
    }

    pub fn includes(&self) -> &[JsonValue] {
        &self.includes
    }

    pub fn counter_includes(&self) -> &[CounterIncludes] {
        &self.counter_includes
    }

    /// 1-based position of this batch within the worker's lifetime.
    pub fn batch_number(&self) -> u64 {
        self.batch_number
    }

    /// Included document with the given id, if the server sent one.
    pub fn included_document(&self, id: &str) -> Option<&JsonValue> {
        self.includes.iter().find_map(|inc| {
            inc.as_object()?
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(id))
                .map(|(_, v)| v)
        })
    }
}

/// Accumulates frames until `EndOfBatch`.
#[derive(Debug, Default)]
pub(crate) struct BatchBuilder {
    items: Vec<BatchItem>,
    includes: Vec<JsonValue>,
    counter_includes: Vec<CounterIncludes>,
    size_in_bytes: usize,
}

impl BatchBuilder {
    pub(crate) fn push_item(&mut self, data: JsonValue, exception: Option<String>, size: usize) {
        self.size_in_bytes += size;
        self.items.push(BatchItem::from_frame(data, exception, size));
    }

    pub(crate) fn add_includes(&mut self, includes: JsonValue, size: usize) {
        self.size_in_bytes += size;
        self.includes.push(includes);
    }

    pub(crate) fn add_counter_includes(&mut self, includes: CounterIncludes, size: usize) {
        self.size_in_bytes += size;
        self.counter_includes.push(includes);
    }

    pub(crate) fn finish(&mut self, batch_number: u64) -> SubscriptionBatch {
        let items = std::mem::take(&mut self.items);
        let last_change_vector = items
            .iter()
            .rev()
            .find_map(|item| item.change_vector.clone());
        SubscriptionBatch {
            items,
            includes: std::mem::take(&mut self.includes),
            counter_includes: std::mem::take(&mut self.counter_includes),
            size_in_bytes: std::mem::take(&mut self.size_in_bytes),
            last_change_vector,
            batch_number,
        }
    }
}
