//! Client-side reconciliation of broadcast events into local collections.
//!
//! Every membership operation here is idempotent: applying the same
//! event twice leaves a collection exactly as applying it once. That is
//! what makes un-suppressed self-delivery safe: a client may receive
//! the echo of its own mutation before, after, or instead of the RPC
//! reply and still converge.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::record::{id_key_of, Record};
use super::protocol::{BroadcastEvent, ConnectionId, Envelope};

/// What to do with events originated by this client's own connection.
///
/// `ApplyOwn` re-applies echoes through the same merge path as everyone
/// else's events; `DropOwn` discards them, for deployments where the
/// application applies RPC replies to its collections itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoPolicy {
    #[default]
    ApplyOwn,
    DropOwn,
}

/// An ordered, id-keyed set of records held locally.
///
/// At most one record per id at any time; insertion order is preserved
/// across merges. Mutated by the [`Reconciler`] on broadcast arrival, or
/// directly by the owning consumer.
#[derive(Debug, Default)]
pub struct Collection {
    items: RwLock<Vec<Record>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, or merge its fields into the existing record with
    /// the same id. Records without an id are skipped (membership is
    /// id-keyed). Returns whether the collection changed shape or
    /// content.
    pub fn upsert(&self, record: &Record) -> bool {
        let Some(key) = record.id_key() else {
            return false;
        };
        let mut items = self.items.write();
        match items.iter_mut().find(|r| r.id_key().as_deref() == Some(&key)) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge_from(record);
                *existing != before
            }
            None => {
                items.push(record.clone());
                true
            }
        }
    }

    /// Remove the record with the given id, if present.
    pub fn remove(&self, id: &Value) -> bool {
        let key = id_key_of(id);
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|r| r.id_key().as_deref() != Some(&key));
        items.len() != before
    }

    /// Replace the entire membership.
    pub fn reset(&self, records: &[Record]) {
        let mut fresh: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            // Keep the invariant even against a duplicate-laden snapshot.
            match record.id_key() {
                Some(key) => {
                    if let Some(existing) = fresh
                        .iter_mut()
                        .find(|r| r.id_key().as_deref() == Some(&key))
                    {
                        existing.merge_from(record);
                    } else {
                        fresh.push(record.clone());
                    }
                }
                None => continue,
            }
        }
        *self.items.write() = fresh;
    }

    pub fn get(&self, id: &Value) -> Option<Record> {
        let key = id_key_of(id);
        self.items
            .read()
            .iter()
            .find(|r| r.id_key().as_deref() == Some(&key))
            .cloned()
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Snapshot of the current membership in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.items.read().clone()
    }
}

/// Applies inbound broadcast events to every registered collection.
#[derive(Clone, Default)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

#[derive(Default)]
struct ReconcilerInner {
    collections: DashMap<Uuid, Arc<Collection>>,
    echo: RwLock<EchoPolicy>,
    local_id: RwLock<Option<ConnectionId>>,
}

impl Reconciler {
    pub fn new(echo: EchoPolicy) -> Self {
        let reconciler = Self::default();
        *reconciler.inner.echo.write() = echo;
        reconciler
    }

    /// Register a collection for broadcast updates. Returns a handle for
    /// [`detach`](Self::detach). Registration is safe while broadcasts
    /// are being applied.
    pub fn attach(&self, collection: Arc<Collection>) -> Uuid {
        let handle = Uuid::new_v4();
        self.inner.collections.insert(handle, collection);
        handle
    }

    pub fn detach(&self, handle: Uuid) -> bool {
        self.inner.collections.remove(&handle).is_some()
    }

    pub fn collection_count(&self) -> usize {
        self.inner.collections.len()
    }

    /// Record the connection identity announced by the hub's welcome
    /// frame; used only by the `DropOwn` echo policy.
    pub fn set_local_id(&self, id: ConnectionId) {
        *self.inner.local_id.write() = Some(id);
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        *self.inner.local_id.read()
    }

    /// Apply one envelope to every registered collection.
    pub fn apply(&self, envelope: &Envelope) {
        if *self.inner.echo.read() == EchoPolicy::DropOwn
            && self.local_id() == Some(envelope.originator)
        {
            tracing::trace!(originator = %envelope.originator, "dropping own echo");
            return;
        }

        for entry in self.inner.collections.iter() {
            apply_event(entry.value(), &envelope.event);
        }
    }
}

fn apply_event(collection: &Collection, event: &BroadcastEvent) {
    match event {
        // A created record that already exists locally is merged like an
        // update; a missing record in an update is added. Both collapse
        // to the same idempotent upsert.
        BroadcastEvent::Created(record) | BroadcastEvent::Updated(record) => {
            collection.upsert(record);
        }
        BroadcastEvent::Destroyed(record) => {
            if let Some(id) = record.id() {
                collection.remove(id);
            }
        }
        BroadcastEvent::Reset(records) => collection.reset(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64, name: &str) -> Record {
        let mut r = Record::new();
        r.set_id(id);
        r.set("name", name);
        r
    }

    fn setup() -> (Reconciler, Arc<Collection>) {
        let reconciler = Reconciler::default();
        let collection = Arc::new(Collection::new());
        reconciler.attach(collection.clone());
        (reconciler, collection)
    }

    #[test]
    fn every_event_kind_is_idempotent() {
        let (reconciler, collection) = setup();
        let events = [
            Envelope::from_hub(BroadcastEvent::Created(record(1, "x"))),
            Envelope::from_hub(BroadcastEvent::Updated(record(1, "y"))),
            Envelope::from_hub(BroadcastEvent::Reset(vec![record(1, "y"), record(2, "z")])),
            Envelope::from_hub(BroadcastEvent::Destroyed(record(2, "z"))),
        ];

        for envelope in &events {
            reconciler.apply(envelope);
            let once = collection.records();
            reconciler.apply(envelope);
            assert_eq!(collection.records(), once);
        }
    }

    #[test]
    fn distinct_creates_never_duplicate() {
        let (reconciler, collection) = setup();
        for id in [1u64, 2, 3, 2, 1] {
            reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(record(
                id, "n",
            ))));
        }
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn update_on_missing_record_adds_it() {
        let (reconciler, collection) = setup();
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Updated(record(7, "w"))));
        assert_eq!(
            collection.get(&json!(7)).unwrap().get("name"),
            Some(&json!("w"))
        );
    }

    #[test]
    fn destroy_on_missing_record_is_a_noop() {
        let (reconciler, collection) = setup();
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(record(1, "x"))));
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Destroyed(record(2, "y"))));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn reset_membership_is_total() {
        let (reconciler, collection) = setup();
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(record(1, "x"))));
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(record(2, "y"))));

        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Reset(vec![
            record(3, "a"),
            record(4, "b"),
        ])));

        assert_eq!(collection.len(), 2);
        assert!(!collection.contains(&json!(1)));
        assert!(collection.contains(&json!(3)));
        assert!(collection.contains(&json!(4)));
    }

    #[test]
    fn out_of_order_arrival_converges() {
        // updated(1,"y") twice and created(1,"x") in any interleaving
        // must end with one record, name "y" last-applied.
        let created = Envelope::from_hub(BroadcastEvent::Created(record(1, "x")));
        let updated = Envelope::from_hub(BroadcastEvent::Updated(record(1, "y")));

        let orders: [[&Envelope; 3]; 3] = [
            [&created, &updated, &updated],
            [&updated, &created, &updated],
            [&updated, &updated, &created],
        ];

        for order in orders {
            let (reconciler, collection) = setup();
            for envelope in order {
                reconciler.apply(envelope);
            }
            assert_eq!(collection.len(), 1);
            let final_record = collection.get(&json!(1)).unwrap();
            // Last-applied write to `name` wins, whatever the order.
            let name = final_record.get("name").unwrap();
            let last = order[2];
            let expected = match &last.event {
                BroadcastEvent::Created(r) | BroadcastEvent::Updated(r) => {
                    r.get("name").unwrap().clone()
                }
                _ => unreachable!(),
            };
            assert_eq!(name, &expected);
        }
    }

    #[test]
    fn records_without_id_are_skipped() {
        let (reconciler, collection) = setup();
        let mut nameless = Record::new();
        nameless.set("name", "ghost");
        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(nameless)));
        assert!(collection.is_empty());
    }

    #[test]
    fn drop_own_echo_policy_suppresses_self() {
        let reconciler = Reconciler::new(EchoPolicy::DropOwn);
        let collection = Arc::new(Collection::new());
        reconciler.attach(collection.clone());

        let me = Uuid::new_v4();
        reconciler.set_local_id(me);

        reconciler.apply(&Envelope::new(me, BroadcastEvent::Created(record(1, "x"))));
        assert!(collection.is_empty());

        let other = Uuid::new_v4();
        reconciler.apply(&Envelope::new(other, BroadcastEvent::Created(record(1, "x"))));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn detach_stops_updates() {
        let reconciler = Reconciler::default();
        let collection = Arc::new(Collection::new());
        let handle = reconciler.attach(collection.clone());
        assert!(reconciler.detach(handle));

        reconciler.apply(&Envelope::from_hub(BroadcastEvent::Created(record(1, "x"))));
        assert!(collection.is_empty());
    }

    #[test]
    fn reset_deduplicates_snapshot_by_id() {
        let collection = Collection::new();
        collection.reset(&[record(1, "a"), record(1, "b"), record(2, "c")]);
        assert_eq!(collection.len(), 2);
        assert_eq!(
            collection.get(&json!(1)).unwrap().get("name"),
            Some(&json!("b"))
        );
    }
}
