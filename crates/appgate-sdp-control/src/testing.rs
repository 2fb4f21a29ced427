//! In-memory Controller for tests.
//!
//! `MemoryController` implements [`ControllerApi`] over plain maps: collection
//! endpoints hold entities keyed by id, singleton endpoints hold one document.
//! List queries behave like the real Controller (substring match on `name`,
//! name ordering, ranges), which is what the resolver depends on.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use appgate_sdp_core::{ControllerVersion, EntityId};

use crate::api::{ControllerApi, ListQuery};
use crate::error::{self, ControlError, Result};

/// A recorded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// HTTP method.
    pub method: &'static str,
    /// Request path.
    pub path: String,
    /// Request body, if any.
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Value>>,
    singletons: HashMap<String, Value>,
    singleton_paths: HashSet<String>,
    failures: Vec<(&'static str, String, u16, u32)>,
    reverts: Vec<(String, Value, u32)>,
    log: Vec<Recorded>,
}

/// An in-memory Controller.
#[derive(Debug)]
pub struct MemoryController {
    version: ControllerVersion,
    state: Mutex<State>,
}

impl MemoryController {
    /// An empty Controller reporting `version`.
    #[must_use]
    pub fn new(version: ControllerVersion) -> Self {
        Self {
            version,
            state: Mutex::new(State::default()),
        }
    }

    /// Store an entity under a collection path such as `/entitlements`.
    pub fn insert(&self, collection: &str, entity: Value) {
        let id = entity
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| EntityId::generate().to_string(), str::to_string);
        let mut entity = entity;
        if let Some(map) = entity.as_object_mut() {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        self.state
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, entity);
    }

    /// Set a singleton document such as `/globalSettings`.
    pub fn set_singleton(&self, path: &str, document: Value) {
        let mut state = self.state.lock();
        state.singleton_paths.insert(path.to_string());
        state.singletons.insert(path.to_string(), document);
    }

    /// Declare `path` a singleton endpoint that starts out empty.
    ///
    /// `POST` on such a path stores the body as the document.
    pub fn singleton_endpoint(&self, path: &str) {
        self.state.lock().singleton_paths.insert(path.to_string());
    }

    /// Current singleton document.
    #[must_use]
    pub fn singleton(&self, path: &str) -> Option<Value> {
        self.state.lock().singletons.get(path).cloned()
    }

    /// Current entity.
    #[must_use]
    pub fn entity(&self, collection: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Number of entities in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Make the next `times` requests of `method` on `path` answer `status`.
    pub fn fail(&self, method: &'static str, path: &str, status: u16, times: u32) {
        self.state
            .lock()
            .failures
            .push((method, path.to_string(), status, times));
    }

    /// After each of the next `times` PUTs on the singleton `path`, replace the
    /// stored document with `document`, as a concurrent writer would.
    pub fn revert_after_put(&self, path: &str, document: Value, times: u32) {
        self.state
            .lock()
            .reverts
            .push((path.to_string(), document, times));
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().log.clone()
    }

    /// Requests of `method` received so far.
    #[must_use]
    pub fn requests_of(&self, method: &str) -> Vec<Recorded> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    fn record(&self, method: &'static str, path: &str, body: Option<&Value>) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(Recorded {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let injected = state
            .failures
            .iter_mut()
            .find(|(m, p, _, times)| *m == method && p == path && *times > 0);
        if let Some((_, _, status, times)) = injected {
            *times -= 1;
            return Err(error::from_response(*status, ""));
        }
        Ok(())
    }

    fn split(path: &str) -> Option<(&str, &str)> {
        let (collection, id) = path.rsplit_once('/')?;
        if collection.is_empty() {
            None
        } else {
            Some((collection, id))
        }
    }
}

fn name_of(entity: &Value) -> String {
    entity
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

#[async_trait]
impl ControllerApi for MemoryController {
    async fn controller_version(&self) -> Result<ControllerVersion> {
        Ok(self.version)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.record("GET", path, None)?;
        let state = self.state.lock();

        if let Some(doc) = state.singletons.get(path) {
            return Ok(doc.clone());
        }
        if let Some(collection) = state.collections.get(path) {
            return Ok(json!({ "data": collection.values().cloned().collect::<Vec<_>>() }));
        }
        if let Some((collection, id)) = Self::split(path) {
            if let Some(entity) = state.collections.get(collection).and_then(|c| c.get(id)) {
                return Ok(entity.clone());
            }
        }
        Err(error::from_response(404, r#"{"id": "not found"}"#))
    }

    async fn list(&self, path: &str, query: &ListQuery) -> Result<Vec<Value>> {
        self.record("GET", path, None)?;
        let state = self.state.lock();

        let mut items: Vec<Value> = state
            .collections
            .get(path)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();

        if let Some(q) = &query.query {
            items.retain(|e| name_of(e).contains(q.as_str()));
        }
        if query.order_by.as_deref() == Some("name") {
            items.sort_by_key(name_of);
        }
        if let Some((start, end)) = query.range.as_deref().and_then(parse_range) {
            items = items.into_iter().skip(start).take(end.saturating_sub(start)).collect();
        }
        Ok(items)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.record("POST", path, Some(body))?;
        let mut entity = body.clone();
        let mut state = self.state.lock();

        if state.singleton_paths.contains(path) {
            if let Some(map) = entity.as_object_mut() {
                map.entry("id")
                    .or_insert_with(|| Value::String(EntityId::generate().to_string()));
            }
            state.singletons.insert(path.to_string(), entity.clone());
            return Ok(entity);
        }

        let id = entity
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| EntityId::generate().to_string(), str::to_string);
        if let Some(map) = entity.as_object_mut() {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        let collection = state.collections.entry(path.to_string()).or_default();
        if collection.contains_key(&id) {
            return Err(ControlError::Conflict(format!("{path}/{id} already exists")));
        }
        collection.insert(id, entity.clone());
        Ok(entity)
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.record("PUT", path, Some(body))?;
        let mut state = self.state.lock();

        let reverted = state
            .reverts
            .iter_mut()
            .find(|(p, _, times)| p == path && *times > 0)
            .map(|(_, doc, times)| {
                *times -= 1;
                doc.clone()
            });
        if let Some(doc) = state.singletons.get_mut(path) {
            *doc = reverted.unwrap_or_else(|| body.clone());
            return Ok(body.clone());
        }
        if let Some((collection, id)) = Self::split(path) {
            if let Some(entity) = state
                .collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
            {
                *entity = body.clone();
                return Ok(body.clone());
            }
        }
        Err(error::from_response(404, ""))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record("DELETE", path, None)?;
        let mut state = self.state.lock();

        if state.singletons.remove(path).is_some() {
            return Ok(());
        }
        if let Some((collection, id)) = Self::split(path) {
            if state
                .collections
                .get_mut(collection)
                .and_then(|c| c.remove(id))
                .is_some()
            {
                return Ok(());
            }
        }
        Err(error::from_response(404, ""))
    }
}
