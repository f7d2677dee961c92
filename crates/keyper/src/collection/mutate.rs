//! Write-through operations and mutable working copies.

use super::{BackRef, Collection};
use crate::entity::{Entity, MutableEntity};

use keyper_core::{Error, Key, Result, Value, ValueRecord};

use std::sync::Arc;

impl Collection {
    /// Creates a record through the data source; the response is
    /// authoritative and lands in the cache.
    pub async fn create(&self, payload: ValueRecord) -> Result<Arc<Entity>> {
        let payload = self.apply_before_send(payload);
        let record = self
            .shared
            .source
            .create(&self.shared.name, payload)
            .await
            .map_err(|err| {
                err.context(Error::source_operation_failed(
                    self.shared.name.clone(),
                    "create",
                ))
            })?;
        self.insert(record)
    }

    /// Sends a full-payload update for `key`.
    pub async fn update(&self, key: &Key, mut payload: ValueRecord) -> Result<Arc<Entity>> {
        self.stamp_key(&mut payload, key)?;
        let payload = self.apply_before_send(payload);
        let record = self
            .shared
            .source
            .update(&self.shared.name, key, payload)
            .await
            .map_err(|err| {
                err.context(Error::source_operation_failed(
                    self.shared.name.clone(),
                    "update",
                ))
            })?;
        self.insert(record)
    }

    /// Sends only what changed in `mutable`.
    ///
    /// An empty diff is a no-op that resolves to the current cached
    /// snapshot without touching the data source.
    pub async fn update_diff(&self, mutable: &MutableEntity) -> Result<Arc<Entity>> {
        let key = mutable
            .key()
            .ok_or_else(|| Error::invalid_key("cannot update an entity without a primary key"))?
            .clone();

        let diff = self.diff(mutable)?;
        if !self.diff_has_changes(&diff) {
            tracing::trace!(collection = %self.shared.name, key = %key, "empty diff, skipping update");
            return self.get(&key);
        }

        let payload = self.apply_before_send(diff);
        let record = self
            .shared
            .source
            .update(&self.shared.name, &key, payload)
            .await
            .map_err(|err| {
                err.context(Error::source_operation_failed(
                    self.shared.name.clone(),
                    "update",
                ))
            })?;
        self.insert(record)
    }

    /// Like [`update_diff`](Self::update_diff), but also refreshes the
    /// caller's working copy from the post-response cache, preserving the
    /// relation mask it was created with.
    pub async fn update_inplace(&self, mutable: &mut MutableEntity) -> Result<Arc<Entity>> {
        let entity = self.update_diff(mutable).await?;
        let fields = self.mutable_fields(entity.key(), mutable.mask().cloned().as_ref())?;
        mutable.replace_fields(fields, entity.key().clone());
        Ok(entity)
    }

    /// Deletes through the data source, then drops any cached copy.
    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.shared
            .source
            .delete(&self.shared.name, key)
            .await
            .map_err(|err| {
                err.context(Error::source_operation_failed(
                    self.shared.name.clone(),
                    "delete",
                ))
            })?;
        self.remove(key);
        Ok(())
    }

    /// Routes to [`create`](Self::create) when `item` has no primary key
    /// yet, otherwise to [`update_diff`](Self::update_diff).
    pub async fn commit(&self, item: &MutableEntity) -> Result<Arc<Entity>> {
        match item.key() {
            None => self.create(item.fields().clone()).await,
            Some(_) => self.update_diff(item).await,
        }
    }

    /// A mutable working copy of the cached entity.
    ///
    /// With a relation mask, each requested back-reference bucket is
    /// materialized inline as a list of mutable records (recursing with the
    /// nested mask), so the caller can edit members and diff the whole
    /// shape.
    pub fn get_mutable(
        &self,
        key: &Key,
        mask: Option<&super::RelationMask>,
    ) -> Result<MutableEntity> {
        let fields = self.mutable_fields(key, mask)?;
        Ok(MutableEntity::new(
            self.shared.name.clone(),
            Some(key.clone()),
            fields,
            mask.cloned(),
        ))
    }

    fn mutable_fields(
        &self,
        key: &Key,
        mask: Option<&super::RelationMask>,
    ) -> Result<ValueRecord> {
        let entity = self.get(key)?;
        let mut fields = entity.fields().clone();

        if let Some(mask) = mask {
            let back_refs = {
                let links = self.shared.links.lock().unwrap();
                links.back_refs.clone()
            };
            for (name, submask) in mask.iter() {
                let Some(back_ref) = back_refs.get(name) else {
                    continue;
                };
                let declaring = self.related_collection(&back_ref.collection)?;
                let members = declaring.bucket_members(&back_ref.foreign_key, &key.to_value());
                let mut list = Vec::with_capacity(members.len());
                for member in members {
                    let nested = if submask.is_empty() { None } else { Some(submask) };
                    list.push(Value::Record(declaring.mutable_fields(member.key(), nested)?));
                }
                fields.insert(name.clone(), Value::List(list));
            }
        }

        Ok(fields)
    }

    /// Whether `mutable` differs from the cached snapshot.
    pub fn has_changes(&self, mutable: &MutableEntity) -> Result<bool> {
        Ok(self.diff_has_changes(&self.diff(mutable)?))
    }

    /// The structural difference between `mutable` and the cached snapshot,
    /// stamped with the source pk.
    ///
    /// Back-reference fields diff per element: an element without a pk is
    /// new and surfaces whole; the rest surface as nested diffs. The array
    /// appears in the result only when membership or any element changed.
    pub fn diff(&self, mutable: &MutableEntity) -> Result<ValueRecord> {
        let key = mutable
            .key()
            .ok_or_else(|| Error::invalid_key("cannot diff an entity without a primary key"))?;
        let current = self.get(key)?;
        let back_refs = {
            let links = self.shared.links.lock().unwrap();
            links.back_refs.clone()
        };

        let mut diff = ValueRecord::new();
        for (field, value) in mutable.fields().iter() {
            if let Some(back_ref) = back_refs.get(field) {
                if let Some(changed) = self.diff_back_ref(back_ref, key, value)? {
                    diff.insert(field.clone(), changed);
                }
                continue;
            }
            if current.get(field) != Some(value) {
                diff.insert(field.clone(), value.clone());
            }
        }

        self.stamp_key(&mut diff, key)?;
        Ok(diff)
    }

    fn diff_back_ref(
        &self,
        back_ref: &BackRef,
        key: &Key,
        value: &Value,
    ) -> Result<Option<Value>> {
        let Some(items) = value.as_list() else {
            return Ok(None);
        };
        let declaring = self.related_collection(&back_ref.collection)?;
        let current = declaring.bucket_members(&back_ref.foreign_key, &key.to_value());

        let mut changed = items.len() != current.len();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Some(record) = item.as_record() else {
                changed = true;
                out.push(item.clone());
                continue;
            };
            match declaring.primary_key_of(record) {
                // No pk: a new member, surfaced whole.
                Err(_) => {
                    changed = true;
                    out.push(item.clone());
                }
                Ok(member_key) => {
                    let nested = MutableEntity::new(
                        declaring.name().to_string(),
                        Some(member_key),
                        record.clone(),
                        None,
                    );
                    let nested_diff = declaring.diff(&nested)?;
                    if declaring.diff_has_changes(&nested_diff) {
                        changed = true;
                    }
                    out.push(Value::Record(nested_diff));
                }
            }
        }

        Ok(changed.then(|| Value::List(out)))
    }

    fn diff_has_changes(&self, diff: &ValueRecord) -> bool {
        let pk = &self.shared.config.primary_key;
        diff.iter().any(|(field, _)| !pk.contains(field))
    }

    /// Writes the pk components into a payload.
    fn stamp_key(&self, record: &mut ValueRecord, key: &Key) -> Result<()> {
        let pk = &self.shared.config.primary_key;
        match (pk.len(), key) {
            (1, key) if !key.is_composite() => {
                record.insert(pk[0].clone(), key.to_value());
            }
            (n, Key::Composite(parts)) if parts.len() == n => {
                for (field, part) in pk.iter().zip(parts) {
                    record.insert(field.clone(), part.to_value());
                }
            }
            _ => {
                return Err(Error::invalid_key(format!(
                    "key `{key}` does not match the primary key shape of `{}`",
                    self.shared.name
                )))
            }
        }
        Ok(())
    }

    fn apply_before_send(&self, payload: ValueRecord) -> ValueRecord {
        match &self.shared.config.before_send {
            Some(transform) => transform(payload),
            None => payload,
        }
    }
}
