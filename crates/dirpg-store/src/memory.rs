use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use dirpg_entry::{AddEntry, ModifyEntry};
use dirpg_schema::{AttrKey, Dn, Rdn, Schema, SchemaValue};
use dirpg_types::LdapError;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entry::{SearchQuery, StoredEntry};
use crate::error::{StoreError, StoreResult};
use crate::predicate::Predicate;
use crate::traits::Repository;

pub const ENTRY_UUID: &str = "entryUUID";
pub const CREATE_TIMESTAMP: &str = "createTimestamp";
pub const MODIFY_TIMESTAMP: &str = "modifyTimestamp";
pub const HAS_SUBORDINATES: &str = "hasSubordinates";
pub const MEMBER_OF: &str = "memberOf";

type Table = BTreeMap<String, StoredEntry>;

/// In-memory entry store keyed by normalized DN.
///
/// Intended for tests and embedding. The table sits behind a `RwLock`.
/// Writes are staged on a copy of the table and committed at the end, so a
/// failed call leaves no trace.
pub struct InMemoryRepository {
    schema: Arc<Schema>,
    rows: RwLock<Table>,
}

impl InMemoryRepository {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: RwLock::new(Table::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.rows.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.read().expect("lock poisoned").is_empty()
    }

    /// All stored DNs in normalized form, sorted.
    pub fn all_dns(&self) -> Vec<String> {
        self.rows.read().expect("lock poisoned").keys().cloned().collect()
    }
}

impl std::fmt::Debug for InMemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("entry_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, entry: &AddEntry) -> StoreResult<StoredEntry> {
        let schema = self.schema.as_ref();
        let dn = entry.dn();
        let key = dn.norm_string();

        let mut rows = self.rows.write().expect("lock poisoned");
        if rows.contains_key(&key) {
            return Err(StoreError::AlreadyExists { dn: dn.to_string() });
        }
        check_parent(&rows, dn)?;
        for value in entry.associations() {
            for (index, target) in targets(value).iter().enumerate() {
                if !rows.contains_key(target) {
                    return Err(missing_target(value.description(), index));
                }
            }
        }

        let mut staged = rows.clone();
        let (attrs_norm, attrs_orig) = entry.attrs();
        let mut row = StoredEntry {
            id: Uuid::now_v7(),
            dn: dn.clone(),
            attrs_norm,
            attrs_orig,
        };
        let id = row.id.to_string();
        let now = timestamp();
        set_attr(schema, &mut row, ENTRY_UUID, vec![id])?;
        set_attr(schema, &mut row, CREATE_TIMESTAMP, vec![now.clone()])?;
        set_attr(schema, &mut row, MODIFY_TIMESTAMP, vec![now])?;
        staged.insert(key.clone(), row);

        refresh_subordinates(schema, &mut staged, dn)?;
        if let Some(parent) = dn.parent() {
            refresh_subordinates(schema, &mut staged, &parent)?;
        }
        for value in entry.associations() {
            for target in targets(value) {
                edit_back_reference(schema, &mut staged, &target, dn, true)?;
            }
        }

        let stored = staged
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("row {key} vanished during insert")))?;
        *rows = staged;
        info!(dn = %dn, id = %stored.id, "entry inserted");
        Ok(stored)
    }

    async fn find(&self, dn: &Dn) -> StoreResult<Option<StoredEntry>> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.get(&dn.norm_string()).cloned())
    }

    async fn update(&self, entry: &ModifyEntry) -> StoreResult<()> {
        let schema = self.schema.as_ref();
        let dn = entry.dn();
        let key = dn.norm_string();

        let mut rows = self.rows.write().expect("lock poisoned");
        let id = rows
            .get(&key)
            .map(|row| row.id)
            .ok_or_else(|| StoreError::NoSuchObject { dn: dn.to_string() })?;

        let touched = entry.associations();
        for assoc in &touched {
            let before: BTreeSet<String> = targets(assoc.old).into_iter().collect();
            let after = assoc.new.map(targets).unwrap_or_default();
            for (index, target) in after.iter().enumerate() {
                if !before.contains(target) && !rows.contains_key(target) {
                    return Err(missing_target(assoc.key.to_string(), index));
                }
            }
        }

        // Back-references follow the union over every association attribute,
        // so a target still named by another attribute keeps its memberOf.
        let mut before: BTreeSet<String> = touched.iter().flat_map(|a| targets(a.old)).collect();
        let mut after = BTreeSet::new();
        for value in entry.values().filter(|v| v.attribute_type().association) {
            let current = targets(value);
            if !touched.iter().any(|a| *a.key == value.key()) {
                before.extend(current.iter().cloned());
            }
            after.extend(current);
        }
        let added: Vec<String> = after.difference(&before).cloned().collect();
        let removed: Vec<String> = before.difference(&after).cloned().collect();

        let mut staged = rows.clone();
        let (attrs_norm, attrs_orig) = entry.attrs();
        let mut row = StoredEntry {
            id,
            dn: dn.clone(),
            attrs_norm,
            attrs_orig,
        };
        set_attr(schema, &mut row, MODIFY_TIMESTAMP, vec![timestamp()])?;
        staged.insert(key, row);
        for target in &removed {
            edit_back_reference(schema, &mut staged, target, dn, false)?;
        }
        for target in &added {
            edit_back_reference(schema, &mut staged, target, dn, true)?;
        }

        *rows = staged;
        info!(dn = %dn, added = added.len(), removed = removed.len(), "entry updated");
        Ok(())
    }

    async fn update_dn(&self, old: &Dn, new: &Dn, old_rdn: Option<&Rdn>) -> StoreResult<()> {
        let schema = self.schema.as_ref();
        let old_key = old.norm_string();
        let new_key = new.norm_string();

        let mut rows = self.rows.write().expect("lock poisoned");
        let current = rows
            .get(&old_key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchObject { dn: old.to_string() })?;
        if old_key != new_key && rows.contains_key(&new_key) {
            return Err(StoreError::AlreadyExists { dn: new.to_string() });
        }
        if new.is_descendant_of(old) {
            return Err(LdapError::UnwillingToPerform {
                reason: format!("cannot move {old} below itself"),
            }
            .into());
        }
        if let Some(parent) = new.parent().filter(|p| Some(p) != old.parent().as_ref()) {
            if !parent.is_root() && !rows.contains_key(&parent.norm_string()) {
                return Err(StoreError::NoSuchObject {
                    dn: parent.to_string(),
                });
            }
        }

        let renamed = ModifyEntry::from_stored(Arc::clone(&self.schema), old.clone(), &current.attrs_orig)?;
        let mut renamed = renamed.modify_rdn(new.clone())?;
        if old_rdn.is_none() {
            if let Some(rdn) = old.rdn() {
                renamed.remove_rdn_values(rdn)?;
            }
        }
        renamed.validate()?;

        let mut staged = rows.clone();
        let moved: Vec<(Dn, Option<Dn>)> = staged
            .values()
            .filter_map(|row| row.dn.rebase(old, new).map(|to| (row.dn.clone(), Some(to))))
            .collect();
        for (from, to) in &moved {
            if let (Some(mut row), Some(to)) = (staged.remove(&from.norm_string()), to) {
                row.dn = to.clone();
                staged.insert(to.norm_string(), row);
            }
        }

        let (attrs_norm, attrs_orig) = renamed.attrs();
        let row = staged
            .get_mut(&new_key)
            .ok_or_else(|| StoreError::Backend(format!("row {new_key} vanished during rename")))?;
        row.attrs_norm = attrs_norm;
        row.attrs_orig = attrs_orig;
        set_attr(schema, row, MODIFY_TIMESTAMP, vec![timestamp()])?;

        rewrite_references(schema, &mut staged, &moved)?;
        for parent in [old.parent(), new.parent()].into_iter().flatten() {
            refresh_subordinates(schema, &mut staged, &parent)?;
        }

        *rows = staged;
        info!(old = %old, new = %new, moved = moved.len(), "entry renamed");
        Ok(())
    }

    async fn delete(&self, dn: &Dn) -> StoreResult<()> {
        let schema = self.schema.as_ref();
        let key = dn.norm_string();

        let mut rows = self.rows.write().expect("lock poisoned");
        if !rows.contains_key(&key) {
            return Err(StoreError::NoSuchObject { dn: dn.to_string() });
        }
        if rows.values().any(|row| row.dn.is_child_of(dn)) {
            return Err(StoreError::NotAllowedOnNonLeaf { dn: dn.to_string() });
        }

        let mut staged = rows.clone();
        staged.remove(&key);
        rewrite_references(schema, &mut staged, &[(dn.clone(), None)])?;
        if let Some(parent) = dn.parent() {
            refresh_subordinates(schema, &mut staged, &parent)?;
        }

        *rows = staged;
        info!(dn = %dn, "entry deleted");
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<StoredEntry>> {
        let predicate = Predicate::compile(&query.filter)?;
        let rows = self.rows.read().expect("lock poisoned");
        if !query.base.is_root() && !rows.contains_key(&query.base.norm_string()) {
            return Err(StoreError::NoSuchObject {
                dn: query.base.to_string(),
            });
        }

        let mut hits: Vec<StoredEntry> = rows
            .values()
            .filter(|row| query.in_scope(&row.dn) && predicate.matches(&row.attrs_norm))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            a.dn.depth()
                .cmp(&b.dn.depth())
                .then_with(|| a.dn_norm().cmp(&b.dn_norm()))
        });
        if let Some(limit) = query.size_limit {
            hits.truncate(limit);
        }
        debug!(
            base = %query.base,
            scope = %query.scope,
            predicate = %query.filter.predicate,
            hits = hits.len(),
            "search"
        );
        Ok(hits)
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%SZ").to_string()
}

fn missing_target(attr: String, index: usize) -> StoreError {
    LdapError::InvalidAttributeSyntax { attr, index }.into()
}

/// Normalized DNs referenced by an association value.
fn targets(value: &SchemaValue) -> Vec<String> {
    value
        .norm()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// The parent must exist once the entry sits inside a stored tree. The first
/// entry of a tree (its naming context) has no stored parent.
fn check_parent(rows: &Table, dn: &Dn) -> StoreResult<()> {
    let Some(parent) = dn.parent() else {
        return Ok(());
    };
    if parent.is_root() || rows.contains_key(&parent.norm_string()) {
        return Ok(());
    }
    if rows.values().any(|row| dn.is_descendant_of(&row.dn)) {
        return Err(StoreError::NoSuchObject {
            dn: parent.to_string(),
        });
    }
    Ok(())
}

fn current_value(schema: &Schema, row: &StoredEntry, key: &AttrKey) -> StoreResult<SchemaValue> {
    let orig = row.attrs_orig.get(&key.to_string()).cloned().unwrap_or_default();
    Ok(SchemaValue::from_stored(schema, key, &orig)?)
}

/// Replace one attribute on a row, keeping both documents in step. An empty
/// list removes the attribute.
fn set_attr(schema: &Schema, row: &mut StoredEntry, name: &str, orig: Vec<String>) -> StoreResult<()> {
    set_key(schema, row, &AttrKey::plain(name), orig)
}

fn set_key(schema: &Schema, row: &mut StoredEntry, key: &AttrKey, orig: Vec<String>) -> StoreResult<()> {
    let name = key.to_string();
    let Value::Object(doc) = &mut row.attrs_norm else {
        return Err(StoreError::Corrupted {
            dn: row.dn.to_string(),
            reason: "normalized attributes are not an object".into(),
        });
    };
    if orig.is_empty() {
        doc.remove(&name);
        row.attrs_orig.remove(&name);
        return Ok(());
    }
    let value = SchemaValue::from_stored(schema, key, &orig)?;
    doc.insert(name.clone(), value.norm_json());
    row.attrs_orig.insert(name, value.orig_strings());
    Ok(())
}

fn refresh_subordinates(schema: &Schema, rows: &mut Table, dn: &Dn) -> StoreResult<()> {
    let has_children = rows.values().any(|row| row.dn.is_child_of(dn));
    if let Some(row) = rows.get_mut(&dn.norm_string()) {
        let flag = if has_children { "TRUE" } else { "FALSE" };
        set_attr(schema, row, HAS_SUBORDINATES, vec![flag.to_string()])?;
    }
    Ok(())
}

/// Add or remove `source` in the `memberOf` values of `target`.
fn edit_back_reference(
    schema: &Schema,
    rows: &mut Table,
    target: &str,
    source: &Dn,
    add: bool,
) -> StoreResult<()> {
    let Some(row) = rows.get_mut(target) else {
        return Ok(());
    };
    let key = AttrKey::plain(MEMBER_OF);
    let mut value = current_value(schema, row, &key)?;
    let reference = SchemaValue::new(schema, MEMBER_OF, &[source.to_string()])?;
    if add {
        value.merge(&reference)?;
    } else {
        value.delete(&reference);
    }
    set_key(schema, row, &key, value.orig_strings())
}

/// Rewrite association and `memberOf` values naming a moved entry. A `None`
/// destination drops the value.
fn rewrite_references(schema: &Schema, rows: &mut Table, moved: &[(Dn, Option<Dn>)]) -> StoreResult<()> {
    let renames: HashMap<String, Option<String>> = moved
        .iter()
        .map(|(from, to)| (from.norm_string(), to.as_ref().map(Dn::to_string)))
        .collect();
    let keys: Vec<AttrKey> = schema
        .association_attributes()
        .map(|attr| AttrKey::plain(&attr.name))
        .chain(std::iter::once(AttrKey::plain(MEMBER_OF)))
        .collect();

    for row in rows.values_mut() {
        for key in &keys {
            let value = current_value(schema, row, key)?;
            let mut changed = false;
            let mut orig = Vec::with_capacity(value.len());
            for (o, n) in value.orig().zip(value.norm()) {
                match n.as_str().and_then(|n| renames.get(n)) {
                    Some(Some(to)) => {
                        orig.push(to.clone());
                        changed = true;
                    }
                    Some(None) => changed = true,
                    None => orig.push(o.to_string()),
                }
            }
            if changed {
                set_key(schema, row, key, orig)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirpg_filter::{Filter, FilterCompiler};
    use dirpg_schema::SchemaBuilder;
    use dirpg_types::{ResultCode, SearchScope};

    const BASE: &str = "dc=example,dc=com";
    const PEOPLE: &str = "ou=people,dc=example,dc=com";
    const GROUPS: &str = "ou=groups,dc=example,dc=com";
    const ALICE: &str = "uid=alice,ou=people,dc=example,dc=com";
    const BOB: &str = "uid=bob,ou=people,dc=example,dc=com";
    const STAFF: &str = "cn=staff,ou=groups,dc=example,dc=com";

    fn dn(schema: &Schema, text: &str) -> Dn {
        Dn::parse(schema, text).unwrap()
    }

    async fn add(repo: &InMemoryRepository, schema: &Arc<Schema>, text: &str, attrs: &[(&str, &[&str])]) -> StoreResult<StoredEntry> {
        let mut entry = AddEntry::new(Arc::clone(schema), dn(schema, text))?;
        for &(name, values) in attrs {
            entry.add(name, values)?;
        }
        entry.validate()?;
        repo.insert(&entry).await
    }

    async fn seeded() -> (InMemoryRepository, Arc<Schema>) {
        let schema = Arc::new(Schema::builtin());
        let repo = InMemoryRepository::new(Arc::clone(&schema));
        add(&repo, &schema, BASE, &[("objectClass", &["domain"])]).await.unwrap();
        for ou in [PEOPLE, GROUPS] {
            add(&repo, &schema, ou, &[("objectClass", &["organizationalUnit"])]).await.unwrap();
        }
        for (user, cn) in [(ALICE, "Alice"), (BOB, "Bob")] {
            add(
                &repo,
                &schema,
                user,
                &[("objectClass", &["inetOrgPerson"]), ("cn", &[cn]), ("sn", &["Smith"])],
            )
            .await
            .unwrap();
        }
        add(
            &repo,
            &schema,
            STAFF,
            &[("objectClass", &["groupOfNames"]), ("member", &[ALICE])],
        )
        .await
        .unwrap();
        (repo, schema)
    }

    async fn attr(repo: &InMemoryRepository, schema: &Schema, text: &str, name: &str) -> Vec<String> {
        let row = repo.find(&dn(schema, text)).await.unwrap().unwrap();
        row.attrs_orig.get(name).cloned().unwrap_or_default()
    }

    fn query(schema: &Schema, base: &str, scope: SearchScope, filter: &str) -> SearchQuery {
        let compiled = FilterCompiler::new(schema)
            .compile(&Filter::parse(filter).unwrap())
            .unwrap();
        SearchQuery::new(dn(schema, base), scope, compiled)
    }

    // ---- Test 1: insert ----

    #[tokio::test]
    async fn insert_stamps_operational_attributes() {
        let (repo, schema) = seeded().await;
        assert_eq!(repo.len(), 6);

        let row = repo.find(&dn(&schema, ALICE)).await.unwrap().unwrap();
        let uuid = &row.attrs_orig["entryuuid"][0];
        assert_eq!(uuid, &row.id.to_string());
        assert!(row.attrs_orig.contains_key("createtimestamp"));
        assert!(row.attrs_orig.contains_key("modifytimestamp"));
        assert_eq!(row.attrs_orig["hassubordinates"], vec!["FALSE"]);
        assert_eq!(attr(&repo, &schema, PEOPLE, "hassubordinates").await, vec!["TRUE"]);
    }

    #[tokio::test]
    async fn insert_rejects_duplicates_and_orphans() {
        let (repo, schema) = seeded().await;
        let err = add(&repo, &schema, PEOPLE, &[("objectClass", &["organizationalUnit"])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let err = add(
            &repo,
            &schema,
            "cn=x,ou=missing,dc=example,dc=com",
            &[("objectClass", &["device"])],
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            StoreError::NoSuchObject {
                dn: "ou=missing,dc=example,dc=com".into()
            }
        );
        assert_eq!(repo.len(), 6);
    }

    #[tokio::test]
    async fn insert_rejects_missing_association_target() {
        let (repo, schema) = seeded().await;
        let err = add(
            &repo,
            &schema,
            "cn=ghosts,ou=groups,dc=example,dc=com",
            &[("objectClass", &["groupOfNames"]), ("member", &[ALICE, "uid=ghost,dc=example,dc=com"])],
        )
        .await
        .unwrap_err();
        assert_eq!(LdapError::from(err).code(), ResultCode::InvalidAttributeSyntax);
    }

    #[tokio::test]
    async fn insert_maintains_member_of() {
        let (repo, schema) = seeded().await;
        assert_eq!(attr(&repo, &schema, ALICE, "memberof").await, vec![STAFF]);
        assert!(attr(&repo, &schema, BOB, "memberof").await.is_empty());
    }

    // ---- Test 2: update ----

    #[tokio::test]
    async fn update_follows_association_changes() {
        let (repo, schema) = seeded().await;
        let row = repo.find(&dn(&schema, STAFF)).await.unwrap().unwrap();
        let mut entry =
            ModifyEntry::from_stored(Arc::clone(&schema), row.dn.clone(), &row.attrs_orig).unwrap();
        entry.replace("member", &[BOB]).unwrap();
        entry.validate().unwrap();
        repo.update(&entry).await.unwrap();

        assert!(attr(&repo, &schema, ALICE, "memberof").await.is_empty());
        assert_eq!(attr(&repo, &schema, BOB, "memberof").await, vec![STAFF]);
        assert_eq!(attr(&repo, &schema, STAFF, "member").await, vec![BOB]);
    }

    #[tokio::test]
    async fn member_of_survives_while_another_association_names_the_target() {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_builtin()
                .associations(["member", "owner"])
                .build()
                .unwrap(),
        );
        let repo = InMemoryRepository::new(Arc::clone(&schema));
        add(&repo, &schema, BASE, &[("objectClass", &["domain"])]).await.unwrap();
        add(&repo, &schema, PEOPLE, &[("objectClass", &["organizationalUnit"])]).await.unwrap();
        add(&repo, &schema, GROUPS, &[("objectClass", &["organizationalUnit"])]).await.unwrap();
        add(
            &repo,
            &schema,
            ALICE,
            &[("objectClass", &["inetOrgPerson"]), ("cn", &["Alice"]), ("sn", &["Smith"])],
        )
        .await
        .unwrap();
        add(
            &repo,
            &schema,
            STAFF,
            &[("objectClass", &["groupOfNames"]), ("member", &[ALICE]), ("owner", &[ALICE])],
        )
        .await
        .unwrap();
        assert_eq!(attr(&repo, &schema, ALICE, "memberof").await, vec![STAFF]);

        let row = repo.find(&dn(&schema, STAFF)).await.unwrap().unwrap();
        let mut entry =
            ModifyEntry::from_stored(Arc::clone(&schema), row.dn.clone(), &row.attrs_orig).unwrap();
        entry.delete("member", &[] as &[&str]).unwrap();
        entry.validate().unwrap();
        repo.update(&entry).await.unwrap();
        assert_eq!(attr(&repo, &schema, ALICE, "memberof").await, vec![STAFF]);

        let row = repo.find(&dn(&schema, STAFF)).await.unwrap().unwrap();
        let mut entry =
            ModifyEntry::from_stored(Arc::clone(&schema), row.dn.clone(), &row.attrs_orig).unwrap();
        entry.delete("owner", &[] as &[&str]).unwrap();
        entry.validate().unwrap();
        repo.update(&entry).await.unwrap();
        assert!(attr(&repo, &schema, ALICE, "memberof").await.is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_entry_fails() {
        let (repo, schema) = seeded().await;
        let entry = ModifyEntry::from_stored(
            Arc::clone(&schema),
            dn(&schema, "uid=nobody,ou=people,dc=example,dc=com"),
            &Default::default(),
        )
        .unwrap();
        assert!(matches!(
            repo.update(&entry).await,
            Err(StoreError::NoSuchObject { .. })
        ));
    }

    // ---- Test 3: rename and move ----

    #[tokio::test]
    async fn rename_moves_subtree_and_rewrites_references() {
        let (repo, schema) = seeded().await;
        let old = dn(&schema, PEOPLE);
        let new = dn(&schema, "ou=staff,dc=example,dc=com");
        repo.update_dn(&old, &new, None).await.unwrap();

        assert!(repo.find(&old).await.unwrap().is_none());
        let moved = dn(&schema, "uid=alice,ou=staff,dc=example,dc=com");
        assert!(repo.find(&moved).await.unwrap().is_some());
        assert_eq!(attr(&repo, &schema, "ou=staff,dc=example,dc=com", "ou").await, vec!["staff"]);
        assert_eq!(
            attr(&repo, &schema, STAFF, "member").await,
            vec!["uid=alice,ou=staff,dc=example,dc=com"]
        );
        assert_eq!(repo.len(), 6);
    }

    #[tokio::test]
    async fn rename_keeps_or_drops_old_rdn_value() {
        let (repo, schema) = seeded().await;
        let old = dn(&schema, BOB);
        let kept = dn(&schema, "uid=robert,ou=people,dc=example,dc=com");
        repo.update_dn(&old, &kept, old.rdn()).await.unwrap();
        assert_eq!(
            attr(&repo, &schema, "uid=robert,ou=people,dc=example,dc=com", "uid").await,
            vec!["bob", "robert"]
        );

        let dropped = dn(&schema, "uid=rob,ou=people,dc=example,dc=com");
        repo.update_dn(&kept, &dropped, None).await.unwrap();
        assert_eq!(
            attr(&repo, &schema, "uid=rob,ou=people,dc=example,dc=com", "uid").await,
            vec!["bob", "rob"]
        );
    }

    #[tokio::test]
    async fn move_updates_member_of_and_subordinates() {
        let (repo, schema) = seeded().await;
        let old = dn(&schema, STAFF);
        let new = dn(&schema, "cn=staff,ou=people,dc=example,dc=com");
        repo.update_dn(&old, &new, None).await.unwrap();

        assert_eq!(
            attr(&repo, &schema, ALICE, "memberof").await,
            vec!["cn=staff,ou=people,dc=example,dc=com"]
        );
        assert_eq!(attr(&repo, &schema, GROUPS, "hassubordinates").await, vec!["FALSE"]);
    }

    #[tokio::test]
    async fn rename_errors() {
        let (repo, schema) = seeded().await;
        let err = repo
            .update_dn(&dn(&schema, ALICE), &dn(&schema, BOB), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let err = repo
            .update_dn(&dn(&schema, PEOPLE), &dn(&schema, "ou=x,ou=people,dc=example,dc=com"), None)
            .await
            .unwrap_err();
        assert_eq!(LdapError::from(err).code(), ResultCode::UnwillingToPerform);

        let err = repo
            .update_dn(&dn(&schema, ALICE), &dn(&schema, "uid=alice,ou=nowhere,dc=example,dc=com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchObject { .. }));
    }

    // ---- Test 4: delete ----

    #[tokio::test]
    async fn delete_leaf_only() {
        let (repo, schema) = seeded().await;
        let err = repo.delete(&dn(&schema, PEOPLE)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAllowedOnNonLeaf { .. }));

        repo.delete(&dn(&schema, ALICE)).await.unwrap();
        assert!(attr(&repo, &schema, STAFF, "member").await.is_empty());
        assert!(repo.delete(&dn(&schema, ALICE)).await.is_err());
    }

    #[tokio::test]
    async fn delete_last_child_clears_subordinates() {
        let (repo, schema) = seeded().await;
        repo.delete(&dn(&schema, STAFF)).await.unwrap();
        assert_eq!(attr(&repo, &schema, GROUPS, "hassubordinates").await, vec!["FALSE"]);
        assert!(attr(&repo, &schema, ALICE, "memberof").await.is_empty());
    }

    // ---- Test 5: search ----

    #[tokio::test]
    async fn search_scopes() {
        let (repo, schema) = seeded().await;
        let all = |scope| query(&schema, PEOPLE, scope, "(objectClass=*)");

        let base = repo.search(&all(SearchScope::Base)).await.unwrap();
        assert_eq!(base.len(), 1);
        let one = repo.search(&all(SearchScope::OneLevel)).await.unwrap();
        assert_eq!(one.len(), 2);
        let sub = repo.search(&all(SearchScope::Subtree)).await.unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub[0].dn, dn(&schema, PEOPLE));
    }

    #[tokio::test]
    async fn search_applies_predicate_and_limit() {
        let (repo, schema) = seeded().await;
        let hits = repo
            .search(&query(&schema, BASE, SearchScope::Subtree, "(&(sn=smith)(!(cn=bob)))"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].dn, dn(&schema, ALICE));

        let hits = repo
            .search(&query(&schema, BASE, SearchScope::Subtree, "(memberOf=*)"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let limited = query(&schema, BASE, SearchScope::Subtree, "(objectClass=*)").with_size_limit(2);
        assert_eq!(repo.search(&limited).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_missing_base() {
        let (repo, schema) = seeded().await;
        let q = query(&schema, "ou=nowhere,dc=example,dc=com", SearchScope::Subtree, "(cn=*)");
        assert!(matches!(
            repo.search(&q).await,
            Err(StoreError::NoSuchObject { .. })
        ));
    }
}
