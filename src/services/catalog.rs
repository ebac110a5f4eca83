//! Catalog collaborator backed by SQLite.
//!
//! `CatalogService` is the engine's only window onto the relational catalog:
//! lineage reads, stored-object pointer reads/writes, link enumeration, and
//! the hygiene deletes. Which links table the schema carries (current
//! `object_links` vs legacy `attachment_links`) is probed once at startup and
//! cached, never re-queried per item.

use crate::models::{entity::CatalogEntity, link::LinkRecord, object::StoredObject};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Maximum lineage depth the recursive walk will follow. Guards against a
/// parent cycle introduced by hand-edited catalog rows.
const MAX_LINEAGE_DEPTH: i64 = 32;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("object `{0}` not found in catalog")]
    ObjectNotFound(Uuid),
    #[error("entity `{0}` not found in catalog")]
    EntityNotFound(Uuid),
    #[error("catalog schema has no links table (run with --migrate first)")]
    SchemaMissing,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Which links table this catalog carries. Probed once, cached for the life
/// of the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinksTable {
    ObjectLinks,
    LegacyAttachmentLinks,
}

impl LinksTable {
    pub fn name(self) -> &'static str {
        match self {
            LinksTable::ObjectLinks => "object_links",
            LinksTable::LegacyAttachmentLinks => "attachment_links",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CatalogService {
    db: Arc<SqlitePool>,
    links_table: LinksTable,
}

impl CatalogService {
    /// Connect the service to a pool, probing the schema once for the links
    /// table name.
    pub async fn probe(db: Arc<SqlitePool>) -> CatalogResult<Self> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name IN ('object_links', 'attachment_links')",
        )
        .fetch_all(&*db)
        .await?;

        let links_table = if names.iter().any(|n| n == "object_links") {
            LinksTable::ObjectLinks
        } else if names.iter().any(|n| n == "attachment_links") {
            LinksTable::LegacyAttachmentLinks
        } else {
            return Err(CatalogError::SchemaMissing);
        };
        debug!("catalog links table: {}", links_table.name());

        Ok(Self { db, links_table })
    }

    pub fn links_table(&self) -> LinksTable {
        self.links_table
    }

    /// Create a catalog entity under `parent_id` (`None` for a top-level
    /// group).
    pub async fn create_entity(
        &self,
        parent_id: Option<Uuid>,
        title: &str,
    ) -> CatalogResult<CatalogEntity> {
        let entity = CatalogEntity {
            id: Uuid::new_v4(),
            parent_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO entities (id, parent_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(entity.id)
            .bind(entity.parent_id)
            .bind(&entity.title)
            .bind(entity.created_at)
            .execute(&*self.db)
            .await?;
        Ok(entity)
    }

    /// Ancestor titles for an entity, outermost group first, the entity's own
    /// title last. Empty when the entity does not exist.
    pub async fn lineage_titles(&self, entity_id: Uuid) -> CatalogResult<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar(
            "WITH RECURSIVE chain(id, parent_id, title, depth) AS (
                 SELECT id, parent_id, title, 0 FROM entities WHERE id = ?
                 UNION ALL
                 SELECT e.id, e.parent_id, e.title, chain.depth + 1
                 FROM entities e JOIN chain ON e.id = chain.parent_id
                 WHERE chain.depth < ?
             )
             SELECT title FROM chain ORDER BY depth DESC",
        )
        .bind(entity_id)
        .bind(MAX_LINEAGE_DEPTH)
        .fetch_all(&*self.db)
        .await?;
        Ok(titles)
    }

    /// Record a freshly placed object.
    pub async fn insert_object(&self, object: &StoredObject) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO objects (
                 id, logical_name, extension, content_type, content_hash,
                 current_key, url, size_bytes, last_modified
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(&object.logical_name)
        .bind(&object.extension)
        .bind(&object.content_type)
        .bind(&object.content_hash)
        .bind(&object.current_key)
        .bind(&object.url)
        .bind(object.size_bytes)
        .bind(object.last_modified)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn fetch_object(&self, id: Uuid) -> CatalogResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, logical_name, extension, content_type, content_hash,
                    current_key, url, size_bytes, last_modified
             FROM objects WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::ObjectNotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }

    /// Update the location pointer after a relocate is confirmed durable.
    ///
    /// Never call this before the physical move has completed; a crash in
    /// between would leave the catalog pointing at nothing.
    pub async fn update_object_location(
        &self,
        id: Uuid,
        current_key: &str,
        url: Option<&str>,
    ) -> CatalogResult<()> {
        let result = sqlx::query(
            "UPDATE objects SET current_key = ?, url = ?, last_modified = ? WHERE id = ?",
        )
        .bind(current_key)
        .bind(url)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::ObjectNotFound(id));
        }
        Ok(())
    }

    /// Attach an object to an entity slot.
    pub async fn insert_link(
        &self,
        object_id: Uuid,
        owner_id: Uuid,
        owner_kind: &str,
        slot: &str,
    ) -> CatalogResult<LinkRecord> {
        let link = LinkRecord {
            id: Uuid::new_v4(),
            object_id,
            owner_id,
            owner_kind: owner_kind.to_string(),
            slot: slot.to_string(),
        };
        let sql = format!(
            "INSERT INTO {} (id, object_id, owner_id, owner_kind, slot) VALUES (?, ?, ?, ?, ?)",
            self.links_table.name()
        );
        sqlx::query(&sql)
            .bind(link.id)
            .bind(link.object_id)
            .bind(link.owner_id)
            .bind(&link.owner_kind)
            .bind(&link.slot)
            .execute(&*self.db)
            .await?;
        Ok(link)
    }

    /// Links whose object and owner both still exist, i.e. the rows the
    /// relocation pass can act on. Rows hygiene would delete are excluded.
    pub async fn relocation_candidates(&self) -> CatalogResult<Vec<LinkRecord>> {
        let sql = format!(
            "SELECT l.id, l.object_id, l.owner_id, l.owner_kind, l.slot
             FROM {} l
             JOIN objects o ON o.id = l.object_id
             JOIN entities e ON e.id = l.owner_id
             ORDER BY l.id",
            self.links_table.name()
        );
        Ok(sqlx::query_as::<_, LinkRecord>(&sql)
            .fetch_all(&*self.db)
            .await?)
    }

    /// Link rows whose object no longer exists.
    pub async fn count_orphaned_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE object_id NOT IN (SELECT id FROM objects)",
            self.links_table.name()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&*self.db).await?;
        Ok(count as u64)
    }

    pub async fn delete_orphaned_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE object_id NOT IN (SELECT id FROM objects)",
            self.links_table.name()
        );
        let result = sqlx::query(&sql).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Link rows whose owning entity no longer exists.
    pub async fn count_dangling_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE owner_id NOT IN (SELECT id FROM entities)",
            self.links_table.name()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&*self.db).await?;
        Ok(count as u64)
    }

    pub async fn delete_dangling_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE owner_id NOT IN (SELECT id FROM entities)",
            self.links_table.name()
        );
        let result = sqlx::query(&sql).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Duplicate `(object_id, owner_id, slot)` rows beyond the first.
    pub async fn count_duplicate_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM {table} GROUP BY object_id, owner_id, slot
             )",
            table = self.links_table.name()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&*self.db).await?;
        Ok(count as u64)
    }

    pub async fn delete_duplicate_links(&self) -> CatalogResult<u64> {
        let sql = format!(
            "DELETE FROM {table} WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM {table} GROUP BY object_id, owner_id, slot
             )",
            table = self.links_table.name()
        );
        let result = sqlx::query(&sql).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }
}

/// Apply the embedded initial schema, statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> CatalogResult<()> {
    let sql = include_str!("../../migrations/0001_init.sql");
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("running {} migration statements", statements.len());
    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn catalog() -> CatalogService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        CatalogService::probe(Arc::new(pool)).await.unwrap()
    }

    fn object(key: &str) -> StoredObject {
        StoredObject {
            id: Uuid::new_v4(),
            logical_name: "notes".into(),
            extension: "pdf".into(),
            content_type: Some("application/pdf".into()),
            content_hash: "abc123".into(),
            current_key: key.into(),
            url: None,
            size_bytes: 3,
            last_modified: Utc::now(),
        }
    }

    #[tokio::test]
    async fn probe_finds_the_links_table() {
        let catalog = catalog().await;
        assert_eq!(catalog.links_table(), LinksTable::ObjectLinks);
    }

    #[tokio::test]
    async fn probe_fails_without_a_schema() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let err = CatalogService::probe(Arc::new(pool)).await.unwrap_err();
        assert!(matches!(err, CatalogError::SchemaMissing));
    }

    #[tokio::test]
    async fn lineage_walks_ancestors_outermost_first() {
        let catalog = catalog().await;
        let group = catalog.create_entity(None, "Intro To Robotics!").await.unwrap();
        let module = catalog.create_entity(Some(group.id), "Module 1").await.unwrap();
        let lesson = catalog.create_entity(Some(module.id), "Lesson  One").await.unwrap();

        let lineage = catalog.lineage_titles(lesson.id).await.unwrap();
        assert_eq!(lineage, vec!["Intro To Robotics!", "Module 1", "Lesson  One"]);

        let missing = catalog.lineage_titles(Uuid::new_v4()).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn pointer_update_requires_an_existing_object() {
        let catalog = catalog().await;
        let obj = object("a/b.pdf");
        catalog.insert_object(&obj).await.unwrap();

        catalog
            .update_object_location(obj.id, "c/d.pdf", Some("http://cdn/c/d.pdf"))
            .await
            .unwrap();
        let fetched = catalog.fetch_object(obj.id).await.unwrap();
        assert_eq!(fetched.current_key, "c/d.pdf");
        assert_eq!(fetched.url.as_deref(), Some("http://cdn/c/d.pdf"));

        let err = catalog
            .update_object_location(Uuid::new_v4(), "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ObjectNotFound(_)));
    }

    #[tokio::test]
    async fn relocation_candidates_exclude_corrupt_rows() {
        let catalog = catalog().await;
        let owner = catalog.create_entity(None, "Course").await.unwrap();
        let obj = object("a.pdf");
        catalog.insert_object(&obj).await.unwrap();
        catalog.insert_link(obj.id, owner.id, "entity", "attachment").await.unwrap();
        // Dangling: owner never existed.
        catalog.insert_link(obj.id, Uuid::new_v4(), "entity", "attachment").await.unwrap();
        // Orphaned: object never existed.
        catalog.insert_link(Uuid::new_v4(), owner.id, "entity", "attachment").await.unwrap();

        let candidates = catalog.relocation_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].object_id, obj.id);
        assert_eq!(candidates[0].owner_id, owner.id);

        assert_eq!(catalog.count_orphaned_links().await.unwrap(), 1);
        assert_eq!(catalog.count_dangling_links().await.unwrap(), 1);
        assert_eq!(catalog.delete_orphaned_links().await.unwrap(), 1);
        assert_eq!(catalog.delete_dangling_links().await.unwrap(), 1);
        // Idempotent: nothing left to remove.
        assert_eq!(catalog.delete_orphaned_links().await.unwrap(), 0);
        assert_eq!(catalog.delete_dangling_links().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_links_keep_exactly_one_row() {
        let catalog = catalog().await;
        let owner = catalog.create_entity(None, "Course").await.unwrap();
        let obj = object("a.pdf");
        catalog.insert_object(&obj).await.unwrap();
        for _ in 0..3 {
            catalog.insert_link(obj.id, owner.id, "entity", "attachment").await.unwrap();
        }
        catalog.insert_link(obj.id, owner.id, "entity", "banner").await.unwrap();

        assert_eq!(catalog.count_duplicate_links().await.unwrap(), 2);
        assert_eq!(catalog.delete_duplicate_links().await.unwrap(), 2);
        assert_eq!(catalog.count_duplicate_links().await.unwrap(), 0);
        // One row per distinct slot survives.
        assert_eq!(catalog.relocation_candidates().await.unwrap().len(), 2);
    }
}
