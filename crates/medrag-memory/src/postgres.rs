//! PostgreSQL + pgvector backend.
//!
//! Every chunk-set write runs in a single transaction. Search resolves the
//! caller's visible documents and scores only those, inside one
//! `REPEATABLE READ` read-only transaction.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::document::{
    DocumentPatch, DocumentRecord, EmbeddedChunk, MetadataFilter, NewDocument, StoredDocument,
};
use crate::types::{DocumentId, UserId};
use crate::vector_store::{
    BoxFuture, DocumentQuery, ScoredChunk, SearchRequest, VectorStore, VectorStoreError, rank,
};

macro_rules! record_columns {
    () => {
        "id, title, document_type, department, is_sensitive, patient_id, created_by, \
         created_at, updated_at, chunk_count"
    };
}

macro_rules! filtered_documents {
    () => {
        concat!(
            "SELECT ",
            record_columns!(),
            " FROM documents \
             WHERE ($1::text IS NULL OR department = $1) \
             AND (cardinality($2::text[]) = 0 OR document_type = ANY($2)) \
             AND ($3::bigint IS NULL OR patient_id = $3) \
             ORDER BY id"
        )
    };
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: DocumentId,
    title: String,
    document_type: String,
    department: Option<String>,
    is_sensitive: bool,
    patient_id: Option<i64>,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    chunk_count: i32,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = VectorStoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            document_type: row.document_type,
            department: row.department,
            is_sensitive: row.is_sensitive,
            patient_id: row.patient_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            chunk_count: usize::try_from(row.chunk_count)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FullRow {
    #[sqlx(flatten)]
    meta: DocumentRow,
    content: String,
}

#[derive(sqlx::FromRow)]
struct HitRow {
    document_id: DocumentId,
    title: String,
    chunk_index: i32,
    content: String,
    score: f32,
}

#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    dimensions: usize,
}

impl PgVectorStore {
    /// Connect to PostgreSQL and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        dimensions: usize,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(max_connections, dimensions, "connected to PostgreSQL vector store");
        Ok(Self { pool, dimensions })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool, dimensions: usize) -> Self {
        Self { pool, dimensions }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn check_dimensions(&self, len: usize) -> Result<(), VectorStoreError> {
        if len == self.dimensions {
            Ok(())
        } else {
            Err(VectorStoreError::Dimension {
                expected: self.dimensions,
                actual: len,
            })
        }
    }

    async fn insert_chunks(
        tx: &mut Transaction<'_, Postgres>,
        id: DocumentId,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<(), VectorStoreError> {
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks (document_id, chunk_index, content, embedding) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(i32::try_from(chunk.chunk.chunk_index)?)
            .bind(chunk.chunk.content)
            .bind(Vector::from(chunk.embedding))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn filtered(
        tx: &mut Transaction<'_, Postgres>,
        filter: &MetadataFilter,
    ) -> Result<Vec<DocumentRecord>, VectorStoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(filtered_documents!())
            .bind(filter.department.as_deref())
            .bind(&filter.document_types)
            .bind(filter.patient_id)
            .fetch_all(&mut **tx)
            .await?;
        rows.into_iter().map(DocumentRecord::try_from).collect()
    }

    async fn read_only(&self) -> Result<Transaction<'static, Postgres>, VectorStoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

impl VectorStore for PgVectorStore {
    fn insert_document(
        &self,
        document: NewDocument,
        created_by: UserId,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            for chunk in &chunks {
                self.check_dimensions(chunk.embedding.len())?;
            }
            let mut tx = self.pool.begin().await?;
            let row: DocumentRow = sqlx::query_as(concat!(
                "INSERT INTO documents \
                 (title, content, document_type, department, is_sensitive, patient_id, \
                  created_by, chunk_count) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING ",
                record_columns!()
            ))
            .bind(&document.title)
            .bind(&document.content)
            .bind(&document.document_type)
            .bind(document.department.as_deref())
            .bind(document.is_sensitive)
            .bind(document.patient_id)
            .bind(created_by)
            .bind(i32::try_from(chunks.len())?)
            .fetch_one(&mut *tx)
            .await?;
            let record = DocumentRecord::try_from(row)?;
            Self::insert_chunks(&mut tx, record.id, chunks).await?;
            tx.commit().await?;
            Ok(record)
        })
    }

    fn replace_chunks(
        &self,
        id: DocumentId,
        content: String,
        chunks: Vec<EmbeddedChunk>,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            for chunk in &chunks {
                self.check_dimensions(chunk.embedding.len())?;
            }
            let mut tx = self.pool.begin().await?;
            let row: Option<DocumentRow> = sqlx::query_as(concat!(
                "UPDATE documents SET content = $2, chunk_count = $3, updated_at = now() \
                 WHERE id = $1 RETURNING ",
                record_columns!()
            ))
            .bind(id)
            .bind(&content)
            .bind(i32::try_from(chunks.len())?)
            .fetch_optional(&mut *tx)
            .await?;
            let record = DocumentRecord::try_from(row.ok_or(VectorStoreError::NotFound(id))?)?;
            sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_chunks(&mut tx, id, chunks).await?;
            tx.commit().await?;
            Ok(record)
        })
    }

    fn update_metadata(
        &self,
        id: DocumentId,
        patch: DocumentPatch,
    ) -> BoxFuture<'_, Result<DocumentRecord, VectorStoreError>> {
        Box::pin(async move {
            let row: Option<DocumentRow> = sqlx::query_as(concat!(
                "UPDATE documents SET \
                 title = COALESCE($2, title), \
                 document_type = COALESCE($3, document_type), \
                 department = CASE WHEN $4 THEN $5 ELSE department END, \
                 is_sensitive = COALESCE($6, is_sensitive), \
                 patient_id = CASE WHEN $7 THEN $8 ELSE patient_id END, \
                 updated_at = now() \
                 WHERE id = $1 RETURNING ",
                record_columns!()
            ))
            .bind(id)
            .bind(patch.title.as_deref())
            .bind(patch.document_type.as_deref())
            .bind(patch.department.is_some())
            .bind(patch.department.clone().flatten())
            .bind(patch.is_sensitive)
            .bind(patch.patient_id.is_some())
            .bind(patch.patient_id.flatten())
            .fetch_optional(&self.pool)
            .await?;
            DocumentRecord::try_from(row.ok_or(VectorStoreError::NotFound(id))?)
        })
    }

    fn get_document(
        &self,
        id: DocumentId,
    ) -> BoxFuture<'_, Result<Option<StoredDocument>, VectorStoreError>> {
        Box::pin(async move {
            let row: Option<FullRow> = sqlx::query_as(concat!(
                "SELECT ",
                record_columns!(),
                ", content FROM documents WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|row| {
                Ok(StoredDocument {
                    record: DocumentRecord::try_from(row.meta)?,
                    content: row.content,
                })
            })
            .transpose()
        })
    }

    fn list_documents(
        &self,
        query: DocumentQuery,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>, VectorStoreError>> {
        Box::pin(async move {
            let mut tx = self.read_only().await?;
            let candidates = Self::filtered(&mut tx, &query.filter).await?;
            tx.commit().await?;
            Ok(candidates
                .into_iter()
                .filter(|r| query.visibility.allows(r))
                .skip(query.skip)
                .take(query.limit)
                .collect())
        })
    }

    fn delete_document(&self, id: DocumentId) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM documents WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn search(
        &self,
        request: SearchRequest,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, VectorStoreError>> {
        Box::pin(async move {
            self.check_dimensions(request.vector.len())?;
            let mut tx = self.read_only().await?;

            let visible: Vec<i64> = Self::filtered(&mut tx, &request.filter)
                .await?
                .iter()
                .filter(|r| request.visibility.allows(r))
                .map(|r| r.id.0)
                .collect();
            if visible.is_empty() || request.limit == 0 {
                tx.commit().await?;
                tracing::debug!("no visible documents for search");
                return Ok(Vec::new());
            }

            let rows: Vec<HitRow> = sqlx::query_as(
                "SELECT c.document_id, d.title, c.chunk_index, c.content, \
                        (1 - (c.embedding <=> $1))::real AS score \
                 FROM document_chunks c \
                 JOIN documents d ON d.id = c.document_id \
                 WHERE c.document_id = ANY($2) \
                   AND 1 - (c.embedding <=> $1) >= $3 \
                 ORDER BY c.embedding <=> $1 ASC, c.document_id ASC, c.chunk_index ASC \
                 LIMIT $4",
            )
            .bind(Vector::from(request.vector))
            .bind(&visible)
            .bind(f64::from(request.threshold))
            .bind(i64::try_from(request.limit)?)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            let mut hits = rows
                .into_iter()
                .map(|row| {
                    Ok(ScoredChunk {
                        document_id: row.document_id,
                        document_title: row.title,
                        chunk_index: usize::try_from(row.chunk_index)?,
                        content: row.content,
                        score: row.score,
                    })
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            // the real cast can tie scores that differed in double precision
            rank(&mut hits);
            hits.retain(|h| h.score >= request.threshold);
            Ok(hits)
        })
    }
}
