use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::query::{
    Operator, Predicate, Query, SortDirection, numeric_value,
};
use crate::infrastructure::db::stores::record_store::{
    Fields, ID_FIELD, RecordStore, RecordStoreError, format_record_id,
};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::sync::Arc;

/// Decimal text Postgres can cast to `numeric`, surrounding blanks allowed.
const NUMERIC_TEXT: &str = r"^\s*[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$";

/// Record store keeping each record as a JSONB field map in `delayed_jobs`.
///
/// A conditional update is a single `UPDATE ... WHERE` statement. Under read
/// committed isolation a second writer racing on the same row re-evaluates the
/// guard against the committed row, so at most one lock write matches.
#[derive(Clone)]
pub struct RecordStorePostgres {
    db: Arc<PostgresDatabase>,
}

impl RecordStorePostgres {
    /// Build a Postgres-backed record store.
    pub fn new(db: Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    fn unavailable(err: sqlx::Error) -> RecordStoreError {
        RecordStoreError::Unavailable(err.to_string())
    }

    fn push_field(qb: &mut QueryBuilder<'_, Postgres>, field: &str, numeric: bool) {
        if field == ID_FIELD && !numeric {
            qb.push("id");
        } else if numeric {
            // Values that do not parse as numbers compare as 0.
            qb.push("(CASE WHEN fields->>");
            qb.push_bind(field.to_string());
            qb.push(" ~ ");
            qb.push_bind(NUMERIC_TEXT);
            qb.push(" THEN trim(fields->>");
            qb.push_bind(field.to_string());
            qb.push(")::numeric ELSE 0 END)");
        } else {
            qb.push("COALESCE(fields->>");
            qb.push_bind(field.to_string());
            qb.push(", '')");
        }
    }

    fn push_predicates(qb: &mut QueryBuilder<'_, Postgres>, predicates: &[Predicate]) {
        qb.push(" WHERE TRUE");
        for predicate in predicates {
            qb.push(" AND ");
            match predicate.op {
                Operator::Equals | Operator::NotEquals => {
                    Self::push_field(qb, &predicate.field, false);
                    qb.push(if predicate.op == Operator::Equals {
                        " = "
                    } else {
                        " <> "
                    });
                    qb.push_bind(predicate.value.clone());
                }
                Operator::NumEquals
                | Operator::NumLt
                | Operator::NumLe
                | Operator::NumGt
                | Operator::NumGe => {
                    let op = match predicate.op {
                        Operator::NumEquals => " = ",
                        Operator::NumLt => " < ",
                        Operator::NumLe => " <= ",
                        Operator::NumGt => " > ",
                        _ => " >= ",
                    };
                    Self::push_field(qb, &predicate.field, true);
                    qb.push(op);
                    qb.push_bind(numeric_value(&predicate.value));
                    qb.push("::numeric");
                }
                Operator::Contains => {
                    qb.push("strpos(");
                    Self::push_field(qb, &predicate.field, false);
                    qb.push(", ");
                    qb.push_bind(predicate.value.clone());
                    qb.push(") > 0");
                }
                Operator::Matches => {
                    Self::push_field(qb, &predicate.field, false);
                    qb.push(" ~ ");
                    qb.push_bind(predicate.value.clone());
                }
            }
        }
    }

    async fn get_impl_conn(
        conn: &mut PgConnection,
        id: String,
    ) -> Result<Option<Fields>, RecordStoreError> {
        let fields = sqlx::query_scalar::<_, Json<Fields>>(
            "SELECT fields FROM delayed_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Self::unavailable)?;

        Ok(fields.map(|Json(fields)| fields))
    }

    async fn put_impl_conn(
        conn: &mut PgConnection,
        id: String,
        fields: Fields,
    ) -> Result<(), RecordStoreError> {
        sqlx::query(
            "INSERT INTO delayed_jobs (id, fields)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                fields = EXCLUDED.fields",
        )
        .bind(id)
        .bind(Json(fields))
        .execute(&mut *conn)
        .await
        .map_err(Self::unavailable)?;

        Ok(())
    }

    async fn query_impl_conn(
        conn: &mut PgConnection,
        query: Query,
    ) -> Result<Vec<String>, RecordStoreError> {
        // Step 1: Filter on every predicate.
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM delayed_jobs");
        Self::push_predicates(&mut qb, &query.predicates);

        // Step 2: Order, with the id as a stable tie-break.
        qb.push(" ORDER BY ");
        if let Some(order) = &query.order {
            let numeric = matches!(
                order.direction,
                SortDirection::NumAsc | SortDirection::NumDesc
            );
            Self::push_field(&mut qb, &order.field, numeric);
            qb.push(match order.direction {
                SortDirection::StrAsc | SortDirection::NumAsc => " ASC, ",
                SortDirection::StrDesc | SortDirection::NumDesc => " DESC, ",
            });
        }
        qb.push("id ASC");

        // Step 3: Page.
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let ids = qb
            .build_query_scalar::<String>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(ids)
    }

    async fn conditional_update_impl_conn(
        conn: &mut PgConnection,
        changes: Fields,
        predicates: Vec<Predicate>,
    ) -> Result<u64, RecordStoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE delayed_jobs SET fields = fields || ");
        qb.push_bind(Json(changes));
        Self::push_predicates(&mut qb, &predicates);

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(result.rows_affected())
    }

    async fn delete_impl_conn(conn: &mut PgConnection, id: String) -> Result<bool, RecordStoreError> {
        let result = sqlx::query("DELETE FROM delayed_jobs WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_impl_conn(conn: &mut PgConnection) -> Result<(), RecordStoreError> {
        sqlx::query("DELETE FROM delayed_jobs")
            .execute(&mut *conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(())
    }

    async fn next_id_impl_conn(conn: &mut PgConnection) -> Result<String, RecordStoreError> {
        let sequence = sqlx::query_scalar::<_, i64>("SELECT nextval('delayed_job_ids')")
            .fetch_one(&mut *conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(format_record_id(sequence.max(0) as u64))
    }
}

#[async_trait]
impl RecordStore for RecordStorePostgres {
    async fn get(&self, id: &str) -> Result<Option<Fields>, RecordStoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| Box::pin(Self::get_impl_conn(conn, id)))
            .await
    }

    async fn put(&self, id: &str, fields: &Fields) -> Result<(), RecordStoreError> {
        let id = id.to_string();
        let fields = fields.clone();
        self.db
            .with_conn(move |conn| Box::pin(Self::put_impl_conn(conn, id, fields)))
            .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<String>, RecordStoreError> {
        let query = query.clone();
        self.db
            .with_conn(move |conn| Box::pin(Self::query_impl_conn(conn, query)))
            .await
    }

    async fn conditional_update(
        &self,
        changes: &Fields,
        predicates: &[Predicate],
    ) -> Result<u64, RecordStoreError> {
        let changes = changes.clone();
        let predicates = predicates.to_vec();
        self.db
            .with_conn(move |conn| {
                Box::pin(Self::conditional_update_impl_conn(conn, changes, predicates))
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool, RecordStoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| Box::pin(Self::delete_impl_conn(conn, id)))
            .await
    }

    async fn clear(&self) -> Result<(), RecordStoreError> {
        self.db
            .with_conn(|conn| Box::pin(Self::clear_impl_conn(conn)))
            .await
    }

    async fn generate_unique_id(&self) -> Result<String, RecordStoreError> {
        self.db
            .with_conn(|conn| Box::pin(Self::next_id_impl_conn(conn)))
            .await
    }
}
