use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use skybook_core::repository::{CustomerRepository, StoreError, StoreResult};
use skybook_core::{Customer, CustomerFilter, CustomerPatch, CustomerStatus, MatchKey};
use skybook_shared::Masked;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::store_error;

const COLUMNS: &str = "id, name, email, phone, identity_document, date_of_birth, address, membership_card, status, created_at, updated_at";

pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    identity_document: Option<String>,
    date_of_birth: Option<NaiveDate>,
    address: Option<String>,
    membership_card: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: row.id,
            name: row.name,
            email: row.email.map(Masked::new),
            phone: row.phone.map(Masked::new),
            identity_document: row.identity_document.map(Masked::new),
            date_of_birth: row.date_of_birth,
            address: row.address,
            membership_card: row.membership_card,
            status: row.status.parse::<CustomerStatus>().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn exposed(value: &Option<Masked<String>>) -> Option<&str> {
    value.as_ref().map(|v| v.as_str())
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!("SELECT {} FROM customers WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Customer::try_from).transpose()
    }

    async fn find_by_key(&self, key: &MatchKey) -> StoreResult<Option<Customer>> {
        // Column names come from a closed set, never from input.
        let column = match key {
            MatchKey::Email(_) => "email",
            MatchKey::Phone(_) => "phone",
            MatchKey::IdentityDocument(_) => "identity_document",
        };
        let sql = format!("SELECT {} FROM customers WHERE {} = $1", COLUMNS, column);

        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(key.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Customer::try_from).transpose()
    }

    async fn insert(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, identity_document, date_of_birth, address, membership_card, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(customer.id)
        .bind(&customer.name)
        .bind(exposed(&customer.email))
        .bind(exposed(&customer.phone))
        .bind(exposed(&customer.identity_document))
        .bind(customer.date_of_birth)
        .bind(&customer.address)
        .bind(&customer.membership_card)
        .bind(customer.status.as_str())
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn apply_patch(&self, id: Uuid, patch: &CustomerPatch) -> StoreResult<Option<Customer>> {
        // Each column keeps its stored value unless the patch sets it, so
        // concurrent patches to different fields both land. Blank contact
        // values clear the column.
        let sql = format!(
            r#"
            UPDATE customers
            SET name = COALESCE($2, name),
                email = CASE WHEN $3::TEXT IS NULL THEN email WHEN BTRIM($3) = '' THEN NULL ELSE $3 END,
                phone = CASE WHEN $4::TEXT IS NULL THEN phone WHEN BTRIM($4) = '' THEN NULL ELSE $4 END,
                identity_document = CASE
                    WHEN $5::TEXT IS NULL THEN identity_document
                    WHEN BTRIM($5) = '' THEN NULL
                    ELSE $5
                END,
                date_of_birth = COALESCE($6, date_of_birth),
                address = COALESCE($7, address),
                membership_card = COALESCE($8, membership_card),
                status = COALESCE($9, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        );

        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(exposed(&patch.email))
            .bind(exposed(&patch.phone))
            .bind(exposed(&patch.identity_document))
            .bind(patch.date_of_birth)
            .bind(&patch.address)
            .bind(&patch.membership_card)
            .bind(patch.status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Customer::try_from).transpose()
    }

    async fn search(&self, filter: &CustomerFilter) -> StoreResult<Vec<Customer>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM customers WHERE TRUE", COLUMNS));

        for (column, value) in [
            ("name", &filter.name),
            ("email", &filter.email),
            ("phone", &filter.phone),
            ("identity_document", &filter.identity_document),
            ("membership_card", &filter.membership_card),
        ] {
            if let Some(value) = value {
                query.push(format!(" AND {} = ", column)).push_bind(value.clone());
            }
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at");

        let rows: Vec<CustomerRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter().map(Customer::try_from).collect()
    }
}
