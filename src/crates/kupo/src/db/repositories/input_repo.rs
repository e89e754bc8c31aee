//! Input repository for database operations
//!
//! Holds the pattern -> SQL translator: every pattern variant emits a WHERE
//! fragment over the `inputs` columns (or an anti-join against `policies`
//! for asset patterns), composed with the status flag and optional match
//! filters. The translator is the single sanctioned place SQL text is
//! assembled from parts; all user-supplied values go through binds.

use crate::chain::{OutputReference, Pattern, Point};
use crate::db::error::DbResult;
use crate::db::models::Input;
use sqlx::sqlite::SqliteArguments;
use sqlx::SqliteConnection;

/// Spent/unspent restriction applied on top of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFlag {
    Unspent,
    Spent,
    #[default]
    All,
}

/// Result ordering by creation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// A fully-described match query, before translation to SQL.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub pattern: Pattern,
    pub status: StatusFlag,
    pub order: SortDirection,
    /// Narrow to outputs carrying an asset under this policy.
    pub policy_id: Option<String>,
    /// Narrow to outputs produced by this transaction.
    pub transaction_id: Option<String>,
    /// Narrow to one output index (only meaningful with `transaction_id`).
    pub output_index: Option<u64>,
}

impl MatchQuery {
    /// Query selecting everything matched by a pattern.
    pub fn for_pattern(pattern: Pattern) -> Self {
        Self {
            pattern,
            status: StatusFlag::default(),
            order: SortDirection::default(),
            policy_id: None,
            transaction_id: None,
            output_index: None,
        }
    }
}

#[derive(Debug, Clone)]
enum SqlArg {
    Text(String),
    Int(i64),
}

/// A parameterized SELECT, ready to bind.
#[derive(Debug)]
pub struct PreparedQuery {
    pub sql: String,
    args: Vec<SqlArg>,
}

impl PreparedQuery {
    /// Bind the collected arguments onto the statement.
    pub fn query(&self) -> sqlx::query::QueryAs<'_, sqlx::Sqlite, Input, SqliteArguments<'_>> {
        let mut query = sqlx::query_as::<_, Input>(&self.sql);
        for arg in &self.args {
            query = match arg {
                SqlArg::Text(text) => query.bind(text.as_str()),
                SqlArg::Int(int) => query.bind(*int),
            };
        }
        query
    }

    /// Number of `?` placeholders in the statement.
    pub fn placeholders(&self) -> usize {
        self.sql.matches('?').count()
    }

    /// Number of collected arguments.
    pub fn args_len(&self) -> usize {
        self.args.len()
    }
}

fn pattern_fragment(pattern: &Pattern, fragments: &mut Vec<String>, args: &mut Vec<SqlArg>) {
    match pattern {
        Pattern::Any => fragments.push("1 = 1".to_string()),
        Pattern::ExactAddress(address) => {
            fragments.push("inputs.address = ?".to_string());
            args.push(SqlArg::Text(address.clone()));
        }
        Pattern::PaymentCredential(payment) => {
            fragments.push("inputs.payment_credential = ?".to_string());
            args.push(SqlArg::Text(payment.clone()));
        }
        Pattern::DelegationCredential(delegation) => {
            fragments.push("inputs.delegation_credential = ?".to_string());
            args.push(SqlArg::Text(delegation.clone()));
        }
        Pattern::AddressPair {
            payment,
            delegation,
        } => {
            fragments.push("inputs.payment_credential = ?".to_string());
            args.push(SqlArg::Text(payment.clone()));
            fragments.push("inputs.delegation_credential = ?".to_string());
            args.push(SqlArg::Text(delegation.clone()));
        }
        Pattern::PolicyId(policy_id)
        | Pattern::AssetId { policy_id, .. } => {
            // Asset names are post-filtered in process; SQL narrows by policy.
            fragments.push(policy_join());
            args.push(SqlArg::Text(policy_id.clone()));
        }
        Pattern::TransactionId(transaction_id) => {
            fragments.push("inputs.transaction_id = ?".to_string());
            args.push(SqlArg::Text(transaction_id.clone()));
        }
        Pattern::OutputReference {
            transaction_id,
            output_index,
        } => {
            fragments.push("inputs.transaction_id = ?".to_string());
            args.push(SqlArg::Text(transaction_id.clone()));
            fragments.push("inputs.output_index = ?".to_string());
            args.push(SqlArg::Int(*output_index as i64));
        }
    }
}

fn policy_join() -> String {
    "EXISTS (SELECT 1 FROM policies AS asset_policies \
     WHERE asset_policies.transaction_id = inputs.transaction_id \
     AND asset_policies.output_index = inputs.output_index \
     AND asset_policies.policy_id = ?)"
        .to_string()
}

fn status_fragment(status: StatusFlag) -> &'static str {
    match status {
        StatusFlag::Unspent => "inputs.spent_at_slot IS NULL",
        StatusFlag::Spent => "inputs.spent_at_slot IS NOT NULL",
        StatusFlag::All => "1 = 1",
    }
}

fn where_clause(query: &MatchQuery) -> (String, Vec<SqlArg>) {
    let mut fragments = Vec::new();
    let mut args = Vec::new();
    pattern_fragment(&query.pattern, &mut fragments, &mut args);
    fragments.push(status_fragment(query.status).to_string());
    if let Some(policy_id) = &query.policy_id {
        fragments.push(policy_join());
        args.push(SqlArg::Text(policy_id.clone()));
    }
    if let Some(transaction_id) = &query.transaction_id {
        fragments.push("inputs.transaction_id = ?".to_string());
        args.push(SqlArg::Text(transaction_id.clone()));
    }
    if let Some(output_index) = query.output_index {
        fragments.push("inputs.output_index = ?".to_string());
        args.push(SqlArg::Int(output_index as i64));
    }
    (fragments.join(" AND "), args)
}

/// Input repository for managing materialized outputs
pub struct InputRepository;

impl InputRepository {
    /// Translate a match query into a parameterized SELECT.
    ///
    /// Total over the pattern variants, status flags, and sort directions.
    pub fn build_select(query: &MatchQuery) -> PreparedQuery {
        let (where_clause, args) = where_clause(query);
        let direction = match query.order {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let sql = format!(
            "SELECT inputs.* FROM inputs WHERE {} \
             ORDER BY inputs.created_at_slot {}, inputs.transaction_id, inputs.output_index",
            where_clause, direction
        );
        PreparedQuery { sql, args }
    }

    /// Fetch all rows of a match query at once.
    ///
    /// The HTTP surface streams instead; this is for the smaller consumers
    /// (tests, overlap-free deletions).
    pub async fn select_all(
        conn: &mut SqliteConnection,
        query: &MatchQuery,
    ) -> DbResult<Vec<Input>> {
        let prepared = Self::build_select(query);
        let rows = prepared.query().fetch_all(conn).await?;
        Ok(rows)
    }

    /// Persist a fresh input together with its policy join rows.
    pub async fn insert(conn: &mut SqliteConnection, input: &Input) -> DbResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO inputs \
             (transaction_id, output_index, address, payment_credential, delegation_credential, \
              value, datum_hash, script_hash, created_at_slot, created_at_header_hash, \
              spent_at_slot, spent_at_header_hash, spent_at_transaction_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&input.transaction_id)
        .bind(input.output_index)
        .bind(&input.address)
        .bind(&input.payment_credential)
        .bind(&input.delegation_credential)
        .bind(&input.value)
        .bind(&input.datum_hash)
        .bind(&input.script_hash)
        .bind(input.created_at_slot)
        .bind(&input.created_at_header_hash)
        .bind(input.spent_at_slot)
        .bind(&input.spent_at_header_hash)
        .bind(&input.spent_at_transaction_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record the policies present on an output.
    pub async fn insert_policies<'a>(
        conn: &mut SqliteConnection,
        transaction_id: &str,
        output_index: u64,
        policies: impl Iterator<Item = &'a str>,
    ) -> DbResult<()> {
        for policy_id in policies {
            sqlx::query(
                "INSERT OR IGNORE INTO policies (transaction_id, output_index, policy_id) \
                 VALUES (?, ?, ?)",
            )
            .bind(transaction_id)
            .bind(output_index as i64)
            .bind(policy_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Mark an input as spent, if it is indexed.
    pub async fn mark_spent(
        conn: &mut SqliteConnection,
        reference: &OutputReference,
        spent_at: &Point,
        spending_transaction_id: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE inputs SET spent_at_slot = ?, spent_at_header_hash = ?, \
             spent_at_transaction_id = ? WHERE transaction_id = ? AND output_index = ?",
        )
        .bind(spent_at.slot_or_zero() as i64)
        .bind(spent_at.header_hash().unwrap_or_default())
        .bind(spending_transaction_id)
        .bind(&reference.transaction_id)
        .bind(reference.output_index as i64)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch one input by reference.
    pub async fn get(
        conn: &mut SqliteConnection,
        transaction_id: &str,
        output_index: u64,
    ) -> DbResult<Option<Input>> {
        let row = sqlx::query_as::<_, Input>(
            "SELECT * FROM inputs WHERE transaction_id = ? AND output_index = ?",
        )
        .bind(transaction_id)
        .bind(output_index as i64)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Delete everything matched by a pattern. Returns the number of inputs
    /// removed.
    pub async fn delete_matches(conn: &mut SqliteConnection, pattern: &Pattern) -> DbResult<u64> {
        let query = MatchQuery::for_pattern(pattern.clone());
        let (where_clause, args) = where_clause(&query);

        let sql = format!(
            "DELETE FROM policies WHERE EXISTS (SELECT 1 FROM inputs \
             WHERE inputs.transaction_id = policies.transaction_id \
             AND inputs.output_index = policies.output_index AND {})",
            where_clause
        );
        bind_args(sqlx::query(&sql), &args).execute(&mut *conn).await?;

        let sql = format!("DELETE FROM inputs WHERE {}", where_clause);
        let result = bind_args(sqlx::query(&sql), &args).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Retract every effect later than the given slot: delete inputs created
    /// after it and clear spent markers applied after it. Passing -1 retracts
    /// everything (rollback to origin).
    pub async fn rollback_to(conn: &mut SqliteConnection, slot_no: i64) -> DbResult<u64> {
        sqlx::query(
            "DELETE FROM policies WHERE EXISTS (SELECT 1 FROM inputs \
             WHERE inputs.transaction_id = policies.transaction_id \
             AND inputs.output_index = policies.output_index \
             AND inputs.created_at_slot > ?)",
        )
        .bind(slot_no)
        .execute(&mut *conn)
        .await?;
        let deleted = sqlx::query("DELETE FROM inputs WHERE created_at_slot > ?")
            .bind(slot_no)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "UPDATE inputs SET spent_at_slot = NULL, spent_at_header_hash = NULL, \
             spent_at_transaction_id = NULL WHERE spent_at_slot > ?",
        )
        .bind(slot_no)
        .execute(&mut *conn)
        .await?;
        Ok(deleted.rows_affected())
    }

    /// Prune inputs spent strictly before the given slot. Used by the
    /// garbage collector once a spend is older than the rollback horizon.
    pub async fn prune_spent(conn: &mut SqliteConnection, before_slot: u64) -> DbResult<u64> {
        let before_slot = before_slot as i64;
        sqlx::query(
            "DELETE FROM policies WHERE EXISTS (SELECT 1 FROM inputs \
             WHERE inputs.transaction_id = policies.transaction_id \
             AND inputs.output_index = policies.output_index \
             AND inputs.spent_at_slot IS NOT NULL AND inputs.spent_at_slot < ?)",
        )
        .bind(before_slot)
        .execute(&mut *conn)
        .await?;
        let result =
            sqlx::query("DELETE FROM inputs WHERE spent_at_slot IS NOT NULL AND spent_at_slot < ?")
                .bind(before_slot)
                .execute(&mut *conn)
                .await?;
        Ok(result.rows_affected())
    }

    /// Count indexed inputs.
    pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM inputs")
            .fetch_one(conn)
            .await?;
        Ok(count)
    }
}

fn bind_args<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    args: &'q [SqlArg],
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    let mut query = query;
    for arg in args {
        query = match arg {
            SqlArg::Text(text) => query.bind(text.as_str()),
            SqlArg::Int(int) => query.bind(*int),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRED: &str = "11111111111111111111111111111111111111111111111111111111";
    const POLICY: &str = "33333333333333333333333333333333333333333333333333333333";
    const TX_ID: &str = "4444444444444444444444444444444444444444444444444444444444444444";

    fn every_pattern() -> Vec<Pattern> {
        vec![
            Pattern::Any,
            Pattern::ExactAddress("00aabb".into()),
            Pattern::PaymentCredential(CRED.into()),
            Pattern::DelegationCredential(CRED.into()),
            Pattern::AddressPair {
                payment: CRED.into(),
                delegation: CRED.into(),
            },
            Pattern::PolicyId(POLICY.into()),
            Pattern::AssetId {
                policy_id: POLICY.into(),
                asset_name: "abcd".into(),
            },
            Pattern::TransactionId(TX_ID.into()),
            Pattern::OutputReference {
                transaction_id: TX_ID.into(),
                output_index: 1,
            },
        ]
    }

    #[test]
    fn test_translator_is_total() {
        for pattern in every_pattern() {
            for status in [StatusFlag::Unspent, StatusFlag::Spent, StatusFlag::All] {
                for order in [SortDirection::Asc, SortDirection::Desc] {
                    let query = MatchQuery {
                        pattern: pattern.clone(),
                        status,
                        order,
                        policy_id: Some(POLICY.into()),
                        transaction_id: Some(TX_ID.into()),
                        output_index: Some(0),
                    };
                    let prepared = InputRepository::build_select(&query);
                    assert!(prepared.sql.starts_with("SELECT inputs.*"));
                    assert_eq!(
                        prepared.placeholders(),
                        prepared.args_len(),
                        "placeholder/arg mismatch for {:?}",
                        query
                    );
                }
            }
        }
    }

    #[test]
    fn test_status_flag_predicates() {
        let unspent = InputRepository::build_select(&MatchQuery {
            status: StatusFlag::Unspent,
            ..MatchQuery::for_pattern(Pattern::Any)
        });
        assert!(unspent.sql.contains("spent_at_slot IS NULL"));

        let spent = InputRepository::build_select(&MatchQuery {
            status: StatusFlag::Spent,
            ..MatchQuery::for_pattern(Pattern::Any)
        });
        assert!(spent.sql.contains("spent_at_slot IS NOT NULL"));
    }

    #[test]
    fn test_sort_direction() {
        let asc = InputRepository::build_select(&MatchQuery {
            order: SortDirection::Asc,
            ..MatchQuery::for_pattern(Pattern::Any)
        });
        assert!(asc.sql.contains("created_at_slot ASC"));
    }
}
