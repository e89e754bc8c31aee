//! Match endpoint handlers
//!
//! The pattern comes from the path (one or two segments, defaulting to
//! `*`); query parameters narrow by status, asset, or output reference and
//! choose the sort direction. Pattern pre-filters are pushed into SQL;
//! asset-name restrictions are applied in process while streaming.

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{Deleted, Match};
use crate::api::response::json_lines;
use crate::api::routes::AppState;
use crate::chain::pattern::{
    Pattern, ASSET_NAME_MAX_HEX_LEN, POLICY_ID_HEX_LEN, TRANSACTION_ID_HEX_LEN,
};
use crate::db::repositories::{InputRepository, MatchQuery, SortDirection, StatusFlag};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use futures::TryStreamExt;

/// Handler for GET /matches
pub async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    matches_response(state, "*".to_string(), params).await
}

/// Handler for GET /matches/{pattern}
pub async fn list_matches_one(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    matches_response(state, pattern, params).await
}

/// Handler for GET /matches/{pattern}/{sub}
pub async fn list_matches_two(
    State(state): State<AppState>,
    Path((pattern, sub)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    matches_response(state, format!("{}/{}", pattern, sub), params).await
}

/// Handler for DELETE /matches/{pattern}
pub async fn delete_matches_one(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> ApiResult<Json<Deleted>> {
    delete_matches(state, pattern).await
}

/// Handler for DELETE /matches/{pattern}/{sub}
pub async fn delete_matches_two(
    State(state): State<AppState>,
    Path((pattern, sub)): Path<(String, String)>,
) -> ApiResult<Json<Deleted>> {
    delete_matches(state, format!("{}/{}", pattern, sub)).await
}

#[derive(Debug, Default)]
struct MatchFilters {
    status: Option<StatusFlag>,
    order: Option<SortDirection>,
    policy_id: Option<String>,
    asset_name: Option<String>,
    transaction_id: Option<String>,
    output_index: Option<u64>,
}

fn is_hex_of(text: &str, len: usize) -> bool {
    text.len() == len && text.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_filters(params: &[(String, String)]) -> Result<MatchFilters, ApiError> {
    let mut filters = MatchFilters::default();
    for (key, value) in params {
        match key.as_str() {
            "spent" | "unspent" => {
                if filters.status.is_some() {
                    return Err(ApiError::InvalidStatusFlag);
                }
                filters.status = Some(if key == "spent" {
                    StatusFlag::Spent
                } else {
                    StatusFlag::Unspent
                });
            }
            "order" => {
                filters.order = Some(match value.as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    _ => return Err(ApiError::InvalidSortDirection),
                });
            }
            "policy_id" => {
                if !is_hex_of(value, POLICY_ID_HEX_LEN) {
                    return Err(ApiError::InvalidMatchFilter(
                        "policy_id must be 56 hex digits".into(),
                    ));
                }
                filters.policy_id = Some(value.to_lowercase());
            }
            "asset_name" => {
                let valid = value.is_empty()
                    || (value.len() <= ASSET_NAME_MAX_HEX_LEN
                        && value.len() % 2 == 0
                        && value.chars().all(|c| c.is_ascii_hexdigit()));
                if !valid {
                    return Err(ApiError::InvalidMatchFilter(
                        "asset_name must be hex-encoded".into(),
                    ));
                }
                filters.asset_name = Some(value.to_lowercase());
            }
            "transaction_id" => {
                if !is_hex_of(value, TRANSACTION_ID_HEX_LEN) {
                    return Err(ApiError::InvalidMatchFilter(
                        "transaction_id must be 64 hex digits".into(),
                    ));
                }
                filters.transaction_id = Some(value.to_lowercase());
            }
            "output_index" => {
                let index = value.parse().map_err(|_| {
                    ApiError::InvalidMatchFilter("output_index must be a non-negative integer".into())
                })?;
                filters.output_index = Some(index);
            }
            other => {
                return Err(ApiError::InvalidMatchFilter(format!(
                    "unknown query parameter '{}'",
                    other
                )))
            }
        }
    }
    if filters.asset_name.is_some() && filters.policy_id.is_none() {
        return Err(ApiError::InvalidMatchFilter(
            "asset_name requires policy_id".into(),
        ));
    }
    if filters.output_index.is_some() && filters.transaction_id.is_none() {
        return Err(ApiError::InvalidMatchFilter(
            "output_index requires transaction_id".into(),
        ));
    }
    Ok(filters)
}

async fn matches_response(
    state: AppState,
    pattern_text: String,
    params: Vec<(String, String)>,
) -> ApiResult<Response> {
    let pattern: Pattern = pattern_text.parse().map_err(|_| ApiError::InvalidPattern)?;
    let filters = parse_filters(&params)?;

    // Asset-level restrictions cannot be expressed against the policy join
    // table; they are checked on each decoded row below.
    let mut asset_requirements: Vec<(String, String)> = Vec::new();
    if let Pattern::AssetId {
        policy_id,
        asset_name,
    } = &pattern
    {
        asset_requirements.push((policy_id.clone(), asset_name.clone()));
    }
    if let (Some(policy_id), Some(asset_name)) = (&filters.policy_id, &filters.asset_name) {
        asset_requirements.push((policy_id.clone(), asset_name.clone()));
    }

    let query = MatchQuery {
        pattern,
        status: filters.status.unwrap_or_default(),
        order: filters.order.unwrap_or_default(),
        policy_id: filters.policy_id,
        transaction_id: filters.transaction_id,
        output_index: filters.output_index,
    };

    // The transaction opens before the stream starts: the response is a
    // consistent snapshot no matter how long the client takes to drain it.
    let mut tx = state.db.begin_read().await?;
    let (lines, response) = json_lines();

    tokio::spawn(async move {
        let prepared = InputRepository::build_select(&query);
        {
            let mut rows = prepared.query().fetch(tx.conn());
            loop {
                match rows.try_next().await {
                    Ok(Some(input)) => {
                        let matched = match Match::try_from(input) {
                            Ok(matched) => matched,
                            Err(err) => {
                                tracing::error!(target: "kupo::api", "{}", err);
                                lines.abort("undecodable row").await;
                                break;
                            }
                        };
                        let keep = asset_requirements
                            .iter()
                            .all(|(policy, asset)| matched.value.has_asset(policy, asset));
                        if keep && !lines.send(&matched).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(target: "kupo::api", "match stream failed: {}", err);
                        lines.abort("query failed").await;
                        break;
                    }
                }
            }
        }
        if let Err(err) = tx.commit().await {
            tracing::warn!(target: "kupo::api", "read transaction commit failed: {}", err);
        }
    });

    Ok(response)
}

async fn delete_matches(state: AppState, pattern_text: String) -> ApiResult<Json<Deleted>> {
    let pattern: Pattern = pattern_text.parse().map_err(|_| ApiError::InvalidPattern)?;
    if state.registry.overlaps_any(&pattern) {
        return Err(ApiError::StillActivePattern(pattern.to_string()));
    }
    let mut tx = state.db.begin_write().await?;
    let deleted = InputRepository::delete_matches(tx.conn(), &pattern).await?;
    tx.commit().await?;
    Ok(Json(Deleted { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_status_flags() {
        let filters = parse_filters(&params(&[("unspent", "")])).unwrap();
        assert_eq!(filters.status, Some(StatusFlag::Unspent));
        assert!(parse_filters(&params(&[("spent", ""), ("unspent", "")])).is_err());
    }

    #[test]
    fn test_parse_order() {
        let filters = parse_filters(&params(&[("order", "asc")])).unwrap();
        assert_eq!(filters.order, Some(SortDirection::Asc));
        assert!(matches!(
            parse_filters(&params(&[("order", "upwards")])),
            Err(ApiError::InvalidSortDirection)
        ));
    }

    #[test]
    fn test_asset_name_requires_policy() {
        assert!(parse_filters(&params(&[("asset_name", "abcd")])).is_err());
        let policy = "3".repeat(POLICY_ID_HEX_LEN);
        assert!(
            parse_filters(&params(&[("policy_id", &policy), ("asset_name", "abcd")])).is_ok()
        );
    }

    #[test]
    fn test_output_index_requires_transaction() {
        assert!(parse_filters(&params(&[("output_index", "2")])).is_err());
    }

    #[test]
    fn test_unknown_filter_rejected() {
        assert!(matches!(
            parse_filters(&params(&[("frobnicate", "yes")])),
            Err(ApiError::InvalidMatchFilter(_))
        ));
    }
}
