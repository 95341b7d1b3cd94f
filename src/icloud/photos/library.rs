use serde_json::json;

use super::album::QueryContext;
use super::cloudkit::{QueryResponse, Record};
use crate::icloud::error::ICloudError;

/// Fail with `IndexingNotFinished` unless the library reports `FINISHED`.
/// Listing a library that is still indexing returns incomplete pages.
pub(crate) async fn check_indexing(ctx: &QueryContext) -> Result<(), ICloudError> {
    let body = json!({
        "query": {"recordType": "CheckIndexingState"},
        "zoneID": &ctx.zone_id,
    });
    let response = ctx.post("records/query", &body).await?;
    let query: QueryResponse = serde_json::from_value(response)?;
    let state = query
        .records
        .first()
        .and_then(|r| r.field_str("state"))
        .unwrap_or_default();
    if state != "FINISHED" {
        tracing::debug!(state, "Library indexing state");
        return Err(ICloudError::IndexingNotFinished);
    }
    Ok(())
}

/// All album folder records, including sentinels and deleted ones.
pub(crate) async fn fetch_folders(ctx: &QueryContext) -> Result<Vec<Record>, ICloudError> {
    let body = json!({
        "query": {"recordType": "CPLAlbumByPositionLive"},
        "zoneID": &ctx.zone_id,
    });
    let response = ctx.post("records/query", &body).await?;
    let query: QueryResponse = serde_json::from_value(response)?;
    Ok(query.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icloud::photos::album::testing::context;
    use crate::icloud::photos::session::testing::ScriptedSession;

    #[tokio::test]
    async fn test_indexing_finished() {
        let session = ScriptedSession::new([json!({
            "records": [{"recordName": "x", "fields": {"state": {"value": "FINISHED"}}}]
        })]);
        check_indexing(&context(&session, 100)).await.unwrap();
        assert_eq!(
            session.request_body(0)["query"]["recordType"],
            "CheckIndexingState"
        );
    }

    #[tokio::test]
    async fn test_indexing_in_progress() {
        let session = ScriptedSession::new([json!({
            "records": [{"recordName": "x", "fields": {"state": {"value": "RUNNING"}}}]
        })]);
        let err = check_indexing(&context(&session, 100)).await.unwrap_err();
        assert!(matches!(err, ICloudError::IndexingNotFinished));
    }

    #[tokio::test]
    async fn test_fetch_folders() {
        let session = ScriptedSession::new([json!({
            "records": [
                {"recordName": "----Root-Folder----", "recordType": "CPLAlbum"},
                {"recordName": "F1", "recordType": "CPLAlbum", "fields": {"albumNameEnc": {"value": "SG9saWRheXM="}}}
            ]
        })]);
        let folders = fetch_folders(&context(&session, 100)).await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[1].field_str("albumNameEnc"), Some("SG9saWRheXM="));
    }
}
