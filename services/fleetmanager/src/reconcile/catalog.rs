//! Configured-catalog conversion for the startup reconcile.
//!
//! The configured catalog carries an opaque shard-metadata map per
//! `(connector type, channel)`. Storing it requires a stable revision, which
//! must be declared inside the map itself under `connector_revision`.
use super::ReconcileError;
use crate::config::CatalogEntry;
use crate::model::ShardMetadata;
use serde_json::Value;

/// Convert a configured catalog entry into the shard-metadata row it should
/// resolve to. The row id is assigned by the store on upsert.
pub fn shard_metadata_from_entry(entry: &CatalogEntry) -> Result<ShardMetadata, ReconcileError> {
    let revision = shard_metadata_revision(&entry.channel_config.shard_metadata).map_err(
        |reason| ReconcileError::BadCatalog {
            connector_type_id: entry.connector_type_id.clone(),
            channel: entry.channel.clone(),
            reason,
        },
    )?;
    Ok(ShardMetadata {
        id: 0,
        connector_type_id: entry.connector_type_id.clone(),
        channel: entry.channel.clone(),
        revision,
        // The default serde_json map keeps keys sorted, so this value
        // serializes canonically for checksum comparison.
        shard_metadata: entry.channel_config.shard_metadata.clone(),
    })
}

/// Extract the `connector_revision` declared in a shard-metadata map.
///
/// The value must be numerically integral; JSON decoders commonly surface
/// numbers as floats, so an integral float is accepted.
pub fn shard_metadata_revision(shard_metadata: &Value) -> Result<i64, String> {
    let Some(revision) = shard_metadata.get("connector_revision") else {
        return Err("connector_revision not found in shard metadata".to_string());
    };
    if let Some(value) = revision.as_i64() {
        return Ok(value);
    }
    if let Some(value) = revision.as_f64() {
        if value.fract() == 0.0 {
            return Ok(value as i64);
        }
        return Err(format!(
            "connector_revision in shard metadata was not an integer but {value}"
        ));
    }
    Err(format!(
        "connector_revision in shard metadata was not a number but {revision}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use serde_json::json;

    fn entry(shard_metadata: Value) -> CatalogEntry {
        CatalogEntry {
            connector_type_id: "debezium".to_string(),
            channel: "stable".to_string(),
            channel_config: ChannelConfig { shard_metadata },
        }
    }

    #[test]
    fn revision_from_integer() {
        assert_eq!(
            shard_metadata_revision(&json!({ "connector_revision": 42 })).unwrap(),
            42
        );
    }

    #[test]
    fn revision_from_integral_float() {
        assert_eq!(
            shard_metadata_revision(&json!({ "connector_revision": 42.0 })).unwrap(),
            42
        );
    }

    #[test]
    fn revision_missing_is_rejected() {
        let err = shard_metadata_revision(&json!({})).unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn revision_fractional_is_rejected() {
        assert!(shard_metadata_revision(&json!({ "connector_revision": 4.5 })).is_err());
    }

    #[test]
    fn revision_non_numeric_is_rejected() {
        assert!(shard_metadata_revision(&json!({ "connector_revision": "7" })).is_err());
    }

    #[test]
    fn entry_conversion_carries_payload_and_revision() {
        let metadata = shard_metadata_from_entry(&entry(json!({
            "connector_revision": 3,
            "operators": [{ "type": "camel-k", "version": "[1.0.0,2)" }]
        })))
        .expect("metadata");
        assert_eq!(metadata.connector_type_id, "debezium");
        assert_eq!(metadata.channel, "stable");
        assert_eq!(metadata.revision, 3);
        assert!(metadata.shard_metadata.get("operators").is_some());
    }

    #[test]
    fn entry_conversion_reports_bad_catalog() {
        let err = shard_metadata_from_entry(&entry(json!({}))).unwrap_err();
        assert!(matches!(err, ReconcileError::BadCatalog { .. }));
    }
}
