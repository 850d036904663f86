use async_trait::async_trait;
use std::sync::Arc;

use crate::date_range::parse_date;
use crate::error::ConvertError;
use crate::instances::InstanceLookup;
use crate::log::{LogRecord, Metadata};
use crate::transport::RawRecord;

/// Turns a transport record into a [`LogRecord`].
///
/// Conversion is always asynchronous (it may need a metadata lookup) and the
/// stream awaits one record at a time, so records keep their arrival order.
#[async_trait]
pub trait RecordConverter<R>: Send + Sync {
    async fn convert(&self, raw: R) -> Result<LogRecord, ConvertError>;
}

/// Adapts a synchronous closure
pub struct ConvertFn<F>(pub F);

#[async_trait]
impl<R, F> RecordConverter<R> for ConvertFn<F>
where
    R: Send + 'static,
    F: Fn(R) -> Result<LogRecord, ConvertError> + Send + Sync,
{
    async fn convert(&self, raw: R) -> Result<LogRecord, ConvertError> {
        (self.0)(raw)
    }
}

/// Converts [`RawRecord`]s, optionally enriching them with the instance and
/// deployment they came from.
#[derive(Default)]
pub struct RawRecordConverter {
    lookup: Option<Arc<dyn InstanceLookup>>,
}

impl RawRecordConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(lookup: Arc<dyn InstanceLookup>) -> Self {
        Self { lookup: Some(lookup) }
    }
}

#[async_trait]
impl RecordConverter<RawRecord> for RawRecordConverter {
    async fn convert(&self, raw: RawRecord) -> Result<LogRecord, ConvertError> {
        let date = parse_date(&raw.date).map_err(|err| ConvertError::Malformed(err.to_string()))?;
        let id = raw
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // BTreeMap iteration keeps metadata sorted by name
        let mut metadata: Vec<Metadata> = raw
            .metadata
            .into_iter()
            .map(|(name, value)| Metadata::new(name, value))
            .collect();

        if let Some(instance_id) = raw.instance {
            let info = match &self.lookup {
                Some(lookup) => lookup.lookup(&instance_id).await,
                None => None,
            };
            match info {
                Some(info) => {
                    metadata.push(Metadata::new("instance", info.instance_name));
                    if let Some(deployment_id) = info.deployment_id {
                        metadata.push(Metadata::new("deployment", deployment_id));
                    }
                }
                None => metadata.push(Metadata::new("instance", instance_id)),
            }
        }

        Ok(LogRecord::new(id, date, raw.message).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::InstanceInfo;

    struct OneInstance;

    #[async_trait]
    impl InstanceLookup for OneInstance {
        async fn lookup(&self, instance_id: &str) -> Option<InstanceInfo> {
            (instance_id == "i-1").then(|| InstanceInfo {
                instance_id: "i-1".to_string(),
                instance_name: "web-1".to_string(),
                deployment_id: Some("d-42".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_converts_raw_record() {
        let mut raw = RawRecord::new("2024-10-17T12:00:00.250Z", "hello");
        raw.id = Some("abc".to_string());
        raw.metadata.insert("level".to_string(), "info".to_string());
        raw.metadata.insert("caller".to_string(), "main".to_string());

        let record = RawRecordConverter::new().convert(raw).await.unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.formatted_date(), "2024-10-17T12:00:00.250Z");
        assert_eq!(record.metadata[0], Metadata::new("caller", "main"));
        assert_eq!(record.metadata[1], Metadata::new("level", "info"));
    }

    #[tokio::test]
    async fn test_missing_id_gets_generated() {
        let record = RawRecordConverter::new()
            .convert(RawRecord::new("2024-10-17T12:00:00Z", "hello"))
            .await
            .unwrap();
        assert_eq!(record.id.len(), 36);
    }

    #[tokio::test]
    async fn test_bad_date_is_malformed() {
        let result = RawRecordConverter::new()
            .convert(RawRecord::new("yesterday-ish", "hello"))
            .await;
        assert!(matches!(result, Err(ConvertError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_instance_enrichment() {
        let converter = RawRecordConverter::with_lookup(Arc::new(OneInstance));

        let mut known = RawRecord::new("2024-10-17T12:00:00Z", "a");
        known.instance = Some("i-1".to_string());
        let record = converter.convert(known).await.unwrap();
        assert_eq!(record.metadata_value("instance"), Some("web-1"));
        assert_eq!(record.metadata_value("deployment"), Some("d-42"));

        let mut unknown = RawRecord::new("2024-10-17T12:00:00Z", "b");
        unknown.instance = Some("i-9".to_string());
        let record = converter.convert(unknown).await.unwrap();
        assert_eq!(record.metadata_value("instance"), Some("i-9"));
        assert_eq!(record.metadata_value("deployment"), None);
    }

    #[tokio::test]
    async fn test_convert_fn_adapter() {
        let converter = ConvertFn(|n: u32| {
            if n == 0 {
                return Err(ConvertError::Malformed("zero".to_string()));
            }
            Ok(LogRecord::new(n.to_string(), chrono::Utc::now(), "n"))
        });
        assert!(converter.convert(0).await.is_err());
        assert_eq!(converter.convert(3).await.unwrap().id, "3");
    }
}
