use crate::session::{errors::SessionError, types::SessionRecord};

use crate::storage::CacheData;

impl TryFrom<&SessionRecord> for CacheData {
    type Error = SessionError;

    fn try_from(record: &SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            value: serde_json::to_string(record)?,
        })
    }
}

impl TryFrom<&CacheData> for SessionRecord {
    type Error = SessionError;

    fn try_from(data: &CacheData) -> Result<Self, Self::Error> {
        serde_json::from_str(&data.value).map_err(|e| SessionError::Serialization(e.to_string()))
    }
}
