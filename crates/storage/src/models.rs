use domain::protocol::Document;
use domain::Address;
use sqlx::FromRow;

#[derive(FromRow)]
pub struct SqlDocument {
    pub path: String,
    pub data: String,
}

impl TryFrom<SqlDocument> for Document {
    type Error = anyhow::Error;

    fn try_from(sql: SqlDocument) -> Result<Self, Self::Error> {
        let address = sql
            .path
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("bad stored path {}: {}", sql.path, e))?;
        // unreadable JSON is passed on as null and rejected by the schema check
        let data = serde_json::from_str(&sql.data).unwrap_or_else(|e| {
            tracing::warn!("Stored document {} is not valid JSON: {}", sql.path, e);
            serde_json::Value::Null
        });
        Ok(Document { address, data })
    }
}

pub(crate) fn into_documents(rows: Vec<SqlDocument>) -> Vec<Document> {
    rows.into_iter()
        .filter_map(|row| match Document::try_from(row) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("Skipped stored row: {:?}", e);
                None
            }
        })
        .collect()
}
