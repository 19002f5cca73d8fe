use uuid::Uuid;

/// Geographic unit whose PM2.5 reading is refreshed by the ingestion process.
/// The alerting engine only reads it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    /// IANA timezone name. Some zones have none because the source data is incomplete.
    pub timezone: Option<String>,
    pub pm25: f64,
}
