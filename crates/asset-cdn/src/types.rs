//! Response types for the asset CDN

use chrono::{DateTime, Utc};
use image_cache_store::CacheStats;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            uptime_secs: 3600,
            cache: CacheStats {
                tables: 2,
                entries: 100,
                hits: 500,
                misses: 50,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime_secs"], 3600);
        assert_eq!(json["cache"]["tables"], 2);
        assert_eq!(json["cache"]["hits"], 500);
        assert!(json["timestamp"].as_str().is_some());
    }
}
