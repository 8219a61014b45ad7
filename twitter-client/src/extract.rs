//! Normalization of Twitter trend locations and trending-topic payloads.
//!
//! Same tolerance contract as the Reddit extractor: missing or mistyped
//! fields become `None`; only an item without its natural key (WOEID for
//! regions, name for topics) is skipped, and the skip is counted.

use chrono::{DateTime, Timelike, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use undertow_core::fields::{opt_bool, opt_i64, opt_str};
use undertow_core::{ExtractionOutcome, TrendingTopic, TwitterRegion};

/// Normalize one trend location. Returns `None` only when the WOEID is
/// absent.
pub fn region_from_raw(item: &Value) -> Option<TwitterRegion> {
    let woeid = opt_i64(item, "woeid")?;

    let location_type = item
        .get("placeType")
        .and_then(|place_type| opt_str(place_type, "name"));

    Some(TwitterRegion {
        woeid,
        name: opt_str(item, "name"),
        location_type,
        parent_woeid: opt_i64(item, "parentid"),
        country: opt_str(item, "country"),
        country_code: opt_str(item, "countryCode"),
    })
}

/// Normalize a `trends/available` response.
pub fn regions_from_raw(items: &[Value]) -> ExtractionOutcome<TwitterRegion> {
    let mut outcome = ExtractionOutcome::new();

    for item in items {
        match region_from_raw(item) {
            Some(region) => outcome.records.push(region),
            None => {
                warn!("Skipping trend location without a WOEID");
                outcome.missing_key += 1;
            }
        }
    }

    outcome
}

/// Normalize one `trends/place` payload into topics for the given region.
///
/// Every topic is stamped with the region's WOEID and the payload's reported
/// extraction time (falling back to the poll time), truncated to whole
/// seconds so a retried poll within the same tick lands on the same
/// composite key.
pub fn topics_from_payload(
    payload: &Value,
    woeid: i64,
    polled_at: DateTime<Utc>,
) -> ExtractionOutcome<TrendingTopic> {
    let retrieved_at = whole_second(payload_timestamp(payload).unwrap_or(polled_at));

    let mut outcome = ExtractionOutcome::new();

    let trends = match payload.get("trends").and_then(Value::as_array) {
        Some(trends) => trends,
        None => {
            warn!("Trends payload for WOEID {} carries no trends array", woeid);
            return outcome;
        }
    };

    for trend in trends {
        match opt_str(trend, "name") {
            Some(name) => outcome.records.push(TrendingTopic {
                name,
                woeid,
                retrieved_at,
                url: opt_str(trend, "url"),
                promoted_content: opt_bool(trend, "promoted_content"),
                topic_query: opt_str(trend, "query"),
                tweet_volume: opt_i64(trend, "tweet_volume"),
            }),
            None => {
                warn!("Skipping trend without a name for WOEID {}", woeid);
                outcome.missing_key += 1;
            }
        }
    }

    outcome
}

fn payload_timestamp(payload: &Value) -> Option<DateTime<Utc>> {
    for key in ["created_at", "as_of"] {
        if let Some(raw) = opt_str(payload, key) {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(dt) => return Some(dt.with_timezone(&Utc)),
                Err(e) => debug!("Unparseable {} in trends payload: {}", key, e),
            }
        }
    }
    None
}

fn whole_second(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_region_extraction() {
        let item = json!({
            "name": "Ottawa",
            "placeType": { "code": 7, "name": "Town" },
            "url": "http://where.yahooapis.com/v1/place/3369",
            "parentid": 23424775,
            "country": "Canada",
            "woeid": 3369,
            "countryCode": "CA"
        });

        let region = region_from_raw(&item).unwrap();
        assert_eq!(region.woeid, 3369);
        assert_eq!(region.name.as_deref(), Some("Ottawa"));
        assert_eq!(region.location_type.as_deref(), Some("Town"));
        assert_eq!(region.parent_woeid, Some(23424775));
        assert_eq!(region.country_code.as_deref(), Some("CA"));
    }

    #[test]
    fn test_region_tolerates_partial_location() {
        let item = json!({ "woeid": 1, "placeType": "Supername" });
        let region = region_from_raw(&item).unwrap();
        assert_eq!(region.woeid, 1);
        assert_eq!(region.name, None);
        assert_eq!(region.location_type, None);
        assert_eq!(region.country, None);
    }

    #[test]
    fn test_region_without_woeid_is_counted() {
        let items = vec![
            json!({ "woeid": 3369, "name": "Ottawa" }),
            json!({ "name": "Nowhere" }),
        ];
        let outcome = regions_from_raw(&items);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.missing_key, 1);
    }

    #[test]
    fn test_topics_extraction() {
        let payload = json!({
            "trends": [
                {
                    "name": "Chelsea",
                    "url": "http://twitter.com/search?q=Chelsea",
                    "promoted_content": null,
                    "query": "Chelsea",
                    "tweet_volume": 798388
                },
                {
                    "name": "#rustlang",
                    "query": "%23rustlang",
                    "tweet_volume": null
                }
            ],
            "created_at": "2021-11-30T15:40:32Z",
            "locations": [{ "name": "New York", "woeid": 2459115 }]
        });

        let polled_at = Utc::now();
        let outcome = topics_from_payload(&payload, 2459115, polled_at);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.missing_key, 0);

        let chelsea = &outcome.records[0];
        assert_eq!(chelsea.name, "Chelsea");
        assert_eq!(chelsea.woeid, 2459115);
        assert_eq!(chelsea.tweet_volume, Some(798388));
        assert_eq!(chelsea.promoted_content, None);
        assert_eq!(
            chelsea.retrieved_at.to_rfc3339(),
            "2021-11-30T15:40:32+00:00"
        );

        // Nullable volume stays null without costing the record
        assert_eq!(outcome.records[1].tweet_volume, None);
    }

    #[test]
    fn test_topic_without_name_is_counted() {
        let payload = json!({
            "trends": [
                { "name": "Chelsea" },
                { "query": "nameless" }
            ]
        });
        let outcome = topics_from_payload(&payload, 1, Utc::now());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.missing_key, 1);
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_poll_time() {
        let payload = json!({ "trends": [{ "name": "Chelsea" }] });
        let polled_at = Utc::now();
        let outcome = topics_from_payload(&payload, 1, polled_at);
        assert_eq!(outcome.records[0].retrieved_at, whole_second(polled_at));
        assert_eq!(outcome.records[0].retrieved_at.nanosecond(), 0);
    }

    #[test]
    fn test_missing_trends_array_is_empty_not_error() {
        let payload = json!({ "created_at": "2021-11-30T15:40:32Z" });
        let outcome = topics_from_payload(&payload, 1, Utc::now());
        assert!(outcome.records.is_empty());
    }
}
