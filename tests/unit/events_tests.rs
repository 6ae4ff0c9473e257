/*!
 * Tests for webhook parsing and event gating
 */

use subpilot::app_config::AcquisitionConfig;
use subpilot::errors::EventError;
use subpilot::events::{self, EventKind, EventSource, InboundEvent};

fn plex_form(boundary: &str, json: &str) -> Vec<u8> {
    format!(
        "--{b}\nContent-Disposition: form-data; name=\"payload\"\n\n{json}\n--{b}--\n",
        b = boundary,
        json = json
    )
    .into_bytes()
}

#[test]
fn test_eventSource_fromStr_shouldBeCaseInsensitive() {
    assert_eq!("Plex".parse::<EventSource>(), Ok(EventSource::Plex));
    assert_eq!("TAUTULLI".parse::<EventSource>(), Ok(EventSource::Tautulli));
    assert!(matches!("jellyfin".parse::<EventSource>(), Err(EventError::Unsupported(_))));
    assert_eq!(EventSource::Tautulli.to_string(), "tautulli");
}

#[test]
fn test_eventKind_fromEventName_shouldMapBothSpellings() {
    assert_eq!(EventKind::from_event_name("library.new"), Some(EventKind::LibraryNew));
    assert_eq!(EventKind::from_event_name("created"), Some(EventKind::LibraryNew));
    assert_eq!(EventKind::from_event_name("library.on.deck"), Some(EventKind::LibraryOnDeck));
    assert_eq!(EventKind::from_event_name("Media.Play"), Some(EventKind::MediaPlay));
    assert_eq!(EventKind::from_event_name("media.stop"), None);
}

#[test]
fn test_parse_withQuotedBoundaryAndBareNewlines_shouldReadPayload() {
    let json = r#"{"event":"library.on.deck","Metadata":{"ratingKey":"5150","type":"episode"}}"#;
    let body = plex_form("----abc", json);

    let event = events::parse(EventSource::Plex, &body, "multipart/form-data; boundary=\"----abc\"").unwrap();

    assert_eq!(
        event,
        InboundEvent {
            source: EventSource::Plex,
            kind: EventKind::LibraryOnDeck,
            media_id: "5150".to_string(),
            media_type: "episode".to_string(),
        }
    );
}

#[test]
fn test_parse_withBinaryThumbnailPart_shouldStillReadPayload() {
    let json = r#"{"event":"library.new","Metadata":{"ratingKey":"77","type":"movie"}}"#;
    let mut body = format!(
        "--B\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{}\r\n\
         --B\r\nContent-Disposition: form-data; name=\"thumb\"; filename=\"poster.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n",
        json
    )
    .into_bytes();
    body.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x80, 0xfe, 0x0d, 0x0a]);
    body.extend_from_slice(b"\r\n--B--\r\n");

    let event = events::parse(EventSource::Plex, &body, "multipart/form-data; boundary=B").unwrap();

    assert_eq!(event.kind, EventKind::LibraryNew);
    assert_eq!(event.media_id, "77");
}

#[test]
fn test_parse_withMultipartMissingPayload_shouldBeMalformed() {
    let body = b"--X\nContent-Disposition: form-data; name=\"thumb\"\n\nxx\n--X--\n";
    let result = events::parse(EventSource::Plex, body, "multipart/form-data; boundary=X");
    assert!(matches!(result, Err(EventError::Malformed(_))));
}

#[test]
fn test_parse_withPlexEventWithoutMetadata_shouldReportMissingKey() {
    let result = events::parse(EventSource::Plex, br#"{"event":"media.play"}"#, "application/json");
    assert_eq!(result, Err(EventError::MissingRatingKey));
}

#[test]
fn test_parse_withBlankRatingKey_shouldReportMissingKey() {
    let body = br#"{"event":"library.new","Metadata":{"ratingKey":"  "}}"#;
    assert_eq!(events::parse(EventSource::Plex, body, "application/json"), Err(EventError::MissingRatingKey));
}

#[test]
fn test_parse_withTautulliCamelCaseKey_shouldParse() {
    let body = br#"{"event":"recently_added","ratingKey":"88","media_type":"movie"}"#;
    let event = events::parse(EventSource::Tautulli, body, "application/json").unwrap();
    assert_eq!(event.kind, EventKind::LibraryNew);
    assert_eq!(event.media_id, "88");
    assert_eq!(event.source, EventSource::Tautulli);
}

#[test]
fn test_shouldProcess_withPlayEnabledAndAddDisabled_shouldInvertGating() {
    let config = AcquisitionConfig {
        auto_download_on_add: false,
        auto_download_on_play: true,
        ..AcquisitionConfig::default()
    };
    let event = |kind| InboundEvent {
        source: EventSource::Tautulli,
        kind,
        media_id: "1".to_string(),
        media_type: "movie".to_string(),
    };
    assert!(!event(EventKind::LibraryNew).should_process(&config));
    assert!(event(EventKind::MediaPlay).should_process(&config));
}
