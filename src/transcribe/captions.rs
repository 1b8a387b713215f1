use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::StrategyError;

/// A timestamped snippet of caption text as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionFragment {
    pub text: String,
    /// Offset from the start of the video, in seconds
    pub start: f64,
    /// Display duration, in seconds
    pub duration: f64,
}

/// Caption retrieval collaborator. Implementations perform network I/O;
/// the orchestrator owns the deadline around `fetch`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Fetch caption fragments for a video, honoring the ordered language
    /// preference. `CaptionsUnavailable` means the provider has no captions
    /// in any requested language; that outcome is expected and triggers
    /// fallback rather than surfacing to the caller.
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<CaptionFragment>, StrategyError>;
}

/// Concatenate fragment texts in provider order with single-space
/// separators. No re-punctuation or cleanup.
pub fn join_fragments(fragments: &[CaptionFragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One available caption track for a video.
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
}

/// Pick the first track matching the ordered language preference. An exact
/// code match wins; a prefix match ("en" preferring track "en-US") is
/// accepted next.
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Option<&'a CaptionTrack> {
    for lang in languages {
        if let Some(track) = tracks.iter().find(|t| t.language_code == *lang) {
            return Some(track);
        }
        if let Some(track) = tracks
            .iter()
            .find(|t| t.language_code.starts_with(&format!("{lang}-")))
        {
            return Some(track);
        }
    }
    None
}

/// Caption provider backed by YouTube's innertube player API. Resolves the
/// track list for a video, then fetches the chosen track in json3 form.
pub struct YoutubeCaptionProvider {
    http: reqwest::Client,
    player_endpoint: String,
}

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";

// Innertube requires a client identity; the web client is the least
// restricted for caption listings.
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "2.20240401.00.00";

impl YoutubeCaptionProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            player_endpoint: PLAYER_ENDPOINT.to_string(),
        }
    }

    async fn player_response(&self, video_id: &str) -> Result<Value, StrategyError> {
        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });

        let response = self
            .http
            .post(&self.player_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| StrategyError::CaptionFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| StrategyError::CaptionFetch(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| StrategyError::CaptionFetch(format!("invalid player response: {e}")))
    }

    async fn fetch_track(&self, track: &CaptionTrack) -> Result<String, StrategyError> {
        let separator = if track.base_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}fmt=json3", track.base_url, separator);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StrategyError::CaptionFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| StrategyError::CaptionFetch(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| StrategyError::CaptionFetch(e.to_string()))
    }
}

impl Default for YoutubeCaptionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionProvider for YoutubeCaptionProvider {
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<CaptionFragment>, StrategyError> {
        tracing::debug!("Resolving caption tracks for video: {}", video_id);

        let player = self.player_response(video_id).await?;
        let tracks = parse_track_list(&player);

        if tracks.is_empty() {
            return Err(StrategyError::CaptionsUnavailable(format!(
                "video {video_id} has no caption tracks"
            )));
        }

        let track = select_track(&tracks, languages).ok_or_else(|| {
            StrategyError::CaptionsUnavailable(format!(
                "no caption track matches requested language(s) {languages:?}"
            ))
        })?;

        tracing::debug!(
            "Fetching caption track '{}' for video {}",
            track.language_code,
            video_id
        );

        let body = self.fetch_track(track).await?;
        parse_json3(&body)
    }
}

/// Extract the caption track list from an innertube player response.
pub fn parse_track_list(player: &Value) -> Vec<CaptionTrack> {
    player["captions"]["playerCaptionsTracklistRenderer"]["captionTracks"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|track| {
            Some(CaptionTrack {
                base_url: track["baseUrl"].as_str()?.to_string(),
                language_code: track["languageCode"].as_str()?.to_string(),
            })
        })
        .collect()
}

/// Parse a json3 caption document into fragments, preserving order.
/// Events without text segments (style/window events) are skipped.
pub fn parse_json3(body: &str) -> Result<Vec<CaptionFragment>, StrategyError> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| StrategyError::CaptionFetch(format!("invalid caption payload: {e}")))?;

    let fragments = doc["events"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|event| {
            let segs = event["segs"].as_array()?;
            let text = segs
                .iter()
                .filter_map(|seg| seg["utf8"].as_str())
                .collect::<String>()
                .replace('\n', " ")
                .trim()
                .to_string();
            if text.is_empty() {
                return None;
            }
            Some(CaptionFragment {
                text,
                start: event["tStartMs"].as_f64().unwrap_or(0.0) / 1000.0,
                duration: event["dDurationMs"].as_f64().unwrap_or(0.0) / 1000.0,
            })
        })
        .collect();

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> CaptionFragment {
        CaptionFragment {
            text: text.to_string(),
            start: 0.0,
            duration: 1.0,
        }
    }

    fn track(lang: &str) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://captions.example/{lang}"),
            language_code: lang.to_string(),
        }
    }

    #[test]
    fn join_uses_single_spaces_in_order() {
        let fragments = vec![fragment("Hello"), fragment("world")];
        assert_eq!(join_fragments(&fragments), "Hello world");
    }

    #[test]
    fn join_does_no_cleanup() {
        let fragments = vec![fragment("uh,"), fragment("so  anyway")];
        assert_eq!(join_fragments(&fragments), "uh, so  anyway");
    }

    #[test]
    fn join_of_nothing_is_empty() {
        assert_eq!(join_fragments(&[]), "");
    }

    #[test]
    fn select_track_prefers_language_order() {
        let tracks = vec![track("de"), track("en")];
        let languages = vec!["en".to_string(), "de".to_string()];
        assert_eq!(
            select_track(&tracks, &languages).unwrap().language_code,
            "en"
        );
    }

    #[test]
    fn select_track_accepts_regional_variant() {
        let tracks = vec![track("en-US")];
        let languages = vec!["en".to_string()];
        assert_eq!(
            select_track(&tracks, &languages).unwrap().language_code,
            "en-US"
        );
    }

    #[test]
    fn select_track_returns_none_without_match() {
        let tracks = vec![track("fr")];
        let languages = vec!["en".to_string()];
        assert!(select_track(&tracks, &languages).is_none());
    }

    #[test]
    fn parses_player_track_list() {
        let player = serde_json::json!({
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {"baseUrl": "https://captions.example/a", "languageCode": "en"},
                        {"baseUrl": "https://captions.example/b", "languageCode": "es"},
                    ]
                }
            }
        });

        let tracks = parse_track_list(&player);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language_code, "en");
        assert_eq!(tracks[1].language_code, "es");
    }

    #[test]
    fn missing_caption_section_yields_no_tracks() {
        let player = serde_json::json!({"videoDetails": {}});
        assert!(parse_track_list(&player).is_empty());
    }

    #[test]
    fn parses_json3_events() {
        let body = r#"{
            "events": [
                {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": "Hello"}]},
                {"tStartMs": 1500, "aAppend": 1},
                {"tStartMs": 1600, "dDurationMs": 900, "segs": [{"utf8": "wor"}, {"utf8": "ld"}]},
                {"tStartMs": 2500, "dDurationMs": 100, "segs": [{"utf8": "\n"}]}
            ]
        }"#;

        let fragments = parse_json3(body).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "Hello");
        assert_eq!(fragments[0].start, 0.0);
        assert_eq!(fragments[0].duration, 1.5);
        assert_eq!(fragments[1].text, "world");
        assert_eq!(join_fragments(&fragments), "Hello world");
    }

    #[test]
    fn rejects_invalid_caption_payload() {
        assert!(matches!(
            parse_json3("<html>not json</html>"),
            Err(StrategyError::CaptionFetch(_))
        ));
    }
}
