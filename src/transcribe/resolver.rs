use url::Url;

use crate::error::TranscribeError;

/// Extract the video identifier from a YouTube URL.
///
/// Recognizes the query-parameter form (`youtube.com/watch?v=ID`) and the
/// path-segment forms (`youtu.be/ID`, `/embed/ID`, `/shorts/ID`, `/v/ID`).
/// The identifier is treated as opaque beyond basic character validation.
/// Pure and deterministic; performs no I/O.
pub fn extract_video_id(input: &str) -> Result<String, TranscribeError> {
    let malformed = || TranscribeError::MalformedSourceUrl(input.to_string());

    let parsed = Url::parse(input).map_err(|_| malformed())?;

    // Only web URLs qualify; other schemes can carry a youtube.com host
    // (ftp is a "special" scheme to the parser) but are not video links.
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(malformed());
    }

    let host = parsed.host_str().ok_or_else(malformed)?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let id = match host {
        "youtu.be" => parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => {
            let mut segments = parsed.path_segments().into_iter().flatten();
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find_map(|(key, value)| (key == "v").then(|| value.into_owned())),
                Some("embed") | Some("shorts") | Some("v") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    };

    match id {
        Some(id) if is_plausible_id(&id) => Ok(id),
        _ => Err(malformed()),
    }
}

/// YouTube identifiers are URL-safe base64-ish tokens. This only rejects
/// obvious garbage (empty segments, separators); the format is otherwise
/// provider-specific and not validated further.
fn is_plausible_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
