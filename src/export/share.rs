use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Hosted playground page that understands the `code`/`prompt` query
/// parameters.
pub const SHARE_BASE_URL: &str = "https://maquette.app/play";

/// A component reconstructed from a share link.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedSnippet {
    pub code: String,
    pub prompt: String,
}

/// Build a shareable URL: `code` is URL-safe base64 over the
/// percent-encoded source, so the token survives as a query value
/// untouched; `prompt` rides along percent-encoded.
pub fn share_url(base: &str, code: &str, prompt: &str) -> String {
    let token = URL_SAFE_NO_PAD.encode(urlencoding::encode(code).as_bytes());
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{separator}code={token}&prompt={}",
        urlencoding::encode(prompt)
    )
}

/// Best-effort inverse of [`share_url`]; anything malformed yields `None`.
pub fn decode_share_url(url: &str) -> Option<SharedSnippet> {
    let (_, query) = url.split_once('?')?;
    let mut code = None;
    let mut prompt = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=')?;
        match key {
            "code" => {
                let decoded = URL_SAFE_NO_PAD.decode(value).ok()?;
                let escaped = String::from_utf8(decoded).ok()?;
                code = Some(urlencoding::decode(&escaped).ok()?.into_owned());
            }
            "prompt" => {
                prompt = Some(urlencoding::decode(value).ok()?.into_owned());
            }
            _ => {}
        }
    }
    Some(SharedSnippet {
        code: code?,
        prompt: prompt?,
    })
}
